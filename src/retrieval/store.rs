//! 本地文件向量索引
//!
//! 所有条目保存在 `index.json` 中，查询时做暴力余弦相似度排序，
//! 适合单个代码仓库规模的数据量。

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::embedding::{DEFAULT_DIMENSION, cosine_similarity, embed_text};
use super::{DocumentMetadata, Result, RetrievalResult, VectorIndex};

const INDEX_FILE: &str = "index.json";

/// 索引中的单条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    source: String,
    text: String,
    embedding: Vec<f32>,
}

/// 待写入的文档分片
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub source: String,
    pub text: String,
}

/// 本地向量索引
pub struct LocalVectorIndex {
    storage_dir: PathBuf,
    dimension: usize,
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl LocalVectorIndex {
    /// 打开（或创建）位于 `storage_dir` 的索引
    pub async fn open(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let index = Self {
            storage_dir,
            dimension: DEFAULT_DIMENSION,
            entries: RwLock::new(HashMap::new()),
        };
        index.load().await?;
        Ok(index)
    }

    fn data_file(&self) -> PathBuf {
        self.storage_dir.join(INDEX_FILE)
    }

    async fn load(&self) -> Result<()> {
        let file = self.data_file();
        if !file.exists() {
            debug!(path = %file.display(), "No existing vector index");
            return Ok(());
        }

        let data = std::fs::read_to_string(&file)?;
        let loaded: Vec<IndexEntry> = serde_json::from_str(&data)?;

        let mut entries = self.entries.write().await;
        for entry in loaded {
            entries.insert(entry.id.clone(), entry);
        }

        info!(count = entries.len(), path = %file.display(), "Loaded vector index");
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let entries = self.entries.read().await;
        let mut data: Vec<&IndexEntry> = entries.values().collect();
        data.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_string(&data)?;

        let file = self.data_file();
        let temp_file = file.with_extension("json.tmp");
        std::fs::write(&temp_file, json)?;
        std::fs::rename(&temp_file, &file)?;

        debug!(count = entries.len(), "Saved vector index");
        Ok(())
    }

    /// 批量写入分片，只落盘一次
    pub async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        let inserted = chunks.len();
        {
            let mut entries = self.entries.write().await;
            for chunk in chunks {
                let embedding = embed_text(&chunk.text, self.dimension);
                entries.insert(
                    chunk.id.clone(),
                    IndexEntry {
                        id: chunk.id,
                        source: chunk.source,
                        text: chunk.text,
                        embedding,
                    },
                );
            }
        }
        self.save().await?;
        Ok(inserted)
    }

    /// 清空索引
    pub async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        self.save().await
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// 分片ID：`来源::内容摘要前8位`
pub fn chunk_id(source: &str, text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}::{}", source, &digest[..8])
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn embed(&self, text: &str, source: &str) -> Result<String> {
        let id = chunk_id(source, text);
        self.insert_chunks(vec![DocumentChunk {
            id: id.clone(),
            source: source.to_string(),
            text: text.to_string(),
        }])
        .await?;
        Ok(id)
    }

    async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult> {
        let query_embedding = embed_text(text, self.dimension);
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .values()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(k);

        debug!(hits = scored.len(), k, "Vector index query");

        let mut result = RetrievalResult::default();
        for (_, entry) in scored {
            result.documents.push(entry.text.clone());
            result.metadatas.push(DocumentMetadata {
                source: Some(entry.source.clone()),
            });
        }
        Ok(result)
    }
}
