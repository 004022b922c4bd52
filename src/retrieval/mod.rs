//! 检索子系统：向量索引接口、本地实现与上下文构建

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod context;
pub mod embedding;
pub mod indexer;
pub mod store;

pub use context::{ContextBuilder, NO_DOCUMENTS_FOUND, UNKNOWN_SOURCE};
pub use indexer::{IndexReport, Indexer};
pub use store::LocalVectorIndex;

/// 检索层错误
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("index error: {0}")]
    Index(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// 文档元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: Option<String>,
}

/// 检索结果，documents 与 metadatas 按下标对齐
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub documents: Vec<String>,
    pub metadatas: Vec<DocumentMetadata>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// 文档与来源成对迭代；元数据缺失或不足时来源为 None
    pub fn hits(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.documents.iter().enumerate().map(|(i, doc)| {
            let source = self.metadatas.get(i).and_then(|m| m.source.as_deref());
            (doc.as_str(), source)
        })
    }
}

/// 向量索引协作者
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 写入一段文本，返回文档ID
    async fn embed(&self, text: &str, source: &str) -> Result<String>;

    /// 按相似度降序返回最多 k 条结果
    async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult>;
}
