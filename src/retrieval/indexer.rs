//! 源码目录索引：遍历、过滤、分片并写入本地向量索引

use glob::Pattern;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::Result;
use super::store::{DocumentChunk, LocalVectorIndex, chunk_id};
use crate::config::RetrievalConfig;

/// 一次索引的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks: usize,
}

/// 目录索引器
pub struct Indexer {
    patterns: Vec<Pattern>,
    excluded_dirs: Vec<String>,
    chunk_chars: usize,
    max_file_size: u64,
}

impl Indexer {
    pub fn new(config: &RetrievalConfig) -> Self {
        let patterns = config
            .include_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid include pattern");
                    None
                }
            })
            .collect();

        Self {
            patterns,
            excluded_dirs: config.excluded_dirs.clone(),
            chunk_chars: config.chunk_chars.max(1),
            max_file_size: config.max_file_size,
        }
    }

    fn is_included(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(file_name))
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == name)
    }

    /// 收集目录下所有待索引分片
    pub fn collect_chunks(&self, root: &Path) -> (Vec<DocumentChunk>, IndexReport) {
        let mut chunks = Vec::new();
        let mut report = IndexReport::default();

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !self.is_excluded_dir(&entry.file_name().to_string_lossy())
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable path");
                    report.files_skipped += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            if !self.is_included(&file_name) {
                continue;
            }

            let too_large = entry
                .metadata()
                .map(|m| m.len() > self.max_file_size)
                .unwrap_or(true);
            if too_large {
                debug!(path = %path.display(), "Skipping oversized or unreadable file");
                report.files_skipped += 1;
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) if !content.trim().is_empty() => content,
                Ok(_) => {
                    report.files_skipped += 1;
                    continue;
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping non-text file");
                    report.files_skipped += 1;
                    continue;
                }
            };

            let source = pathdiff::diff_paths(path, root)
                .unwrap_or_else(|| path.to_path_buf())
                .to_string_lossy()
                .replace('\\', "/");

            let pieces = split_into_chunks(&content, self.chunk_chars);
            let multi = pieces.len() > 1;
            for (i, text) in pieces.into_iter().enumerate() {
                let mut id = chunk_id(&source, &text);
                if multi {
                    id = format!("{}#{}", id, i);
                }
                chunks.push(DocumentChunk {
                    id,
                    source: source.clone(),
                    text,
                });
            }
            report.files_indexed += 1;
        }

        report.chunks = chunks.len();
        (chunks, report)
    }

    /// 索引目录，`rebuild` 为真时先清空已有索引
    pub async fn index_directory(
        &self,
        index: &LocalVectorIndex,
        root: &Path,
        rebuild: bool,
    ) -> Result<IndexReport> {
        if rebuild {
            index.clear().await?;
        }

        let (chunks, report) = self.collect_chunks(root);
        index.insert_chunks(chunks).await?;

        info!(
            files = report.files_indexed,
            skipped = report.files_skipped,
            chunks = report.chunks,
            root = %root.display(),
            "Indexed source directory"
        );
        Ok(report)
    }
}

/// 按行切分为不超过 `max_chars` 个字符的分片，超长单行按字符硬切
pub fn split_into_chunks(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in content.split_inclusive('\n') {
        let line_chars = line.chars().count();

        if line_chars > max_chars {
            if !current.trim().is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.clear();
            current_chars = 0;

            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                let piece: String = piece.iter().collect();
                if !piece.trim().is_empty() {
                    chunks.push(piece);
                }
            }
            continue;
        }

        if current_chars + line_chars > max_chars && !current.is_empty() {
            if !current.trim().is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.clear();
            current_chars = 0;
        }

        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::VectorIndex;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> RetrievalConfig {
        RetrievalConfig {
            include_patterns: vec!["*.rs".to_string(), "*.md".to_string()],
            chunk_chars: 64,
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn test_split_into_chunks_respects_limit() {
        let content = "line one\nline two\nline three\n";
        let chunks = split_into_chunks(content, 18);
        assert_eq!(chunks, vec!["line one\nline two\n", "line three\n"]);

        let long = "x".repeat(25);
        let chunks = split_into_chunks(&long, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_split_into_chunks_skips_blank() {
        assert!(split_into_chunks("   \n\n", 10).is_empty());
    }

    #[test]
    fn test_collect_chunks_filters_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
        fs::write(root.join("README.md"), "# Demo\n").unwrap();
        fs::write(root.join("empty.md"), "   \n").unwrap();
        fs::write(root.join("image.png"), "not really").unwrap();
        fs::write(root.join("target/build.rs"), "fn main() {}\n").unwrap();

        let indexer = Indexer::new(&test_config());
        let (chunks, report) = indexer.collect_chunks(root);

        let mut sources: Vec<_> = chunks.iter().map(|c| c.source.as_str()).collect();
        sources.sort();
        assert_eq!(sources, vec!["README.md", "src/lib.rs"]);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.chunks, 2);
    }

    #[tokio::test]
    async fn test_index_directory_and_query() {
        let source_dir = TempDir::new().unwrap();
        let index_dir = TempDir::new().unwrap();
        fs::write(
            source_dir.path().join("billing.rs"),
            "fn invoice_total(items: &[Item]) -> Money { sum(items) }\n",
        )
        .unwrap();
        fs::write(source_dir.path().join("notes.md"), "Deployment notes\n").unwrap();

        let index = LocalVectorIndex::open(index_dir.path()).await.unwrap();
        let indexer = Indexer::new(&test_config());
        let report = indexer
            .index_directory(&index, source_dir.path(), true)
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 2);

        let result = index.query("invoice total", 1).await.unwrap();
        assert_eq!(result.metadatas[0].source.as_deref(), Some("billing.rs"));
    }
}
