use std::sync::Arc;
use tracing::{debug, warn};

use super::{RetrievalResult, VectorIndex};
use crate::utils::text::truncate_chars;

/// 无检索结果时的上下文文本
pub const NO_DOCUMENTS_FOUND: &str = "No relevant documents found.";

/// 来源缺失时的显示标签
pub const UNKNOWN_SOURCE: &str = "unknown";

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// 将检索结果整理为有界的上下文文本
#[derive(Clone)]
pub struct ContextBuilder {
    index: Arc<dyn VectorIndex>,
    max_chars: usize,
}

impl ContextBuilder {
    pub fn new(index: Arc<dyn VectorIndex>, max_chars: usize) -> Self {
        Self { index, max_chars }
    }

    /// 检索并构建上下文，返回 (上下文文本, 命中文档数)。
    /// 检索失败时记录日志并按无结果处理，从不返回错误。
    pub async fn build(&self, query: &str, top_k: usize) -> (String, usize) {
        let result = match self.index.query(query, top_k).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                return (NO_DOCUMENTS_FOUND.to_string(), 0);
            }
        };

        let count = result.documents.len();
        if count == 0 {
            return (NO_DOCUMENTS_FOUND.to_string(), 0);
        }

        let context = truncate_chars(&format_blocks(&result), self.max_chars);
        debug!(doc_count = count, context_chars = context.chars().count(), "Built context");
        (context, count)
    }

    /// 仅返回命中的 (来源, 文档) 列表，用于展示检索来源
    pub async fn sources(&self, query: &str, top_k: usize) -> Vec<(String, String)> {
        match self.index.query(query, top_k).await {
            Ok(result) => result
                .hits()
                .map(|(doc, source)| {
                    (
                        source.unwrap_or(UNKNOWN_SOURCE).to_string(),
                        doc.to_string(),
                    )
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Retrieval failed while listing sources");
                Vec::new()
            }
        }
    }
}

fn format_blocks(result: &RetrievalResult) -> String {
    result
        .hits()
        .map(|(doc, source)| format!("Source: {}\n{}", source.unwrap_or(UNKNOWN_SOURCE), doc))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
