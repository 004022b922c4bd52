//! 结构化输出清洗
//!
//! 所有需要JSON输出的智能体共用同一套流程：去掉markdown代码围栏，按目标结构解析；
//! 解析失败时返回该结构的占位值，占位值中统一带有 [`PARSE_FAILURE_MARKER`]。

use regex::Regex;
use schemars::JsonSchema;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::LazyLock;
use tracing::warn;

/// 解析失败的统一标记文本
pub const PARSE_FAILURE_MARKER: &str = "could not parse LLM output";

static FENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid fence pattern")
});

/// 结构化输出类型：可解析、可序列化、可导出JSON Schema，并定义解析失败时的占位值
pub trait StructuredOutput: DeserializeOwned + Serialize + JsonSchema {
    fn placeholder(raw: &str) -> Self;
}

/// 去掉markdown代码围栏；没有完整围栏时去掉首尾残留的反引号
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(captures) = FENCE_PATTERN.captures(trimmed)
        && let Some(body) = captures.get(1)
    {
        return body.as_str().trim().to_string();
    }

    let mut cleaned = trimmed.trim_matches('`').trim();
    if let Some(rest) = cleaned.strip_prefix("json") {
        cleaned = rest.trim_start();
    }
    cleaned.to_string()
}

/// 截取第一个 `{`/`[` 到最后一个 `}`/`]` 之间的片段，用于处理前后带解释文字的输出
fn outermost_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end > start).then(|| &text[start..=end])
}

/// 清洗并解析为目标结构，失败时返回占位值
pub fn sanitize_structured<T: StructuredOutput>(raw: &str) -> T {
    try_parse_structured(raw).unwrap_or_else(|| {
        warn!(
            output_type = std::any::type_name::<T>(),
            raw_chars = raw.chars().count(),
            "Structured output did not match schema, using placeholder"
        );
        T::placeholder(raw)
    })
}

/// 清洗并解析为目标结构
pub fn try_parse_structured<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let cleaned = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return Some(value);
    }
    outermost_json_span(&cleaned).and_then(|span| serde_json::from_str::<T>(span).ok())
}

/// 将结构化结果渲染为格式化JSON文本
pub fn render_structured<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// 导出目标结构的JSON Schema文本，嵌入到提示词中
pub fn schema_text<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
