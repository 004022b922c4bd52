//! 基于特征哈希的词袋向量
//!
//! 每个词元经 MD5 映射到固定维度中的一个桶，并由摘要的另一字节决定符号，
//! 最终做 L2 归一化。结果对同一输入稳定，不依赖外部模型。

use md5::{Digest, Md5};
use regex::Regex;
use std::sync::LazyLock;

/// 默认向量维度
pub const DEFAULT_DIMENSION: usize = 384;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9]*|[0-9]+").expect("valid token pattern"));

/// 拆分词元：按标识符切分，再拆开下划线与驼峰，统一小写
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for m in TOKEN_PATTERN.find_iter(text) {
        let word = m.as_str();
        let lower = word.to_lowercase();
        let parts = split_camel_case(word);
        if parts.len() > 1 {
            tokens.extend(parts.into_iter().map(|p| p.to_lowercase()));
        }
        tokens.push(lower);
    }
    tokens
}

fn split_camel_case(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let bytes = word.as_bytes();
    for i in 1..bytes.len() {
        if bytes[i].is_ascii_uppercase() && bytes[i - 1].is_ascii_lowercase() {
            parts.push(&word[start..i]);
            start = i;
        }
    }
    parts.push(&word[start..]);
    parts
}

/// 生成文本向量
pub fn embed_text(text: &str, dimension: usize) -> Vec<f32> {
    let dimension = dimension.max(1);
    let mut embedding = vec![0.0f32; dimension];

    for token in tokenize(text) {
        let mut hasher = Md5::new();
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();

        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % dimension;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign;
    }

    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut embedding {
            *x /= magnitude;
        }
    }

    embedding
}

/// 余弦相似度，维度不一致或零向量返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
