/// 按字符数截断，保证落在字符边界上
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// 字符数（非字节数）
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
