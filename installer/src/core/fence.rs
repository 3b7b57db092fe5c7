//! Markdown code-fence detection and removal for generated playbooks.

pub const FENCE: &str = "```";

/// Strip one pair of fence markers wrapping `content`.
///
/// Returns `None` unless the trimmed content starts with a fence and ends with
/// one. The whole first line is the opening marker, whatever info string it
/// carries. Only the two markers are removed; the inner text is trimmed of
/// surrounding whitespace.
pub fn strip_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.starts_with(FENCE) {
        return None;
    }
    let (_, body) = trimmed.split_once('\n')?;
    let inner = body.strip_suffix(FENCE)?;
    Some(inner.trim().to_string())
}
