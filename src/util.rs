/// Canonical form used for every case-insensitive comparison: surrounding
/// whitespace stripped, then Unicode lowercase. The store indexes this form,
/// so code and store always agree on what "same title" means.
pub fn casefold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Truncate a string to `max` characters, appending "…" if truncated.
/// Counts chars, not bytes, so multi-byte text is never split.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut out = String::new();
    for (n, ch) in s.chars().enumerate() {
        if n == max {
            out.push('…');
            return out;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casefold_trims_and_lowercases() {
        assert_eq!(casefold("  Project Phoenix "), "project phoenix");
        assert_eq!(casefold("RUST"), "rust");
    }

    #[test]
    fn casefold_unicode() {
        assert_eq!(casefold("CAFÉ Notes"), "café notes");
    }

    #[test]
    fn casefold_preserves_inner_spacing() {
        assert_eq!(casefold("a  b"), "a  b");
    }

    #[test]
    fn truncate_short_unchanged() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn truncate_at_limit() {
        assert_eq!(truncate_chars("hello world", 5), "hello…");
    }

    #[test]
    fn truncate_multibyte() {
        assert_eq!(truncate_chars("你好世界测试", 4), "你好世界…");
    }

    #[test]
    fn truncate_empty() {
        assert_eq!(truncate_chars("", 3), "");
    }
}
