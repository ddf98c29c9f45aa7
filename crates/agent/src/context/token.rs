//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Only the
//! model knows its real tokenizer, so spans recorded in the context window
//! are estimates; they are consistent, which is what eviction needs.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Tokens a rendered segment occupies in the cache. Never zero, so every
/// recorded turn has a non-empty span.
pub fn span_tokens(segment: &str) -> u32 {
    u32::try_from(estimate_tokens(segment)).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn spans_are_never_empty() {
        assert_eq!(span_tokens(""), 1);
        assert_eq!(span_tokens("hello"), 2);
    }
}
