/// Mask a secret for logging, keeping only enough to recognise it
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "<empty>".to_string(),
        1..=4 => "*".repeat(chars.len()),
        len => {
            let head: String = chars[..2].iter().collect();
            let tail: String = chars[len - 2..].iter().collect();
            format!("{}{}{}", head, "*".repeat(len - 4), tail)
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Compare two secrets without short-circuiting on the first differing byte
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Format a character count in human-readable form
pub fn format_char_count(chars: usize) -> String {
    match chars {
        0..=999 => format!("{} chars", chars),
        1_000..=999_999 => format!("{:.1}k chars", chars as f64 / 1_000.0),
        _ => format!("{:.1}M chars", chars as f64 / 1_000_000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "<empty>");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("spm8v50ymm"), "sp******mm");
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("bearer abc123"), None);
        assert_eq!(bearer_token("abc123"), None);
    }

    #[test]
    fn test_bearer_token_is_taken_verbatim() {
        assert_eq!(bearer_token("Bearer abc123  "), Some("abc123  "));
        assert_eq!(bearer_token("Bearer  abc123"), Some(" abc123"));
        assert!(!constant_time_eq(bearer_token("Bearer abc123 ").unwrap(), "abc123"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("test-api-key", "test-api-key"));
        assert!(!constant_time_eq("test-api-key", "test-api-kez"));
        assert!(!constant_time_eq("short", "longer"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_format_char_count() {
        assert_eq!(format_char_count(512), "512 chars");
        assert_eq!(format_char_count(1_536), "1.5k chars");
        assert_eq!(format_char_count(2_000_000), "2.0M chars");
    }
}
