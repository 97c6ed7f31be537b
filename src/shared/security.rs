//! Usage: Token masking for logs and constant-time comparisons for oauth state checks.

use subtle::ConstantTimeEq;

/// Masks a secret for log output, keeping a short prefix and suffix.
pub fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.len() <= 10 {
        return "*".repeat(trimmed.len());
    }
    let prefix: String = trimmed.chars().take(6).collect();
    let suffix: String = trimmed
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{prefix}...{suffix}")
}

/// Compares two strings without early exit on the first differing byte.
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_keeps_prefix_and_suffix() {
        assert_eq!(mask_token("abcdef0123456789"), "abcdef...6789");
    }

    #[test]
    fn mask_token_hides_short_values_entirely() {
        assert_eq!(mask_token("secret"), "******");
        assert_eq!(mask_token("   "), "<empty>");
    }

    #[test]
    fn constant_time_eq_matches_plain_equality() {
        assert!(constant_time_eq("state-abc", "state-abc"));
        assert!(!constant_time_eq("state-abc", "state-abd"));
        assert!(!constant_time_eq("short", "longer-value"));
    }
}
