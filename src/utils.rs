// Utility helpers shared by config and services

// Internal helper that checks conditions for `is_env_flag_enabled`.
pub fn is_env_flag_enabled(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

// Internal helper that supports `env_non_empty` operations.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_truthy(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

/// Lower-case alphanumeric words of a free-text string.
pub fn tokenize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy(" Yes "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("off"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn tokenize_words_splits_on_punctuation() {
        assert_eq!(
            tokenize_words("Chain is ETH, purpose=listed."),
            vec!["chain", "is", "eth", "purpose", "listed"]
        );
    }
}
