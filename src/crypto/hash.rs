use sha3::{Digest, Keccak256};

/// Cache key for a mapping plan: the instruction plus the header set.
/// Headers are trimmed, lower-cased and sorted so column order and casing
/// do not produce distinct keys.
pub fn plan_cache_key(instruction: &str, headers: &[String]) -> String {
    let mut normalized: Vec<String> = headers
        .iter()
        .map(|header| header.trim().to_lowercase())
        .collect();
    normalized.sort();
    normalized.dedup();

    let mut hasher = Keccak256::new();
    hasher.update(instruction.trim().as_bytes());
    for header in &normalized {
        // Separator keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update([0u8]);
        hasher.update(header.as_bytes());
    }
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_key_ignores_header_order_and_case() {
        let a = plan_cache_key(
            "tag these as expenses",
            &["Purpose".to_string(), "tx_link".to_string()],
        );
        let b = plan_cache_key(
            "tag these as expenses",
            &["TX_LINK ".to_string(), "purpose".to_string()],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn plan_key_is_prefixed_keccak_hex() {
        let key = plan_cache_key("", &[]);
        assert_eq!(
            key,
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn plan_key_depends_on_instruction_and_headers() {
        let headers = vec!["a".to_string(), "bc".to_string()];
        let base = plan_cache_key("x", &headers);
        assert_ne!(base, plan_cache_key("y", &headers));
        assert_ne!(
            base,
            plan_cache_key("x", &["ab".to_string(), "c".to_string()])
        );
    }
}
