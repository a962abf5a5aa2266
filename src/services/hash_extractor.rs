use regex::Regex;
use std::sync::OnceLock;

use crate::constants::TX_PATH_MARKER;
use crate::models::TxHash;

fn hash_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]{64}").expect("valid tx hash regex"))
}

/// Locate a transaction hash in a URL, bare hash or free text.
///
/// URLs are tried first by isolating the segment after `/tx/`; otherwise the
/// first hash-shaped token with a clean boundary on both sides is returned.
/// Hex runs longer than a hash are never truncated into one.
pub fn extract_tx_hash(candidate: &str) -> Option<TxHash> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Some(hash) = tx_path_segment(candidate).and_then(TxHash::parse) {
        return Some(hash);
    }

    hash_pattern()
        .find_iter(candidate)
        .filter(|m| is_boundary(candidate[..m.start()].chars().next_back()))
        .filter(|m| is_boundary(candidate[m.end()..].chars().next()))
        .find_map(|m| TxHash::parse(m.as_str()))
}

/// First hash found across candidates, in order.
pub fn extract_first<'a, I>(candidates: I) -> Option<TxHash>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates.into_iter().find_map(extract_tx_hash)
}

fn tx_path_segment(candidate: &str) -> Option<&str> {
    let lowered = candidate.to_ascii_lowercase();
    let start = lowered.find(TX_PATH_MARKER)? + TX_PATH_MARKER.len();
    let rest = &candidate[start..];
    let end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

// Edge of string, or any character that cannot continue a hex/identifier run.
fn is_boundary(neighbour: Option<char>) -> bool {
    match neighbour {
        None => true,
        Some(c) => !(c.is_ascii_alphanumeric() || c == '_'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(c: char) -> String {
        format!("0x{}", c.to_string().repeat(64))
    }

    #[test]
    fn extracts_hash_after_tx_marker() {
        let hash = hash_of('a');
        let url = format!("https://polygonscan.com/tx/{}", hash);
        assert_eq!(extract_tx_hash(&url).unwrap().as_str(), hash);

        let with_query = format!("https://etherscan.io/tx/{}?tab=logs#events", hash);
        assert_eq!(extract_tx_hash(&with_query).unwrap().as_str(), hash);
    }

    #[test]
    fn extracts_bare_hash_and_hash_in_text() {
        let hash = hash_of('b');
        assert_eq!(extract_tx_hash(&hash).unwrap().as_str(), hash);
        let text = format!("paid via {} yesterday", hash);
        assert_eq!(extract_tx_hash(&text).unwrap().as_str(), hash);
    }

    #[test]
    fn preserves_hex_case() {
        let hash = format!("0x{}", "aB".repeat(32));
        assert_eq!(extract_tx_hash(&hash).unwrap().as_str(), hash);
    }

    #[test]
    fn too_short_hash_is_rejected() {
        assert!(extract_tx_hash("0x123").is_none());
        assert!(extract_tx_hash("https://etherscan.io/tx/0x123").is_none());
    }

    #[test]
    fn longer_hex_runs_do_not_yield_partial_matches() {
        let long = format!("0x{}", "c".repeat(70));
        assert!(extract_tx_hash(&long).is_none());

        let prefixed = format!("ff{}", hash_of('d'));
        assert!(extract_tx_hash(&prefixed).is_none());

        let url = format!("https://etherscan.io/tx/{}", long);
        assert!(extract_tx_hash(&url).is_none());
    }

    #[test]
    fn empty_and_missing_inputs_yield_none() {
        assert!(extract_tx_hash("").is_none());
        assert!(extract_tx_hash("no hash here").is_none());
    }

    #[test]
    fn extract_first_walks_candidates_in_order() {
        let first = hash_of('1');
        let second = hash_of('2');
        assert_eq!(
            extract_first(["none", first.as_str(), second.as_str()])
                .unwrap()
                .as_str(),
            first
        );
    }
}
