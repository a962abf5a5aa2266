use crate::constants::{CHAIN_DOMAINS, CHAIN_NAMES};
use crate::models::ChainId;
use crate::utils::tokenize_words;

/// Maps explorer URLs, domain fragments and free-text chain names onto a
/// `ChainId`. Lookup tables are injected and read-only, so one resolver can
/// be shared across workers.
///
/// Resolution order:
/// 1. first entry of `domains` contained in the candidate (case-insensitive);
/// 2. first entry of `names` appearing as a whole word;
/// 3. otherwise `ChainId::Unknown`.
#[derive(Debug, Clone)]
pub struct ChainResolver {
    domains: Vec<(String, ChainId)>,
    names: Vec<(String, ChainId)>,
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::new(CHAIN_DOMAINS, CHAIN_NAMES)
    }
}

impl ChainResolver {
    pub fn new(domains: &[(&str, ChainId)], names: &[(&str, ChainId)]) -> Self {
        let lower = |table: &[(&str, ChainId)]| {
            table
                .iter()
                .map(|(key, chain)| (key.to_ascii_lowercase(), *chain))
                .collect::<Vec<_>>()
        };
        Self {
            domains: lower(domains),
            names: lower(names),
        }
    }

    pub fn resolve(&self, candidate: &str) -> ChainId {
        let lowered = candidate.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return ChainId::Unknown;
        }

        if let Some((_, chain)) = self
            .domains
            .iter()
            .find(|(domain, _)| lowered.contains(domain.as_str()))
        {
            return *chain;
        }

        let words = tokenize_words(&lowered);
        self.names
            .iter()
            .find(|(name, _)| words.iter().any(|word| word == name))
            .map(|(_, chain)| *chain)
            .unwrap_or(ChainId::Unknown)
    }

    /// First known chain across several candidates (explicit chain column
    /// first, then the tx link), or `Unknown`.
    pub fn resolve_first<'a, I>(&self, candidates: I) -> ChainId
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .map(|candidate| self.resolve(candidate))
            .find(ChainId::is_known)
            .unwrap_or(ChainId::Unknown)
    }
}
