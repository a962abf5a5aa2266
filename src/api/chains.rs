use axum::Json;
use serde::Serialize;

use crate::constants::CHAIN_DOMAINS;
use crate::models::{ApiResponse, ChainId};

#[derive(Debug, Serialize)]
pub struct ChainInfo {
    pub chain: ChainId,
    pub explorers: Vec<&'static str>,
}

pub fn supported_chains() -> Vec<ChainInfo> {
    ChainId::SUPPORTED
        .iter()
        .map(|chain| ChainInfo {
            chain: *chain,
            explorers: CHAIN_DOMAINS
                .iter()
                .filter(|(_, id)| id == chain)
                .map(|(domain, _)| *domain)
                .collect(),
        })
        .collect()
}

/// GET /api/v1/chains
pub async fn list_chains() -> Json<ApiResponse<Vec<ChainInfo>>> {
    Json(ApiResponse::success(supported_chains()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_chain_has_an_explorer() {
        let chains = supported_chains();
        assert_eq!(chains.len(), ChainId::SUPPORTED.len());
        assert!(chains.iter().all(|info| !info.explorers.is_empty()));
        let optimism = chains
            .iter()
            .find(|info| info.chain == ChainId::Optimism)
            .unwrap();
        assert_eq!(optimism.explorers, vec!["optimistic.etherscan.io"]);
    }
}
