// src/api/mod.rs

pub mod chains;
pub mod health;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::integrations::{ApiTarget, DryRunTarget, HttpApiTarget, OllamaOracle};
use crate::services::batch_executor::BatchExecutor;
use crate::services::chain_resolver::ChainResolver;
use crate::services::intent::{CachedOracle, KeywordIntentOracle, MappingOracle};
use crate::services::pipeline::Pipeline;

// AppState definition
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
    pub executor: Arc<BatchExecutor>,
    pub oracle: Arc<dyn MappingOracle>,
}

impl AppState {
    /// Wire the pipeline, downstream target and oracle from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let resolver = Arc::new(ChainResolver::default());
        let pipeline = Pipeline::new(config.builder_config(), resolver.clone());

        let target: Arc<dyn ApiTarget> = match &config.api_target_url {
            Some(url) => {
                tracing::info!("Downstream API target: {}", url);
                Arc::new(HttpApiTarget::new(
                    url,
                    Duration::from_secs(config.call_timeout_secs),
                )?)
            }
            None => Arc::new(DryRunTarget),
        };
        let executor = BatchExecutor::new(target, config.executor_config());

        let inner: Arc<dyn MappingOracle> = match &config.ollama_base_url {
            Some(base_url) => {
                tracing::info!("Mapping oracle: {} ({})", base_url, config.ollama_model);
                Arc::new(OllamaOracle::new(
                    base_url,
                    &config.ollama_model,
                    Duration::from_secs(config.oracle_timeout_secs),
                )?)
            }
            None => Arc::new(KeywordIntentOracle::new(resolver)),
        };
        let oracle = Arc::new(CachedOracle::new(
            inner,
            Duration::from_secs(config.plan_cache_ttl_secs),
        ));

        Ok(Self {
            config: config.clone(),
            pipeline: Arc::new(pipeline),
            executor: Arc::new(executor),
            oracle,
        })
    }
}
