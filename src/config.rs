use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_CHAIN,
    DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MAX_ATTEMPTS, DEFAULT_OLLAMA_MODEL,
    DEFAULT_ORACLE_TIMEOUT_SECS, DEFAULT_PLAN_CACHE_TTL_SECS, DEFAULT_SYSTEMIC_FAILURE_THRESHOLD,
};
use crate::models::ChainId;
use crate::services::batch_executor::{ExecutorConfig, RetryPolicy};
use crate::services::call_builder::BuilderConfig;
use crate::utils::{env_non_empty, is_env_flag_enabled};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: String,

    // Executor
    pub concurrency_limit: usize,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_multiplier: f64,
    pub call_timeout_secs: u64,
    pub systemic_failure_threshold: u32,

    // Builder
    pub default_chain: String,
    pub synthesize_placeholder_hashes: bool,

    // Downstream API
    pub api_target_url: Option<String>,

    // Oracle
    pub ollama_base_url: Option<String>,
    pub ollama_model: String,
    pub oracle_timeout_secs: u64,
    pub plan_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),

            concurrency_limit: env::var("CONCURRENCY_LIMIT")
                .unwrap_or_else(|_| DEFAULT_CONCURRENCY_LIMIT.to_string())
                .parse()?,
            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
                .parse()?,
            retry_backoff_base_ms: env::var("RETRY_BACKOFF_BASE_MS")
                .unwrap_or_else(|_| DEFAULT_BACKOFF_BASE_MS.to_string())
                .parse()?,
            retry_backoff_multiplier: env::var("RETRY_BACKOFF_MULTIPLIER")
                .unwrap_or_else(|_| DEFAULT_BACKOFF_MULTIPLIER.to_string())
                .parse()?,
            call_timeout_secs: env::var("CALL_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_CALL_TIMEOUT_SECS.to_string())
                .parse()?,
            systemic_failure_threshold: env::var("SYSTEMIC_FAILURE_THRESHOLD")
                .unwrap_or_else(|_| DEFAULT_SYSTEMIC_FAILURE_THRESHOLD.to_string())
                .parse()?,

            default_chain: env::var("DEFAULT_CHAIN")
                .map(|v| v.trim().to_ascii_uppercase())
                .unwrap_or_else(|_| DEFAULT_CHAIN.to_string()),
            synthesize_placeholder_hashes: is_env_flag_enabled("SYNTHESIZE_PLACEHOLDER_HASHES"),

            api_target_url: env_non_empty("API_TARGET_URL"),

            ollama_base_url: env_non_empty("OLLAMA_BASE_URL"),
            ollama_model: env_non_empty("OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            oracle_timeout_secs: env::var("ORACLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_ORACLE_TIMEOUT_SECS.to_string())
                .parse()?,
            plan_cache_ttl_secs: env::var("PLAN_CACHE_TTL_SECS")
                .unwrap_or_else(|_| DEFAULT_PLAN_CACHE_TTL_SECS.to_string())
                .parse()?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency_limit == 0 {
            anyhow::bail!("CONCURRENCY_LIMIT must be > 0");
        }
        if self.retry_max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be >= 1 (use 1 to disable retries)");
        }
        // Delays must strictly grow between attempts.
        if !self.retry_backoff_multiplier.is_finite() || self.retry_backoff_multiplier <= 1.0 {
            anyhow::bail!("RETRY_BACKOFF_MULTIPLIER must be a finite value > 1.0");
        }
        if self.default_chain.trim().is_empty() {
            anyhow::bail!("DEFAULT_CHAIN is empty");
        }
        if default_chain_id(&self.default_chain).is_none() {
            anyhow::bail!(
                "DEFAULT_CHAIN '{}' is not one of {}",
                self.default_chain,
                ChainId::SUPPORTED
                    .iter()
                    .map(ChainId::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        if self.retry_max_attempts == 1 {
            tracing::info!("Retries disabled (RETRY_MAX_ATTEMPTS=1)");
        }
        if self.synthesize_placeholder_hashes {
            tracing::warn!("Placeholder tx hashes enabled; synthesized values are flagged in outcomes");
        }
        if self.api_target_url.is_none() {
            tracing::warn!("API_TARGET_URL not set; calls go to the dry-run target");
        }
        if self.ollama_base_url.is_none() {
            tracing::info!("OLLAMA_BASE_URL not set; instructions use the keyword intent oracle");
        }
        if self.call_timeout_secs == 0 {
            tracing::warn!("CALL_TIMEOUT_SECS is 0; every call will time out");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency_limit: self.concurrency_limit,
            retry: self.retry_policy(),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            systemic_failure_threshold: self.systemic_failure_threshold,
        }
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            default_chain: default_chain_id(&self.default_chain)
                .map(|chain| chain.as_str().to_string())
                .unwrap_or_else(|| self.default_chain.trim().to_string()),
            synthesize_placeholder_hashes: self.synthesize_placeholder_hashes,
        }
    }
}

fn default_chain_id(raw: &str) -> Option<ChainId> {
    let raw = raw.trim();
    ChainId::SUPPORTED
        .into_iter()
        .find(|chain| chain.as_str().eq_ignore_ascii_case(raw))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_allowed_origins: "*".to_string(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            retry_backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            systemic_failure_threshold: DEFAULT_SYSTEMIC_FAILURE_THRESHOLD,
            default_chain: DEFAULT_CHAIN.to_string(),
            synthesize_placeholder_hashes: false,
            api_target_url: None,
            ollama_base_url: None,
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            oracle_timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
            plan_cache_ttl_secs: DEFAULT_PLAN_CACHE_TTL_SECS,
        }
    }
}
