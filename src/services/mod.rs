// All service modules
pub mod batch_executor;
pub mod call_builder;
pub mod chain_resolver;
pub mod classifier;
pub mod hash_extractor;
pub mod intent;
pub mod normalizer;
pub mod pipeline;

// Re-export for convenience
pub use batch_executor::{
    AuditSink, BatchExecutor, BatchResult, BatchWarning, CancelToken, ExecutorConfig, RetryPolicy,
    TracingAuditSink,
};
pub use call_builder::{validate_plan, BuilderConfig, CallBuilder};
pub use chain_resolver::ChainResolver;
pub use classifier::{ClassificationStrategy, HeuristicClassifier, PlanClassifier, RowFacts};
pub use hash_extractor::extract_tx_hash;
pub use intent::{CachedOracle, KeywordIntentOracle, MappingOracle};
pub use normalizer::normalize_row;
pub use pipeline::{choose_strategy, Pipeline, PreparedBatch, RunReport, StrategyChoice};
