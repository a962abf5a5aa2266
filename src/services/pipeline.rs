use serde::Serialize;
use std::sync::Arc;

use crate::error::BuildError;
use crate::models::{
    ApiCallDescriptor, BatchOutcome, BatchSummary, ChainId, FunctionType, OutcomeStatus, Row,
};
use crate::services::batch_executor::{BatchExecutor, BatchWarning, CancelToken};
use crate::services::call_builder::{validate_plan, BuilderConfig, CallBuilder};
use crate::services::chain_resolver::ChainResolver;
use crate::services::classifier::{
    ClassificationStrategy, HeuristicClassifier, PlanClassifier, RowFacts,
};
use crate::services::intent::MappingOracle;
use crate::services::normalizer::normalize_row;

// ==================== PREPARED BATCH ====================

#[derive(Debug, Clone, Serialize)]
pub struct PreparedCall {
    pub row_index: usize,
    pub descriptor: ApiCallDescriptor,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defaults_applied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    /// No classification rule matched.
    Unclassified,
    /// Classified, but the builder refused the row.
    Invalid(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RowRejection {
    pub row_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<FunctionType>,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

/// Result of running every row through normalize, extract, classify, build.
/// Each input row lands in exactly one of `calls` or `rejections`.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedBatch {
    pub strategy: &'static str,
    pub total_rows: usize,
    pub calls: Vec<PreparedCall>,
    pub rejections: Vec<RowRejection>,
    pub unresolved_chains: usize,
}

impl PreparedBatch {
    pub fn descriptors(&self) -> Vec<ApiCallDescriptor> {
        self.calls.iter().map(|call| call.descriptor.clone()).collect()
    }
}

// ==================== RUN REPORT ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum RowDisposition {
    Dispatched {
        status: OutcomeStatus,
        attempts: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Unclassified,
    Invalid {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    pub row_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<FunctionType>,
    #[serde(flatten)]
    pub disposition: RowDisposition,
}

/// One terminal disposition per input row plus batch-level aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub strategy: &'static str,
    pub total_rows: usize,
    pub rows: Vec<RowReport>,
    pub summary: BatchSummary,
    pub unclassified: usize,
    pub invalid: usize,
    pub unresolved_chains: usize,
    pub warnings: Vec<String>,
    pub batch_warnings: Vec<BatchWarning>,
    pub outcomes: Vec<BatchOutcome>,
}

impl RunReport {
    pub fn from_parts(
        prepared: PreparedBatch,
        outcomes: Vec<BatchOutcome>,
        batch_warnings: Vec<BatchWarning>,
        warnings: Vec<String>,
    ) -> Self {
        let mut rows: Vec<RowReport> = Vec::with_capacity(prepared.total_rows);

        // Outcome index i corresponds to prepared.calls[i].
        for outcome in &outcomes {
            if let Some(call) = prepared.calls.get(outcome.index) {
                rows.push(RowReport {
                    row_index: call.row_index,
                    method: Some(outcome.descriptor.method),
                    disposition: RowDisposition::Dispatched {
                        status: outcome.status,
                        attempts: outcome.attempts,
                        error: outcome.error.as_ref().map(|e| e.message.clone()),
                    },
                });
            }
        }

        let mut unclassified = 0;
        let mut invalid = 0;
        for rejection in &prepared.rejections {
            let disposition = match &rejection.reason {
                RejectionReason::Unclassified => {
                    unclassified += 1;
                    RowDisposition::Unclassified
                }
                RejectionReason::Invalid(reason) => {
                    invalid += 1;
                    RowDisposition::Invalid {
                        reason: reason.clone(),
                    }
                }
            };
            rows.push(RowReport {
                row_index: rejection.row_index,
                method: rejection.method,
                disposition,
            });
        }
        rows.sort_by_key(|row| row.row_index);

        let mut warnings = warnings;
        warnings.extend(batch_warnings.iter().map(|w| w.message.clone()));
        if prepared.unresolved_chains > 0 {
            warnings.push(format!(
                "{} row(s) had no recognizable chain",
                prepared.unresolved_chains
            ));
        }

        Self {
            strategy: prepared.strategy,
            total_rows: prepared.total_rows,
            summary: BatchSummary::from_outcomes(&outcomes),
            rows,
            unclassified,
            invalid,
            unresolved_chains: prepared.unresolved_chains,
            warnings,
            batch_warnings,
            outcomes,
        }
    }
}

// ==================== STRATEGY SELECTION ====================

pub struct StrategyChoice {
    pub strategy: Arc<dyn ClassificationStrategy>,
    pub warnings: Vec<String>,
}

impl StrategyChoice {
    pub fn heuristic() -> Self {
        Self {
            strategy: Arc::new(HeuristicClassifier),
            warnings: Vec::new(),
        }
    }
}

/// Column names across all rows, in order of first appearance.
pub fn collect_headers(rows: &[Row]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !headers.contains(column) {
                headers.push(column.clone());
            }
        }
    }
    headers
}

/// With an instruction and an oracle, ask for a plan and validate it against
/// the headers. Any oracle or validation failure falls back to heuristics.
pub async fn choose_strategy(
    oracle: Option<&dyn MappingOracle>,
    instruction: Option<&str>,
    headers: &[String],
) -> StrategyChoice {
    let instruction = instruction.map(str::trim).filter(|text| !text.is_empty());
    let (Some(oracle), Some(instruction)) = (oracle, instruction) else {
        return StrategyChoice::heuristic();
    };

    let proposed = oracle.propose_plan(instruction, headers).await;
    let plan = proposed.and_then(|plan| validate_plan(&plan, headers).map(|_| plan));

    match plan {
        Ok(plan) => {
            tracing::info!(
                "Using {} mapping plan: {} with {} mapped columns",
                oracle.name(),
                plan.function,
                plan.column_mapping.len()
            );
            StrategyChoice {
                strategy: Arc::new(PlanClassifier::new(plan)),
                warnings: Vec::new(),
            }
        }
        Err(e) => {
            let message = format!(
                "{} oracle plan rejected ({}); falling back to heuristics",
                oracle.name(),
                e
            );
            tracing::warn!("{}", message);
            let mut choice = StrategyChoice::heuristic();
            choice.warnings.push(message);
            choice
        }
    }
}

// ==================== PIPELINE ====================

/// Row -> NormalizedRow -> facts -> classification -> descriptor.
/// Stateless per row; lookup tables are shared read-only.
#[derive(Debug, Clone)]
pub struct Pipeline {
    resolver: Arc<ChainResolver>,
    builder: CallBuilder,
}

impl Pipeline {
    pub fn new(config: BuilderConfig, resolver: Arc<ChainResolver>) -> Self {
        Self {
            builder: CallBuilder::new(config, resolver.clone()),
            resolver,
        }
    }

    pub fn facts(&self, row: &Row) -> RowFacts {
        RowFacts::extract(normalize_row(row), &self.resolver)
    }

    pub fn prepare_row(
        &self,
        facts: &RowFacts,
        strategy: &dyn ClassificationStrategy,
    ) -> Result<ApiCallDescriptor, (Option<FunctionType>, RejectionReason)> {
        let plan = strategy.classify(facts);
        if !plan.is_classified() {
            return Err((None, RejectionReason::Unclassified));
        }
        self.builder.build(&plan, facts).map_err(|e| match e {
            BuildError::UnknownMethod => (None, RejectionReason::Unclassified),
            other => (Some(plan.function), RejectionReason::Invalid(other.to_string())),
        })
    }

    pub fn prepare(&self, rows: &[Row], strategy: &dyn ClassificationStrategy) -> PreparedBatch {
        let mut calls = Vec::new();
        let mut rejections = Vec::new();
        let mut unresolved_chains = 0;

        for (row_index, row) in rows.iter().enumerate() {
            let facts = self.facts(row);
            if facts.chain == ChainId::Unknown {
                unresolved_chains += 1;
            }

            match self.prepare_row(&facts, strategy) {
                Ok(descriptor) => calls.push(PreparedCall {
                    row_index,
                    defaults_applied: descriptor.defaults_applied.iter().cloned().collect(),
                    descriptor,
                }),
                Err((method, reason)) => {
                    tracing::debug!("Row {} rejected: {:?}", row_index, reason);
                    rejections.push(RowRejection {
                        row_index,
                        method,
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            "Prepared {} of {} rows via {} ({} rejected, {} without a known chain)",
            calls.len(),
            rows.len(),
            strategy.name(),
            rejections.len(),
            unresolved_chains
        );

        PreparedBatch {
            strategy: strategy.name(),
            total_rows: rows.len(),
            calls,
            rejections,
            unresolved_chains,
        }
    }

    /// Prepare, dispatch and fold everything into one report.
    pub async fn run(
        &self,
        rows: &[Row],
        choice: StrategyChoice,
        executor: &BatchExecutor,
        cancel: CancelToken,
    ) -> RunReport {
        let prepared = self.prepare(rows, choice.strategy.as_ref());
        let result = executor
            .execute_with_cancel(prepared.descriptors(), cancel)
            .await;
        RunReport::from_parts(prepared, result.outcomes, result.warnings, choice.warnings)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(BuilderConfig::default(), Arc::new(ChainResolver::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        PARAM_AMOUNT_IN_ETH, PARAM_AMOUNT_IN_USD, PARAM_CHAIN, PARAM_EXPENSE_CATEGORY,
        PARAM_TX_HASH,
    };
    use crate::error::{AppError, Result};
    use crate::integrations::api_target::DryRunTarget;
    use crate::models::{MappingPlan, ParamValue};
    use crate::services::batch_executor::ExecutorConfig;
    use crate::services::intent::KeywordIntentOracle;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn hash(c: char) -> String {
        format!("0x{}", c.to_string().repeat(64))
    }

    fn sample_rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("tx_link", format!("https://polygonscan.com/tx/{}", hash('a')))
                .with("purpose", "Hotel")
                .with("amount in USD", "95.00"),
            Row::new().with("type", "receipt").with("tx_hash", hash('b')),
            Row::new().with("note", "lunch"),
            Row::new().with("purpose", "Taxi").with("amount", "12"),
            Row::new().with("hash", hash('c')).with("chain", "arbitrum"),
        ]
    }

    #[test]
    fn end_to_end_expense_row() {
        let pipeline = Pipeline::default();
        let row = sample_rows().remove(0);
        let prepared = pipeline.prepare(&[row], &HeuristicClassifier);

        assert_eq!(prepared.calls.len(), 1);
        let descriptor = &prepared.calls[0].descriptor;
        assert_eq!(descriptor.method, FunctionType::TagAsExpense);
        assert_eq!(descriptor.params[PARAM_TX_HASH], ParamValue::Text(hash('a')));
        assert_eq!(descriptor.params[PARAM_CHAIN], ParamValue::Text("POLYGON".into()));
        assert_eq!(
            descriptor.params[PARAM_EXPENSE_CATEGORY],
            ParamValue::Text("Hotel".into())
        );
        assert_eq!(
            descriptor.params[PARAM_AMOUNT_IN_USD],
            ParamValue::Number(Decimal::from_str("95.00").unwrap())
        );
        assert_eq!(descriptor.params[PARAM_AMOUNT_IN_ETH], ParamValue::Null);

        let json = serde_json::to_value(descriptor).unwrap();
        assert_eq!(json["method"], "tag_as_expense");
        assert_eq!(json["params"]["amount_in_eth"], serde_json::Value::Null);
    }

    #[test]
    fn every_row_lands_in_exactly_one_bucket() {
        let pipeline = Pipeline::default();
        let rows = sample_rows();
        let prepared = pipeline.prepare(&rows, &HeuristicClassifier);

        assert_eq!(prepared.calls.len() + prepared.rejections.len(), rows.len());
        let methods: Vec<_> = prepared.calls.iter().map(|c| c.descriptor.method).collect();
        assert_eq!(
            methods,
            vec![
                FunctionType::TagAsExpense,
                FunctionType::GetReceipt,
                FunctionType::GetTransaction
            ]
        );

        assert_eq!(prepared.rejections[0].row_index, 2);
        assert_eq!(prepared.rejections[0].reason, RejectionReason::Unclassified);
        assert_eq!(prepared.rejections[1].row_index, 3);
        assert!(matches!(prepared.rejections[1].reason, RejectionReason::Invalid(_)));
        assert_eq!(prepared.rejections[1].method, Some(FunctionType::TagAsExpense));
    }

    #[test]
    fn unresolved_chains_are_counted() {
        let pipeline = Pipeline::default();
        let prepared = pipeline.prepare(&sample_rows(), &HeuristicClassifier);
        // rows 1, 2 and 3 carry no chain hint
        assert_eq!(prepared.unresolved_chains, 3);
        assert!(prepared.calls[1].defaults_applied.contains(&PARAM_CHAIN.to_string()));
    }

    #[test]
    fn preparation_is_idempotent_apart_from_timestamps() {
        let pipeline = Pipeline::default();
        let rows = sample_rows();
        let strip = |batch: PreparedBatch| -> Vec<serde_json::Value> {
            batch
                .calls
                .iter()
                .map(|call| {
                    let mut value = serde_json::to_value(&call.descriptor).unwrap();
                    value.as_object_mut().unwrap().remove("timestamp");
                    value
                })
                .collect()
        };
        let first = strip(pipeline.prepare(&rows, &HeuristicClassifier));
        let second = strip(pipeline.prepare(&rows, &HeuristicClassifier));
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn headers_are_collected_in_first_seen_order() {
        let rows = vec![
            Row::new().with("b", "1").with("a", "2"),
            Row::new().with("c", "3").with("a", "4"),
        ];
        assert_eq!(collect_headers(&rows), vec!["a", "b", "c"]);
    }

    struct BrokenOracle;

    #[async_trait]
    impl MappingOracle for BrokenOracle {
        async fn propose_plan(&self, _i: &str, _h: &[String]) -> Result<MappingPlan> {
            Ok(MappingPlan::new(FunctionType::TagAsExpense).with_column("tx_hash", "ghost column"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    struct DownOracle;

    #[async_trait]
    impl MappingOracle for DownOracle {
        async fn propose_plan(&self, _i: &str, _h: &[String]) -> Result<MappingPlan> {
            Err(AppError::Oracle("connection refused".into()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn hallucinated_plan_falls_back_to_heuristics() {
        let headers = vec!["tx_hash".to_string()];
        let choice = choose_strategy(Some(&BrokenOracle), Some("tag expenses"), &headers).await;
        assert_eq!(choice.strategy.name(), "heuristic");
        assert_eq!(choice.warnings.len(), 1);

        let choice = choose_strategy(Some(&DownOracle), Some("tag expenses"), &headers).await;
        assert_eq!(choice.strategy.name(), "heuristic");
        assert!(choice.warnings[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn no_instruction_means_heuristics() {
        let oracle = KeywordIntentOracle::default();
        let choice = choose_strategy(Some(&oracle), Some("   "), &[]).await;
        assert_eq!(choice.strategy.name(), "heuristic");
        assert!(choice.warnings.is_empty());
    }

    #[tokio::test]
    async fn instruction_plan_applies_to_all_rows() {
        let rows = vec![
            Row::new().with("Reference", hash('d')).with("Note", "whatever"),
            Row::new().with("Reference", hash('e')),
        ];
        let headers = collect_headers(&rows);
        let oracle = KeywordIntentOracle::default();
        let choice = choose_strategy(Some(&oracle), Some("receipts please, chain is base"), &headers).await;
        assert_eq!(choice.strategy.name(), "mapping_plan");

        let prepared = Pipeline::default().prepare(&rows, choice.strategy.as_ref());
        assert_eq!(prepared.calls.len(), 2);
        for call in &prepared.calls {
            assert_eq!(call.descriptor.method, FunctionType::GetReceipt);
            assert_eq!(call.descriptor.params[PARAM_CHAIN], ParamValue::Text("BASE".into()));
        }
    }

    #[tokio::test]
    async fn run_reports_one_disposition_per_row() {
        let pipeline = Pipeline::default();
        let executor = BatchExecutor::new(Arc::new(DryRunTarget), ExecutorConfig::default());
        let rows = sample_rows();
        let report = pipeline
            .run(&rows, StrategyChoice::heuristic(), &executor, CancelToken::new())
            .await;

        assert_eq!(report.rows.len(), rows.len());
        for (i, row) in report.rows.iter().enumerate() {
            assert_eq!(row.row_index, i);
        }
        assert_eq!(report.summary.totals.success, 3);
        assert_eq!(report.unclassified, 1);
        assert_eq!(report.invalid, 1);
        assert!(matches!(
            report.rows[0].disposition,
            RowDisposition::Dispatched {
                status: OutcomeStatus::Success,
                attempts: 1,
                ..
            }
        ));
        assert_eq!(report.rows[2].disposition, RowDisposition::Unclassified);
        assert!(report.warnings.iter().any(|w| w.contains("no recognizable chain")));
    }
}
