use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CALL_TIMEOUT_SECS,
    DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MAX_ATTEMPTS, DEFAULT_SYSTEMIC_FAILURE_THRESHOLD,
};
use crate::error::CallError;
use crate::integrations::api_target::ApiTarget;
use crate::models::{
    ApiCallDescriptor, AuditRecord, BatchOutcome, BatchSummary, CallErrorKind, CallErrorRecord,
    OutcomeStatus,
};

// ==================== POLICY ====================

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per descriptor, including the first. 1 disables retry.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based):
    /// `backoff_base * backoff_multiplier^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.backoff_base.as_secs_f64() * factor;
        if secs.is_finite() {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
    /// Consecutive transient failures before a systemic warning; 0 disables.
    pub systemic_failure_threshold: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            systemic_failure_threshold: DEFAULT_SYSTEMIC_FAILURE_THRESHOLD,
        }
    }
}

// ==================== CANCELLATION ====================

/// Batch-level cancellation signal. Stops admission of new items; in-flight
/// calls are never interrupted, only their retries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ==================== AUDIT ====================

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits one structured event per outcome under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        match serde_json::to_string(record) {
            Ok(line) => tracing::info!(target: "audit", "{}", line),
            Err(e) => tracing::error!(target: "audit", "Failed to serialize audit record: {}", e),
        }
    }
}

// ==================== RESULT ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    SystemicFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchWarning {
    pub kind: WarningKind,
    pub message: String,
    pub consecutive_failures: u32,
    /// Batch index of the item whose failure crossed the threshold.
    pub at_index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// One outcome per submitted descriptor, sorted by batch index.
    pub outcomes: Vec<BatchOutcome>,
    pub summary: BatchSummary,
    pub warnings: Vec<BatchWarning>,
    pub cancelled: bool,
}

// Tracks consecutive transient failures across the batch with atomics only.
struct FailureMonitor {
    threshold: u32,
    consecutive: AtomicU32,
    tripped: AtomicBool,
    tripped_at: AtomicUsize,
}

impl FailureMonitor {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
            tripped_at: AtomicUsize::new(0),
        }
    }

    fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    fn record_transient(&self, index: usize, error: &CallError) {
        let run = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        if self.threshold == 0 || run < self.threshold {
            return;
        }
        if !self.tripped.swap(true, Ordering::SeqCst) {
            self.tripped_at.store(index, Ordering::SeqCst);
            tracing::warn!(
                "{} consecutive transient failures (latest: {}); downstream target may be unreachable, continuing best-effort",
                run,
                error
            );
        }
    }

    fn warning(&self) -> Option<BatchWarning> {
        if !self.tripped.load(Ordering::SeqCst) {
            return None;
        }
        Some(BatchWarning {
            kind: WarningKind::SystemicFailure,
            message: format!(
                "{} consecutive transient failures; downstream target may be unreachable",
                self.threshold
            ),
            consecutive_failures: self.threshold,
            at_index: self.tripped_at.load(Ordering::SeqCst),
        })
    }
}

// ==================== EXECUTOR ====================

struct ItemContext {
    target: Arc<dyn ApiTarget>,
    retry: RetryPolicy,
    call_timeout: Duration,
    cancel: CancelToken,
    monitor: FailureMonitor,
    audit: Arc<dyn AuditSink>,
}

/// Dispatches descriptors against an `ApiTarget` with bounded concurrency,
/// per-item retry and fault isolation.
pub struct BatchExecutor {
    target: Arc<dyn ApiTarget>,
    config: ExecutorConfig,
    audit: Arc<dyn AuditSink>,
}

impl BatchExecutor {
    pub fn new(target: Arc<dyn ApiTarget>, config: ExecutorConfig) -> Self {
        Self {
            target,
            config,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub async fn execute(&self, descriptors: Vec<ApiCallDescriptor>) -> BatchResult {
        self.execute_with_cancel(descriptors, CancelToken::new())
            .await
    }

    /// Items are admitted in submission order through a semaphore of
    /// `concurrency_limit` permits. Once `cancel` fires, every item not yet
    /// admitted is reported as SKIPPED.
    pub async fn execute_with_cancel(
        &self,
        descriptors: Vec<ApiCallDescriptor>,
        cancel: CancelToken,
    ) -> BatchResult {
        let total = descriptors.len();
        let limit = self.config.concurrency_limit.max(1);
        tracing::info!(
            "Dispatching {} descriptors via {} (concurrency={}, max_attempts={})",
            total,
            self.target.name(),
            limit,
            self.config.retry.max_attempts
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let ctx = Arc::new(ItemContext {
            target: self.target.clone(),
            retry: self.config.retry.clone(),
            call_timeout: self.config.call_timeout,
            cancel: cancel.clone(),
            monitor: FailureMonitor::new(self.config.systemic_failure_threshold),
            audit: self.audit.clone(),
        });

        let mut outcomes = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let permit = if cancel.is_cancelled() {
                None
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.clone().acquire_owned() => permit.ok(),
                }
            };

            let Some(permit) = permit else {
                let outcome = skipped_outcome(index, descriptor);
                self.audit.record(&outcome.audit_record());
                outcomes.push(outcome);
                continue;
            };

            let item_ctx = ctx.clone();
            let fallback = descriptor.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_item(&item_ctx, index, descriptor).await
            });
            handles.push((index, fallback, handle));
        }

        let joined = join_all(
            handles
                .into_iter()
                .map(|(index, descriptor, handle)| async move { (index, descriptor, handle.await) }),
        )
        .await;

        for (index, descriptor, result) in joined {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!("Dispatch task for item {} aborted: {}", index, e);
                    let outcome = finalize(
                        index,
                        descriptor,
                        OutcomeStatus::Failed,
                        0,
                        Some(CallErrorRecord {
                            kind: CallErrorKind::Panicked,
                            message: format!("dispatch task aborted: {}", e),
                        }),
                        None,
                    );
                    self.audit.record(&outcome.audit_record());
                    outcomes.push(outcome);
                }
            }
        }

        outcomes.sort_by_key(|outcome| outcome.index);
        let summary = BatchSummary::from_outcomes(&outcomes);
        let warnings = ctx.monitor.warning().into_iter().collect();

        tracing::info!(
            "Batch settled: {} success, {} failed, {} skipped",
            summary.totals.success,
            summary.totals.failed,
            summary.totals.skipped
        );

        BatchResult {
            outcomes,
            summary,
            warnings,
            cancelled: cancel.is_cancelled(),
        }
    }
}

async fn run_item(ctx: &ItemContext, index: usize, descriptor: ApiCallDescriptor) -> BatchOutcome {
    let max_attempts = ctx.retry.max_attempts.max(1);
    let mut attempt = 0;

    let outcome = loop {
        attempt += 1;
        let result = match tokio::time::timeout(ctx.call_timeout, ctx.target.invoke(&descriptor)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Transient(format!(
                "call timed out after {}ms",
                ctx.call_timeout.as_millis()
            ))),
        };

        match result {
            Ok(response) => {
                ctx.monitor.record_success();
                break finalize(index, descriptor, OutcomeStatus::Success, attempt, None, Some(response));
            }
            Err(err) if err.is_transient() => {
                ctx.monitor.record_transient(index, &err);
                if attempt >= max_attempts {
                    tracing::error!(
                        "{} item {} failed after {} attempts: {}",
                        descriptor.method,
                        index,
                        attempt,
                        err
                    );
                    break finalize(
                        index,
                        descriptor,
                        OutcomeStatus::Failed,
                        attempt,
                        Some(error_record(CallErrorKind::Transient, err.message())),
                        None,
                    );
                }

                let delay = ctx.retry.delay_for(attempt);
                tracing::warn!(
                    "{} item {} attempt {}/{} failed: {}; retrying in {}ms",
                    descriptor.method,
                    index,
                    attempt,
                    max_attempts,
                    err,
                    delay.as_millis()
                );

                let cancelled = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    break finalize(
                        index,
                        descriptor,
                        OutcomeStatus::Failed,
                        attempt,
                        Some(error_record(
                            CallErrorKind::Cancelled,
                            &format!("batch cancelled before retry; last error: {}", err.message()),
                        )),
                        None,
                    );
                }
            }
            Err(err) => {
                // Reachable target; the run of transient failures is broken.
                ctx.monitor.record_success();
                tracing::warn!("{} item {} rejected: {}", descriptor.method, index, err);
                break finalize(
                    index,
                    descriptor,
                    OutcomeStatus::Failed,
                    attempt,
                    Some(error_record(CallErrorKind::Permanent, err.message())),
                    None,
                );
            }
        }
    };

    ctx.audit.record(&outcome.audit_record());
    outcome
}

fn error_record(kind: CallErrorKind, message: &str) -> CallErrorRecord {
    CallErrorRecord {
        kind,
        message: message.to_string(),
    }
}

fn skipped_outcome(index: usize, descriptor: ApiCallDescriptor) -> BatchOutcome {
    finalize(
        index,
        descriptor,
        OutcomeStatus::Skipped,
        0,
        Some(error_record(
            CallErrorKind::Cancelled,
            "batch cancelled before admission",
        )),
        None,
    )
}

fn finalize(
    index: usize,
    descriptor: ApiCallDescriptor,
    status: OutcomeStatus,
    attempts: u32,
    error: Option<CallErrorRecord>,
    response: Option<serde_json::Value>,
) -> BatchOutcome {
    let defaults_applied = descriptor.defaults_applied.iter().cloned().collect();
    BatchOutcome {
        index,
        descriptor,
        status,
        attempts,
        error,
        response,
        defaults_applied,
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FunctionType, ParamValue};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn descriptor(tag: &str) -> ApiCallDescriptor {
        ApiCallDescriptor {
            method: FunctionType::GetTransaction,
            params: BTreeMap::from([
                ("tx_hash".to_string(), ParamValue::Text(tag.to_string())),
                ("chain".to_string(), ParamValue::Text("ETHEREUM".to_string())),
            ]),
            timestamp: Utc::now(),
            defaults_applied: BTreeSet::new(),
        }
    }

    fn batch(n: usize) -> Vec<ApiCallDescriptor> {
        (0..n).map(|i| descriptor(&i.to_string())).collect()
    }

    fn tag(descriptor: &ApiCallDescriptor) -> String {
        descriptor
            .param("tx_hash")
            .and_then(ParamValue::as_text)
            .unwrap_or_default()
            .to_string()
    }

    fn config(limit: usize, attempts: u32) -> ExecutorConfig {
        ExecutorConfig {
            concurrency_limit: limit,
            retry: RetryPolicy {
                max_attempts: attempts,
                backoff_base: Duration::from_millis(100),
                backoff_multiplier: 2.0,
            },
            call_timeout: Duration::from_secs(5),
            systemic_failure_threshold: 0,
        }
    }

    /// Sleeps, then succeeds; records the peak number of concurrent calls.
    #[derive(Default)]
    struct InFlightStub {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ApiTarget for InFlightStub {
        async fn invoke(&self, _d: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({"ok": true}))
        }
    }

    /// Fails transiently `failures` times, then succeeds. Records attempt times.
    struct FlakyStub {
        failures: u32,
        calls: AtomicU32,
        attempt_times: Mutex<Vec<Instant>>,
    }

    impl FlakyStub {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                attempt_times: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ApiTarget for FlakyStub {
        async fn invoke(&self, _d: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
            self.attempt_times.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(CallError::Transient("503 service unavailable".into()))
            } else {
                Ok(serde_json::json!({"call": call}))
            }
        }
    }

    /// Permanent failure for descriptors tagged "bad", success otherwise.
    struct SelectiveStub;

    #[async_trait]
    impl ApiTarget for SelectiveStub {
        async fn invoke(&self, d: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
            if tag(d) == "bad" {
                Err(CallError::Permanent("400 bad request".into()))
            } else {
                Ok(serde_json::json!({"tag": tag(d)}))
            }
        }
    }

    struct SlowStub(Duration);

    #[async_trait]
    impl ApiTarget for SlowStub {
        async fn invoke(&self, _d: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
            tokio::time::sleep(self.0).await;
            Ok(serde_json::Value::Null)
        }
    }

    struct PanickingStub;

    #[async_trait]
    impl ApiTarget for PanickingStub {
        async fn invoke(&self, d: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
            if tag(d) == "boom" {
                panic!("stub exploded");
            }
            Ok(serde_json::Value::Null)
        }
    }

    /// Records the order in which descriptors reach the target.
    #[derive(Default)]
    struct OrderStub(Mutex<Vec<String>>);

    #[async_trait]
    impl ApiTarget for OrderStub {
        async fn invoke(&self, d: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
            self.0.lock().unwrap().push(tag(d));
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(serde_json::Value::Null)
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<AuditRecord>>);

    impl AuditSink for CollectingSink {
        fn record(&self, record: &AuditRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_limit() {
        let stub = Arc::new(InFlightStub::default());
        let executor = BatchExecutor::new(stub.clone(), config(3, 1));
        let result = executor.execute(batch(10)).await;

        assert_eq!(result.outcomes.len(), 10);
        assert_eq!(stub.peak.load(Ordering::SeqCst), 3);
        assert_eq!(result.summary.totals.success, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_is_attempted_max_times_with_growing_delays() {
        let stub = Arc::new(FlakyStub::new(u32::MAX));
        let executor = BatchExecutor::new(stub.clone(), config(1, 3));
        let result = executor.execute(batch(1)).await;

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.error.as_ref().map(|e| e.kind),
            Some(CallErrorKind::Transient)
        );

        let times = stub.attempt_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_millis(100));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let stub = Arc::new(FlakyStub::new(2));
        let executor = BatchExecutor::new(stub, config(1, 3));
        let result = executor.execute(batch(1)).await;

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.response, Some(serde_json::json!({"call": 3})));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_does_not_retry() {
        let stub = Arc::new(FlakyStub::new(1));
        let executor = BatchExecutor::new(stub.clone(), config(1, 1));
        let result = executor.execute(batch(1)).await;
        assert_eq!(result.outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_isolated_and_not_retried() {
        let executor = BatchExecutor::new(Arc::new(SelectiveStub), config(2, 3));
        let descriptors = vec![descriptor("a"), descriptor("bad"), descriptor("c")];
        let result = executor.execute(descriptors).await;

        let statuses: Vec<_> = result.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OutcomeStatus::Success, OutcomeStatus::Failed, OutcomeStatus::Success]
        );
        assert_eq!(result.outcomes[1].attempts, 1);
        assert_eq!(
            result.outcomes[1].error.as_ref().map(|e| e.kind),
            Some(CallErrorKind::Permanent)
        );
        for (i, outcome) in result.outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
        }

        let by_method = result.summary.by_method[&FunctionType::GetTransaction];
        assert_eq!(by_method.success, 2);
        assert_eq!(by_method.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient() {
        let mut cfg = config(1, 2);
        cfg.call_timeout = Duration::from_secs(1);
        let executor = BatchExecutor::new(Arc::new(SlowStub(Duration::from_secs(10))), cfg);
        let result = executor.execute(batch(1)).await;

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            outcome.error.as_ref().map(|e| e.kind),
            Some(CallErrorKind::Transient)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_transient_failures_raise_one_warning() {
        let mut cfg = config(1, 1);
        cfg.systemic_failure_threshold = 3;
        let executor = BatchExecutor::new(Arc::new(FlakyStub::new(u32::MAX)), cfg);
        let result = executor.execute(batch(6)).await;

        assert_eq!(result.summary.totals.failed, 6);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::SystemicFailure);
        assert_eq!(result.warnings[0].at_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_skips_everything() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let stub = Arc::new(FlakyStub::new(0));
        let executor = BatchExecutor::new(stub.clone(), config(2, 3));
        let result = executor.execute_with_cancel(batch(4), cancel).await;

        assert!(result.cancelled);
        assert_eq!(result.summary.totals.skipped, 4);
        assert!(result.outcomes.iter().all(|o| o.attempts == 0));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_batch_lets_in_flight_finish() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let executor = BatchExecutor::new(
            Arc::new(SlowStub(Duration::from_millis(100))),
            config(1, 1),
        );
        let result = executor.execute_with_cancel(batch(6), cancel).await;

        assert_eq!(result.outcomes.len(), 6);
        assert_eq!(result.outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(result.outcomes[5].status, OutcomeStatus::Skipped);
        assert!(result
            .outcomes
            .iter()
            .all(|o| matches!(o.status, OutcomeStatus::Success | OutcomeStatus::Skipped)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_retrying() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let stub = Arc::new(FlakyStub::new(u32::MAX));
        let executor = BatchExecutor::new(stub.clone(), config(1, 3));
        let result = executor.execute_with_cancel(batch(1), cancel).await;

        assert!(result.cancelled);
        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.error.as_ref().map(|e| e.kind),
            Some(CallErrorKind::Cancelled)
        );
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_follows_submission_order() {
        let stub = Arc::new(OrderStub::default());
        let executor = BatchExecutor::new(stub.clone(), config(1, 1));
        let result = executor.execute(batch(5)).await;

        assert_eq!(result.summary.totals.success, 5);
        let seen = stub.0.lock().unwrap().clone();
        assert_eq!(seen, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_item_is_reported_as_failed() {
        let executor = BatchExecutor::new(Arc::new(PanickingStub), config(2, 1));
        let result = executor
            .execute(vec![descriptor("ok"), descriptor("boom"), descriptor("ok")])
            .await;

        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.outcomes[1].status, OutcomeStatus::Failed);
        assert_eq!(
            result.outcomes[1].error.as_ref().map(|e| e.kind),
            Some(CallErrorKind::Panicked)
        );
        assert_eq!(result.summary.totals.success, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn every_outcome_reaches_the_audit_sink() {
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancelToken::new();
        let executor = BatchExecutor::new(Arc::new(SelectiveStub), config(2, 1))
            .with_audit_sink(sink.clone());
        let result = executor
            .execute_with_cancel(vec![descriptor("a"), descriptor("bad")], cancel)
            .await;

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), result.outcomes.len());
        assert!(records.iter().any(|r| r.status == OutcomeStatus::Failed));
        assert!(records.iter().all(|r| r.method == FunctionType::GetTransaction));
    }
}
