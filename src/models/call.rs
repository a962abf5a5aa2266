use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::constants::{TX_HASH_HEX_LEN, TX_HASH_PREFIX};

// ==================== CHAIN ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainId {
    Ethereum,
    Polygon,
    Optimism,
    Arbitrum,
    Base,
    Bsc,
    Unknown,
}

impl ChainId {
    pub const SUPPORTED: [ChainId; 6] = [
        ChainId::Ethereum,
        ChainId::Polygon,
        ChainId::Optimism,
        ChainId::Arbitrum,
        ChainId::Base,
        ChainId::Bsc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ETHEREUM",
            ChainId::Polygon => "POLYGON",
            ChainId::Optimism => "OPTIMISM",
            ChainId::Arbitrum => "ARBITRUM",
            ChainId::Base => "BASE",
            ChainId::Bsc => "BSC",
            ChainId::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ChainId::Unknown)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== TX HASH ====================

/// A transaction hash that is guaranteed to match `0x` + 64 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Accepts only an exact, whole-string match of the canonical shape.
    pub fn parse(candidate: &str) -> Option<Self> {
        let body = candidate.strip_prefix(TX_HASH_PREFIX)?;
        if body.len() == TX_HASH_HEX_LEN && body.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(candidate.to_string()))
        } else {
            None
        }
    }

    /// Random placeholder hash; callers must flag it as synthesized.
    pub fn placeholder() -> Self {
        Self(format!("0x{}", hex::encode(rand::random::<[u8; 32]>())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==================== FUNCTION TYPE ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    TagAsExpense,
    GetTransaction,
    GetReceipt,
    FillAccountBy,
    ListChains,
    Unknown,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionType::TagAsExpense => "tag_as_expense",
            FunctionType::GetTransaction => "get_transaction",
            FunctionType::GetReceipt => "get_receipt",
            FunctionType::FillAccountBy => "fill_account_by",
            FunctionType::ListChains => "list_chains",
            FunctionType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionType {
    type Err = String;

    // Accepts wire names, enum-style names and the legacy alias used by older oracles.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tag_as_expense" => Ok(FunctionType::TagAsExpense),
            "get_transaction" | "get_transaction_details" => Ok(FunctionType::GetTransaction),
            "get_receipt" => Ok(FunctionType::GetReceipt),
            "fill_account_by" => Ok(FunctionType::FillAccountBy),
            "list_chains" => Ok(FunctionType::ListChains),
            other => Err(format!("unsupported API method: {}", other)),
        }
    }
}

// ==================== DESCRIPTOR ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Number(Decimal),
    Text(String),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// A validated call ready for dispatch. Serializes to exactly
/// `{"method", "params", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallDescriptor {
    pub method: FunctionType,
    pub params: BTreeMap<String, ParamValue>,
    pub timestamp: DateTime<Utc>,
    /// Parameters whose value was filled by a default policy rather than taken from input.
    #[serde(skip)]
    pub defaults_applied: BTreeSet<String>,
}

impl ApiCallDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn is_synthetic(&self, name: &str) -> bool {
        self.defaults_applied.contains(name)
    }
}

// ==================== OUTCOMES ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    Transient,
    Permanent,
    Cancelled,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallErrorRecord {
    pub kind: CallErrorKind,
    pub message: String,
}

/// Terminal result of dispatching one descriptor. `index` is the descriptor's
/// position in the submitted batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub descriptor: ApiCallDescriptor,
    pub status: OutcomeStatus,
    pub attempts: u32,
    pub error: Option<CallErrorRecord>,
    pub response: Option<serde_json::Value>,
    pub defaults_applied: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl BatchOutcome {
    pub fn audit_record(&self) -> AuditRecord {
        AuditRecord {
            method: self.descriptor.method,
            params: self.descriptor.params.clone(),
            status: self.status,
            attempts: self.attempts,
            timestamp: self.finished_at,
            error: self.error.as_ref().map(|e| e.message.clone()),
            defaults_applied: self.defaults_applied.clone(),
        }
    }
}

/// Append-only audit line emitted once per outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub method: FunctionType,
    pub params: BTreeMap<String, ParamValue>,
    pub status: OutcomeStatus,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defaults_applied: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Success => self.success += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub totals: StatusCounts,
    pub by_method: BTreeMap<FunctionType, StatusCounts>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut summary = BatchSummary::default();
        for outcome in outcomes {
            summary.totals.record(outcome.status);
            summary
                .by_method
                .entry(outcome.descriptor.method)
                .or_default()
                .record(outcome.status);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_parse_rejects_wrong_length_and_non_hex() {
        assert!(TxHash::parse("0x123").is_none());
        assert!(TxHash::parse(&format!("0x{}", "g".repeat(64))).is_none());
        assert!(TxHash::parse(&format!("0x{}", "a".repeat(65))).is_none());
        assert!(TxHash::parse(&"a".repeat(66)).is_none());
        assert!(TxHash::parse(&format!("0x{}", "aB".repeat(32))).is_some());
    }

    #[test]
    fn placeholder_hash_has_canonical_shape() {
        let hash = TxHash::placeholder();
        assert!(TxHash::parse(hash.as_str()).is_some());
    }

    #[test]
    fn function_type_parses_aliases() {
        assert_eq!("TAG_AS_EXPENSE".parse::<FunctionType>(), Ok(FunctionType::TagAsExpense));
        assert_eq!(
            "get_transaction_details".parse::<FunctionType>(),
            Ok(FunctionType::GetTransaction)
        );
        assert!("mark_as_refund".parse::<FunctionType>().is_err());
        assert!("unknown".parse::<FunctionType>().is_err());
    }

    #[test]
    fn descriptor_serializes_to_fixed_shape() {
        let descriptor = ApiCallDescriptor {
            method: FunctionType::GetReceipt,
            params: BTreeMap::from([("chain".to_string(), ParamValue::Text("BASE".into()))]),
            timestamp: Utc::now(),
            defaults_applied: BTreeSet::from(["chain".to_string()]),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["method", "params", "timestamp"]);
        assert_eq!(value["method"], "get_receipt");
    }

    #[test]
    fn status_counts_total() {
        let mut counts = StatusCounts::default();
        counts.record(OutcomeStatus::Success);
        counts.record(OutcomeStatus::Skipped);
        counts.record(OutcomeStatus::Skipped);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.skipped, 2);
    }
}
