use std::sync::Arc;

use crate::constants::{
    CATEGORY_FIELDS, CHAIN_FIELDS, ETH_AMOUNT_FIELDS, FREE_TEXT_FIELDS, RECEIPT_KEYWORDS,
    REQUEST_TYPE_FIELDS, TX_FIELDS, USD_AMOUNT_FIELDS,
};
use crate::models::{ChainId, FieldValue, FunctionType, MappingPlan, NormalizedRow, TxHash};
use crate::services::chain_resolver::ChainResolver;
use crate::services::hash_extractor::extract_first;
use crate::utils::tokenize_words;

/// A normalized row together with the chain and hash found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFacts {
    pub row: NormalizedRow,
    pub chain: ChainId,
    pub tx_hash: Option<TxHash>,
}

impl RowFacts {
    /// Hash: tx alias columns first, then free-text columns such as notes.
    /// Columns like `block_hash` are never searched.
    /// Chain: explicit chain columns first, then the tx alias columns.
    pub fn extract(row: NormalizedRow, resolver: &ChainResolver) -> Self {
        let tx_cells = alias_texts(&row, TX_FIELDS);
        let free_text = alias_texts(&row, FREE_TEXT_FIELDS);

        let tx_hash = extract_first(
            tx_cells
                .iter()
                .chain(free_text.iter())
                .map(String::as_str),
        );

        let chain_cells = alias_texts(&row, CHAIN_FIELDS);
        let chain = resolver.resolve_first(
            chain_cells
                .iter()
                .chain(tx_cells.iter())
                .map(String::as_str),
        );

        Self {
            row,
            chain,
            tx_hash,
        }
    }
}

fn alias_texts(row: &NormalizedRow, aliases: &[&str]) -> Vec<String> {
    aliases
        .iter()
        .filter_map(|alias| row.value(alias).and_then(FieldValue::render))
        .collect()
}

/// Decides which method a row represents. Heuristic and oracle-backed
/// strategies are interchangeable; the call builder validates either.
pub trait ClassificationStrategy: Send + Sync {
    fn classify(&self, facts: &RowFacts) -> MappingPlan;

    fn name(&self) -> &'static str;
}

pub type RulePredicate = fn(&RowFacts) -> bool;

pub struct ClassificationRule {
    pub name: &'static str,
    pub predicate: RulePredicate,
    pub outcome: FunctionType,
}

/// Evaluated top to bottom, first match wins. Reordering changes results.
pub const HEURISTIC_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        name: "expense_metadata",
        predicate: has_expense_metadata,
        outcome: FunctionType::TagAsExpense,
    },
    ClassificationRule {
        name: "receipt_keyword",
        predicate: requests_receipt,
        outcome: FunctionType::GetReceipt,
    },
    ClassificationRule {
        name: "bare_tx_hash",
        predicate: has_tx_hash,
        outcome: FunctionType::GetTransaction,
    },
    ClassificationRule {
        name: "fallback",
        predicate: always,
        outcome: FunctionType::Unknown,
    },
];

fn has_expense_metadata(facts: &RowFacts) -> bool {
    facts.row.has_any(CATEGORY_FIELDS)
        && (facts.row.has_any(USD_AMOUNT_FIELDS) || facts.row.has_any(ETH_AMOUNT_FIELDS))
}

fn requests_receipt(facts: &RowFacts) -> bool {
    REQUEST_TYPE_FIELDS.iter().any(|alias| {
        facts
            .row
            .value(alias)
            .and_then(FieldValue::as_text)
            .map(|text| {
                tokenize_words(text)
                    .iter()
                    .any(|word| RECEIPT_KEYWORDS.contains(&word.as_str()))
            })
            .unwrap_or(false)
    })
}

fn has_tx_hash(facts: &RowFacts) -> bool {
    facts.tx_hash.is_some()
}

fn always(_: &RowFacts) -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn matching_rule(&self, facts: &RowFacts) -> Option<&'static ClassificationRule> {
        HEURISTIC_RULES.iter().find(|rule| (rule.predicate)(facts))
    }
}

impl ClassificationStrategy for HeuristicClassifier {
    fn classify(&self, facts: &RowFacts) -> MappingPlan {
        match self.matching_rule(facts) {
            Some(rule) => {
                tracing::debug!("Row matched rule '{}' -> {}", rule.name, rule.outcome);
                MappingPlan::new(rule.outcome)
            }
            None => MappingPlan::unknown(),
        }
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Applies one validated oracle plan to every row of the batch.
#[derive(Debug, Clone)]
pub struct PlanClassifier {
    plan: Arc<MappingPlan>,
}

impl PlanClassifier {
    pub fn new(plan: MappingPlan) -> Self {
        Self {
            plan: Arc::new(plan),
        }
    }
}

impl ClassificationStrategy for PlanClassifier {
    fn classify(&self, _facts: &RowFacts) -> MappingPlan {
        self.plan.as_ref().clone()
    }

    fn name(&self) -> &'static str {
        "mapping_plan"
    }
}
