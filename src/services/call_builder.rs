use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::constants::{
    ACCOUNT_FIELDS, CATEGORY_FIELDS, CHAIN_FIELDS, DEFAULT_CHAIN, ETH_AMOUNT_FIELDS,
    PARAM_ACCOUNT_ID, PARAM_AMOUNT, PARAM_AMOUNT_IN_ETH, PARAM_AMOUNT_IN_USD, PARAM_CHAIN,
    PARAM_EXPENSE_CATEGORY, PARAM_TX_HASH, TX_FIELDS, USD_AMOUNT_FIELDS,
};
use crate::error::{AppError, BuildError};
use crate::models::{
    ApiCallDescriptor, ChainId, FieldValue, FunctionType, MappingPlan, ParamValue, TxHash,
};
use crate::services::chain_resolver::ChainResolver;
use crate::services::classifier::RowFacts;
use crate::services::hash_extractor::extract_tx_hash;
use crate::services::normalizer::coerce_decimal;

/// What to do when a parameter has no value in the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    /// Missing value fails the build.
    NoDefault,
    /// Filled with the configured default chain.
    DefaultChain,
    /// Filled with a random placeholder hash when synthesis is enabled,
    /// otherwise behaves like `NoDefault`.
    PlaceholderHash,
    /// Optional: present in the descriptor as null.
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    TxHash,
    Chain,
    Text,
    Number,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub policy: DefaultPolicy,
    pub aliases: &'static [&'static str],
}

const TX_HASH_SPEC: ParamSpec = ParamSpec {
    name: PARAM_TX_HASH,
    kind: ParamKind::TxHash,
    policy: DefaultPolicy::PlaceholderHash,
    aliases: TX_FIELDS,
};

const CHAIN_SPEC: ParamSpec = ParamSpec {
    name: PARAM_CHAIN,
    kind: ParamKind::Chain,
    policy: DefaultPolicy::DefaultChain,
    aliases: CHAIN_FIELDS,
};

const TAG_AS_EXPENSE_SCHEMA: &[ParamSpec] = &[
    TX_HASH_SPEC,
    CHAIN_SPEC,
    ParamSpec {
        name: PARAM_EXPENSE_CATEGORY,
        kind: ParamKind::Text,
        policy: DefaultPolicy::NoDefault,
        aliases: CATEGORY_FIELDS,
    },
    ParamSpec {
        name: PARAM_AMOUNT_IN_USD,
        kind: ParamKind::Number,
        policy: DefaultPolicy::Null,
        aliases: USD_AMOUNT_FIELDS,
    },
    ParamSpec {
        name: PARAM_AMOUNT_IN_ETH,
        kind: ParamKind::Number,
        policy: DefaultPolicy::Null,
        aliases: ETH_AMOUNT_FIELDS,
    },
];

const TX_LOOKUP_SCHEMA: &[ParamSpec] = &[TX_HASH_SPEC, CHAIN_SPEC];

const FILL_ACCOUNT_BY_SCHEMA: &[ParamSpec] = &[
    ParamSpec {
        name: PARAM_ACCOUNT_ID,
        kind: ParamKind::Text,
        policy: DefaultPolicy::NoDefault,
        aliases: ACCOUNT_FIELDS,
    },
    ParamSpec {
        name: PARAM_AMOUNT,
        kind: ParamKind::Number,
        policy: DefaultPolicy::NoDefault,
        aliases: USD_AMOUNT_FIELDS,
    },
];

/// Ordered parameter schema per method. `None` for `Unknown`.
pub fn schema_for(method: FunctionType) -> Option<&'static [ParamSpec]> {
    match method {
        FunctionType::TagAsExpense => Some(TAG_AS_EXPENSE_SCHEMA),
        FunctionType::GetTransaction | FunctionType::GetReceipt => Some(TX_LOOKUP_SCHEMA),
        FunctionType::FillAccountBy => Some(FILL_ACCOUNT_BY_SCHEMA),
        FunctionType::ListChains => Some(&[]),
        FunctionType::Unknown => None,
    }
}

/// Reject plans that name an unknown method, a parameter outside the
/// method's schema, a column not present in the headers, or an unknown
/// pinned chain.
pub fn validate_plan(plan: &MappingPlan, headers: &[String]) -> Result<(), AppError> {
    let schema = schema_for(plan.function).ok_or_else(|| {
        AppError::InvalidPlan("plan does not name a supported API method".to_string())
    })?;

    let known_columns: BTreeSet<String> = headers
        .iter()
        .map(|header| header.trim().to_lowercase())
        .collect();

    for (param, column) in &plan.column_mapping {
        if !schema.iter().any(|spec| spec.name == param) {
            return Err(AppError::InvalidPlan(format!(
                "{} has no parameter `{}`",
                plan.function, param
            )));
        }
        if !known_columns.contains(&column.trim().to_lowercase()) {
            return Err(AppError::InvalidPlan(format!(
                "column `{}` mapped to `{}` is not in the input",
                column, param
            )));
        }
    }

    if plan.chain == Some(ChainId::Unknown) {
        return Err(AppError::InvalidPlan(
            "plan pins an unsupported chain".to_string(),
        ));
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub default_chain: String,
    pub synthesize_placeholder_hashes: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            default_chain: DEFAULT_CHAIN.to_string(),
            synthesize_placeholder_hashes: false,
        }
    }
}

/// Assembles validated descriptors from classified rows.
#[derive(Debug, Clone)]
pub struct CallBuilder {
    config: BuilderConfig,
    resolver: Arc<ChainResolver>,
}

impl CallBuilder {
    pub fn new(config: BuilderConfig, resolver: Arc<ChainResolver>) -> Self {
        Self { config, resolver }
    }

    /// Build for a bare method, using the alias tables for every parameter.
    pub fn build_for(
        &self,
        method: FunctionType,
        facts: &RowFacts,
    ) -> Result<ApiCallDescriptor, BuildError> {
        self.build(&MappingPlan::new(method), facts)
    }

    /// Mapped columns take precedence; unmapped parameters fall back to the
    /// alias tables and then to their default policy.
    pub fn build(
        &self,
        plan: &MappingPlan,
        facts: &RowFacts,
    ) -> Result<ApiCallDescriptor, BuildError> {
        let method = plan.function;
        let schema = schema_for(method).ok_or(BuildError::UnknownMethod)?;

        let mut params = BTreeMap::new();
        let mut defaults_applied = BTreeSet::new();

        for spec in schema {
            let value = match spec.kind {
                ParamKind::TxHash => self.tx_hash_param(method, spec, plan, facts)?,
                ParamKind::Chain => self.chain_param(plan, facts),
                ParamKind::Text => text_param(method, spec, plan, facts)?,
                ParamKind::Number => number_param(method, spec, plan, facts)?,
            };
            let value = match value {
                Some(value) => value,
                None => match spec.policy {
                    DefaultPolicy::Null => ParamValue::Null,
                    DefaultPolicy::DefaultChain => {
                        defaults_applied.insert(spec.name.to_string());
                        ParamValue::Text(self.config.default_chain.clone())
                    }
                    DefaultPolicy::PlaceholderHash if self.config.synthesize_placeholder_hashes => {
                        tracing::warn!("{}: substituting placeholder {}", method, spec.name);
                        defaults_applied.insert(spec.name.to_string());
                        ParamValue::Text(TxHash::placeholder().to_string())
                    }
                    DefaultPolicy::PlaceholderHash | DefaultPolicy::NoDefault => {
                        return Err(BuildError::MissingParam {
                            method,
                            param: spec.name,
                        });
                    }
                },
            };
            params.insert(spec.name.to_string(), value);
        }

        Ok(ApiCallDescriptor {
            method,
            params,
            timestamp: Utc::now(),
            defaults_applied,
        })
    }

    fn tx_hash_param(
        &self,
        method: FunctionType,
        spec: &ParamSpec,
        plan: &MappingPlan,
        facts: &RowFacts,
    ) -> Result<Option<ParamValue>, BuildError> {
        let hash = match plan.column_for(spec.name) {
            Some(column) => match facts.row.value(column).and_then(FieldValue::render) {
                Some(raw) => Some(extract_tx_hash(&raw).ok_or_else(|| BuildError::InvalidParam {
                    method,
                    param: spec.name.to_string(),
                    reason: format!("column `{}` holds no transaction hash", column),
                })?),
                None => None,
            },
            None => facts.tx_hash.clone(),
        };
        Ok(hash.map(|hash| ParamValue::Text(hash.to_string())))
    }

    fn chain_param(&self, plan: &MappingPlan, facts: &RowFacts) -> Option<ParamValue> {
        let chain = plan.chain.unwrap_or_else(|| {
            plan.column_for(PARAM_CHAIN)
                .and_then(|column| facts.row.value(column))
                .and_then(FieldValue::render)
                .map(|raw| self.resolver.resolve(&raw))
                .filter(ChainId::is_known)
                .unwrap_or(facts.chain)
        });
        chain
            .is_known()
            .then(|| ParamValue::Text(chain.as_str().to_string()))
    }
}

fn source_value<'a>(
    spec: &ParamSpec,
    plan: &MappingPlan,
    facts: &'a RowFacts,
) -> Option<&'a FieldValue> {
    match plan.column_for(spec.name) {
        Some(column) => facts.row.value(column),
        None => facts.row.first_of(spec.aliases).map(|(_, value)| value),
    }
}

fn text_param(
    method: FunctionType,
    spec: &ParamSpec,
    plan: &MappingPlan,
    facts: &RowFacts,
) -> Result<Option<ParamValue>, BuildError> {
    let value = source_value(spec, plan, facts).and_then(FieldValue::render);
    match value {
        Some(text) if text.trim().is_empty() => Err(BuildError::InvalidParam {
            method,
            param: spec.name.to_string(),
            reason: "value is blank".to_string(),
        }),
        Some(text) => Ok(Some(ParamValue::Text(text))),
        None => Ok(None),
    }
}

// Optional numbers that do not coerce become null; required ones fail.
fn number_param(
    method: FunctionType,
    spec: &ParamSpec,
    plan: &MappingPlan,
    facts: &RowFacts,
) -> Result<Option<ParamValue>, BuildError> {
    let Some(value) = source_value(spec, plan, facts) else {
        return Ok(None);
    };
    let number = match value {
        FieldValue::Decimal(number) => Some(number.value),
        FieldValue::Text(text) => coerce_decimal(text),
        FieldValue::Null => None,
    };
    match (number, spec.policy) {
        (Some(number), _) => Ok(Some(ParamValue::Number(number))),
        (None, DefaultPolicy::Null) => Ok(Some(ParamValue::Null)),
        (None, _) => Err(BuildError::InvalidParam {
            method,
            param: spec.name.to_string(),
            reason: format!("`{}` is not numeric", value.render().unwrap_or_default()),
        }),
    }
}
