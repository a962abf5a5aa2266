use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::crypto::plan_cache_key;
use crate::error::{AppError, Result};
use crate::models::{ChainId, FunctionType, MappingPlan};
use crate::services::call_builder::schema_for;
use crate::services::chain_resolver::ChainResolver;
use crate::utils::tokenize_words;

/// Proposes a mapping plan for a free-text instruction over a header set.
/// Plans are untrusted; callers validate them before use.
#[async_trait]
pub trait MappingOracle: Send + Sync {
    async fn propose_plan(&self, instruction: &str, headers: &[String]) -> Result<MappingPlan>;

    fn name(&self) -> &'static str;
}

// ==================== API USAGE GUIDE ====================

/// Matches when any verb and any noun both appear as whole words,
/// e.g. "show ... chains" or "retrieve ... transactions".
pub struct VerbNoun {
    pub verbs: &'static [&'static str],
    pub nouns: &'static [&'static str],
}

pub struct ApiMethodDoc {
    pub function: FunctionType,
    pub summary: &'static str,
    pub use_when: &'static str,
    /// Whole-word phrases that signal this method in an instruction.
    pub keywords: &'static [&'static str],
    pub verb_nouns: &'static [VerbNoun],
}

/// Checked in order; the first method with a matching keyword or
/// verb/noun pair wins.
pub const API_METHODS: &[ApiMethodDoc] = &[
    ApiMethodDoc {
        function: FunctionType::ListChains,
        summary: "List the chains the API supports.",
        use_when: "the user asks which chains or networks are available",
        keywords: &[
            "list chains",
            "list networks",
            "supported chains",
            "supported networks",
            "which chains",
            "show chains",
        ],
        // Plural nouns only, so "chain is ETH" never lists chains.
        verb_nouns: &[VerbNoun {
            verbs: &["list", "show", "what", "which", "available", "supported"],
            nouns: &["chains", "networks", "blockchains"],
        }],
    },
    ApiMethodDoc {
        function: FunctionType::GetReceipt,
        summary: "Generate a receipt for a transaction (tx_hash, chain).",
        use_when: "the user wants receipts or proof of payment",
        keywords: &["receipt", "receipts", "proof of payment"],
        verb_nouns: &[],
    },
    ApiMethodDoc {
        function: FunctionType::TagAsExpense,
        summary: "Tag a transaction as an expense (tx_hash, chain, expense_category, amount_in_usd, amount_in_eth).",
        use_when: "the user wants to categorize, tag or book transactions as expenses",
        keywords: &[
            "expense",
            "expenses",
            "tag",
            "tagged",
            "categorize",
            "categorise",
            "bookkeeping",
        ],
        verb_nouns: &[],
    },
    ApiMethodDoc {
        function: FunctionType::FillAccountBy,
        summary: "Credit an account by an amount (account_id, amount).",
        use_when: "the user wants to fill, fund, credit or top up accounts",
        keywords: &["fill", "top up", "topup", "credit", "fund"],
        verb_nouns: &[],
    },
    ApiMethodDoc {
        function: FunctionType::GetTransaction,
        summary: "Fetch transaction details (tx_hash, chain).",
        use_when: "the user wants to look up or fetch transaction details",
        keywords: &[
            "transaction details",
            "transaction detail",
            "look up",
            "lookup",
            "fetch",
            "details",
            "status",
        ],
        verb_nouns: &[VerbNoun {
            verbs: &["get", "retrieve", "fetch", "show", "find"],
            nouns: &["transaction", "transactions", "tx", "txs"],
        }],
    },
];

/// Text rendering of `API_METHODS` for prompts and logs.
pub fn usage_guide() -> String {
    API_METHODS
        .iter()
        .map(|doc| {
            let params = schema_for(doc.function)
                .map(|schema| {
                    schema
                        .iter()
                        .map(|spec| spec.name)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!(
                "- {}({}): {} Use when {}.",
                doc.function, params, doc.summary, doc.use_when
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ==================== KEYWORD ORACLE ====================

fn has_any_word(words: &[String], candidates: &[&str]) -> bool {
    words.iter().any(|word| candidates.contains(&word.as_str()))
}

/// Deterministic oracle: keyword intent plus alias-based column mapping.
#[derive(Debug, Clone)]
pub struct KeywordIntentOracle {
    resolver: Arc<ChainResolver>,
}

impl Default for KeywordIntentOracle {
    fn default() -> Self {
        Self::new(Arc::new(ChainResolver::default()))
    }
}

impl KeywordIntentOracle {
    pub fn new(resolver: Arc<ChainResolver>) -> Self {
        Self { resolver }
    }

    pub fn detect_function(&self, instruction: &str) -> Option<FunctionType> {
        let words = tokenize_words(instruction);
        let padded = format!(" {} ", words.join(" "));
        API_METHODS
            .iter()
            .find(|doc| {
                doc.keywords
                    .iter()
                    .any(|keyword| padded.contains(&format!(" {} ", keyword)))
                    || doc
                        .verb_nouns
                        .iter()
                        .any(|pair| has_any_word(&words, pair.verbs) && has_any_word(&words, pair.nouns))
            })
            .map(|doc| doc.function)
    }

    /// "chain is ETH", "network: polygon", "on base".
    pub fn pinned_chain(&self, instruction: &str) -> Option<ChainId> {
        let words = tokenize_words(instruction);
        for (i, word) in words.iter().enumerate() {
            let candidate = match word.as_str() {
                "chain" | "network" => {
                    let next = i + 1;
                    if words.get(next).is_some_and(|w| w == "is") {
                        words.get(next + 1)
                    } else {
                        words.get(next)
                    }
                }
                "on" => words.get(i + 1),
                _ => None,
            };
            if let Some(chain) = candidate
                .map(|w| self.resolver.resolve(w))
                .filter(ChainId::is_known)
            {
                return Some(chain);
            }
        }
        None
    }

    fn map_columns(&self, function: FunctionType, headers: &[String]) -> MappingPlan {
        let mut plan = MappingPlan::new(function);
        let Some(schema) = schema_for(function) else {
            return plan;
        };
        for spec in schema {
            let column = spec.aliases.iter().find_map(|alias| {
                headers
                    .iter()
                    .find(|header| header.trim().to_lowercase() == *alias)
            });
            if let Some(column) = column {
                plan = plan.with_column(spec.name, column);
            }
        }
        plan
    }
}

#[async_trait]
impl MappingOracle for KeywordIntentOracle {
    async fn propose_plan(&self, instruction: &str, headers: &[String]) -> Result<MappingPlan> {
        let function = self.detect_function(instruction).ok_or_else(|| {
            AppError::Oracle(format!(
                "could not infer an API method from instruction '{}'",
                instruction.trim()
            ))
        })?;

        let mut plan = self.map_columns(function, headers);
        plan.chain = self.pinned_chain(instruction);
        tracing::debug!(
            "Keyword oracle mapped instruction to {} ({} columns, chain override: {:?})",
            plan.function,
            plan.column_mapping.len(),
            plan.chain
        );
        Ok(plan)
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

// ==================== CACHE ====================

/// TTL cache in front of another oracle. Only successful plans are cached;
/// expired entries are evicted when looked up.
pub struct CachedOracle {
    inner: Arc<dyn MappingOracle>,
    ttl: Duration,
    entries: RwLock<HashMap<String, (MappingPlan, Instant)>>,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn MappingOracle>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn lookup(&self, key: &str) -> Option<MappingPlan> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((plan, stored_at)) if stored_at.elapsed() < self.ttl => {
                    return Some(plan.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(key);
        None
    }
}

#[async_trait]
impl MappingOracle for CachedOracle {
    async fn propose_plan(&self, instruction: &str, headers: &[String]) -> Result<MappingPlan> {
        let key = plan_cache_key(instruction, headers);
        if let Some(plan) = self.lookup(&key).await {
            tracing::debug!("Mapping plan cache hit for {}", key);
            return Ok(plan);
        }

        let plan = self.inner.propose_plan(instruction, headers).await?;
        self.entries
            .write()
            .await
            .insert(key, (plan.clone(), Instant::now()));
        Ok(plan)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
