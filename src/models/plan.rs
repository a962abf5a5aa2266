use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ChainId, FunctionType};

/// Which method a row maps to and, optionally, which column feeds each
/// parameter. Produced by heuristics or by an oracle; oracle plans are
/// untrusted until validated against the builder schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingPlan {
    pub function: FunctionType,
    /// parameter name -> source column
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
    /// Chain pinned by the instruction, overriding per-row resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainId>,
}

impl MappingPlan {
    pub fn new(function: FunctionType) -> Self {
        Self {
            function,
            column_mapping: BTreeMap::new(),
            chain: None,
        }
    }

    pub fn unknown() -> Self {
        Self::new(FunctionType::Unknown)
    }

    pub fn with_column(mut self, param: &str, column: &str) -> Self {
        self.column_mapping
            .insert(param.to_string(), column.to_string());
        self
    }

    pub fn with_chain(mut self, chain: ChainId) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn column_for(&self, param: &str) -> Option<&str> {
        self.column_mapping.get(param).map(String::as_str)
    }

    pub fn is_classified(&self) -> bool {
        self.function != FunctionType::Unknown
    }
}
