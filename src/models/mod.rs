// src/models/mod.rs
pub mod call;
pub mod plan;
pub mod row;

pub use call::{
    ApiCallDescriptor,
    AuditRecord,
    BatchOutcome,
    BatchSummary,
    CallErrorKind,
    CallErrorRecord,
    ChainId,
    FunctionType,
    OutcomeStatus,
    ParamValue,
    StatusCounts,
    TxHash,
};
pub use plan::MappingPlan;
pub use row::{FieldValue, NormalizedRow, Numeric, RawValue, Row};

use serde::Serialize;

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
