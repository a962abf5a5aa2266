use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::constants::PARAM_TX_HASH;
use crate::error::CallError;
use crate::models::{ApiCallDescriptor, ChainId, FunctionType, ParamValue};

/// Downstream API: one descriptor in, success payload or classified error out.
#[async_trait]
pub trait ApiTarget: Send + Sync {
    async fn invoke(&self, descriptor: &ApiCallDescriptor) -> Result<serde_json::Value, CallError>;

    fn name(&self) -> &'static str {
        "api"
    }
}

// ==================== DRY RUN ====================

/// Local target that acknowledges descriptors without any network traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTarget;

impl DryRunTarget {
    fn status_for(method: FunctionType) -> &'static str {
        match method {
            FunctionType::TagAsExpense => "tagged_as_expense",
            FunctionType::GetTransaction => "transaction_fetched",
            FunctionType::GetReceipt => "receipt_generated",
            FunctionType::FillAccountBy => "account_filled",
            FunctionType::ListChains => "chains_listed",
            FunctionType::Unknown => "unknown",
        }
    }
}

#[async_trait]
impl ApiTarget for DryRunTarget {
    async fn invoke(&self, descriptor: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
        if descriptor.method == FunctionType::Unknown {
            return Err(CallError::Permanent("unknown method".to_string()));
        }

        if let Some(value) = descriptor.param(PARAM_TX_HASH) {
            let blank = match value {
                ParamValue::Text(text) => text.trim().is_empty(),
                ParamValue::Null => true,
                ParamValue::Number(_) => false,
            };
            if blank {
                return Err(CallError::Permanent("tx_hash is empty".to_string()));
            }
        }

        let mut payload = serde_json::json!({
            "status": Self::status_for(descriptor.method),
            "method": descriptor.method,
            "params": descriptor.params,
        });
        if descriptor.method == FunctionType::ListChains {
            payload["chains"] = serde_json::json!(ChainId::SUPPORTED
                .iter()
                .map(ChainId::as_str)
                .collect::<Vec<_>>());
        }
        Ok(payload)
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

// ==================== HTTP ====================

#[derive(Clone, Debug)]
pub struct HttpApiTarget {
    endpoint: String,
    client: Client,
}

impl HttpApiTarget {
    /// Constructs a new instance via `new`.
    ///
    /// # Arguments
    /// * `endpoint` - URL that receives the descriptor JSON via POST.
    /// * `timeout` - per-request timeout applied by the HTTP client.
    ///
    /// # Returns
    /// * `Ok(Self)` when the endpoint parses and the client builds.
    /// * `Err(anyhow::Error)` otherwise.
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let parsed = url::Url::parse(endpoint.trim())?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: parsed.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 408, 429 and 5xx are worth retrying; any other non-2xx status is final.
pub fn classify_status(status: StatusCode, body: &str) -> CallError {
    let message = format!("{} {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        CallError::Transient(message)
    } else {
        CallError::Permanent(message)
    }
}

#[async_trait]
impl ApiTarget for HttpApiTarget {
    async fn invoke(&self, descriptor: &ApiCallDescriptor) -> Result<serde_json::Value, CallError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(descriptor)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    CallError::Transient(e.to_string())
                } else {
                    CallError::Permanent(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CallError::Transient(format!("failed to read response body: {}", e)))?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
