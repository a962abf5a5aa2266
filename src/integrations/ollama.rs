use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{ChainId, FunctionType, MappingPlan};
use crate::services::chain_resolver::ChainResolver;
use crate::services::intent::{usage_guide, MappingOracle};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

// Both field spellings appear in model output.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(alias = "function")]
    api_method: String,
    #[serde(default, alias = "mapping")]
    csv_mapping: BTreeMap<String, String>,
    #[serde(default)]
    chain: Option<String>,
}

/// Mapping-plan oracle backed by an Ollama-compatible `/api/generate` endpoint.
#[derive(Clone, Debug)]
pub struct OllamaOracle {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaOracle {
    /// Constructs a new instance via `new`.
    ///
    /// # Arguments
    /// * `base_url` - server root, e.g. `http://localhost:11434`.
    /// * `model` - model name passed through to the server.
    /// * `timeout` - request timeout; generation can be slow.
    ///
    /// # Returns
    /// * `Ok(Self)` when the URL parses and the HTTP client builds.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        url::Url::parse(base_url.trim())?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn build_prompt(instruction: &str, headers: &[String]) -> String {
        format!(
            "You map spreadsheet columns onto API calls. Output only one JSON object, no explanations.\n\
             Available API methods:\n{}\n\n\
             Instruction: \"{}\"\n\
             CSV columns: {}\n\n\
             Respond with {{\"api_method\": \"<method>\", \"csv_mapping\": {{\"<parameter>\": \"<column>\"}}, \"chain\": null}}. \
             Only use columns from the list above. Set \"chain\" only when the instruction names one.",
            usage_guide(),
            instruction.trim(),
            serde_json::to_string(headers).unwrap_or_default()
        )
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Oracle(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Oracle(format!(
                "oracle returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Oracle(format!("invalid oracle envelope: {}", e)))?;
        Ok(payload.response)
    }
}

#[async_trait]
impl MappingOracle for OllamaOracle {
    async fn propose_plan(&self, instruction: &str, headers: &[String]) -> Result<MappingPlan> {
        let reply = self
            .generate(Self::build_prompt(instruction, headers))
            .await?;
        tracing::debug!("Oracle reply ({} chars)", reply.len());
        parse_plan_reply(&reply)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

/// Parse a model reply into a plan. Tolerates code fences and surrounding
/// prose; anything else malformed is an oracle error.
pub fn parse_plan_reply(reply: &str) -> Result<MappingPlan> {
    let stripped = strip_code_fences(reply);
    let json = first_json_object(&stripped)
        .ok_or_else(|| AppError::Oracle("oracle reply contains no JSON object".to_string()))?;
    let raw: RawPlan = serde_json::from_str(json)
        .map_err(|e| AppError::Oracle(format!("oracle reply is not a mapping plan: {}", e)))?;

    let function: FunctionType = raw
        .api_method
        .parse()
        .map_err(AppError::Oracle)?;

    let chain = match raw.chain.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) => {
            let resolved = ChainResolver::default().resolve(name);
            if resolved == ChainId::Unknown {
                return Err(AppError::Oracle(format!("oracle named unknown chain '{}'", name)));
            }
            Some(resolved)
        }
    };

    Ok(MappingPlan {
        function,
        column_mapping: raw.csv_mapping,
        chain,
    })
}

fn strip_code_fences(reply: &str) -> String {
    reply
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First balanced `{...}` in the text, honouring JSON string escapes.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply_with_prose() {
        let reply = "Sure! Here is the plan:\n```json\n{\"api_method\": \"tag_as_expense\", \"csv_mapping\": {\"tx_hash\": \"Tx Link\", \"expense_category\": \"Purpose\"}}\n```\nLet me know.";
        let plan = parse_plan_reply(reply).unwrap();
        assert_eq!(plan.function, FunctionType::TagAsExpense);
        assert_eq!(plan.column_for("tx_hash"), Some("Tx Link"));
        assert_eq!(plan.chain, None);
    }

    #[test]
    fn accepts_alternate_field_names_and_chain() {
        let reply = r#"{"function": "GET_RECEIPT", "mapping": {"tx_hash": "hash"}, "chain": "eth"}"#;
        let plan = parse_plan_reply(reply).unwrap();
        assert_eq!(plan.function, FunctionType::GetReceipt);
        assert_eq!(plan.chain, Some(ChainId::Ethereum));
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let reply = r#"{"api_method": "get_transaction", "csv_mapping": {"tx_hash": "col {x}"}} trailing }"#;
        let plan = parse_plan_reply(reply).unwrap();
        assert_eq!(plan.column_for("tx_hash"), Some("col {x}"));
    }

    #[test]
    fn malformed_replies_are_oracle_errors() {
        for reply in [
            "no json here",
            "{\"api_method\": ",
            "{\"csv_mapping\": {}}",
            "{\"api_method\": \"mark_as_refund\"}",
            "{\"api_method\": \"get_receipt\", \"chain\": \"solana\"}",
        ] {
            assert!(
                matches!(parse_plan_reply(reply), Err(AppError::Oracle(_))),
                "reply {:?}",
                reply
            );
        }
    }

    #[test]
    fn prompt_names_instruction_columns_and_methods() {
        let prompt = OllamaOracle::build_prompt(
            "tag as expense",
            &["Tx Link".to_string(), "Purpose".to_string()],
        );
        assert!(prompt.contains("tag as expense"));
        assert!(prompt.contains("[\"Tx Link\",\"Purpose\"]"));
        assert!(prompt.contains("fill_account_by"));
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(OllamaOracle::new("::", "m", Duration::from_secs(1)).is_err());
        assert!(OllamaOracle::new("http://localhost:11434/", "m", Duration::from_secs(1)).is_ok());
    }
}
