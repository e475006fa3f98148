use pbs_common::errors::PbsError;
use serde::{Deserialize, Serialize};

/// The budget-type tag carried per key. Only `Binary` is implemented; the
/// enum exists so a second budget type is a compile-time extension point
/// rather than a silently-accepted string (see §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetType {
    Binary,
}

impl BudgetType {
    pub const DEFAULT_WIRE_NAME: &'static str = "BUDGET_TYPE_BINARY_BUDGET";

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BUDGET_TYPE_BINARY_BUDGET" => Some(BudgetType::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenWrapper {
    pub token_int32: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyBodyV2 {
    pub key: String,
    #[serde(default)]
    pub token: Option<i32>,
    #[serde(default)]
    pub tokens: Option<Vec<TokenWrapper>>,
    pub reporting_time: String,
    #[serde(default)]
    pub budget_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataEntry {
    pub reporting_origin: String,
    pub keys: Vec<KeyBodyV2>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequestV2 {
    pub v: String,
    #[serde(default)]
    pub data: Vec<DataEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyBodyV1 {
    pub key: String,
    pub token: i32,
    pub reporting_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequestV1 {
    pub v: String,
    #[serde(default)]
    pub t: Vec<KeyBodyV1>,
}

/// One token value regardless of which of the two wire shapes it arrived in.
impl KeyBodyV2 {
    pub fn token_value(&self) -> Option<i32> {
        if let Some(token) = self.token {
            return Some(token);
        }
        match &self.tokens {
            Some(tokens) if tokens.len() == 1 => Some(tokens[0].token_int32),
            _ => None,
        }
    }
}

/// Which wire shape a parsed body turned out to be, after version sniffing.
#[derive(Debug, Clone)]
pub enum TransactionRequest {
    V1(TransactionRequestV1),
    V2(TransactionRequestV2),
}

impl TransactionRequest {
    /// Sniffs `"v"` and deserializes into the matching shape, per §4.4's
    /// top-level dispatch (`"1.0"` or `"2.0"`, anything else is rejected).
    pub fn parse(body: &[u8]) -> Result<Self, PbsError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|err| PbsError::InvalidRequestBody(format!("malformed JSON body: {err}")))?;
        let version = value
            .get("v")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PbsError::InvalidRequestBody("JSON key absent: \"v\"".to_string()))?;

        match version {
            "1.0" => serde_json::from_value(value)
                .map(TransactionRequest::V1)
                .map_err(|err| PbsError::InvalidRequestBody(err.to_string())),
            "2.0" => serde_json::from_value(value)
                .map(TransactionRequest::V2)
                .map_err(|err| PbsError::InvalidRequestBody(err.to_string())),
            other => Err(PbsError::InvalidRequestBody(format!(
                "invalid version: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExhaustedResponseLegacy {
    pub v: String,
    pub f: Vec<u32>,
}

impl ExhaustedResponseLegacy {
    pub fn new(indices: Vec<u32>) -> Self {
        Self {
            v: "1.0".to_string(),
            f: indices,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExhaustedResponseProto {
    pub version: String,
    pub exhausted_budget_indices: Vec<u32>,
}

impl ExhaustedResponseProto {
    pub fn new(indices: Vec<u32>) -> Self {
        Self {
            version: "1.0".to_string(),
            exhausted_budget_indices: indices,
        }
    }
}
