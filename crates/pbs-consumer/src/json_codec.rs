use pbs_common::errors::PbsError;

use crate::state::{EMPTY, FULL};
use crate::time::HOURS_PER_DAY;

const TOKEN_COUNT_FIELD: &str = "TokenCount";

/// Parses the legacy `{"TokenCount": "v0 v1 … v23"}` representation.
pub fn deserialize_budget_vector(
    value: &serde_json::Value,
) -> Result<[i8; HOURS_PER_DAY as usize], PbsError> {
    let raw = value
        .get(TOKEN_COUNT_FIELD)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            PbsError::ParsingError(
                "Value column JSON does not contain a TokenCount string field".to_string(),
            )
        })?;

    let tokens: Vec<&str> = raw.split(' ').collect();
    if tokens.len() != HOURS_PER_DAY as usize {
        return Err(PbsError::ParsingError(format!(
            "TokenCount has {} tokens, expected {}",
            tokens.len(),
            HOURS_PER_DAY
        )));
    }

    let mut budgets = [EMPTY; HOURS_PER_DAY as usize];
    for (i, token) in tokens.iter().enumerate() {
        let parsed: i8 = token
            .parse()
            .map_err(|_| PbsError::ParsingError(format!("non-integer token in TokenCount: {token}")))?;
        if parsed != EMPTY && parsed != FULL {
            return Err(PbsError::ParsingError(format!(
                "TokenCount value must be 0 or 1, found {parsed}"
            )));
        }
        budgets[i] = parsed;
    }
    Ok(budgets)
}

/// Serializes a budget vector back to the legacy JSON shape.
pub fn serialize_budget_vector(budgets: &[i8; HOURS_PER_DAY as usize]) -> serde_json::Value {
    let joined = budgets
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    serde_json::json!({ TOKEN_COUNT_FIELD: joined })
}
