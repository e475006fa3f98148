use pbs_common::errors::PbsError;

use crate::state::{EMPTY, FULL};
use crate::time::HOURS_PER_DAY;

/// `LaplaceDpBudgets{ budgets: repeated int32[24] }` stand-in: no `.proto`
/// compiler is in scope for this crate, so the wire shape is reproduced by
/// hand as 24 little-endian `i32`s, one per hour, matching the field's
/// `repeated int32` layout. `FULL` round-trips through 6400, `EMPTY` through
/// 0, exactly as the real message does.
pub const FULL_BUDGET_COUNT: i32 = 6400;
pub const EMPTY_BUDGET_COUNT: i32 = 0;

pub fn serialize_budget_vector(budgets: &[i8; HOURS_PER_DAY as usize]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(budgets.len() * 4);
    for &value in budgets {
        let encoded = if value == FULL {
            FULL_BUDGET_COUNT
        } else {
            EMPTY_BUDGET_COUNT
        };
        bytes.extend_from_slice(&encoded.to_le_bytes());
    }
    bytes
}

pub fn deserialize_budget_vector(bytes: &[u8]) -> Result<[i8; HOURS_PER_DAY as usize], PbsError> {
    if bytes.len() != HOURS_PER_DAY as usize * 4 {
        return Err(PbsError::ParsingError(format!(
            "LaplaceDpBudgets have {} bytes, expected {} tokens",
            bytes.len(),
            HOURS_PER_DAY
        )));
    }

    let mut budgets = [EMPTY; HOURS_PER_DAY as usize];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        let value = i32::from_le_bytes(chunk.try_into().unwrap());
        budgets[i] = match value {
            EMPTY_BUDGET_COUNT => EMPTY,
            FULL_BUDGET_COUNT => FULL,
            other => {
                return Err(PbsError::ParsingError(format!(
                    "LaplaceDpBudgets value should be either {FULL_BUDGET_COUNT} (full) or \
                     {EMPTY_BUDGET_COUNT} (empty), found {other}"
                )))
            }
        };
    }
    Ok(budgets)
}
