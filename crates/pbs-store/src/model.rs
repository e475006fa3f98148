use serde::{Deserialize, Serialize};

/// (Budget_Key, Timeframe) — the store's primary key, per §3/§6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    pub budget_key: String,
    pub timeframe: String,
}

impl PrimaryKey {
    pub fn new(budget_key: impl Into<String>, day: i64) -> Self {
        Self {
            budget_key: budget_key.into(),
            timeframe: day.to_string(),
        }
    }
}

/// Which column(s) to read, per `BudgetConsumer::GetReadColumns` (depends on
/// migration phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadColumns {
    Json,
    Proto,
}

/// A persisted row. `value_json`/`value_proto` are mutually present/absent
/// depending on which columns were written at the time, and on `ReadColumns`
/// (only the requested column is populated by a real store query).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BudgetRow {
    pub budget_key: String,
    pub timeframe: String,
    pub value_json: Option<serde_json::Value>,
    pub value_proto: Option<Vec<u8>>,
}

/// An `InsertOrUpdate` mutation against the budget table.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub budget_key: String,
    pub timeframe: String,
    pub value_json: Option<serde_json::Value>,
    pub value_proto: Option<Vec<u8>>,
}
