use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use pbs_common::errors::PbsError;

use crate::model::{BudgetRow, Mutation, PrimaryKey, ReadColumns};
use crate::store::{ApplyFn, BudgetStore};

/// In-process `BudgetStore` for tests that don't need a live Postgres
/// instance. No retry loop: a single in-memory map has no serialization
/// conflicts to retry around.
#[derive(Default)]
pub struct InMemoryBudgetStore {
    rows: Mutex<HashMap<(String, String), BudgetRow>>,
}

impl InMemoryBudgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, row: BudgetRow) {
        let mut rows = self.rows.lock().unwrap();
        rows.insert((row.budget_key.clone(), row.timeframe.clone()), row);
    }
}

#[async_trait]
impl BudgetStore for InMemoryBudgetStore {
    async fn run_transaction(
        &self,
        keys: &[PrimaryKey],
        columns: ReadColumns,
        apply: ApplyFn,
    ) -> Result<Vec<Mutation>, PbsError> {
        let rows = {
            let guard = self.rows.lock().unwrap();
            keys.iter()
                .filter_map(|key| {
                    guard
                        .get(&(key.budget_key.clone(), key.timeframe.clone()))
                        .map(|row| mask_column(row, columns))
                })
                .collect::<Vec<_>>()
        };

        let mutations = apply(rows)?;

        let mut guard = self.rows.lock().unwrap();
        for mutation in &mutations {
            let entry = guard
                .entry((mutation.budget_key.clone(), mutation.timeframe.clone()))
                .or_insert_with(|| BudgetRow {
                    budget_key: mutation.budget_key.clone(),
                    timeframe: mutation.timeframe.clone(),
                    value_json: None,
                    value_proto: None,
                });
            if mutation.value_json.is_some() {
                entry.value_json = mutation.value_json.clone();
            }
            if mutation.value_proto.is_some() {
                entry.value_proto = mutation.value_proto.clone();
            }
        }

        Ok(mutations)
    }
}

fn mask_column(row: &BudgetRow, columns: ReadColumns) -> BudgetRow {
    match columns {
        ReadColumns::Json => BudgetRow {
            value_proto: None,
            ..row.clone()
        },
        ReadColumns::Proto => BudgetRow {
            value_json: None,
            ..row.clone()
        },
    }
}
