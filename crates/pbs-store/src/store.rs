use async_trait::async_trait;
use pbs_common::errors::PbsError;

use crate::model::{BudgetRow, Mutation, PrimaryKey, ReadColumns};

/// A pure function from the rows read inside one transaction attempt to the
/// mutations to commit (or an application-level error). Must be safe to
/// invoke more than once, since a retriable store failure re-invokes it
/// against a fresh read. See `BudgetStore::run_transaction`.
pub type ApplyFn = Box<dyn Fn(Vec<BudgetRow>) -> Result<Vec<Mutation>, PbsError> + Send + Sync>;

/// Row read + atomic multi-row commit against a strongly-consistent tabular
/// store. See §4.5.
///
/// `run_transaction` folds the contract's `ReadRows` and `Commit(fn)` into a
/// single call, matching how `ConsumeBudgetService` actually drives the
/// store (§4.6 step 4): read, apply, commit, with the whole cycle retried on
/// a retriable store-level failure. An application-level error returned by
/// `apply` (budget exhaustion, a corrupted row) is never retried and is
/// surfaced verbatim, taking precedence over the store's own wrapping
/// status.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn run_transaction(
        &self,
        keys: &[PrimaryKey],
        columns: ReadColumns,
        apply: ApplyFn,
    ) -> Result<Vec<Mutation>, PbsError>;
}
