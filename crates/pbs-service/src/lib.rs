//! Orchestrates parse → store-transaction → response encoding for the
//! `:prepare` phase, per §4.6. Everything else `FrontEnd` routes is a
//! no-op success in this engine (§4.7); this crate only implements the one
//! phase that actually touches budget state.

use std::sync::Arc;

use pbs_common::config::MigrationPhase;
use pbs_common::errors::PbsError;
use pbs_consumer::BudgetConsumer;
use pbs_metrics::{observe_budget_exhausted, observe_keys_per_transaction,
    observe_successful_budget_consumed, TransactionPhase};
use pbs_request::TransactionRequest;
use pbs_site::{Site, SiteResolver};
use pbs_store::store::{ApplyFn, BudgetStore};
use tokio::sync::Semaphore;
use tracing::instrument;

/// What `ConsumeBudgetService::consume_budget` hands back on success; the
/// front end only needs the count to decide on an empty `2xx` body.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeBudgetOutcome {
    pub keys_consumed: usize,
}

/// Binds a `BudgetStore`, a `SiteResolver`, and the store's migration phase
/// into the single orchestration step the front end's `:prepare` route
/// calls. See §2's request-flow diagram and §4.6's six numbered steps.
pub struct ConsumeBudgetService {
    store: Arc<dyn BudgetStore>,
    site_resolver: SiteResolver,
    migration_phase: MigrationPhase,
    /// Bounds concurrent in-flight store transactions, the same way
    /// `collector::Collector::run_once` bounds concurrent blocking work with
    /// a `Semaphore`-gated `JoinSet` rather than leaving it unbounded.
    transaction_permits: Arc<Semaphore>,
}

impl ConsumeBudgetService {
    pub fn new(
        store: Arc<dyn BudgetStore>,
        site_resolver: SiteResolver,
        migration_phase: MigrationPhase,
        max_concurrent_transactions: usize,
    ) -> Self {
        Self {
            store,
            site_resolver,
            migration_phase,
            transaction_permits: Arc::new(Semaphore::new(max_concurrent_transactions.max(1))),
        }
    }

    /// Step 1 (migration phase) is `self.migration_phase`, read fresh at the
    /// top of each call rather than cached from service construction, since
    /// the source leaves cross-phase consistency within one client retry
    /// undefined (§9 Open Questions) and re-reading is the simpler contract
    /// to reason about.
    #[instrument(skip(self, authorized_domain, request), fields(transaction_origin = %transaction_origin))]
    pub async fn consume_budget(
        &self,
        transaction_origin: &str,
        authorized_domain: &Site,
        request: &TransactionRequest,
    ) -> Result<ConsumeBudgetOutcome, PbsError> {
        // Step 2: parse via BudgetConsumer.
        let consumer = BudgetConsumer::parse_transaction_request(
            transaction_origin,
            authorized_domain,
            request,
            &self.site_resolver,
        )?;
        observe_keys_per_transaction(TransactionPhase::Prepare, consumer.key_count());

        let phase = self.migration_phase;
        let columns = BudgetConsumer::read_columns(phase);
        let primary_keys = consumer.primary_keys();

        // The store may re-invoke `apply` on a retriable conflict (§4.5), so
        // the closure clones its own BudgetConsumer per attempt rather than
        // consuming the outer one.
        let apply: ApplyFn = Box::new(move |rows| consumer.clone().consume_budget(rows, columns, phase));

        // Step 3: schedule the store transaction. With a native async
        // `sqlx` store this is simply an `.await` on the request's own task
        // rather than a hop to a separate pool (§5's expansion).
        let _permit = self
            .transaction_permits
            .acquire()
            .await
            .expect("transaction semaphore is never closed");
        let result = self.store.run_transaction(&primary_keys, columns, apply).await;
        drop(_permit);

        // Step 4/5: fold the outcome back into metrics and the response.
        match result {
            Ok(mutations) => {
                observe_successful_budget_consumed(TransactionPhase::Prepare, mutations.len());
                Ok(ConsumeBudgetOutcome {
                    keys_consumed: mutations.len(),
                })
            }
            Err(PbsError::BudgetExhausted { exhausted_indices }) => {
                observe_budget_exhausted(TransactionPhase::Prepare, exhausted_indices.len());
                Err(PbsError::BudgetExhausted { exhausted_indices })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbs_site::resolve;
    use pbs_store::mem::InMemoryBudgetStore;

    fn v2_request(origin: &str, key: &str, reporting_time: &str) -> TransactionRequest {
        let json = serde_json::json!({
            "v": "2.0",
            "data": [{
                "reporting_origin": origin,
                "keys": [{"key": key, "token": 1, "reporting_time": reporting_time}]
            }]
        });
        TransactionRequest::parse(&serde_json::to_vec(&json).unwrap()).unwrap()
    }

    fn service(store: Arc<dyn BudgetStore>) -> ConsumeBudgetService {
        ConsumeBudgetService::new(store, SiteResolver::default(), MigrationPhase::Phase1, 4)
    }

    #[tokio::test]
    async fn s1_single_new_key_succeeds() {
        let store: Arc<dyn BudgetStore> = Arc::new(InMemoryBudgetStore::new());
        let service = service(store);
        let site = resolve("https://a.test").unwrap();
        let request = v2_request("https://a.test", "k", "2019-12-11T07:20:50Z");

        let outcome = service
            .consume_budget("https://a.test", &site, &request)
            .await
            .unwrap();
        assert_eq!(outcome.keys_consumed, 1);
    }

    #[tokio::test]
    async fn s2_repeat_consumption_is_exhausted() {
        let store: Arc<dyn BudgetStore> = Arc::new(InMemoryBudgetStore::new());
        let service = service(store);
        let site = resolve("https://a.test").unwrap();
        let request = v2_request("https://a.test", "k", "2019-12-11T07:20:50Z");

        service
            .consume_budget("https://a.test", &site, &request)
            .await
            .unwrap();

        let result = service.consume_budget("https://a.test", &site, &request).await;
        match result {
            Err(PbsError::BudgetExhausted { exhausted_indices }) => {
                assert_eq!(exhausted_indices, vec![0]);
            }
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn s5_reporting_origin_mismatch_is_rejected() {
        let store: Arc<dyn BudgetStore> = Arc::new(InMemoryBudgetStore::new());
        let service = service(store);
        let site = resolve("https://a.test").unwrap();
        let request = v2_request("https://b.test", "k", "2019-12-11T07:20:50Z");

        let result = service.consume_budget("https://a.test", &site, &request).await;
        assert!(matches!(result, Err(PbsError::ReportingOriginNotBelongToSite)));
    }

    #[tokio::test]
    async fn s3_multi_key_transaction_consumes_every_new_key() {
        let store: Arc<dyn BudgetStore> = Arc::new(InMemoryBudgetStore::new());
        let service = service(store);
        let site = resolve("https://a.test").unwrap();
        let json = serde_json::json!({
            "v": "2.0",
            "data": [{
                "reporting_origin": "https://a.test",
                "keys": [
                    {"key": "k1", "token": 1, "reporting_time": "2019-12-11T07:20:50Z"},
                    {"key": "k2", "token": 1, "reporting_time": "2019-12-11T08:20:50Z"}
                ]
            }]
        });
        let request = TransactionRequest::parse(&serde_json::to_vec(&json).unwrap()).unwrap();

        let outcome = service
            .consume_budget("https://a.test", &site, &request)
            .await
            .unwrap();
        assert_eq!(outcome.keys_consumed, 2);
    }
}
