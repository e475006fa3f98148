use pbs_common::errors::PbsError;
use pbs_store::model::{BudgetRow, Mutation, PrimaryKey, ReadColumns};
use pbs_store::pg::PgBudgetStore;
use pbs_store::store::BudgetStore;

fn admin_url() -> Option<String> {
    std::env::var("PBS_TEST_DATABASE_ADMIN_URL").ok()
}

async fn connected_store(prefix: &str) -> Option<PgBudgetStore> {
    let admin_url = admin_url()?;
    let (pool, _db_name) = pbs_test_fixture::create_temp_db(&admin_url, prefix)
        .await
        .expect("creating temp database");
    pbs_store::pg::run_migrations(&pool)
        .await
        .expect("running migrations against temp database");
    Some(PgBudgetStore::from_pool(pool, "budget_keys", 3))
}

fn insert_if_absent(rows: Vec<BudgetRow>, key: &PrimaryKey) -> Result<Vec<Mutation>, PbsError> {
    if !rows.is_empty() {
        return Err(PbsError::BudgetExhausted {
            exhausted_indices: vec![0],
        });
    }
    Ok(vec![Mutation {
        budget_key: key.budget_key.clone(),
        timeframe: key.timeframe.clone(),
        value_json: Some(serde_json::json!({"consumed": true})),
        value_proto: None,
    }])
}

#[tokio::test]
async fn new_key_is_inserted_and_repeat_consumption_is_exhausted() {
    let Some(store) = connected_store("pbs_store_roundtrip").await else {
        eprintln!(
            "skipping new_key_is_inserted_and_repeat_consumption_is_exhausted: \
             PBS_TEST_DATABASE_ADMIN_URL is not set"
        );
        return;
    };

    let key = PrimaryKey::new("site:example.test", 18242);
    let keys = vec![key.clone()];

    let first = store
        .run_transaction(
            &keys,
            ReadColumns::Json,
            Box::new({
                let key = key.clone();
                move |rows| insert_if_absent(rows, &key)
            }),
        )
        .await
        .expect("first consumption should succeed");
    assert_eq!(first.len(), 1);

    let second = store
        .run_transaction(
            &keys,
            ReadColumns::Json,
            Box::new(move |rows| insert_if_absent(rows, &key)),
        )
        .await;
    assert!(matches!(
        second,
        Err(PbsError::BudgetExhausted { exhausted_indices }) if exhausted_indices == vec![0]
    ));
}

#[tokio::test]
async fn commit_retries_are_exhausted_as_a_store_error() {
    let Some(store) = connected_store("pbs_store_retry").await else {
        eprintln!("skipping commit_retries_are_exhausted_as_a_store_error: PBS_TEST_DATABASE_ADMIN_URL is not set");
        return;
    };

    let key = PrimaryKey::new("site:retries.test", 1);
    let result = store
        .run_transaction(
            &[key],
            ReadColumns::Json,
            Box::new(|_rows| Err(PbsError::InvalidRequest("rejected by apply".into()))),
        )
        .await;
    assert!(matches!(result, Err(PbsError::InvalidRequest(_))));
}
