use pbs_common::errors::PbsError;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tokio::time::{sleep, Duration};
use tracing::{instrument, warn};

use crate::model::{BudgetRow, Mutation, PrimaryKey, ReadColumns};
use crate::store::{ApplyFn, BudgetStore};

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed `BudgetStore`: SERIALIZABLE transactions give the
/// cross-row atomicity the contract needs without a bespoke lock manager.
/// Connection retry mirrors the backoff the rest of the pack uses when
/// standing up a pool; commit retry handles the serialization failures
/// SERIALIZABLE isolation can legitimately produce under contention.
#[derive(Clone)]
pub struct PgBudgetStore {
    pool: PgPool,
    table_name: String,
    commit_retries: u32,
}

impl PgBudgetStore {
    pub async fn connect(
        database_url: &str,
        table_name: impl Into<String>,
        max_connections: u32,
        commit_retries: u32,
    ) -> Result<Self, PbsError> {
        const MAX_ATTEMPTS: u32 = 5;
        const BASE_DELAY_MS: u64 = 500;

        let mut attempts = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    run_migrations(&pool)
                        .await
                        .map_err(|err| PbsError::InitializationError(err.to_string()))?;
                    return Ok(Self::from_pool(pool, table_name, commit_retries));
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(PbsError::InitializationError(err.to_string()));
                    }

                    let exp = (attempts - 1).min(5);
                    let backoff = Duration::from_millis(BASE_DELAY_MS * (1u64 << exp));
                    warn!(
                        attempts,
                        error = %err,
                        wait_ms = backoff.as_millis(),
                        "store connection failed; retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    pub fn from_pool(pool: PgPool, table_name: impl Into<String>, commit_retries: u32) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
            commit_retries,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn read_rows(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        keys: &[PrimaryKey],
        columns: ReadColumns,
    ) -> Result<Vec<BudgetRow>, sqlx::Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let value_column = match columns {
            ReadColumns::Json => "value_json",
            ReadColumns::Proto => "value_proto",
        };

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
            "SELECT budget_key, timeframe, {value_column} FROM {} WHERE ",
            self.table_name
        ));
        builder.push("(budget_key, timeframe) IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push("(");
            separated.push_bind_unseparated(&key.budget_key);
            separated.push_unseparated(", ");
            separated.push_bind_unseparated(&key.timeframe);
            separated.push_unseparated(")");
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&mut **tx).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let budget_key: String = row.try_get("budget_key")?;
            let timeframe: String = row.try_get("timeframe")?;
            let (value_json, value_proto) = match columns {
                ReadColumns::Json => (row.try_get("value_json")?, None),
                ReadColumns::Proto => (None, row.try_get("value_proto")?),
            };
            out.push(BudgetRow {
                budget_key,
                timeframe,
                value_json,
                value_proto,
            });
        }
        Ok(out)
    }

    async fn write_mutations(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        mutations: &[Mutation],
    ) -> Result<(), sqlx::Error> {
        for mutation in mutations {
            sqlx::query(&format!(
                r#"
                INSERT INTO {table} (budget_key, timeframe, value_json, value_proto)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (budget_key, timeframe) DO UPDATE
                    SET value_json = COALESCE(EXCLUDED.value_json, {table}.value_json),
                        value_proto = COALESCE(EXCLUDED.value_proto, {table}.value_proto)
                "#,
                table = self.table_name
            ))
            .bind(&mutation.budget_key)
            .bind(&mutation.timeframe)
            .bind(&mutation.value_json)
            .bind(&mutation.value_proto)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("40001"))
}

#[async_trait::async_trait]
impl BudgetStore for PgBudgetStore {
    #[instrument(skip(self, apply), fields(keys = keys.len()))]
    async fn run_transaction(
        &self,
        keys: &[PrimaryKey],
        columns: ReadColumns,
        apply: ApplyFn,
    ) -> Result<Vec<Mutation>, PbsError> {
        let mut attempt = 0u32;
        loop {
            let outcome = self.run_transaction_once(keys, columns, &apply).await;
            match outcome {
                Ok(mutations) => return Ok(mutations),
                Err(TxFailure::App(err)) => return Err(err),
                Err(TxFailure::Store(err)) => {
                    attempt += 1;
                    if attempt > self.commit_retries || !is_serialization_failure(&err) {
                        return Err(PbsError::FailToCommit(err.to_string()));
                    }
                    warn!(attempt, error = %err, "retrying budget transaction after serialization conflict");
                }
            }
        }
    }
}

enum TxFailure {
    App(PbsError),
    Store(sqlx::Error),
}

impl PgBudgetStore {
    async fn run_transaction_once(
        &self,
        keys: &[PrimaryKey],
        columns: ReadColumns,
        apply: &ApplyFn,
    ) -> Result<Vec<Mutation>, TxFailure> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(TxFailure::Store)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(TxFailure::Store)?;

        let rows = self
            .read_rows(&mut tx, keys, columns)
            .await
            .map_err(TxFailure::Store)?;

        let mutations = apply(rows).map_err(TxFailure::App)?;

        self.write_mutations(&mut tx, &mutations)
            .await
            .map_err(TxFailure::Store)?;

        tx.commit().await.map_err(TxFailure::Store)?;

        Ok(mutations)
    }
}
