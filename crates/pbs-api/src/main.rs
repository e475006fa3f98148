use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use pbs_api::routes::{build_router, ApiState};
use pbs_auth::AuthInterceptor;
use pbs_common::config::AppConfig;
use pbs_common::logging;
use pbs_metrics::ReportingOriginClass;
use pbs_service::ConsumeBudgetService;
use pbs_site::SiteResolver;
use pbs_store::PgBudgetStore;
use tracing::info;

fn parse_reporting_origin_class(raw: &str) -> Result<ReportingOriginClass> {
    match raw {
        "OPERATOR" => Ok(ReportingOriginClass::Operator),
        "COORDINATOR" => Ok(ReportingOriginClass::Coordinator),
        other => anyhow::bail!("unknown reporting_origin_class: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing("pbs-api", "info");
    let config = AppConfig::load().context("loading configuration")?;

    let store = PgBudgetStore::connect(
        &config.store.database_url,
        &config.store.table_name,
        config.store.max_connections,
        config.store.commit_retries,
    )
    .await
    .context("connecting to budget store")?;

    let service = Arc::new(ConsumeBudgetService::new(
        Arc::new(store),
        SiteResolver::default(),
        config.store.migration_phase,
        config.store.max_concurrent_transactions,
    ));

    let state = Arc::new(ApiState {
        service,
        auth: AuthInterceptor::new(),
        reporting_origin_class: parse_reporting_origin_class(&config.api.reporting_origin_class)?,
        metrics_path: Box::leak(config.observability.metrics_path.clone().into_boxed_str()),
        require_claimed_identity: config.auth.require_claimed_identity,
    });

    let app = build_router(state);

    let addr: SocketAddr = config.api.bind.parse().context("parsing api.bind")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "pbs-api listening");
    axum::serve(listener, app.into_make_service()).await?;

    logging::shutdown_tracer_provider();
    Ok(())
}
