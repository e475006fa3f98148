use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub http_client: HttpClientConfig,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// Which of the two on-disk budget-vector columns is authoritative, and
/// which columns get written. See spec §3's migration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MigrationPhase {
    #[serde(rename = "phase_1")]
    Phase1,
    #[serde(rename = "phase_2")]
    Phase2,
    #[serde(rename = "phase_3")]
    Phase3,
    #[serde(rename = "phase_4")]
    Phase4,
}

impl MigrationPhase {
    /// (read_truth_from_proto, write_json, write_proto)
    pub fn column_flags(self) -> (bool, bool, bool) {
        match self {
            MigrationPhase::Phase1 => (false, true, false),
            MigrationPhase::Phase2 => (false, true, true),
            MigrationPhase::Phase3 => (true, true, true),
            MigrationPhase::Phase4 => (true, false, true),
        }
    }

    pub fn reads_proto_truth(self) -> bool {
        self.column_flags().0
    }

    pub fn writes_json(self) -> bool {
        self.column_flags().1
    }

    pub fn writes_proto(self) -> bool {
        self.column_flags().2
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default)]
    pub test_admin_url: Option<String>,
    pub table_name: String,
    #[serde(default = "StoreConfig::default_migration_phase")]
    pub migration_phase: MigrationPhase,
    #[serde(default = "StoreConfig::default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "StoreConfig::default_commit_retries")]
    pub commit_retries: u32,
    /// Caps how many `BudgetStore::run_transaction` calls may be in flight at
    /// once, independent of `max_connections`, so a spike in inbound requests
    /// degrades to queuing rather than exhausting the pool. See §5.
    #[serde(default = "StoreConfig::default_max_concurrent_transactions")]
    pub max_concurrent_transactions: usize,
}

impl StoreConfig {
    const fn default_migration_phase() -> MigrationPhase {
        MigrationPhase::Phase1
    }

    const fn default_max_connections() -> u32 {
        10
    }

    const fn default_commit_retries() -> u32 {
        3
    }

    const fn default_max_concurrent_transactions() -> usize {
        32
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "HttpClientConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "HttpClientConfig::default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "HttpClientConfig::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "HttpClientConfig::default_max_connections_per_host")]
    pub max_connections_per_host: usize,
    #[serde(default = "HttpClientConfig::default_deadline_ms")]
    pub deadline_ms: u64,
}

impl HttpClientConfig {
    const fn default_max_retries() -> u32 {
        5
    }

    const fn default_base_backoff_ms() -> u64 {
        100
    }

    const fn default_max_backoff_ms() -> u64 {
        10_000
    }

    const fn default_max_connections_per_host() -> usize {
        16
    }

    const fn default_deadline_ms() -> u64 {
        5_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
    /// Which of the two independently-operated PBS deployments this instance
    /// is; tags every request-path metric (§4.8). One of `"OPERATOR"` or
    /// `"COORDINATOR"`.
    #[serde(default = "ApiConfig::default_reporting_origin_class")]
    pub reporting_origin_class: String,
}

impl ApiConfig {
    fn default_reporting_origin_class() -> String {
        "OPERATOR".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub require_claimed_identity: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "ObservabilityConfig::default_metrics_path")]
    pub metrics_path: String,
}

impl ObservabilityConfig {
    fn default_metrics_path() -> String {
        "/metrics".to_string()
    }
}
