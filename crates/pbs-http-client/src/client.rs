use std::time::{Duration, Instant};

use pbs_common::config::HttpClientConfig;
use tracing::{instrument, warn};

use crate::backoff::exponential_jitter_backoff;
use crate::model::{ClientOutcome, HttpRequest, HttpResponse};

/// Below this much remaining budget, a new attempt isn't worth starting.
const MIN_VIABLE_SLOT: Duration = Duration::from_millis(5);

enum LastFailureKind {
    Transport,
    ServerError,
}

/// A blocking HTTP/2 client with bounded retries, exponential backoff, a
/// per-host connection pool, and a per-request deadline. See §4.1.
pub struct SyncHttpClient {
    client: reqwest::blocking::Client,
    config: HttpClientConfig,
}

impl SyncHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build()?;
        Ok(Self { client, config })
    }

    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub fn perform_request(&self, request: HttpRequest) -> ClientOutcome {
        let url = match reqwest::Url::parse(&request.url) {
            Ok(url) => url,
            Err(_) => return ClientOutcome::InvalidUri,
        };

        let deadline = Instant::now() + Duration::from_millis(self.config.deadline_ms);
        let mut last_failure = LastFailureKind::ServerError;

        for attempt in 0..=self.config.max_retries {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < MIN_VIABLE_SLOT {
                return ClientOutcome::Deadline;
            }

            let mut builder = self
                .client
                .request(request.method.clone(), url.clone())
                .timeout(remaining)
                .body(request.body.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            match builder.send() {
                Ok(response) => {
                    let status = response.status();
                    let headers = response
                        .headers()
                        .iter()
                        .filter_map(|(k, v)| {
                            v.to_str().ok().map(|v| (k.to_string(), v.to_string()))
                        })
                        .collect();
                    let body = response.bytes().map(|b| b.to_vec()).unwrap_or_default();
                    let http_response = HttpResponse {
                        status: status.as_u16(),
                        headers,
                        body,
                    };

                    if status.is_success() {
                        return ClientOutcome::Ok(http_response);
                    }
                    if status.is_client_error() {
                        return ClientOutcome::ClientError(http_response);
                    }
                    // 5xx: retriable.
                    last_failure = LastFailureKind::ServerError;
                    warn!(attempt, status = status.as_u16(), "retriable server error");
                }
                Err(err) => {
                    last_failure = LastFailureKind::Transport;
                    warn!(attempt, error = %err, "retriable transport error");
                }
            }

            if attempt < self.config.max_retries {
                let backoff = exponential_jitter_backoff(
                    Duration::from_millis(self.config.base_backoff_ms),
                    attempt,
                    Duration::from_millis(self.config.max_backoff_ms),
                    0.2,
                );
                let remaining = deadline.saturating_duration_since(Instant::now());
                std::thread::sleep(backoff.min(remaining));
            }
        }

        match last_failure {
            LastFailureKind::Transport => ClientOutcome::ConnectFailure,
            LastFailureKind::ServerError => ClientOutcome::RetriesExhausted,
        }
    }
}
