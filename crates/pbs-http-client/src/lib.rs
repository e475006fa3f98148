pub mod backoff;
pub mod client;
pub mod model;

pub use client::SyncHttpClient;
pub use model::{ClientOutcome, HttpRequest, HttpResponse};

#[cfg(test)]
mod tests {
    use super::*;
    use pbs_common::config::HttpClientConfig;

    fn test_config() -> HttpClientConfig {
        HttpClientConfig {
            max_retries: 2,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
            max_connections_per_host: 4,
            deadline_ms: 2_000,
        }
    }

    #[test]
    fn invalid_uri_is_returned_immediately() {
        let client = SyncHttpClient::new(test_config()).unwrap();
        let request = HttpRequest::new(http::Method::GET, "not a url");
        let outcome = client.perform_request(request);
        assert!(matches!(outcome, ClientOutcome::InvalidUri));
    }
}
