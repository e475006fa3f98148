use std::collections::HashMap;

/// A method/url/headers/body tuple, independent of any particular HTTP
/// implementation crate, per the SyncHttpClient contract.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Outcome of `SyncHttpClient::perform_request`, per the SyncHttpClient contract:
/// `Ok`, `4xx(code, body)`, `RetriesExhausted`, `Deadline`, `InvalidUri`, `ConnectFailure`.
#[derive(Debug)]
pub enum ClientOutcome {
    Ok(HttpResponse),
    ClientError(HttpResponse),
    RetriesExhausted,
    Deadline,
    InvalidUri,
    ConnectFailure,
}

impl ClientOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ClientOutcome::Ok(_))
    }
}
