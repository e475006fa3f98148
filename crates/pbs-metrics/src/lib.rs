//! Fixed counter/histogram registry for the request path, with bounded label
//! cardinality. Names and bucket boundaries are part of the external contract
//! (dashboards and tests depend on them) and must not be changed casually.

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec,
};

/// The six legacy transaction phases plus the status-check route, per §4.7/§4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Begin,
    Prepare,
    Commit,
    Abort,
    Notify,
    End,
    GetStatus,
}

impl TransactionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionPhase::Begin => "BEGIN",
            TransactionPhase::Prepare => "PREPARE",
            TransactionPhase::Commit => "COMMIT",
            TransactionPhase::Abort => "ABORT",
            TransactionPhase::Notify => "NOTIFY",
            TransactionPhase::End => "END",
            TransactionPhase::GetStatus => "GET_STATUS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportingOriginClass {
    Operator,
    Coordinator,
}

impl ReportingOriginClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportingOriginClass::Operator => "OPERATOR",
            ReportingOriginClass::Coordinator => "COORDINATOR",
        }
    }
}

/// Labels shared by `requests`/`client_errors`/`server_errors`.
pub struct RequestLabels<'a> {
    pub transaction_phase: TransactionPhase,
    pub reporting_origin_class: ReportingOriginClass,
    pub claimed_identity: &'a str,
    pub user_agent: &'a str,
}

static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "requests",
        "Total inbound requests observed by the front end",
        &[
            "transaction_phase",
            "reporting_origin_class",
            "claimed_identity",
            "user_agent"
        ]
    )
    .expect("requests counter registration")
});

static CLIENT_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "client_errors",
        "Requests that resulted in a 4xx response",
        &[
            "transaction_phase",
            "reporting_origin_class",
            "claimed_identity",
            "user_agent"
        ]
    )
    .expect("client_errors counter registration")
});

static SERVER_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "server_errors",
        "Requests that resulted in a 5xx response",
        &[
            "transaction_phase",
            "reporting_origin_class",
            "claimed_identity",
            "user_agent"
        ]
    )
    .expect("server_errors counter registration")
});

fn keys_and_budget_consumed_buckets() -> Vec<f64> {
    // 26-entry geometric series starting at 1.0, ratio ~1.5, capped ~25251.2.
    exponential_buckets(1.0, 1.5, 26).expect("keys/budget-consumed bucket series")
}

fn budget_exhausted_buckets() -> Vec<f64> {
    // Powers of two, 1 through 2048 (12 buckets).
    exponential_buckets(1.0, 2.0, 12).expect("budget-exhausted bucket series")
}

static KEYS_PER_TRANSACTION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "keys_per_transaction",
        "Number of keys carried by a single consume-budget transaction",
        &["transaction_phase"],
        keys_and_budget_consumed_buckets()
    )
    .expect("keys_per_transaction histogram registration")
});

static SUCCESSFUL_BUDGET_CONSUMED: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "successful_budget_consumed",
        "Number of (key, hour) budget entries successfully consumed",
        &["transaction_phase"],
        keys_and_budget_consumed_buckets()
    )
    .expect("successful_budget_consumed histogram registration")
});

static BUDGET_EXHAUSTED: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "budget_exhausted",
        "Number of exhausted budget indices returned in a 409 response",
        &["transaction_phase"],
        budget_exhausted_buckets()
    )
    .expect("budget_exhausted histogram registration")
});

pub fn record_request(labels: RequestLabels<'_>) {
    REQUESTS_TOTAL
        .with_label_values(&[
            labels.transaction_phase.as_str(),
            labels.reporting_origin_class.as_str(),
            labels.claimed_identity,
            labels.user_agent,
        ])
        .inc();
}

pub fn record_client_error(labels: RequestLabels<'_>) {
    CLIENT_ERRORS_TOTAL
        .with_label_values(&[
            labels.transaction_phase.as_str(),
            labels.reporting_origin_class.as_str(),
            labels.claimed_identity,
            labels.user_agent,
        ])
        .inc();
}

pub fn record_server_error(labels: RequestLabels<'_>) {
    SERVER_ERRORS_TOTAL
        .with_label_values(&[
            labels.transaction_phase.as_str(),
            labels.reporting_origin_class.as_str(),
            labels.claimed_identity,
            labels.user_agent,
        ])
        .inc();
}

pub fn observe_keys_per_transaction(phase: TransactionPhase, count: usize) {
    KEYS_PER_TRANSACTION
        .with_label_values(&[phase.as_str()])
        .observe(count as f64);
}

pub fn observe_successful_budget_consumed(phase: TransactionPhase, count: usize) {
    SUCCESSFUL_BUDGET_CONSUMED
        .with_label_values(&[phase.as_str()])
        .observe(count as f64);
}

pub fn observe_budget_exhausted(phase: TransactionPhase, count: usize) {
    BUDGET_EXHAUSTED
        .with_label_values(&[phase.as_str()])
        .observe(count as f64);
}

/// Gather all registered families in Prometheus text exposition format,
/// for the `/metrics` route.
pub fn gather_text() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let metric_families = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_per_transaction_buckets_are_26_long_and_capped() {
        let buckets = keys_and_budget_consumed_buckets();
        assert_eq!(buckets.len(), 26);
        assert!((buckets[25] - 25251.168).abs() < 1.0);
    }

    #[test]
    fn budget_exhausted_buckets_are_powers_of_two() {
        let buckets = budget_exhausted_buckets();
        assert_eq!(buckets.len(), 12);
        assert_eq!(buckets[0], 1.0);
        assert_eq!(buckets[11], 2048.0);
    }

    #[test]
    fn recording_does_not_panic() {
        record_request(RequestLabels {
            transaction_phase: TransactionPhase::Prepare,
            reporting_origin_class: ReportingOriginClass::Operator,
            claimed_identity: "https://a.test",
            user_agent: "test-agent",
        });
        observe_keys_per_transaction(TransactionPhase::Prepare, 3);
        let text = gather_text().unwrap();
        assert!(text.contains("requests"));
    }
}
