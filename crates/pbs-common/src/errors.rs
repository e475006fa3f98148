use std::fmt::Debug;

pub type Result<T, E = PbsError> = std::result::Result<T, E>;

/// The request-path error taxonomy from the error handling design.
///
/// Every variant carries its own fixed HTTP status via [`PbsError::status_code`];
/// `BudgetExhausted` additionally carries the sorted exhausted-index list needed
/// by the response encoder.
#[derive(thiserror::Error, Debug)]
pub enum PbsError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("no keys available in request")]
    NoKeysAvailable,

    #[error("reporting origin does not belong to the authorized site")]
    ReportingOriginNotBelongToSite,

    #[error("bad auth token: {0}")]
    BadToken(String),

    #[error("Not enough budget.")]
    BudgetExhausted { exhausted_indices: Vec<u32> },

    #[error("stored row is not well-formed: {0}")]
    ParsingError(String),

    #[error("store rejected commit: {0}")]
    FailToCommit(String),

    #[error("store is not initialized: {0}")]
    InitializationError(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PbsError {
    /// HTTP status the front end maps this error to, per the error handling design table.
    pub fn status_code(&self) -> u16 {
        match self {
            PbsError::InvalidRequest(_) => 400,
            PbsError::InvalidRequestBody(_) => 400,
            PbsError::NoKeysAvailable => 400,
            PbsError::ReportingOriginNotBelongToSite => 400,
            PbsError::BadToken(_) => 401,
            PbsError::BudgetExhausted { .. } => 409,
            PbsError::ParsingError(_) => 500,
            PbsError::FailToCommit(_) => 500,
            PbsError::InitializationError(_) => 500,
            PbsError::Config(_) => 500,
            PbsError::Other(_) => 500,
        }
    }

    /// Whether this is the terminal, expected-on-the-happy-path exhaustion case,
    /// which is logged at warning rather than error.
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, PbsError::BudgetExhausted { .. })
    }
}
