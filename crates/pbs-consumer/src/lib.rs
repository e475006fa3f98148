pub mod consumer;
pub mod json_codec;
pub mod proto_codec;
pub mod state;
pub mod time;

pub use consumer::BudgetConsumer;
pub use state::ConsumptionState;
pub use time::{reporting_time_to_bucket, ReportingTime};
