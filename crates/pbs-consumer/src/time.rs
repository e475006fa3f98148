use chrono::DateTime;
use pbs_common::errors::PbsError;

pub const HOURS_PER_DAY: u32 = 24;
const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_HOUR: i64 = 3_600;

/// A reporting timestamp resolved to (Day, Hour), per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingTime {
    pub day: i64,
    pub hour: u32,
}

/// Parses an RFC-3339 `reporting_time` into (days since epoch, hour of day).
/// Negative epoch seconds are rejected, matching the source's timestamp
/// validation.
pub fn reporting_time_to_bucket(reporting_time: &str) -> Result<ReportingTime, PbsError> {
    let parsed = DateTime::parse_from_rfc3339(reporting_time).map_err(|_| {
        PbsError::InvalidRequest(format!("invalid reporting_time: {reporting_time}"))
    })?;
    let seconds = parsed.timestamp();
    if seconds < 0 {
        return Err(PbsError::InvalidRequest(format!(
            "invalid reporting_time: {reporting_time}"
        )));
    }

    let day = seconds.div_euclid(SECONDS_PER_DAY);
    let hour = (seconds.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR) as u32;
    Ok(ReportingTime { day, hour })
}
