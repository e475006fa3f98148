//! Inbound header names and the transaction-origin override, per §6.

pub const TRANSACTION_ID: &str = "x-gscp-transaction-id";
pub const TRANSACTION_SECRET: &str = "x-gscp-transaction-secret";
pub const CLAIMED_IDENTITY: &str = "x-gscp-claimed-identity";
pub const TRANSACTION_ORIGIN: &str = "x-gscp-transaction-origin";
pub const AUTH_TOKEN: &str = "x-auth-token";

/// A client may override the reporting origin used to build budget keys via
/// `x-gscp-transaction-origin`; absent or empty, the authorized domain itself
/// is used.
pub fn obtain_transaction_origin(header_value: Option<&str>, authorized_domain: &str) -> String {
    match header_value {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => authorized_domain.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_authorized_domain_when_absent() {
        assert_eq!(
            obtain_transaction_origin(None, "https://a.test"),
            "https://a.test"
        );
    }

    #[test]
    fn uses_header_override_when_present() {
        assert_eq!(
            obtain_transaction_origin(Some("https://b.test"), "https://a.test"),
            "https://b.test"
        );
    }
}
