use std::collections::HashSet;

use pbs_common::errors::PbsError;
use pbs_site::{Site, SiteResolver};

use crate::wire::{BudgetType, KeyBodyV2, TransactionRequestV2};

/// Implements the RequestParser contract (ParseCommonV2): validates version,
/// per-entry origin/site, duplicate-origin detection, and budget_type
/// defaulting/consistency, then hands each key to `key_body_processor` in
/// order with its running flat index. See §4.3.
pub fn parse_common_v2<F>(
    authorized_domain: &Site,
    request: &TransactionRequestV2,
    site_resolver: &SiteResolver,
    mut key_body_processor: F,
) -> Result<(), PbsError>
where
    F: FnMut(&KeyBodyV2, usize, &str, BudgetType) -> Result<(), PbsError>,
{
    if request.v != "2.0" {
        return Err(PbsError::InvalidRequestBody(format!(
            "unsupported version: {}",
            request.v
        )));
    }
    if request.data.is_empty() {
        return Err(PbsError::InvalidRequestBody("missing data".to_string()));
    }

    let mut seen_origins: HashSet<&str> = HashSet::new();
    let mut common_budget_type: Option<BudgetType> = None;
    let mut key_index = 0usize;

    for entry in &request.data {
        if entry.reporting_origin.is_empty() {
            return Err(PbsError::InvalidRequestBody(
                "reporting_origin must not be empty".to_string(),
            ));
        }

        let site = site_resolver
            .resolve(&pbs_site::ReportingOrigin::new(entry.reporting_origin.clone()))
            .map_err(|_| PbsError::InvalidRequestBody("invalid reporting_origin".to_string()))?;
        if &site != authorized_domain {
            return Err(PbsError::ReportingOriginNotBelongToSite);
        }

        if !seen_origins.insert(entry.reporting_origin.as_str()) {
            return Err(PbsError::InvalidRequest(
                "duplicate reporting_origin in request".to_string(),
            ));
        }

        for key in &entry.keys {
            let budget_type_raw = key
                .budget_type
                .clone()
                .unwrap_or_else(|| BudgetType::DEFAULT_WIRE_NAME.to_string());
            if budget_type_raw.is_empty() {
                return Err(PbsError::InvalidRequestBody(
                    "budget_type must not be empty when present".to_string(),
                ));
            }
            let budget_type = BudgetType::parse(&budget_type_raw).ok_or_else(|| {
                PbsError::InvalidRequestBody(format!("unknown budget_type: {budget_type_raw}"))
            })?;

            match common_budget_type {
                None => common_budget_type = Some(budget_type),
                Some(existing) if existing != budget_type => {
                    return Err(PbsError::InvalidRequest(
                        "all keys in one request must share the same budget_type".to_string(),
                    ));
                }
                _ => {}
            }

            key_body_processor(key, key_index, &entry.reporting_origin, budget_type)?;
            key_index += 1;
        }
    }

    if key_index == 0 {
        return Err(PbsError::NoKeysAvailable);
    }

    Ok(())
}
