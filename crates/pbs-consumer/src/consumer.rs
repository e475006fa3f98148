use std::collections::{HashMap, HashSet};

use pbs_common::config::MigrationPhase;
use pbs_common::errors::PbsError;
use pbs_request::{parse_common_v2, KeyBodyV1, TransactionRequest, TransactionRequestV1,
    TransactionRequestV2};
use pbs_site::{Site, SiteResolver};
use pbs_store::model::{BudgetRow, Mutation, PrimaryKey, ReadColumns};
use tracing::{info, warn};

use crate::json_codec;
use crate::proto_codec;
use crate::state::{ConsumptionState, EMPTY, FULL};
use crate::time::reporting_time_to_bucket;

/// Binary-budget consumer: normalizes a request into per-(BudgetKey, Day)
/// consumption state, then folds the store's rows into it to detect
/// exhaustion and produce mutations. See §4.4.
#[derive(Debug, Default, Clone)]
pub struct BudgetConsumer {
    metadata: HashMap<PrimaryKey, ConsumptionState>,
    key_count: usize,
}

impl BudgetConsumer {
    /// Parses either wire version into consumer state.
    ///
    /// `transaction_origin` is only consulted for v1 requests, which carry no
    /// per-key reporting origin of their own (`x-gscp-transaction-origin`
    /// overrides it; absent, the authorized domain is used). v2 requests
    /// carry `reporting_origin` per `data` entry instead.
    pub fn parse_transaction_request(
        transaction_origin: &str,
        authorized_domain: &Site,
        request: &TransactionRequest,
        site_resolver: &SiteResolver,
    ) -> Result<Self, PbsError> {
        match request {
            TransactionRequest::V1(request) => Self::parse_v1(transaction_origin, request),
            TransactionRequest::V2(request) => {
                Self::parse_v2(authorized_domain, request, site_resolver)
            }
        }
    }

    fn parse_v1(transaction_origin: &str, request: &TransactionRequestV1) -> Result<Self, PbsError> {
        if request.t.is_empty() {
            return Err(PbsError::InvalidRequestBody("missing data: \"t\"".to_string()));
        }

        let mut consumer = Self::default();
        let mut visited: HashSet<(PrimaryKey, u32)> = HashSet::new();

        for (index, key) in request.t.iter().enumerate() {
            consumer.ingest_key(transaction_origin, &KeyLike::from(key), index, &mut visited)?;
        }

        if consumer.key_count == 0 {
            return Err(PbsError::NoKeysAvailable);
        }
        Ok(consumer)
    }

    fn parse_v2(
        authorized_domain: &Site,
        request: &TransactionRequestV2,
        site_resolver: &SiteResolver,
    ) -> Result<Self, PbsError> {
        let mut consumer = Self::default();
        let mut visited: HashSet<(PrimaryKey, u32)> = HashSet::new();

        parse_common_v2(authorized_domain, request, site_resolver, |key, index, origin, _budget_type| {
            consumer.ingest_key(origin, &KeyLike::from(key), index, &mut visited)
        })?;

        if consumer.key_count == 0 {
            return Err(PbsError::NoKeysAvailable);
        }
        Ok(consumer)
    }

    fn ingest_key(
        &mut self,
        reporting_origin: &str,
        key: &KeyLike<'_>,
        index: usize,
        visited: &mut HashSet<(PrimaryKey, u32)>,
    ) -> Result<(), PbsError> {
        let token = key.token_value()?;
        if token != FULL {
            return Err(PbsError::InvalidRequestBody(format!(
                "expected token equal to {FULL}, found {token}"
            )));
        }

        let budget_key = format!("{reporting_origin}/{}", key.key);
        let bucket = reporting_time_to_bucket(key.reporting_time)?;
        let primary_key = PrimaryKey::new(budget_key, bucket.day);

        if !visited.insert((primary_key.clone(), bucket.hour)) {
            return Err(PbsError::InvalidRequest(format!(
                "repeated key found: {} day {} hour {}",
                primary_key.budget_key, primary_key.timeframe, bucket.hour
            )));
        }

        self.metadata
            .entry(primary_key)
            .or_default()
            .hour_to_key_index
            .insert(bucket.hour, index);
        self.key_count += 1;
        Ok(())
    }

    pub fn key_count(&self) -> usize {
        self.key_count
    }

    pub fn primary_keys(&self) -> Vec<PrimaryKey> {
        self.metadata.keys().cloned().collect()
    }

    pub fn read_columns(phase: MigrationPhase) -> ReadColumns {
        if phase.reads_proto_truth() {
            ReadColumns::Proto
        } else {
            ReadColumns::Json
        }
    }

    /// Folds the store's rows into consumption state, detects exhaustion,
    /// and returns the mutations to commit. A non-empty result of exhausted
    /// indices short-circuits as `Err(PbsError::BudgetExhausted)`; any
    /// malformed row aborts immediately with `Err(PbsError::ParsingError)`.
    pub fn consume_budget(
        mut self,
        rows: Vec<BudgetRow>,
        columns: ReadColumns,
        phase: MigrationPhase,
    ) -> Result<Vec<Mutation>, PbsError> {
        let mut exhausted_indices: Vec<u32> = Vec::new();

        for row in rows {
            let primary_key = PrimaryKey {
                budget_key: row.budget_key.clone(),
                timeframe: row.timeframe.clone(),
            };
            let Some(state) = self.metadata.get_mut(&primary_key) else {
                info!(budget_key = %primary_key.budget_key, timeframe = %primary_key.timeframe,
                    "found key from database read which was not requested; ignoring");
                continue;
            };
            state.is_key_already_present_in_database = true;

            let budgets = match columns {
                ReadColumns::Json => {
                    let value = row.value_json.ok_or_else(|| {
                        PbsError::ParsingError("row is missing value_json".to_string())
                    })?;
                    json_codec::deserialize_budget_vector(&value)?
                }
                ReadColumns::Proto => {
                    let value = row.value_proto.ok_or_else(|| {
                        PbsError::ParsingError("row is missing value_proto".to_string())
                    })?;
                    proto_codec::deserialize_budget_vector(&value)?
                }
            };
            state.budget_state = budgets;

            for (&hour, &key_index) in &state.hour_to_key_index {
                if state.budget_state[hour as usize] == EMPTY {
                    exhausted_indices.push(key_index as u32);
                }
                state.budget_state[hour as usize] = EMPTY;
            }
        }

        for state in self.metadata.values_mut() {
            if state.is_key_already_present_in_database {
                continue;
            }
            state.budget_state = [FULL; 24];
            for &hour in state.hour_to_key_index.keys() {
                state.budget_state[hour as usize] = EMPTY;
            }
        }

        if !exhausted_indices.is_empty() {
            exhausted_indices.sort_unstable();
            warn!(count = exhausted_indices.len(), "budget exhausted");
            return Err(PbsError::BudgetExhausted {
                exhausted_indices,
            });
        }

        Ok(self.generate_mutations(phase))
    }

    fn generate_mutations(&self, phase: MigrationPhase) -> Vec<Mutation> {
        self.metadata
            .iter()
            .map(|(primary_key, state)| Mutation {
                budget_key: primary_key.budget_key.clone(),
                timeframe: primary_key.timeframe.clone(),
                value_json: phase
                    .writes_json()
                    .then(|| json_codec::serialize_budget_vector(&state.budget_state)),
                value_proto: phase
                    .writes_proto()
                    .then(|| proto_codec::serialize_budget_vector(&state.budget_state)),
            })
            .collect()
    }
}

/// Either wire shape's per-key body, narrowed to what `ingest_key` needs.
struct KeyLike<'a> {
    key: &'a str,
    reporting_time: &'a str,
    token: Option<i32>,
    tokens: Option<&'a [pbs_request::TokenWrapper]>,
}

impl KeyLike<'_> {
    fn token_value(&self) -> Result<i32, PbsError> {
        match (self.token, &self.tokens) {
            (None, None) => Err(PbsError::InvalidRequestBody(
                "JSON key absent: \"token\" or \"tokens\"".to_string(),
            )),
            (Some(_), Some(_)) => Err(PbsError::InvalidRequestBody(
                "both \"token\" and \"tokens\" present".to_string(),
            )),
            (Some(token), None) => Ok(token),
            (None, Some(tokens)) => {
                if tokens.len() != 1 {
                    return Err(PbsError::InvalidRequestBody(
                        "\"tokens\" is not of size 1".to_string(),
                    ));
                }
                Ok(tokens[0].token_int32)
            }
        }
    }
}

impl<'a> From<&'a KeyBodyV1> for KeyLike<'a> {
    fn from(key: &'a KeyBodyV1) -> Self {
        KeyLike {
            key: &key.key,
            reporting_time: &key.reporting_time,
            token: Some(key.token),
            tokens: None,
        }
    }
}

impl<'a> From<&'a pbs_request::KeyBodyV2> for KeyLike<'a> {
    fn from(key: &'a pbs_request::KeyBodyV2) -> Self {
        KeyLike {
            key: &key.key,
            reporting_time: &key.reporting_time,
            token: key.token,
            tokens: key.tokens.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbs_site::resolve;

    fn v2_request(origin: &str, key: &str, reporting_time: &str) -> TransactionRequest {
        let json = serde_json::json!({
            "v": "2.0",
            "data": [{
                "reporting_origin": origin,
                "keys": [{"key": key, "token": 1, "reporting_time": reporting_time}]
            }]
        });
        TransactionRequest::parse(&serde_json::to_vec(&json).unwrap()).unwrap()
    }

    fn empty_row(primary_key: &PrimaryKey) -> BudgetRow {
        BudgetRow {
            budget_key: primary_key.budget_key.clone(),
            timeframe: primary_key.timeframe.clone(),
            value_json: Some(json_codec::serialize_budget_vector(&[FULL; 24])),
            value_proto: None,
        }
    }

    #[test]
    fn s1_single_new_key_succeeds() {
        let site = resolve("https://a.test").unwrap();
        let resolver = SiteResolver::default();
        let request = v2_request("https://a.test", "k", "2019-12-11T07:20:50Z");

        let consumer =
            BudgetConsumer::parse_transaction_request("https://a.test", &site, &request, &resolver)
                .unwrap();
        assert_eq!(consumer.key_count(), 1);

        let mutations = consumer
            .consume_budget(Vec::new(), ReadColumns::Json, MigrationPhase::Phase1)
            .unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].budget_key, "https://a.test/k");
        assert_eq!(mutations[0].timeframe, "18241");
        let vector = json_codec::deserialize_budget_vector(mutations[0].value_json.as_ref().unwrap())
            .unwrap();
        assert_eq!(vector[7], EMPTY);
        for hour in 0..24u32 {
            if hour != 7 {
                assert_eq!(vector[hour as usize], FULL);
            }
        }
    }

    #[test]
    fn s2_repeat_against_populated_store_is_exhausted() {
        let site = resolve("https://a.test").unwrap();
        let resolver = SiteResolver::default();
        let request = v2_request("https://a.test", "k", "2019-12-11T07:20:50Z");
        let consumer =
            BudgetConsumer::parse_transaction_request("https://a.test", &site, &request, &resolver)
                .unwrap();
        let primary_key = consumer.primary_keys().remove(0);

        let mut vector = [FULL; 24];
        vector[7] = EMPTY;
        let row = BudgetRow {
            budget_key: primary_key.budget_key.clone(),
            timeframe: primary_key.timeframe.clone(),
            value_json: Some(json_codec::serialize_budget_vector(&vector)),
            value_proto: None,
        };

        let result = consumer.consume_budget(vec![row], ReadColumns::Json, MigrationPhase::Phase1);
        match result {
            Err(PbsError::BudgetExhausted { exhausted_indices }) => {
                assert_eq!(exhausted_indices, vec![0]);
            }
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
    }

    #[test]
    fn s4_duplicate_key_is_invalid_request() {
        let json = serde_json::json!({
            "v": "1.0",
            "t": [
                {"key": "k", "token": 1, "reporting_time": "2019-12-11T07:20:50Z"},
                {"key": "k", "token": 1, "reporting_time": "2019-12-11T07:20:50Z"}
            ]
        });
        let request = TransactionRequest::parse(&serde_json::to_vec(&json).unwrap()).unwrap();
        let site = resolve("https://a.test").unwrap();
        let resolver = SiteResolver::default();
        let result =
            BudgetConsumer::parse_transaction_request("https://a.test", &site, &request, &resolver);
        assert!(matches!(result, Err(PbsError::InvalidRequest(_))));
    }

    #[test]
    fn s6_corrupted_stored_row_is_parsing_error() {
        let site = resolve("https://a.test").unwrap();
        let resolver = SiteResolver::default();
        let request = v2_request("https://a.test", "k", "2019-12-11T07:20:50Z");
        let consumer =
            BudgetConsumer::parse_transaction_request("https://a.test", &site, &request, &resolver)
                .unwrap();
        let primary_key = consumer.primary_keys().remove(0);

        let row = BudgetRow {
            budget_key: primary_key.budget_key.clone(),
            timeframe: primary_key.timeframe.clone(),
            value_json: Some(serde_json::json!({"TokenCount": "1 1 1"})),
            value_proto: None,
        };

        let result = consumer.consume_budget(vec![row], ReadColumns::Json, MigrationPhase::Phase1);
        assert!(matches!(result, Err(PbsError::ParsingError(_))));
    }

    #[test]
    fn unrequested_row_is_ignored_and_does_not_error() {
        let site = resolve("https://a.test").unwrap();
        let resolver = SiteResolver::default();
        let request = v2_request("https://a.test", "k", "2019-12-11T07:20:50Z");
        let consumer =
            BudgetConsumer::parse_transaction_request("https://a.test", &site, &request, &resolver)
                .unwrap();

        let unrelated = empty_row(&PrimaryKey::new("https://a.test/other", 1));
        let mutations = consumer
            .consume_budget(vec![unrelated], ReadColumns::Json, MigrationPhase::Phase1)
            .unwrap();
        assert_eq!(mutations.len(), 1);
    }
}
