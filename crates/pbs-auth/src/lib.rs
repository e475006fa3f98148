use base64::Engine;
use pbs_common::errors::PbsError;
use pbs_http_client::model::{HttpRequest, HttpResponse};

const CLAIMED_IDENTITY_HEADER: &str = "x-gscp-claimed-identity";
const ACCESS_KEY_HEADER: &str = "x-gscp-auth-access-key";
const AMZ_DATE_HEADER: &str = "x-gscp-auth-amz-date";
const SIGNATURE_HEADER: &str = "x-gscp-auth-signature";
const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
const ACCESS_KEY_FIELD: &str = "access_key";
const SIGNATURE_FIELD: &str = "signature";
const AMZ_DATE_FIELD: &str = "amz_date";
const SECURITY_TOKEN_FIELD: &str = "security_token";
const AUTHORIZED_DOMAIN_FIELD: &str = "authorized_domain";

/// Inbound token carried by the caller, and the identity it claims to be
/// acting as. See §4.9.
#[derive(Debug, Clone)]
pub struct AuthorizationMetadata {
    pub authorization_token: String,
    pub claimed_identity: String,
}

/// What the peer PBS hands back after a successful signed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedMetadata {
    pub authorized_domain: String,
}

/// Adapts an inbound auth token into an outbound signed, identity-bearing
/// request to a peer coordinator PBS, and parses its response. The token is
/// base64-JSON carrying the pieces an AWS SigV4 signer needs
/// (`access_key`/`signature`/`amz_date`, optional `security_token`); actually
/// computing a SigV4 signature is cloud-specific machinery out of scope here
/// (§1), so `prepare_request` attaches the decoded components as headers for
/// a downstream signer to consume instead of performing the signing itself.
#[derive(Debug, Clone)]
pub struct AuthInterceptor;

impl Default for AuthInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// The fields decoded out of an `x-auth-token` value, ahead of either
/// being attached to an outbound peer call or used as an inbound gate.
struct DecodedToken {
    access_key: String,
    signature: String,
    amz_date: String,
    security_token: String,
}

impl AuthInterceptor {
    pub fn new() -> Self {
        Self
    }

    fn decode(metadata: &AuthorizationMetadata) -> Result<DecodedToken, PbsError> {
        if metadata.authorization_token.is_empty() || metadata.claimed_identity.is_empty() {
            return Err(PbsError::BadToken("missing token or claimed identity".to_string()));
        }

        let padded = pad_base64(&metadata.authorization_token);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(padded)
            .map_err(|err| PbsError::BadToken(format!("invalid base64 token: {err}")))?;
        let token: serde_json::Value = serde_json::from_slice(&decoded)
            .map_err(|err| PbsError::BadToken(format!("invalid token JSON: {err}")))?;

        Ok(DecodedToken {
            access_key: required_field(&token, ACCESS_KEY_FIELD)?,
            signature: required_field(&token, SIGNATURE_FIELD)?,
            amz_date: required_field(&token, AMZ_DATE_FIELD)?,
            security_token: token
                .get(SECURITY_TOKEN_FIELD)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// FrontEnd's inbound gate (§2: "AuthInterceptor → FrontEnd"): confirms
    /// the caller's `x-auth-token` is well-formed before routing proceeds.
    /// Does not perform any network I/O itself.
    pub fn validate_inbound(&self, metadata: &AuthorizationMetadata) -> Result<(), PbsError> {
        Self::decode(metadata)?;
        Ok(())
    }

    pub fn prepare_request(
        &self,
        metadata: &AuthorizationMetadata,
        request: HttpRequest,
    ) -> Result<HttpRequest, PbsError> {
        let DecodedToken {
            access_key,
            signature,
            amz_date,
            security_token,
        } = Self::decode(metadata)?;

        let mut request = request
            .with_header(CLAIMED_IDENTITY_HEADER, metadata.claimed_identity.clone())
            .with_header(ACCESS_KEY_HEADER, access_key)
            .with_header(AMZ_DATE_HEADER, amz_date)
            .with_header(SIGNATURE_HEADER, signature);
        if !security_token.is_empty() {
            request = request.with_header(SECURITY_TOKEN_HEADER, security_token);
        }
        Ok(request)
    }

    pub fn obtain_authorized_metadata_from_response(
        &self,
        response: &HttpResponse,
    ) -> Result<AuthorizedMetadata, PbsError> {
        let body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|err| PbsError::BadToken(format!("malformed response body: {err}")))?;
        let authorized_domain = required_field(&body, AUTHORIZED_DOMAIN_FIELD)?;
        Ok(AuthorizedMetadata { authorized_domain })
    }
}

fn required_field(value: &serde_json::Value, field: &str) -> Result<String, PbsError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| PbsError::BadToken(format!("missing field: {field}")))
}

fn pad_base64(token: &str) -> String {
    let remainder = token.len() % 4;
    if remainder == 0 {
        token.to_string()
    } else {
        let mut padded = token.to_string();
        padded.extend(std::iter::repeat('=').take(4 - remainder));
        padded
    }
}
