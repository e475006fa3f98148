//! Converts an inbound reporting origin into its authorization site: the
//! scheme-qualified eTLD+1, per §3/§4.2.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportingOrigin(String);

impl ReportingOrigin {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The scheme-qualified eTLD+1 of a [`ReportingOrigin`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Site(String);

impl Site {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("invalid reporting origin")]
    InvalidReportingOrigin,
}

/// Implements the SiteResolver contract: `Resolve(origin) -> site | InvalidReportingOrigin`.
pub struct SiteResolver;

impl SiteResolver {
    pub fn resolve(&self, origin: &ReportingOrigin) -> Result<Site, SiteError> {
        resolve(origin.as_str())
    }
}

impl Default for SiteResolver {
    fn default() -> Self {
        Self
    }
}

/// 1. strip scheme, 2. strip trailing path, 3. strip port (only the colon
/// after the first dot in the host, per the edge-case note), 4. resolve
/// the registrable domain via the Public Suffix List, 5. re-qualify with
/// `https://`.
pub fn resolve(origin: &str) -> Result<Site, SiteError> {
    if origin.is_empty() {
        return Err(SiteError::InvalidReportingOrigin);
    }

    let without_scheme = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin);

    let authority = without_scheme
        .split_once('/')
        .map(|(authority, _path)| authority)
        .unwrap_or(without_scheme);

    let host = strip_port_after_first_dot(authority);
    if host.is_empty() {
        return Err(SiteError::InvalidReportingOrigin);
    }

    let registrable = psl::domain_str(host).ok_or(SiteError::InvalidReportingOrigin)?;

    Ok(Site(format!("https://{registrable}")))
}

fn strip_port_after_first_dot(authority: &str) -> &str {
    let Some(dot_idx) = authority.find('.') else {
        return authority;
    };
    match authority[dot_idx..].find(':') {
        Some(offset) => &authority[..dot_idx + offset],
        None => authority,
    }
}
