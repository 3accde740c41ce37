use crate::consts::{DEFAULT_OUTDIR, DRIVE_API_BASE, DRIVE_READONLY_SCOPE};
use reqwest::Url;
use std::path::PathBuf;
use thiserror::Error;

/// Settings for a single sync pass
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct SyncConfig {
    /// ID of the Drive folder whose files are mirrored
    pub(crate) folder_id: String,

    /// Local directory into which files are downloaded
    pub(crate) outdir: PathBuf,

    /// Base URL of the Drive v3 API, always ending in a slash
    pub(crate) api_base: Url,

    /// OAuth scopes requested when refreshing the access token
    pub(crate) scopes: Vec<String>,
}

impl SyncConfig {
    pub(crate) fn new(folder_id: String, outdir: Option<PathBuf>) -> Result<SyncConfig, ConfigError> {
        Ok(SyncConfig {
            folder_id,
            outdir: outdir.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTDIR)),
            api_base: parse_base_url(DRIVE_API_BASE)?,
            scopes: vec![DRIVE_READONLY_SCOPE.to_owned()],
        })
    }

    /// Replace the Drive API base URL
    pub(crate) fn with_api_base(mut self, base: &str) -> Result<SyncConfig, ConfigError> {
        self.api_base = parse_base_url(base)?;
        Ok(self)
    }
}

/// Parse `s` as an HTTP(S) URL and normalize it to end in exactly one slash
/// so that joining relative paths appends to it rather than replacing its
/// last segment
fn parse_base_url(s: &str) -> Result<Url, ConfigError> {
    let normalized = format!("{}/", s.trim_end_matches('/'));
    let url = Url::parse(&normalized).map_err(|e| ConfigError::BadUrl {
        url: s.to_owned(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::NotHttp { url: s.to_owned() });
    }
    Ok(url)
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub(crate) enum ConfigError {
    #[error("invalid API base URL {url:?}: {reason}")]
    BadUrl { url: String, reason: String },
    #[error("API base URL {url:?} is not an HTTP(S) URL")]
    NotHttp { url: String },
}
