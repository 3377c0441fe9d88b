//! Startup configuration for conditional caching.

use serde::Deserialize;
use thiserror::Error;

use super::epoch::{EpochError, ServerEpoch};
use super::validator::Validator;
use crate::middleware::conditional::Http304;

/// Errors produced while loading or applying an [`Http304Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid http304 configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot establish server epoch: {0}")]
    Epoch(#[from] EpochError),
}

/// Settings for the validator engine and the caching middleware.
///
/// Every field has a default, so an empty JSON object is a valid config.
///
/// | Field                 | Default                                  |
/// |-----------------------|------------------------------------------|
/// | `last_modified`       | modification time of the running binary  |
/// | `bind_client_address` | `false`                                  |
///
/// # Examples
///
/// ```
/// use http304::cache::Http304Config;
///
/// let config = Http304Config::from_json(
///     r#"{ "last_modified": "Wed, 01 Jan 2025 00:00:00 GMT", "bind_client_address": true }"#,
/// ).unwrap();
///
/// assert!(config.bind_client_address);
/// assert_eq!(config.epoch().unwrap().as_str(), "Wed, 01 Jan 2025 00:00:00 GMT");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Http304Config {
    /// Explicit deployment time as an HTTP date.
    pub last_modified: Option<String>,

    /// Whether middleware built from this config binds tokens to the
    /// client's IP address.
    pub bind_client_address: bool,
}

impl Http304Config {
    /// Parses a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] on malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolves the server epoch: the configured date if present, otherwise
    /// the executable's modification time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Epoch`] when the date does not parse or the
    /// executable cannot be inspected.
    pub fn epoch(&self) -> Result<ServerEpoch, ConfigError> {
        let epoch = match self.last_modified.as_deref() {
            Some(value) => ServerEpoch::parse(value)?,
            None => ServerEpoch::from_current_exe()?,
        };
        Ok(epoch)
    }

    /// Builds the shared orchestrator. Call once at startup.
    ///
    /// # Errors
    ///
    /// See [`epoch`](Self::epoch).
    pub fn build(&self) -> Result<Http304, ConfigError> {
        let epoch = self.epoch()?;
        tracing::info!(epoch = %epoch, "http304 validators bound to server epoch");
        Ok(Http304::new(Validator::new(epoch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = Http304Config::from_json("{}").unwrap();
        assert_eq!(config, Http304Config::default());
        assert!(!config.bind_client_address);
        assert!(config.last_modified.is_none());
    }

    #[test]
    fn defaults_to_executable_mtime() {
        let epoch = Http304Config::default().epoch().unwrap();
        assert_eq!(epoch, ServerEpoch::from_current_exe().unwrap());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Http304Config::from_json(r#"{ "lastModified": "x" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn bad_epoch_fails_at_build() {
        let config = Http304Config {
            last_modified: Some("not a date".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.build(),
            Err(ConfigError::Epoch(EpochError::InvalidDate { .. }))
        ));
    }

    #[test]
    fn build_uses_configured_epoch() {
        let config = Http304Config {
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".into()),
            ..Default::default()
        };
        let http304 = config.build().unwrap();
        assert_eq!(http304.epoch().as_str(), "Wed, 01 Jan 2025 00:00:00 GMT");
    }
}
