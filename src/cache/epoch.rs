//! The server epoch every issued validator is tied to.
//!
//! Tokens are only honored while the `If-Modified-Since` value the client
//! echoes back is byte-for-byte the epoch string of the running process, so
//! a redeploy (new epoch) invalidates every cached copy at once.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

/// Errors raised while establishing the server epoch at startup.
#[derive(Debug, Error)]
pub enum EpochError {
    #[error("cannot locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("cannot read modification time of {path}: {source}")]
    Modified {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid HTTP date {value:?}: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: httpdate::Error,
    },
}

/// An immutable RFC 1123 timestamp, built once at startup and shared by
/// reference with every request.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
/// use http304::cache::ServerEpoch;
///
/// let epoch = ServerEpoch::from_system_time(UNIX_EPOCH + Duration::from_secs(1_735_689_600));
/// assert_eq!(epoch.as_str(), "Wed, 01 Jan 2025 00:00:00 GMT");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServerEpoch(Arc<str>);

impl ServerEpoch {
    /// Formats `time` as an HTTP date. Sub-second precision is dropped.
    pub fn from_system_time(time: SystemTime) -> Self {
        Self(httpdate::fmt_http_date(time).into())
    }

    /// Parses an explicitly configured deployment time.
    ///
    /// Any format `httpdate` accepts (RFC 1123, RFC 850, asctime) is
    /// normalized to RFC 1123, so the stored string is always what
    /// `Last-Modified` will carry.
    ///
    /// # Errors
    ///
    /// Returns [`EpochError::InvalidDate`] if `value` is not an HTTP date.
    pub fn parse(value: &str) -> Result<Self, EpochError> {
        let time = httpdate::parse_http_date(value.trim()).map_err(|source| {
            EpochError::InvalidDate {
                value: value.to_owned(),
                source,
            }
        })?;
        Ok(Self::from_system_time(time))
    }

    /// Uses the modification time of the running executable.
    ///
    /// # Errors
    ///
    /// Returns [`EpochError::CurrentExe`] or [`EpochError::Modified`] when the
    /// executable cannot be located or its metadata cannot be read.
    pub fn from_current_exe() -> Result<Self, EpochError> {
        let path = std::env::current_exe().map_err(EpochError::CurrentExe)?;
        let modified = std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|source| EpochError::Modified {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "server epoch taken from executable mtime");
        Ok(Self::from_system_time(modified))
    }

    /// Returns the epoch as it is sent in `Last-Modified`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServerEpoch").field(&&*self.0).finish()
    }
}

impl AsRef<str> for ServerEpoch {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn formats_rfc1123() {
        let epoch = ServerEpoch::from_system_time(UNIX_EPOCH + Duration::from_secs(1_735_689_600));
        assert_eq!(epoch.as_str(), "Wed, 01 Jan 2025 00:00:00 GMT");
    }

    #[test]
    fn drops_subsecond_precision() {
        let base = UNIX_EPOCH + Duration::from_secs(1_735_689_600);
        let a = ServerEpoch::from_system_time(base);
        let b = ServerEpoch::from_system_time(base + Duration::from_millis(999));
        assert_eq!(a, b);
    }

    #[test]
    fn parse_normalizes_other_http_date_formats() {
        let epoch = ServerEpoch::parse("Wednesday, 01-Jan-25 00:00:00 GMT").unwrap();
        assert_eq!(epoch.as_str(), "Wed, 01 Jan 2025 00:00:00 GMT");

        let epoch = ServerEpoch::parse("  Wed, 01 Jan 2025 00:00:00 GMT ").unwrap();
        assert_eq!(epoch.as_str(), "Wed, 01 Jan 2025 00:00:00 GMT");
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = ServerEpoch::parse("yesterday").unwrap_err();
        assert!(matches!(err, EpochError::InvalidDate { ref value, .. } if value == "yesterday"));
    }

    #[test]
    fn current_exe_epoch_is_an_http_date() {
        let epoch = ServerEpoch::from_current_exe().unwrap();
        assert!(httpdate::parse_http_date(epoch.as_str()).is_ok());
        assert!(epoch.as_str().ends_with(" GMT"));
    }
}
