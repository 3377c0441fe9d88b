//! Salted-digest entity tags: issuing and verifying them.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::epoch::ServerEpoch;
use super::token::{self, DIGEST_LEN, QUOTED_TOKEN_LEN, Salt};
use crate::Response;

/// Header carrying the epoch on issued validators.
pub const LAST_MODIFIED: &str = "Last-Modified";
/// Header carrying the salted token on issued validators.
pub const ETAG: &str = "ETag";

/// What a validator is bound to for one request.
///
/// The discriminator names the cached thing (a path, a resource id, a
/// version). The client address, when present, additionally ties the token
/// to one client.
///
/// # Examples
///
/// ```
/// use http304::cache::ValidationContext;
///
/// let page = ValidationContext::new("page-42");
/// let pinned = ValidationContext::new("page-42").with_client_address("203.0.113.7");
/// assert_eq!(page.client_address(), "");
/// assert_eq!(pinned.client_address(), "203.0.113.7");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext<'a> {
    discriminator: &'a str,
    client_address: Option<String>,
}

impl<'a> ValidationContext<'a> {
    /// Creates a context bound only to `discriminator`.
    pub fn new(discriminator: &'a str) -> Self {
        Self {
            discriminator,
            client_address: None,
        }
    }

    /// Binds the context to a client address.
    #[must_use]
    pub fn with_client_address(mut self, address: impl ToString) -> Self {
        self.client_address = Some(address.to_string());
        self
    }

    pub fn discriminator(&self) -> &'a str {
        self.discriminator
    }

    /// The bound address, or `""` when the context is not address-bound.
    pub fn client_address(&self) -> &str {
        self.client_address.as_deref().unwrap_or_default()
    }
}

/// A freshly issued pair of validator headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedValidator {
    etag: String,
    last_modified: ServerEpoch,
}

impl IssuedValidator {
    /// The quoted 50-character `ETag` value.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// The `Last-Modified` value (the server epoch).
    pub fn last_modified(&self) -> &str {
        self.last_modified.as_str()
    }

    /// The two headers in the order they are written.
    pub fn headers(&self) -> [(&'static str, &str); 2] {
        [
            (LAST_MODIFIED, self.last_modified()),
            (ETAG, self.etag()),
        ]
    }

    /// Writes both headers onto `response`, replacing earlier values.
    pub fn apply(&self, response: &mut Response) {
        for (name, value) in self.headers() {
            response.set_header(name, value);
        }
    }
}

type SaltGenerator = Box<dyn Fn() -> Salt + Send + Sync + 'static>;

/// Issues and verifies salted entity tags for one server epoch.
///
/// # Examples
///
/// ```
/// use http304::cache::{ServerEpoch, ValidationContext, Validator};
///
/// let epoch = ServerEpoch::parse("Wed, 01 Jan 2025 00:00:00 GMT").unwrap();
/// let validator = Validator::new(epoch);
///
/// let context = ValidationContext::new("page-42");
/// let issued = validator.generate(&context);
///
/// assert!(validator.verify(&context, &[issued.last_modified()], &[issued.etag()]));
/// assert!(!validator.verify(
///     &ValidationContext::new("page-43"),
///     &[issued.last_modified()],
///     &[issued.etag()],
/// ));
/// ```
pub struct Validator {
    epoch: ServerEpoch,
    salt_generator: Option<SaltGenerator>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("epoch", &self.epoch)
            .field(
                "salt_generator",
                &if self.salt_generator.is_some() {
                    "Some(salt generator fn)"
                } else {
                    "None"
                },
            )
            .finish()
    }
}

impl Validator {
    /// Creates a validator for `epoch` that draws salts with [`Salt::random`].
    pub fn new(epoch: ServerEpoch) -> Self {
        Self {
            epoch,
            salt_generator: None,
        }
    }

    /// Replaces the salt source. The generator is shared by every request,
    /// so it must be safe to call concurrently.
    #[must_use]
    pub fn with_salt_generator<F>(mut self, salt_generator: F) -> Self
    where
        F: Fn() -> Salt + Send + Sync + 'static,
    {
        self.salt_generator = Some(Box::new(salt_generator));
        self
    }

    pub fn epoch(&self) -> &ServerEpoch {
        &self.epoch
    }

    fn next_salt(&self) -> Salt {
        match self.salt_generator {
            Some(ref salt_generator) => salt_generator(),
            None => Salt::random(),
        }
    }

    /// Issues a new validator for `context` under a fresh salt.
    pub fn generate(&self, context: &ValidationContext<'_>) -> IssuedValidator {
        let salt = self.next_salt();
        let digest = digest(context.client_address(), salt.as_str(), context.discriminator());

        IssuedValidator {
            etag: token::encode(&salt, &digest),
            last_modified: self.epoch.clone(),
        }
    }

    /// Checks the client's `If-Modified-Since` and `If-None-Match` values
    /// against `context`.
    ///
    /// Each slice holds every value the request carried for that header.
    /// Anything other than exactly one well-formed value per header, issued
    /// under this epoch for this context, is `false`.
    pub fn verify(
        &self,
        context: &ValidationContext<'_>,
        if_modified_since: &[&str],
        if_none_match: &[&str],
    ) -> bool {
        let (&[modified_since], &[etag]) = (if_modified_since, if_none_match) else {
            return false;
        };

        if etag.len() != QUOTED_TOKEN_LEN || modified_since != self.epoch.as_str() {
            return false;
        }

        let Some(client_token) = token::decode(etag) else {
            return false;
        };

        let computed = digest(
            context.client_address(),
            client_token.salt(),
            context.discriminator(),
        );
        tracing::debug!(digest = %computed, "validator shape accepted, recomputed digest");

        client_token.digest_matches(&computed)
    }
}

/// Base64 SHA-256 of `address ++ salt ++ discriminator`, truncated to
/// [`DIGEST_LEN`] characters.
pub fn digest(address: &str, salt: &str, discriminator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(salt.as_bytes());
    hasher.update(discriminator.as_bytes());

    let mut encoded = STANDARD.encode(hasher.finalize());
    encoded.truncate(DIGEST_LEN);
    encoded
}
