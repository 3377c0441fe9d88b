//! Conditional-caching core: salted entity tags tied to a server epoch.
//!
//! - [`token`]: fixed-layout wire encoding of a salt and a truncated digest.
//! - [`Validator`]: issues tokens for a [`ValidationContext`] and verifies
//!   the `If-Modified-Since` / `If-None-Match` pair a client sends back.
//! - [`ServerEpoch`]: the startup timestamp every token is tied to.
//! - [`Http304Config`]: deserializable settings for the above.
//!
//! The request/response side lives in
//! [`middleware::conditional`](crate::middleware::conditional).

pub mod config;
pub mod epoch;
pub mod token;
pub mod validator;

pub use config::{ConfigError, Http304Config};
pub use epoch::{EpochError, ServerEpoch};
pub use validator::{IssuedValidator, ValidationContext, Validator};
