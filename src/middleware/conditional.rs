//! `304 Not Modified` for requests that present a validator this server issued.
//!
//! [`Http304`] is the per-request decision: read `If-Modified-Since` and
//! `If-None-Match`, verify them, then either turn the response into an empty
//! 304 or stamp fresh `Last-Modified` / `ETag` headers on it. It is cheap to
//! clone and meant to be built once at startup (see
//! [`Http304Config::build`](crate::cache::Http304Config::build)).
//!
//! Two middleware put it to work:
//!
//! - [`ConditionalCacheMiddleware`] answers 304 before the handler runs and
//!   otherwise stamps validators on successful responses.
//! - [`InjectHttp304`] hands the orchestrator to handlers through the request
//!   [`Context`], for handlers that choose their own discriminator and only
//!   want to skip work when the client is current:
//!
//! ```
//! use http304::{Response, StatusCode};
//! use http304::cache::{ServerEpoch, Validator};
//! use http304::context::Context;
//! use http304::middleware::Stack;
//! use http304::middleware::conditional::{Http304, Http304Ext, InjectHttp304};
//!
//! let epoch = ServerEpoch::parse("Wed, 01 Jan 2025 00:00:00 GMT").unwrap();
//! let http304 = Http304::new(Validator::new(epoch));
//!
//! let app = Stack::new()
//!     .with(InjectHttp304::new(http304))
//!     .handler(|ctx: Context| async move {
//!         let mut response = Response::new(StatusCode::Ok);
//!         if let Some(http304) = ctx.http304() {
//!             if http304.try_set(ctx.request(), &mut response, "page-42") {
//!                 return response;
//!             }
//!         }
//!         response.body("expensive page")
//!     });
//! # drop(app);
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::{BoxResponse, Middleware, Next};
use crate::cache::{ConfigError, Http304Config, ServerEpoch, ValidationContext, Validator};
use crate::context::{ConnectionInfo, Context};
use crate::{Method, Request, Response, StatusCode};

pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const IF_NONE_MATCH: &str = "If-None-Match";

/// Decides between `304 Not Modified` and issuing fresh validators.
///
/// `value` is the discriminator the validator is bound to. The `_for_client`
/// variants additionally bind it to the request's remote IP; a request with
/// no recorded address binds to the empty string.
#[derive(Clone, Debug)]
pub struct Http304 {
    validator: Arc<Validator>,
}

impl Http304 {
    pub fn new(validator: Validator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn epoch(&self) -> &ServerEpoch {
        self.validator.epoch()
    }

    /// Whether the client's cached copy of `value` is still current.
    /// Touches nothing.
    pub fn is_valid(&self, request: &Request, value: &str) -> bool {
        self.check(request, &validation_context(request, false, value))
    }

    /// [`is_valid`](Self::is_valid), bound to the client address.
    pub fn is_valid_for_client(&self, request: &Request, value: &str) -> bool {
        self.check(request, &validation_context(request, true, value))
    }

    /// Validates, then either marks `response` as 304 or writes fresh
    /// validators onto it. Returns `true` when 304 was set; the caller should
    /// then send `response` as is.
    pub fn try_set(&self, request: &Request, response: &mut Response, value: &str) -> bool {
        self.decide(request, response, &validation_context(request, false, value))
    }

    /// [`try_set`](Self::try_set), bound to the client address.
    pub fn try_set_for_client(
        &self,
        request: &Request,
        response: &mut Response,
        value: &str,
    ) -> bool {
        self.decide(request, response, &validation_context(request, true, value))
    }

    /// Forces the outcome. When `is_set`, clears whatever was written to
    /// `response` and sets `304 Not Modified`. Returns `is_set`.
    pub fn set(&self, response: &mut Response, is_set: bool) -> bool {
        if is_set {
            response.clear();
            response.set_status(StatusCode::NotModified);
        }
        info!(not_modified = is_set, "HTTP 304 {}", if is_set { "set" } else { "not set" });
        is_set
    }

    fn check(&self, request: &Request, context: &ValidationContext<'_>) -> bool {
        let headers = request.headers();
        let if_modified_since: Vec<&str> = headers.get_all(IF_MODIFIED_SINCE).collect();
        let if_none_match: Vec<&str> = headers.get_all(IF_NONE_MATCH).collect();

        debug!(
            ?if_modified_since,
            ?if_none_match,
            "verifying conditional cache validators"
        );

        self.validator
            .verify(context, &if_modified_since, &if_none_match)
    }

    fn decide(
        &self,
        request: &Request,
        response: &mut Response,
        context: &ValidationContext<'_>,
    ) -> bool {
        let is_valid = self.check(request, context);
        if !is_valid {
            self.validator.generate(context).apply(response);
        }
        self.set(response, is_valid)
    }
}

fn validation_context<'a>(
    request: &Request,
    bind_client_address: bool,
    value: &'a str,
) -> ValidationContext<'a> {
    let context = ValidationContext::new(value);
    if !bind_client_address {
        return context;
    }
    match request.remote_address() {
        Some(ip) => context.with_client_address(ip),
        None => context.with_client_address(""),
    }
}

type Discriminator = Arc<dyn Fn(&Request) -> String + Send + Sync + 'static>;

/// Answers `304 Not Modified` without running the handler when the client
/// presents a current validator; otherwise runs the handler and stamps fresh
/// validators on a successful response.
///
/// Only `GET` and `HEAD` are considered; other methods pass through
/// untouched. The validator is bound to the request target (path and query)
/// unless [`with_discriminator`](Self::with_discriminator) says otherwise.
///
/// # Examples
///
/// ```
/// use http304::cache::{ServerEpoch, Validator};
/// use http304::middleware::conditional::{ConditionalCacheMiddleware, Http304};
///
/// let epoch = ServerEpoch::parse("Wed, 01 Jan 2025 00:00:00 GMT").unwrap();
/// let middleware = ConditionalCacheMiddleware::new(Http304::new(Validator::new(epoch)))
///     .with_client_address(true)
///     .with_discriminator(|request| request.path().to_owned());
/// ```
pub struct ConditionalCacheMiddleware {
    http304: Http304,
    bind_client_address: bool,
    discriminator: Discriminator,
}

impl fmt::Debug for ConditionalCacheMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalCacheMiddleware")
            .field("http304", &self.http304)
            .field("bind_client_address", &self.bind_client_address)
            .finish_non_exhaustive()
    }
}

impl ConditionalCacheMiddleware {
    pub fn new(http304: Http304) -> Self {
        Self {
            http304,
            bind_client_address: false,
            discriminator: Arc::new(request_target),
        }
    }

    /// Builds the orchestrator and middleware from `config`.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from [`Http304Config::build`].
    pub fn from_config(config: &Http304Config) -> Result<Self, ConfigError> {
        Ok(Self::new(config.build()?).with_client_address(config.bind_client_address))
    }

    /// Binds issued validators to the client's IP address.
    #[must_use]
    pub fn with_client_address(mut self, bind_client_address: bool) -> Self {
        self.bind_client_address = bind_client_address;
        self
    }

    /// Replaces the function that names what a request is caching.
    #[must_use]
    pub fn with_discriminator<F>(mut self, discriminator: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.discriminator = Arc::new(discriminator);
        self
    }
}

fn request_target(request: &Request) -> String {
    match request.query_string() {
        Some(query) => format!("{}?{}", request.path(), query),
        None => request.path().to_owned(),
    }
}

impl Middleware for ConditionalCacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let http304 = self.http304.clone();
        let bind_client_address = self.bind_client_address;
        let discriminator = Arc::clone(&self.discriminator);

        Box::pin(async move {
            if !matches!(ctx.request().method(), Method::Get | Method::Head) {
                return next.run(ctx).await;
            }

            let value = discriminator(ctx.request());
            let context = validation_context(ctx.request(), bind_client_address, &value);

            if http304.check(ctx.request(), &context) {
                let mut response = Response::new(StatusCode::NotModified);
                http304.set(&mut response, true);
                return response;
            }

            let mut response = next.run(ctx).await;
            if response.status().is_success() {
                http304.validator().generate(&context).apply(&mut response);
            }
            http304.set(&mut response, false);
            response
        })
    }
}

/// Makes an [`Http304`] available to handlers via [`Http304Ext::http304`].
#[derive(Clone, Debug)]
pub struct InjectHttp304 {
    http304: Http304,
}

impl InjectHttp304 {
    pub fn new(http304: Http304) -> Self {
        Self { http304 }
    }
}

impl Middleware for InjectHttp304 {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxResponse {
        ctx.extensions_mut().insert(self.http304.clone());
        Box::pin(next.run(ctx))
    }
}

/// Retrieves the orchestrator installed by [`InjectHttp304`].
pub trait Http304Ext {
    fn http304(&self) -> Option<&Http304>;
}

impl Http304Ext for Context {
    fn http304(&self) -> Option<&Http304> {
        self.extensions().get::<Http304>()
    }
}
