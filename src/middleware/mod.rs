//! Request pipeline.
//!
//! A [`Stack`] is a list of [`Middleware`] layers closed by a handler. Each
//! layer receives the [`Context`] and a [`Next`]; it may answer on its own
//! (the conditional-cache layer does, with `304`) or call [`Next::run`] and
//! edit what comes back. See [`conditional`] for the caching layers.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode, context::Context};

pub mod conditional;

/// The boxed future every middleware returns.
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// The rest of the chain, from one layer's point of view.
///
/// [`run`](Self::run) takes `self`, so a layer can forward a request at most
/// once.
///
/// # Examples
///
/// ```rust,no_run
/// use http304::{context::Context, middleware::{BoxResponse, Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    layers: Arc<[MiddlewareHandler]>,
    position: usize,
}

/// A layer with its concrete type erased.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponse + Send + Sync + 'static>;

pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Wraps a terminal request handler so it can close a middleware chain.
///
/// The handler never sees [`Next`]; anything registered after it is unreachable.
pub fn handler_fn<H, F>(handler: H) -> MiddlewareHandler
where
    H: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context, _next: Next| -> BoxResponse { Box::pin(handler(ctx)) })
}

impl Next {
    pub fn new(layers: impl Into<Arc<[MiddlewareHandler]>>) -> Self {
        Self {
            layers: layers.into(),
            position: 0,
        }
    }

    /// Hands `ctx` to the next layer. Running off the end of the chain is a
    /// wiring bug and answers `500`.
    pub async fn run(mut self, ctx: Context) -> Response {
        let Some(layer) = self.layers.get(self.position).cloned() else {
            tracing::error!(path = %ctx.request().path(), "no handler produced a response");
            return Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline");
        };
        self.position += 1;
        layer(ctx, self).await
    }
}

/// One layer of a [`Stack`].
///
/// Shared by every connection task, so implementors must be `Send + Sync`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// An ordered middleware pipeline closed by a request handler.
///
/// # Examples
///
/// ```
/// use http304::{Request, Response, StatusCode};
/// use http304::middleware::{LoggerMiddleware, Stack};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let stack = Stack::new()
///     .with(LoggerMiddleware)
///     .handler(|_ctx| async { Response::new(StatusCode::Ok).body("hello") });
///
/// let (request, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// let response = stack.call(request).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Stack {
    layers: Vec<MiddlewareHandler>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer inside the ones already added.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.layers.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Closes the chain. Layers added after this never run.
    #[must_use]
    pub fn handler<H, F>(mut self, handler: H) -> Self
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.layers.push(handler_fn(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn call(&self, request: Request) -> BoxResponse {
        let next = Next::new(self.layers.clone());
        Box::pin(next.run(Context::new(request)))
    }
}

/// Logs one line per request once the response is ready.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let started = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?started.elapsed(),
                "request served"
            );
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Trace", tag);
                response
            })
        }
    }

    #[tokio::test]
    async fn empty_chain_is_500() {
        let response = Stack::new().call(request("/")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn middleware_wrap_in_order() {
        let stack = Stack::new()
            .with(Tag("outer"))
            .with(Tag("inner"))
            .handler(|ctx: Context| async move {
                Response::new(StatusCode::Ok).body(ctx.request().path().to_owned())
            });
        assert_eq!(stack.len(), 3);

        let response = stack.call(request("/a")).await;
        assert_eq!(response.body_ref(), b"/a");
        let trace: Vec<_> = response.headers().get_all("x-trace").collect();
        assert_eq!(trace, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn handler_ends_the_chain() {
        let stack = Stack::new()
            .handler(|_ctx| async { Response::new(StatusCode::NoContent) })
            .with(Tag("unreachable"));
        let response = stack.call(request("/")).await;
        assert_eq!(response.status(), StatusCode::NoContent);
        assert!(!response.headers().contains("x-trace"));
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let stack = Stack::new()
            .with(LoggerMiddleware)
            .handler(|_ctx| async { Response::new(StatusCode::NotFound) });
        assert_eq!(stack.call(request("/missing")).await.status(), StatusCode::NotFound);
    }
}
