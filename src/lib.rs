//! # http304
//!
//! Server-side HTTP conditional caching with salted, tamper-resistant entity
//! tags, on a small async HTTP/1.1 stack.
//!
//! A response carries `Last-Modified: <server epoch>` and an `ETag` whose
//! digest is bound to a discriminator (and optionally the client's IP). When
//! the client sends both back unchanged, the server answers
//! `304 Not Modified` without a body. Restarting the server with a new epoch
//! invalidates every outstanding validator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use http304::cache::Http304Config;
//! use http304::middleware::{LoggerMiddleware, Stack, conditional::ConditionalCacheMiddleware};
//! use http304::server::Server;
//! use http304::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Http304Config::from_json(r#"{ "bind_client_address": true }"#)?;
//!     let app = Stack::new()
//!         .with(LoggerMiddleware)
//!         .with(ConditionalCacheMiddleware::from_config(&config)?)
//!         .handler(|_ctx| async { Response::new(StatusCode::Ok).body("Hello, World!") });
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| app.call(req)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

pub use cache::{Http304Config, ServerEpoch, ValidationContext, Validator};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::conditional::Http304;
pub use server::{Server, ServerError};
