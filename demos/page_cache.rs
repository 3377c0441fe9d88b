//! Serves pages that the browser may revalidate with `304 Not Modified`.
//!
//! ```text
//! RUST_LOG=debug cargo run --example page_cache
//! curl -i http://127.0.0.1:8080/pages/42
//! curl -i http://127.0.0.1:8080/pages/42 \
//!     -H 'If-Modified-Since: <Last-Modified from above>' \
//!     -H 'If-None-Match: <ETag from above>'
//! ```
//!
//! Set `HTTP304_CONFIG` to a JSON config to pin the epoch, e.g.
//! `{"last_modified": "Wed, 01 Jan 2025 00:00:00 GMT"}`.

use http304::cache::Http304Config;
use http304::context::Context;
use http304::middleware::conditional::{Http304Ext, InjectHttp304};
use http304::middleware::{LoggerMiddleware, Stack};
use http304::server::Server;
use http304::{Response, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("HTTP304_CONFIG") {
        Ok(json) => Http304Config::from_json(&json)?,
        Err(_) => Http304Config::default(),
    };

    let app = Stack::new()
        .with(LoggerMiddleware)
        .with(InjectHttp304::new(config.build()?))
        .handler(render_page);

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!(address = %server.local_addr(), "page cache demo ready");
    server.run(move |req| app.call(req)).await?;
    Ok(())
}

async fn render_page(ctx: Context) -> Response {
    let Some(id) = ctx.request().path().strip_prefix("/pages/") else {
        return Response::new(StatusCode::NotFound).body("try /pages/42");
    };

    let mut response = Response::new(StatusCode::Ok);
    if let Some(http304) = ctx.http304() {
        if http304.try_set_for_client(ctx.request(), &mut response, &format!("page-{id}")) {
            return response;
        }
    }

    response
        .header("Content-Type", "text/html; charset=utf-8")
        .body(format!("<h1>Page {id}</h1>"))
}
