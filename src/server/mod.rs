//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function, keeping HTTP/1.1 connections alive between requests. Each
//! request carries the peer address it arrived from, which client-bound
//! validators are derived from.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request (headers plus body) buffered before answering 413.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP/1.1 server.
///
/// # Examples
///
/// ```rust,no_run
/// use http304::cache::Http304Config;
/// use http304::middleware::{Stack, conditional::ConditionalCacheMiddleware};
/// use http304::server::Server;
/// use http304::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let caching = ConditionalCacheMiddleware::from_config(&Http304Config::default())?;
///     let app = Stack::new()
///         .with(caching)
///         .handler(|_ctx| async { Response::new(StatusCode::Ok).body("Hello!") });
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(move |req| app.call(req)).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address. Port `0` picks a free port;
    /// see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Serves requests until `shutdown` resolves. Connections already
    /// accepted finish on their own tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener itself fails.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "http304 listening");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                let connection = Connection::new(stream, peer_addr);
                if let Err(e) = connection.serve(handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// What reading from the socket produced.
enum Incoming {
    /// A complete request, plus how many buffered bytes it consumed.
    Request(Request, usize),
    /// The connection is done, either closed by the peer or answered with
    /// an error response.
    Closed,
}

/// One accepted TCP connection and its read buffer.
struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
        }
    }

    /// Dispatches requests one at a time until the peer closes or asks to.
    async fn serve<H, F>(mut self, handler: Arc<H>) -> std::io::Result<()>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        loop {
            let (mut request, consumed) = match self.next_request().await? {
                Incoming::Request(request, consumed) => (request, consumed),
                Incoming::Closed => return Ok(()),
            };

            let keep_alive = request.is_keep_alive();
            request.set_remote_addr(self.peer_addr);

            debug!(
                peer = %self.peer_addr,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let response = handler(request).await;
            self.send(response.keep_alive(keep_alive)).await?;
            self.buf.advance(consumed);

            if !keep_alive {
                debug!(peer = %self.peer_addr, "closing after response");
                return Ok(());
            }
        }
    }

    async fn next_request(&mut self) -> std::io::Result<Incoming> {
        loop {
            // Pipelined bytes may already hold a full request.
            if !self.buf.is_empty() {
                match Request::parse(&self.buf) {
                    Ok((request, body_offset)) => {
                        let framed = body_offset
                            .checked_add(request.content_length().unwrap_or(0))
                            .filter(|&total| total <= MAX_REQUEST_SIZE);
                        let Some(consumed) = framed else {
                            return self.reject_oversized().await;
                        };
                        if self.buf.len() >= consumed {
                            return Ok(Incoming::Request(request, consumed));
                        }
                    }
                    Err(RequestError::Incomplete) => {}
                    Err(e) => {
                        warn!(peer = %self.peer_addr, error = %e, "rejecting malformed request");
                        let response = Response::new(StatusCode::BadRequest)
                            .body(format!("Bad Request: {e}"));
                        self.send(response.keep_alive(false)).await?;
                        return Ok(Incoming::Closed);
                    }
                }
            }

            if self.buf.len() > MAX_REQUEST_SIZE {
                return self.reject_oversized().await;
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                debug!(peer = %self.peer_addr, "connection closed by peer");
                return Ok(Incoming::Closed);
            }
        }
    }

    async fn reject_oversized(&mut self) -> std::io::Result<Incoming> {
        warn!(peer = %self.peer_addr, "rejecting oversized request");
        let response =
            Response::new(StatusCode::PayloadTooLarge).body("Request entity too large");
        self.send(response.keep_alive(false)).await?;
        Ok(Incoming::Closed)
    }

    async fn send(&mut self, response: Response) -> std::io::Result<()> {
        self.stream.write_all(&response.into_bytes()).await?;
        self.stream.flush().await
    }
}
