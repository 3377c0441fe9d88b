//! End-to-end conditional requests over a real TCP connection.

use std::net::SocketAddr;

use http304::cache::Http304Config;
use http304::middleware::conditional::ConditionalCacheMiddleware;
use http304::middleware::{LoggerMiddleware, Stack};
use http304::server::Server;
use http304::{Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const EPOCH: &str = "Wed, 01 Jan 2025 00:00:00 GMT";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_app(config: &Http304Config) -> SocketAddr {
    init_tracing();
    let app = Stack::new()
        .with(LoggerMiddleware)
        .with(ConditionalCacheMiddleware::from_config(config).unwrap())
        .handler(|ctx| async move {
            Response::new(StatusCode::Ok).body(format!("article {}", ctx.request().path()))
        });

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(move |req| app.call(req)));
    addr
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn send(addr: SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> Reply {
    let mut raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    for (name, value) in extra_headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8(buf).unwrap();

    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

    Reply {
        status,
        headers,
        body: body.to_owned(),
    }
}

fn config(bind_client_address: bool) -> Http304Config {
    Http304Config {
        last_modified: Some(EPOCH.to_owned()),
        bind_client_address,
    }
}

#[tokio::test]
async fn second_request_is_not_modified() {
    let addr = spawn_app(&config(false)).await;

    let first = send(addr, "/articles/7", &[]).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.body, "article /articles/7");
    assert_eq!(first.header("last-modified"), Some(EPOCH));
    let etag = first.header("etag").unwrap().to_owned();
    assert_eq!(etag.len(), 50);

    let second = send(
        addr,
        "/articles/7",
        &[("If-Modified-Since", EPOCH), ("If-None-Match", etag.as_str())],
    )
    .await;
    assert_eq!(second.status, 304);
    assert!(second.body.is_empty());
    assert!(second.header("etag").is_none());
    assert!(second.header("content-length").is_none());
}

#[tokio::test]
async fn validator_for_one_article_does_not_cover_another() {
    let addr = spawn_app(&config(false)).await;

    let first = send(addr, "/articles/7", &[]).await;
    let etag = first.header("etag").unwrap().to_owned();

    let other = send(
        addr,
        "/articles/8",
        &[("If-Modified-Since", EPOCH), ("If-None-Match", etag.as_str())],
    )
    .await;
    assert_eq!(other.status, 200);
    assert_eq!(other.body, "article /articles/8");
    assert_ne!(other.header("etag"), Some(etag.as_str()));
}

#[tokio::test]
async fn client_bound_validators_survive_reconnects() {
    let addr = spawn_app(&config(true)).await;

    let first = send(addr, "/feed", &[]).await;
    let etag = first.header("etag").unwrap().to_owned();

    // New connection, new source port, same IP.
    let second = send(
        addr,
        "/feed",
        &[("If-Modified-Since", EPOCH), ("If-None-Match", etag.as_str())],
    )
    .await;
    assert_eq!(second.status, 304);
}

#[tokio::test]
async fn redeploy_invalidates_validators() {
    let before = spawn_app(&config(false)).await;
    let first = send(before, "/", &[]).await;
    let etag = first.header("etag").unwrap().to_owned();

    let after = spawn_app(&Http304Config {
        last_modified: Some("Thu, 02 Jan 2025 00:00:00 GMT".to_owned()),
        bind_client_address: false,
    })
    .await;
    let second = send(
        after,
        "/",
        &[("If-Modified-Since", EPOCH), ("If-None-Match", etag.as_str())],
    )
    .await;
    assert_eq!(second.status, 200);
    assert_eq!(second.header("last-modified"), Some("Thu, 02 Jan 2025 00:00:00 GMT"));
}

#[tokio::test]
async fn tampered_or_duplicated_validators_get_full_response() {
    let addr = spawn_app(&config(false)).await;
    let etag = send(addr, "/", &[]).await.header("etag").unwrap().to_owned();

    let mut tampered = etag.clone().into_bytes();
    tampered[10] = if tampered[10] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let reply = send(
        addr,
        "/",
        &[("If-Modified-Since", EPOCH), ("If-None-Match", tampered.as_str())],
    )
    .await;
    assert_eq!(reply.status, 200);

    let reply = send(
        addr,
        "/",
        &[
            ("If-Modified-Since", EPOCH),
            ("If-None-Match", etag.as_str()),
            ("If-None-Match", etag.as_str()),
        ],
    )
    .await;
    assert_eq!(reply.status, 200);
}
