use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::StreamExt;
use game_ingestor::{
    models::request_params::GamesRequestParams,
    providers::{
        GameSource, ProviderError,
        lichess::{LichessConfig, LichessProvider},
    },
    retry::RetryPolicy,
};
use nonzero_ext::nonzero;
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One canned HTTP response.
struct Reply {
    status: &'static str,
    body: String,
}

fn reply(status: &'static str, body: impl Into<String>) -> Reply {
    Reply {
        status,
        body: body.into(),
    }
}

/// Minimal loopback HTTP/1.1 responder: answers each connection with the next
/// scripted reply and records the request line.
async fn serve(replies: Vec<Reply>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        for r in replies {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let text = String::from_utf8_lossy(&head);
            log.lock()
                .unwrap()
                .push(text.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/x-ndjson\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                r.status,
                r.body.len(),
                r.body
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.unwrap();
        }
    });

    (format!("http://{addr}"), seen)
}

fn provider(base_url: String) -> LichessProvider {
    LichessProvider::with_config(LichessConfig {
        base_url,
        requests_per_minute: nonzero!(6000u32),
        retry: RetryPolicy::new(3, Duration::from_millis(10)),
        ..LichessConfig::default()
    })
    .expect("provider")
}

const TWO_GAMES: &str = concat!(
    r#"{"id":"new1","rated":true,"speed":"blitz","createdAt":1706745600000,"players":{"white":{"user":{"name":"Alice"},"rating":1800},"black":{"user":{"name":"Bob"},"rating":1750}},"winner":"white","moves":"e4 e5 Nf3"}"#,
    "\n",
    r#"{"id":"old1","rated":false,"speed":"rapid","createdAt":1706659200000,"players":{"white":{"user":{"name":"Bob"}},"black":{"user":{"name":"Alice"}}},"status":"draw","moves":"d4 d5"}"#,
    "\n"
);

#[tokio::test]
async fn retries_rate_limit_then_streams_records() {
    let (url, seen) = serve(vec![
        reply("429 Too Many Requests", ""),
        reply("429 Too Many Requests", ""),
        reply("200 OK", TWO_GAMES),
    ])
    .await;

    let until = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let params = GamesRequestParams {
        username: "Alice".into(),
        until: Some(until),
        since: None,
        max: Some(200),
    };
    let batch = provider(url).fetch_games(&params).await.expect("batch");

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.games[0].id, "new1");
    assert_eq!(batch.games[1].id, "old1");
    assert_eq!(batch.newest.unwrap().timestamp_millis(), 1706745600000);
    assert_eq!(batch.oldest.unwrap().timestamp_millis(), 1706659200000);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[2].starts_with("GET /api/games/user/Alice?"));
    assert!(seen[2].contains("until=1709251200000"));
    assert!(seen[2].contains("max=200"));
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let (url, seen) = serve(vec![
        reply("429 Too Many Requests", ""),
        reply("429 Too Many Requests", ""),
        reply("429 Too Many Requests", ""),
    ])
    .await;

    let err = provider(url)
        .fetch_games(&GamesRequestParams::newest("Alice", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited { attempts: 3, .. }));
    assert!(err.is_transient());
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_player_fails_without_retry() {
    let (url, seen) = serve(vec![reply("404 Not Found", "{}")]).await;

    let err = provider(url)
        .fetch_games(&GamesRequestParams::newest("ghost", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::NotFound { .. }));
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_transient());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_body_is_an_empty_batch_not_an_error() {
    let (url, _seen) = serve(vec![reply("200 OK", "")]).await;

    let batch = provider(url)
        .fetch_games(&GamesRequestParams::newest("Alice", 10))
        .await
        .expect("empty batch");
    assert!(batch.is_empty());
    assert!(batch.oldest.is_none());
}

#[tokio::test]
async fn malformed_line_surfaces_as_decode_error() {
    let (url, _seen) = serve(vec![reply("200 OK", "{\"id\":\"ok\"}\nnot json\n")]).await;

    let mut stream = provider(url)
        .stream_games(&GamesRequestParams::newest("Alice", 10))
        .await
        .expect("stream");
    assert_eq!(stream.next().await.unwrap().unwrap().id, "ok");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, ProviderError::Decode { .. }));
}

#[tokio::test]
#[serial]
#[ignore]
async fn live_lichess_export_smoke() {
    // Talks to lichess.org; run with `--ignored` when network access is available.
    let provider = LichessProvider::new().expect("provider");
    let batch = provider
        .fetch_games(&GamesRequestParams::newest("DrNykterstein", 5))
        .await
        .expect("fetch");

    assert!(batch.len() <= 5);
    if batch.len() > 1 {
        assert!(batch.games[0].timestamp() >= batch.games[1].timestamp());
    }
}
