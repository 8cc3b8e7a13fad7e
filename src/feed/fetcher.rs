use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RETRY_AFTER,
};
use reqwest::{Client, StatusCode};

use crate::error::{AppError, Result};
use crate::models::{FetchError, PollOutcome, Validators};

use super::parse::parse_feed;
use super::FeedSource;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str, cached: &Validators) -> PollOutcome {
        let mut request = self.client.get(url);

        if let Some(last_modified) = &cached.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }
        if let Some(etag) = &cached.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return PollOutcome::TransientFailure {
                    status: None,
                    retry_after: None,
                    error: FetchError::Network(e),
                }
            }
        };

        let status = response.status();
        let headers = response.headers();
        let validators = Validators::new(
            header_value(headers, LAST_MODIFIED),
            header_value(headers, ETAG),
        );
        let retry_after = header_value(headers, RETRY_AFTER);

        match status {
            StatusCode::NOT_MODIFIED => PollOutcome::NotModified {
                status: status.as_u16(),
                validators,
            },
            StatusCode::TOO_MANY_REQUESTS => PollOutcome::RateLimited {
                status: status.as_u16(),
                retry_after,
            },
            StatusCode::GONE => PollOutcome::Gone {
                status: status.as_u16(),
            },
            StatusCode::OK => {
                let body = match response.bytes().await {
                    Ok(body) => body,
                    Err(e) => {
                        return PollOutcome::TransientFailure {
                            status: Some(status.as_u16()),
                            retry_after,
                            error: FetchError::Body(e),
                        }
                    }
                };

                match parse_feed(url, &body) {
                    Ok(parsed) => PollOutcome::Success {
                        feed_title: parsed.title,
                        items: parsed.items,
                        validators,
                        status: status.as_u16(),
                    },
                    Err(error) => PollOutcome::TransientFailure {
                        status: Some(status.as_u16()),
                        retry_after,
                        error,
                    },
                }
            }
            other => PollOutcome::TransientFailure {
                status: Some(other.as_u16()),
                retry_after,
                error: FetchError::Status(other.as_u16()),
            },
        }
    }
}

fn header_value(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Served</title>
<item><title>One</title><link>https://example.com/1</link><guid>one</guid></item>
<item><title>Anonymous</title></item>
</channel></rss>"#;

    /// Serves one canned response and hands back the raw request it received.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/feed.xml", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_lowercase()
        });

        (url, handle)
    }

    fn response(status_line: &str, headers: &[&str], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status_line}\r\n");
        for header in headers {
            out.push_str(header);
            out.push_str("\r\n");
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        out
    }

    #[tokio::test]
    async fn sends_conditional_headers_and_reads_not_modified() {
        let (url, server) =
            serve_once(response("304 Not Modified", &["ETag: \"v2\""], "")).await;
        let cached = Validators::new(
            Some("Sun, 01 Mar 2026 08:00:00 GMT".into()),
            Some("\"v1\"".into()),
        );

        let outcome = FeedFetcher::new().unwrap().fetch(&url, &cached).await;
        let request = server.await.unwrap();

        assert!(request.contains("if-modified-since: sun, 01 mar 2026 08:00:00 gmt"));
        assert!(request.contains("if-none-match: \"v1\""));
        assert!(request.contains(&format!("user-agent: {}", USER_AGENT.to_lowercase())));
        match outcome {
            PollOutcome::NotModified { status, validators } => {
                assert_eq!(status, 304);
                assert_eq!(validators.etag.as_deref(), Some("\"v2\""));
                assert_eq!(validators.last_modified, None);
            }
            other => panic!("expected NotModified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn omits_conditional_headers_without_validators() {
        let (url, server) = serve_once(response("200 OK", &[], FEED)).await;

        FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;
        let request = server.await.unwrap();

        assert!(!request.contains("if-modified-since"));
        assert!(!request.contains("if-none-match"));
    }

    #[tokio::test]
    async fn ok_response_yields_items_and_validators() {
        let (url, server) = serve_once(response(
            "200 OK",
            &[
                "Last-Modified: Sun, 01 Mar 2026 09:00:00 GMT",
                "ETag: \"abc\"",
                "Content-Type: application/rss+xml",
            ],
            FEED,
        ))
        .await;

        let outcome = FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;
        server.await.unwrap();

        match outcome {
            PollOutcome::Success {
                feed_title,
                items,
                validators,
                status,
            } => {
                assert_eq!(status, 200);
                assert_eq!(feed_title, "Served");
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].guid, "one");
                assert_eq!(
                    validators.last_modified.as_deref(),
                    Some("Sun, 01 Mar 2026 09:00:00 GMT")
                );
                assert_eq!(validators.etag.as_deref(), Some("\"abc\""));
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn too_many_requests_keeps_retry_after_verbatim() {
        let (url, server) =
            serve_once(response("429 Too Many Requests", &["Retry-After: 120"], "")).await;

        let outcome = FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;
        server.await.unwrap();

        match outcome {
            PollOutcome::RateLimited {
                status,
                retry_after,
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after.as_deref(), Some("120"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gone_is_classified_before_generic_failures() {
        let (url, server) = serve_once(response("410 Gone", &[], "")).await;

        let outcome = FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;
        server.await.unwrap();

        assert!(matches!(outcome, PollOutcome::Gone { status: 410 }));
    }

    #[tokio::test]
    async fn server_error_is_transient_with_status() {
        let (url, server) = serve_once(response(
            "503 Service Unavailable",
            &["Retry-After: 30"],
            "down",
        ))
        .await;

        let outcome = FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;
        server.await.unwrap();

        assert_eq!(outcome.status_code(), 503);
        assert_eq!(outcome.retry_after(), Some("30"));
        assert!(matches!(
            outcome,
            PollOutcome::TransientFailure {
                error: FetchError::Status(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unparseable_body_is_transient() {
        let (url, server) = serve_once(response("200 OK", &[], "<html>oops")).await;

        let outcome = FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;
        server.await.unwrap();

        assert!(matches!(
            outcome,
            PollOutcome::TransientFailure {
                status: Some(200),
                error: FetchError::Parse(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn connection_failure_has_no_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/feed.xml", listener.local_addr().unwrap());
        drop(listener);

        let outcome = FeedFetcher::new()
            .unwrap()
            .fetch(&url, &Validators::default())
            .await;

        assert_eq!(outcome.status_code(), 0);
        assert!(matches!(
            outcome,
            PollOutcome::TransientFailure {
                status: None,
                error: FetchError::Network(_),
                ..
            }
        ));
    }
}
