use crate::error::Result;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
}

/// Raw response: the engine decides what a given status means, the transport
/// only moves bytes. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Injected HTTP capability. One request in flight at a time per catalog
/// operation; the rate ceiling and timeout live here, not in the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
}

impl ReqwestTransport {
    pub fn new(requests_per_second: u32, request_timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second.max(1)).expect("non-zero rate limit"),
        );

        Self {
            client,
            limiter: RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.limiter.until_ready().await;

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
        };

        debug!("{:?} {}", request.method, request.url);

        // Transient network failures are retried here; HTTP statuses never are
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(Duration::from_secs(8)))
            .build();

        let client = &self.client;
        let url = &request.url;
        let headers = &request.headers;
        let response = backoff::future::retry(policy, || {
            let method = method.clone();
            async move {
                let mut builder = client.request(method, url.as_str());
                for (key, value) in headers {
                    builder = builder.header(key.as_str(), value.as_str());
                }
                builder.send().await.map_err(|e| {
                    if e.is_timeout() || e.is_connect() {
                        warn!("transient network error for {}: {}", url, e);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(TransportResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: String, method: Method) -> TransportRequest {
        TransportRequest {
            url,
            method,
            headers: vec![("user-agent".to_string(), "wpstream-test".to_string())],
        }
    }

    #[tokio::test]
    async fn get_returns_status_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/manga/")
            .match_header("user-agent", "wpstream-test")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>ok</html>")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(100, 5_000);
        let response = transport
            .send(request(format!("{}/manga/", server.url()), Method::Get))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<html>ok</html>");
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/html")
        );
    }

    #[tokio::test]
    async fn head_exposes_headers_without_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/manga/mashle/")
            .with_status(200)
            .with_header("link", "<https://example.com/?p=4452>; rel=shortlink")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(100, 5_000);
        let response = transport
            .send(request(format!("{}/manga/mashle/", server.url()), Method::Head))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert!(response
            .headers
            .get("link")
            .is_some_and(|link| link.contains("?p=4452")));
    }

    #[tokio::test]
    async fn non_success_statuses_are_returned_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing/")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(100, 5_000);
        let response = transport
            .send(request(format!("{}/missing/", server.url()), Method::Get))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 404);
    }
}
