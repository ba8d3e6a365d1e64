//! services/api/src/adapters/fetch.rs
//!
//! The outbound page fetcher. Every URL the client touches (the initial one, each
//! redirect hop, and the final one) goes through the same URL policy.

use async_trait::async_trait;
use blog_pipeline_core::ports::{FetchedPage, PageFetcher, PortError, PortResult};
use blog_pipeline_core::url_guard::{self, UrlRejection};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::{redirect::Policy, Client, Response};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MAX_REDIRECTS: usize = 5;
/// Pages larger than this are refused. Extraction keeps far less anyway.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Decides whether a URL may be requested.
pub type UrlPolicy = fn(&Url) -> Result<(), UrlRejection>;

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

pub struct GuardedFetcher {
    client: Client,
    policy: UrlPolicy,
    max_body_bytes: usize,
}

impl GuardedFetcher {
    /// A fetcher enforcing the production SSRF policy.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_policy(timeout, url_guard::validate_url)
    }

    pub fn with_policy(timeout: Duration, policy: UrlPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(browser_headers())
            .timeout(timeout)
            .redirect(Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    return attempt.error("too many redirects");
                }
                match policy(attempt.url()) {
                    Ok(()) => attempt.follow(),
                    Err(rejection) => attempt.error(rejection),
                }
            }))
            .build()?;
        Ok(Self {
            client,
            policy,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Reads the body chunk by chunk, giving up as soon as it passes the limit.
    async fn read_capped(&self, url: &Url, mut response: Response) -> PortResult<String> {
        let too_large = || {
            warn!(%url, limit = self.max_body_bytes, "Page body too large");
            PortError::Unexpected(format!(
                "page body exceeds {} bytes",
                self.max_body_bytes
            ))
        };

        if let Some(declared) = response.content_length() {
            if declared > self.max_body_bytes as u64 {
                return Err(too_large());
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PortError::Unexpected(format!("failed to read body: {}", e)))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl PageFetcher for GuardedFetcher {
    async fn fetch(&self, url: &Url) -> PortResult<FetchedPage> {
        (self.policy)(url).map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(%url, "Fetching page");
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_redirect() {
                warn!(%url, "Redirect refused: {}", e);
            }
            PortError::Unexpected(format!("fetch failed: {}", e))
        })?;

        let final_url = response.url().clone();
        (self.policy)(&final_url).map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status().as_u16();
        let body = self.read_capped(&final_url, response).await?;

        Ok(FetchedPage {
            final_url,
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn allow_all(_: &Url) -> Result<(), UrlRejection> {
        Ok(())
    }

    fn block_internal(url: &Url) -> Result<(), UrlRejection> {
        if url.path().starts_with("/internal") {
            Err(UrlRejection::PrivateNetwork(url.path().to_string()))
        } else {
            Ok(())
        }
    }

    fn fetcher(policy: UrlPolicy) -> GuardedFetcher {
        GuardedFetcher::with_policy(Duration::from_secs(5), policy).unwrap()
    }

    #[tokio::test]
    async fn returns_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>Hello</body></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/article", server.uri())).unwrap();
        let page = fetcher(allow_all).fetch(&url).await.unwrap();

        assert_eq!(page.status, 200);
        assert!(page.body.contains("Hello"));
        assert_eq!(page.final_url, url);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_not_hidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let page = fetcher(allow_all).fetch(&url).await.unwrap();
        assert_eq!(page.status, 404);
    }

    #[tokio::test]
    async fn redirect_to_blocked_hop_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/internal/admin", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/internal/admin"))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/start", server.uri())).unwrap();
        assert!(fetcher(block_internal).fetch(&url).await.is_err());
    }

    #[tokio::test]
    async fn blocked_url_is_never_requested() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/internal/metadata", server.uri())).unwrap();
        assert!(fetcher(block_internal).fetch(&url).await.is_err());
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(512)))
            .mount(&server)
            .await;

        let fetcher = fetcher(allow_all).with_body_limit(1024);

        let huge = Url::parse(&format!("{}/huge", server.uri())).unwrap();
        let err = fetcher.fetch(&huge).await.unwrap_err();
        assert!(err.to_string().contains("exceeds 1024 bytes"), "got {err}");

        let small = Url::parse(&format!("{}/small", server.uri())).unwrap();
        assert_eq!(fetcher.fetch(&small).await.unwrap().body.len(), 512);
    }

    #[tokio::test]
    async fn production_policy_refuses_plain_http() {
        let fetcher = GuardedFetcher::new(Duration::from_secs(1)).unwrap();
        let url = Url::parse("http://example.com/").unwrap();
        assert!(fetcher.fetch(&url).await.is_err());
    }
}
