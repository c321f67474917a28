// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::redirect::Policy;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, FailureKind};

/// A fetched page with the metadata discovery cares about.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,

    /// Lowercased `Content-Type` header value, empty if absent
    pub content_type: String,

    pub body: String,
}

impl FetchedPage {
    /// Whether the response body is HTML worth parsing.
    pub fn is_html(&self) -> bool {
        self.content_type.is_empty() || self.content_type.contains("text/html")
    }
}

/// Create a configured asynchronous HTTP client.
///
/// Redirects are followed up to the configured bound; exceeding it surfaces
/// as a redirect error on the request.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(Policy::limited(config.redirect_limit))
        .build()?;
    Ok(client)
}

/// Fetch a page body under a hard deadline.
///
/// The deadline wraps the whole request including the body read; exceeding
/// it cancels the fetch and returns [`AppError::Timeout`]. Non-success
/// statuses surface as [`AppError::Http`].
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    deadline: Duration,
) -> Result<FetchedPage> {
    let fetch = async {
        let response = client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = response.text().await?;
        Ok::<_, AppError>(FetchedPage {
            url: final_url,
            content_type,
            body,
        })
    };

    match tokio::time::timeout(deadline, fetch).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(url.to_string())),
    }
}

/// Map a fetch error onto the discovery failure taxonomy.
pub fn failure_kind(error: &AppError) -> FailureKind {
    match error {
        AppError::Timeout(_) => FailureKind::Timeout,
        AppError::Http(e) if e.is_timeout() => FailureKind::Timeout,
        AppError::Http(e) if e.is_redirect() => FailureKind::RedirectLoop,
        AppError::Http(e) if e.status().is_some() => FailureKind::BadStatus,
        _ => FailureKind::Transport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        let page = |ct: &str| FetchedPage {
            url: "https://example.com".into(),
            content_type: ct.into(),
            body: String::new(),
        };
        assert!(page("text/html; charset=utf-8").is_html());
        assert!(page("").is_html());
        assert!(!page("application/pdf").is_html());
        assert!(!page("image/png").is_html());
    }

    #[test]
    fn test_failure_kind_for_timeout() {
        let err = AppError::Timeout("https://example.com".into());
        assert_eq!(failure_kind(&err), FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_respects_deadline() {
        // A listener that accepts but never responds forces the deadline.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = create_async_client(&CrawlerConfig::default()).unwrap();
        let url = format!("http://{addr}/");
        let result = fetch_text(&client, &url, Duration::from_millis(200)).await;

        match result {
            Err(ref e) => assert_eq!(failure_kind(e), FailureKind::Timeout),
            Ok(_) => panic!("expected timeout"),
        }
        server.abort();
    }
}
