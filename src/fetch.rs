use std::future::Future;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use tracing::debug;

use crate::config::Settings;
use crate::error::FetchError;

/// Plain GET transport. Returns the body of a successful response.
pub trait Fetch {
    fn get(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        let referer = HeaderValue::from_str(&settings.gallery_url)
            .map_err(|_| FetchError::InvalidUrl(settings.gallery_url.clone()))?;
        headers.insert(header::REFERER, referer);

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| FetchError::from_reqwest(&settings.gallery_url, e))?;

        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        debug!("GET {} -> {}", url, status);
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}

/// Reject identifiers that would change the shape of the page URL.
pub fn check_identifier(id: &str) -> Result<&str, FetchError> {
    let id = id.trim();
    // Also true for an empty id.
    let dots_only = id.chars().all(|c| c == '.');
    if dots_only || id.contains(['/', '?', '#', '\\']) || id.chars().any(char::is_whitespace) {
        return Err(FetchError::InvalidUrl(id.to_string()));
    }
    Ok(id)
}

/// Fetch the gallery page for one workflow.
pub async fn fetch_page<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    id: &str,
) -> Result<String, FetchError> {
    let id = check_identifier(id)?;
    fetcher.get(&settings.page_url(id)).await
}
