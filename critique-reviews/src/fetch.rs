use async_trait::async_trait;
use critique_http::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use critique_http::{HttpClient, HttpError, RequestOpts};
use thiserror::Error;
use tracing::debug;

use crate::crawl::PageRequest;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("invalid fetcher setup: {0}")]
    Setup(String),
    #[error("page unavailable: {0}")]
    Unavailable(String),
}

/// Source of raw listing HTML. The crawl only ever talks to this.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError>;
}

/// [`PageFetcher`] over [`HttpClient`], sending the headers a desktop
/// browser would so the site serves its regular markup.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: HttpClient,
}

impl HttpPageFetcher {
    pub fn new(client: HttpClient, user_agent: &str) -> Result<Self, FetchError> {
        let headers = browser_headers(user_agent)?;
        Ok(Self {
            client: client.with_default_headers(headers),
        })
    }
}

pub fn browser_headers(user_agent: &str) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| FetchError::Setup(format!("user agent: {e}")))?,
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    Ok(headers)
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
        debug!(target: "reviews.fetch", page = request.number, url = %request.url, "page.fetch");
        let body = self
            .client
            .get_text(
                request.url.as_str(),
                RequestOpts {
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(body)
    }
}
