use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::Params;

/// Status, content type and body of one HTTP response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_owned),
            body: body.into(),
        }
    }

    /// Whether the content type names an XML media type.
    pub fn is_xml(&self) -> bool {
        let Some(content_type) = self.content_type.as_deref() else {
            return false;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        mime == "text/xml" || mime == "application/xml" || mime.ends_with("+xml")
    }
}

/// Failure to obtain a response from a [`Session`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A GET-capable HTTP session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Issues a GET request to `url` with the given query parameters.
    ///
    /// Implementations must give up after `timeout` and report it as
    /// [`SessionError::Timeout`].
    async fn get(
        &self,
        url: &str,
        params: &Params,
        timeout: Duration,
    ) -> Result<HttpResponse, SessionError>;
}

/// Plain, uncached session on top of `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct HttpSession {
    http: reqwest::Client,
}

impl HttpSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing `reqwest` client, e.g. one with custom headers.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn get(
        &self,
        url: &str,
        params: &Params,
        timeout: Duration,
    ) -> Result<HttpResponse, SessionError> {
        let pairs: Vec<(&str, &str)> = params.iter().collect();
        let response = self
            .http
            .get(url)
            .query(&pairs)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(map_transport)?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

fn map_transport(err: reqwest::Error) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout
    } else {
        SessionError::Transport(err.to_string())
    }
}
