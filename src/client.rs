use std::fmt;

use crate::{
    cache_session_from_uri, fetch::fetch_document, CachedSession, Collection, FetchOptions,
    Params, Result, Session, XmlNode,
};

/// Default API root.
pub const DEFAULT_API_URL: &str = "https://boardgamegeek.com/xmlapi2";

/// Cache used by [`BggClient::from_env`] when `BGG_CACHE_URI` is not set.
pub const DEFAULT_CACHE_URI: &str = "memory:///?ttl=3600";

/// Joins an API root and an endpoint name.
///
/// Example: `("https://boardgamegeek.com/xmlapi2/", "/thing")` →
/// `"https://boardgamegeek.com/xmlapi2/thing"`
pub fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        endpoint.trim().trim_start_matches('/')
    )
}

/// Client for the BoardGameGeek XML API.
///
/// Generic over the [`Session`] doing the HTTP work; by default requests go
/// through a [`CachedSession`].
#[derive(Clone)]
pub struct BggClient<S = CachedSession> {
    session: S,
    base_url: String,
    options: FetchOptions,
}

impl<S> fmt::Debug for BggClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BggClient")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BggClient<CachedSession> {
    /// Creates a client with a session built from a cache URI.
    pub fn with_cache_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(cache_session_from_uri(uri)?))
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `BGG_CACHE_URI`: cache URI, defaults to [`DEFAULT_CACHE_URI`]
    /// - `BGG_API_URL`: API root, defaults to [`DEFAULT_API_URL`]
    ///
    /// Empty values count as unset.
    pub fn from_env() -> Result<Self> {
        let cache_uri = non_empty_env("BGG_CACHE_URI");
        let client = Self::with_cache_uri(cache_uri.as_deref().unwrap_or(DEFAULT_CACHE_URI))?;
        Ok(match non_empty_env("BGG_API_URL") {
            Some(base_url) => client.with_base_url(base_url),
            None => client,
        })
    }
}

impl<S: Session> BggClient<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            base_url: DEFAULT_API_URL.to_owned(),
            options: FetchOptions::default(),
        }
    }

    /// Points the client at another API root, e.g. a mirror or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Applies timeout and retry options.
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetches one endpoint and returns the parsed document root.
    pub async fn fetch<P: Into<Params>>(&self, endpoint: &str, params: P) -> Result<XmlNode> {
        let url = endpoint_url(&self.base_url, endpoint);
        fetch_document(&self.session, &url, &params.into(), &self.options).await
    }

    /// Fetches the collection of `username`.
    pub async fn collection(&self, username: &str) -> Result<Collection> {
        let root = self
            .fetch("collection", Params::new().with("username", username))
            .await?;
        Collection::from_xml(&root, username)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
