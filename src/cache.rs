//! Response caching for sessions.
//!
//! A [`CachedSession`] sits in front of another [`Session`] and keeps
//! successful (status 200) responses for a configurable TTL, either in
//! process memory or in a sqlite file. Build one from a URI with
//! [`cache_session_from_uri`]:
//!
//! - `memory:///?ttl=<seconds>`
//! - `sqlite:///path/to/cache.db?ttl=<seconds>&fast_save=<0|1>`

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use rusqlite::{params, Connection, OptionalExtension};
use url::Url;

use crate::{BggError, HttpResponse, HttpSession, Params, Result, Session, SessionError};

const DEFAULT_TTL_SECS: u64 = 3600;

/// Storage backend selected by the cache URI scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite { path: PathBuf, fast_save: bool },
}

/// Parsed cache URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub ttl: Duration,
}

impl CacheConfig {
    /// Parses a cache URI without opening any storage.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|err| {
            BggError::Configuration(format!("invalid cache URI '{uri}': {err}"))
        })?;

        let mut ttl = DEFAULT_TTL_SECS;
        let mut fast_save = false;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "ttl" => {
                    ttl = value.parse().map_err(|err| {
                        BggError::Configuration(format!(
                            "invalid ttl '{value}' in cache URI '{uri}': {err}"
                        ))
                    })?;
                }
                "fast_save" => fast_save = value != "0",
                _ => {}
            }
        }

        let backend = match parsed.scheme() {
            "memory" => CacheBackend::Memory,
            "sqlite" => {
                let path = percent_decode_str(parsed.path())
                    .decode_utf8()
                    .map_err(|err| {
                        BggError::Configuration(format!(
                            "invalid database path in cache URI '{uri}': {err}"
                        ))
                    })?;
                if path.is_empty() || path == "/" {
                    return Err(BggError::Configuration(format!(
                        "missing database path in cache URI '{uri}'"
                    )));
                }
                CacheBackend::Sqlite {
                    path: PathBuf::from(path.as_ref()),
                    fast_save,
                }
            }
            other => {
                return Err(BggError::Configuration(format!(
                    "unsupported cache scheme '{other}' in '{uri}'"
                )))
            }
        };

        Ok(Self {
            backend,
            ttl: Duration::from_secs(ttl),
        })
    }
}

/// Builds a caching session over a fresh [`HttpSession`] from a cache URI.
pub fn cache_session_from_uri(uri: &str) -> Result<CachedSession> {
    CachedSession::open(HttpSession::new(), CacheConfig::from_uri(uri)?)
}

enum Store {
    Memory(Mutex<HashMap<String, (Instant, HttpResponse)>>),
    Sqlite(Mutex<Connection>),
}

impl Store {
    fn open(backend: &CacheBackend) -> Result<Self> {
        match backend {
            CacheBackend::Memory => Ok(Self::Memory(Mutex::new(HashMap::new()))),
            CacheBackend::Sqlite { path, fast_save } => {
                let conn = Connection::open(path).map_err(|err| {
                    BggError::Configuration(format!(
                        "cannot open cache database '{}': {err}",
                        path.display()
                    ))
                })?;
                if *fast_save {
                    conn.pragma_update(None, "synchronous", "OFF")
                        .map_err(config_error)?;
                }
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS responses (
                        key TEXT PRIMARY KEY,
                        response TEXT NOT NULL,
                        expires_at INTEGER NOT NULL
                    )",
                    [],
                )
                .map_err(config_error)?;
                Ok(Self::Sqlite(Mutex::new(conn)))
            }
        }
    }

    fn get(&self, key: &str) -> Option<HttpResponse> {
        match self {
            Self::Memory(map) => {
                let mut map = map.lock().ok()?;
                let (expires_at, response) = map.get(key)?;
                if Instant::now() < *expires_at {
                    return Some(response.clone());
                }
                map.remove(key);
                None
            }
            Self::Sqlite(conn) => {
                let conn = conn.lock().ok()?;
                let row: Option<(String, i64)> = conn
                    .query_row(
                        "SELECT response, expires_at FROM responses WHERE key = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .ok()?;
                let (raw, expires_at) = row?;
                if unix_now() >= expires_at {
                    // a failed delete only leaves a stale row behind
                    let _ = conn.execute("DELETE FROM responses WHERE key = ?1", params![key]);
                    return None;
                }
                serde_json::from_str(&raw).ok()
            }
        }
    }

    fn put(&self, key: String, response: &HttpResponse, ttl: Duration) -> Result<()> {
        match self {
            Self::Memory(map) => {
                let mut map = map
                    .lock()
                    .map_err(|_| BggError::Api("response cache lock poisoned".to_owned()))?;
                let now = Instant::now();
                map.retain(|_, (expires_at, _)| now < *expires_at);
                map.insert(key, (now + ttl, response.clone()));
                Ok(())
            }
            Self::Sqlite(conn) => {
                let raw = serde_json::to_string(response)
                    .map_err(|err| BggError::Api(format!("cannot serialize response: {err}")))?;
                let now = unix_now();
                let expires_at = now.saturating_add(ttl.as_secs() as i64);
                let conn = conn
                    .lock()
                    .map_err(|_| BggError::Api("response cache lock poisoned".to_owned()))?;
                conn.execute(
                    "DELETE FROM responses WHERE expires_at <= ?1",
                    params![now],
                )
                .map_err(|err| BggError::Api(format!("cannot evict cached responses: {err}")))?;
                conn.execute(
                    "INSERT OR REPLACE INTO responses (key, response, expires_at)
                     VALUES (?1, ?2, ?3)",
                    params![key, raw, expires_at],
                )
                .map_err(|err| BggError::Api(format!("cannot store cached response: {err}")))?;
                Ok(())
            }
        }
    }
}

/// Session decorator that serves repeated GETs from a TTL-bounded cache.
///
/// Only status 200 responses are stored. There is no explicit
/// invalidation; staleness is bounded by the TTL alone.
pub struct CachedSession<S = HttpSession> {
    inner: S,
    store: Arc<Store>,
    config: CacheConfig,
}

impl<S> std::fmt::Debug for CachedSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: Session> CachedSession<S> {
    /// Wraps `inner`, opening the storage described by `config`.
    pub fn open(inner: S, config: CacheConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.backend)?);
        Ok(Self {
            inner,
            store,
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    async fn lookup(&self, key: &str) -> Option<HttpResponse> {
        match self.store.as_ref() {
            Store::Memory(_) => self.store.get(key),
            Store::Sqlite(_) => {
                let store = Arc::clone(&self.store);
                let key = key.to_owned();
                tokio::task::spawn_blocking(move || store.get(&key))
                    .await
                    .ok()
                    .flatten()
            }
        }
    }

    async fn remember(&self, key: String, response: &HttpResponse) -> Result<()> {
        let ttl = self.config.ttl;
        match self.store.as_ref() {
            Store::Memory(_) => self.store.put(key, response, ttl),
            Store::Sqlite(_) => {
                let store = Arc::clone(&self.store);
                let response = response.clone();
                tokio::task::spawn_blocking(move || store.put(key, &response, ttl))
                    .await
                    .map_err(|err| BggError::Api(format!("cache write task failed: {err}")))?
            }
        }
    }
}

#[async_trait]
impl<S: Session> Session for CachedSession<S> {
    async fn get(
        &self,
        url: &str,
        params: &Params,
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, SessionError> {
        let key = cache_key(url, params);
        if let Some(hit) = self.lookup(&key).await {
            #[cfg(feature = "tracing")]
            tracing::trace!("cache hit for {}", key);
            return Ok(hit);
        }

        let response = self.inner.get(url, params, timeout).await?;
        if response.status == 200 {
            // A failed cache write must not turn a good response into an error.
            if let Err(_err) = self.remember(key, &response).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("failed to cache response: {}", _err);
            }
        }
        Ok(response)
    }
}

fn cache_key(url: &str, params: &Params) -> String {
    if params.is_empty() {
        url.to_owned()
    } else {
        format!("{url}?{}", params.to_query_string())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

fn config_error(err: rusqlite::Error) -> BggError {
    BggError::Configuration(format!("cannot initialize cache database: {err}"))
}
