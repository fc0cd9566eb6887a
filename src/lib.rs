//! `bgg-http` is an async client for the BoardGameGeek XML API.
//!
//! The API answers slowly-prepared requests with `202 Accepted`, throttles
//! with `503`, and occasionally replies with something that is not XML.
//! This crate hides those conventions behind:
//! - [`fetch_document`], a retry/backoff loop returning a parsed [`XmlNode`]
//! - [`cache_session_from_uri`], a TTL response cache in memory or sqlite
//! - [`attr_of`], [`attr_list_of`] and [`text_of`] for reading fields
//! - [`Record`] and [`Collection`] for the extracted data
//! - [`BggClient`], tying the pieces together

mod cache;
mod client;
mod collection;
mod error;
mod extract;
mod fetch;
mod options;
mod params;
mod record;
mod session;
mod value;
mod xml;

pub use cache::{cache_session_from_uri, CacheBackend, CacheConfig, CachedSession};
pub use client::{endpoint_url, BggClient, DEFAULT_API_URL, DEFAULT_CACHE_URI};
pub use collection::{Collection, CollectionIter};
pub use error::BggError;
pub use extract::{as_string, attr_list_of, attr_of, text_of, ExtractOptions};
pub use fetch::fetch_document;
pub use options::FetchOptions;
pub use params::Params;
pub use record::Record;
pub use session::{HttpResponse, HttpSession, Session, SessionError};
pub use value::Value;
pub use xml::{parse_xml, XmlNode, XmlParseError};

pub type Result<T> = std::result::Result<T, BggError>;
