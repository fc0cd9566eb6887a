/// Error type returned by this crate.
///
/// Fetch failures are split into mutually exclusive kinds so callers can
/// react to each one differently, e.g. re-run a fetch on
/// [`BggError::RetryableRequest`] while treating [`BggError::NonXmlResponse`]
/// as fatal.
#[derive(Debug, thiserror::Error)]
pub enum BggError {
    /// Invalid cache URI, cache backend setup failure or invalid fetch options.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The API accepted the request but the data is not ready yet.
    ///
    /// `message` is `None` when retries were disabled and the caller is
    /// expected to retry on its own.
    #[error("request should be retried{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    RetryableRequest { message: Option<String> },
    /// Unexpected status code or a response that is not XML.
    #[error("non-XML reply (status {status}, content-type {})", .content_type.as_deref().unwrap_or("<none>"))]
    NonXmlResponse {
        status: u16,
        content_type: Option<String>,
    },
    /// Transport timeout. `retries` is set once the retry budget is spent.
    #[error("request timed out{}", .retries.map(|n| format!(" after {n} retries")).unwrap_or_default())]
    Timeout { retries: Option<u32> },
    /// Parse failures, transport failures and anything else.
    #[error("API error: {0}")]
    Api(String),
    /// Field lookup on a [`crate::Record`] for a key it does not hold.
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),
    /// Raw data that does not have the expected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl BggError {
    /// Returns `true` when re-issuing the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableRequest { .. })
    }
}

#[cfg(test)]
mod tests {
    use crate::BggError;

    #[test]
    fn display_includes_optional_details() {
        let bare = BggError::RetryableRequest { message: None };
        assert_eq!(bare.to_string(), "request should be retried");

        let timeout = BggError::Timeout { retries: Some(2) };
        assert_eq!(timeout.to_string(), "request timed out after 2 retries");

        let non_xml = BggError::NonXmlResponse {
            status: 200,
            content_type: Some("application/json".to_owned()),
        };
        assert!(non_xml.to_string().contains("application/json"));
    }

    #[test]
    fn only_retryable_request_is_retryable() {
        assert!(BggError::RetryableRequest { message: None }.is_retryable());
        assert!(!BggError::Timeout { retries: None }.is_retryable());
        assert!(!BggError::Api("boom".to_owned()).is_retryable());
    }
}
