//! Resilient retrieval of one XML document.
//!
//! The API answers `202 Accepted` while it prepares a response and `503`
//! when it throttles a client. Both are retried after a growing delay.
//! Transport timeouts are retried at once with a longer per-attempt
//! timeout. The three conditions draw from one shared retry budget.

use std::time::Duration;

use tokio::time::sleep;

use crate::{
    xml::parse_xml, BggError, FetchOptions, HttpResponse, Params, Result, Session, SessionError,
    XmlNode,
};

/// What one attempt produced, before any retry decision.
#[derive(Debug)]
enum Attempt {
    Document(XmlNode),
    /// 202: the server is still preparing the data.
    NotReady,
    /// 503: the server is rate limiting.
    Throttled,
    TimedOut,
}

/// Per-call retry bookkeeping. `remaining` only goes down; `timeout` and
/// `delay` only go up.
#[derive(Debug)]
struct RetryState {
    remaining: u32,
    timeout: Duration,
    delay: Duration,
}

impl RetryState {
    fn new(options: &FetchOptions) -> Self {
        Self {
            remaining: options.retries,
            timeout: options.timeout,
            delay: options.retry_delay,
        }
    }

    /// Consumes one retry, if any are left.
    fn take(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }

    async fn back_off(&mut self, multiplier: f64) {
        sleep(self.delay).await;
        self.delay = grow(self.delay, multiplier);
    }
}

/// Scales `duration`, saturating at [`Duration::MAX`].
fn grow(duration: Duration, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * multiplier).unwrap_or(Duration::MAX)
}

/// Fetches `url` through `session` and returns the parsed document root.
///
/// # Errors
///
/// - [`BggError::RetryableRequest`] when the API keeps answering 202. The
///   message is `None` if `options.retries` is zero.
/// - [`BggError::NonXmlResponse`] for any other unexpected status or a
///   non-XML content type. Never retried.
/// - [`BggError::Timeout`] when attempts keep timing out.
/// - [`BggError::Api`] for malformed XML, other transport failures, or
///   when throttling outlasts the retry budget.
/// - [`BggError::Configuration`] when `options` fails
///   [`FetchOptions::validate`]. No request is sent.
pub async fn fetch_document<S>(
    session: &S,
    url: &str,
    params: &Params,
    options: &FetchOptions,
) -> Result<XmlNode>
where
    S: Session + ?Sized,
{
    options.validate()?;
    let mut state = RetryState::new(options);

    loop {
        match attempt(session, url, params, state.timeout).await? {
            Attempt::Document(root) => return Ok(root),
            Attempt::NotReady => {
                if options.retries == 0 {
                    return Err(BggError::RetryableRequest { message: None });
                }
                if !state.take() {
                    return Err(BggError::RetryableRequest {
                        message: Some(format!(
                            "failed to retrieve data after {} retries",
                            options.retries
                        )),
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "API call will be retried in {:?} ({} more retries)",
                    state.delay,
                    state.remaining
                );
                state.back_off(options.delay_multiplier).await;
            }
            Attempt::Throttled => {
                #[cfg(feature = "tracing")]
                tracing::warn!("API returned 503, {} retries left", state.remaining);
                if !state.take() {
                    break;
                }
                state.back_off(options.delay_multiplier).await;
            }
            Attempt::TimedOut => {
                if options.retries == 0 {
                    return Err(BggError::Timeout { retries: None });
                }
                if !state.take() {
                    return Err(BggError::Timeout {
                        retries: Some(options.retries),
                    });
                }
                state.timeout = grow(state.timeout, options.timeout_multiplier);
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "API request timed out, retrying {} more times with timeout {:?}",
                    state.remaining,
                    state.timeout
                );
            }
        }
    }

    Err(BggError::Api(
        "couldn't fetch data within the configured number of retries".to_owned(),
    ))
}

async fn attempt<S>(session: &S, url: &str, params: &Params, timeout: Duration) -> Result<Attempt>
where
    S: Session + ?Sized,
{
    let response = match session.get(url, params, timeout).await {
        Ok(response) => response,
        Err(SessionError::Timeout) => return Ok(Attempt::TimedOut),
        Err(SessionError::Transport(message)) => {
            return Err(BggError::Api(format!(
                "error fetching API response: {message}"
            )))
        }
    };
    classify(response)
}

fn classify(response: HttpResponse) -> Result<Attempt> {
    match response.status {
        202 => return Ok(Attempt::NotReady),
        503 => return Ok(Attempt::Throttled),
        200 if response.is_xml() => {}
        status => {
            return Err(BggError::NonXmlResponse {
                status,
                content_type: response.content_type,
            })
        }
    }

    parse_xml(&response.body)
        .map(Attempt::Document)
        .map_err(|err| BggError::Api(format!("error decoding API response: {err}")))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::{
        fetch::{fetch_document, grow},
        BggError, FetchOptions, HttpResponse, Params, Session,
        SessionError,
    };

    const XML: &str = r#"<items totalitems="0"></items>"#;

    /// Replays canned outcomes and records when and with which timeout each
    /// request was made.
    struct ScriptedSession {
        script: Mutex<VecDeque<Result<HttpResponse, SessionError>>>,
        calls: Mutex<Vec<(Instant, Duration)>>,
    }

    impl ScriptedSession {
        fn new(script: Vec<Result<HttpResponse, SessionError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Instant, Duration)> {
            self.calls.lock().expect("calls mutex").clone()
        }

        /// Time slept between consecutive requests.
        fn gaps(&self) -> Vec<Duration> {
            self.calls()
                .windows(2)
                .map(|pair| pair[1].0 - pair[0].0)
                .collect()
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn get(
            &self,
            _url: &str,
            _params: &Params,
            timeout: Duration,
        ) -> Result<HttpResponse, SessionError> {
            self.calls
                .lock()
                .expect("calls mutex")
                .push((Instant::now(), timeout));
            self.script
                .lock()
                .expect("script mutex")
                .pop_front()
                .unwrap_or_else(|| Err(SessionError::Transport("script exhausted".to_owned())))
        }
    }

    fn xml() -> Result<HttpResponse, SessionError> {
        Ok(HttpResponse::new(200, Some("text/xml; charset=utf-8"), XML))
    }

    fn status(code: u16) -> Result<HttpResponse, SessionError> {
        Ok(HttpResponse::new(code, Some("text/html"), ""))
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff < Duration::from_millis(5),
            "expected {expected:?}, got {actual:?}"
        );
    }

    async fn run(session: &ScriptedSession, options: FetchOptions) -> crate::Result<crate::XmlNode> {
        fetch_document(session, "https://api.test/xmlapi2/collection", &Params::new(), &options)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_responses_back_off_geometrically() {
        let session = ScriptedSession::new(vec![status(202), status(202), status(202), xml()]);

        let root = run(&session, FetchOptions::default())
            .await
            .expect("must succeed after retries");

        assert_eq!(root.tag, "items");
        let gaps = session.gaps();
        assert_eq!(gaps.len(), 3);
        assert_close(gaps[0], Duration::from_secs_f64(5.0));
        assert_close(gaps[1], Duration::from_secs_f64(7.5));
        assert_close(gaps[2], Duration::from_secs_f64(11.25));
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_without_retries_fails_immediately() {
        let session = ScriptedSession::new(vec![status(202), xml()]);

        let err = run(&session, FetchOptions::default().with_retries(0))
            .await
            .expect_err("must fail");

        assert!(matches!(err, BggError::RetryableRequest { message: None }));
        assert!(err.is_retryable());
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_beyond_budget_is_terminal_retryable() {
        let session = ScriptedSession::new(vec![status(202), status(202), status(202)]);

        let err = run(&session, FetchOptions::default().with_retries(2))
            .await
            .expect_err("must fail");

        match err {
            BggError::RetryableRequest { message: Some(message) } => {
                assert!(message.contains("2 retries"))
            }
            other => panic!("expected terminal retryable error, got {other:?}"),
        }
        assert_eq!(session.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_escalate_and_exhaust_budget() {
        let session = ScriptedSession::new(vec![
            Err(SessionError::Timeout),
            Err(SessionError::Timeout),
            Err(SessionError::Timeout),
            xml(),
        ]);
        let timeout = Duration::from_secs(2);

        let err = run(
            &session,
            FetchOptions::default().with_retries(2).with_timeout(timeout),
        )
        .await
        .expect_err("must time out");

        assert!(matches!(err, BggError::Timeout { retries: Some(2) }));
        let timeouts: Vec<_> = session.calls().into_iter().map(|(_, t)| t).collect();
        assert_eq!(timeouts.len(), 3);
        assert_close(timeouts[0], timeout);
        assert_close(timeouts[1], timeout.mul_f64(2.5));
        assert_close(timeouts[2], timeout.mul_f64(6.25));
        // timeouts are retried without sleeping
        assert!(session.gaps().iter().all(|gap| gap.is_zero()));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_retries_is_immediate() {
        let session = ScriptedSession::new(vec![Err(SessionError::Timeout)]);

        let err = run(&session, FetchOptions::default().with_retries(0))
            .await
            .expect_err("must time out");

        assert!(matches!(err, BggError::Timeout { retries: None }));
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_shares_budget_with_accepted() {
        let session = ScriptedSession::new(vec![status(503), status(202), status(503), xml()]);

        run(&session, FetchOptions::default())
            .await
            .expect("must succeed on the last retry");

        let gaps = session.gaps();
        assert_close(gaps[0], Duration::from_secs_f64(5.0));
        assert_close(gaps[1], Duration::from_secs_f64(7.5));
        assert_close(gaps[2], Duration::from_secs_f64(11.25));
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_beyond_budget_falls_back_to_api_error() {
        let session = ScriptedSession::new(vec![status(503), status(503)]);

        let err = run(&session, FetchOptions::default().with_retries(1))
            .await
            .expect_err("must fail");

        assert!(matches!(err, BggError::Api(_)));
        assert_eq!(session.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn json_reply_is_non_xml_and_not_retried() {
        let session = ScriptedSession::new(vec![
            Ok(HttpResponse::new(200, Some("application/json"), "{}")),
            xml(),
        ]);

        let err = run(&session, FetchOptions::default())
            .await
            .expect_err("must fail");

        assert!(matches!(
            err,
            BggError::NonXmlResponse { status: 200, .. }
        ));
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_is_non_xml() {
        let session = ScriptedSession::new(vec![Ok(HttpResponse::new(
            404,
            Some("text/xml"),
            "<error/>",
        ))]);

        let err = run(&session, FetchOptions::default())
            .await
            .expect_err("must fail");

        assert!(matches!(err, BggError::NonXmlResponse { status: 404, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_xml_is_api_error_and_not_retried() {
        let session = ScriptedSession::new(vec![
            Ok(HttpResponse::new(200, Some("text/xml"), "<items><item></items>")),
            xml(),
        ]);

        let err = run(&session, FetchOptions::default())
            .await
            .expect_err("must fail");

        assert!(matches!(err, BggError::Api(_)));
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_api_error_and_not_retried() {
        let session = ScriptedSession::new(vec![
            Err(SessionError::Transport("connection refused".to_owned())),
            xml(),
        ]);

        let err = run(&session, FetchOptions::default())
            .await
            .expect_err("must fail");

        match err {
            BggError::Api(message) => assert!(message.contains("connection refused")),
            other => panic!("expected api error, got {other:?}"),
        }
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shrinking_delay_multiplier_is_rejected_before_any_request() {
        let session = ScriptedSession::new(vec![status(503), status(503), xml()]);
        let options = FetchOptions {
            delay_multiplier: -1.5,
            ..FetchOptions::default()
        };

        let err = run(&session, options).await.expect_err("must fail");

        assert!(matches!(err, BggError::Configuration(_)));
        assert!(session.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nan_timeout_multiplier_is_rejected() {
        let session = ScriptedSession::new(vec![Err(SessionError::Timeout), xml()]);
        let options = FetchOptions {
            timeout_multiplier: f64::NAN,
            ..FetchOptions::default()
        };

        let err = run(&session, options).await.expect_err("must fail");

        assert!(matches!(err, BggError::Configuration(_)));
        assert!(session.calls().is_empty());
    }

    #[test]
    fn grow_saturates_instead_of_overflowing() {
        assert_eq!(grow(Duration::from_secs(5), f64::MAX), Duration::MAX);
        assert_eq!(grow(Duration::MAX, 2.5), Duration::MAX);
        assert_eq!(grow(Duration::from_secs(2), 1.5), Duration::from_secs(3));
    }
}
