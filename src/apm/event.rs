//! The finished-transaction record and the backend-side transaction that
//! builds it.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use super::{Transaction, WebRequest};

/// An error noticed by application code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoticedError {
    pub message: String,
    /// `source()` chain, outermost first.
    pub causes: Vec<String>,
}

impl NoticedError {
    fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self { message: error.to_string(), causes }
    }
}

/// Everything recorded about one finished transaction.
#[derive(Clone, Debug, Default)]
pub struct TransactionEvent {
    pub name: String,
    pub is_web: bool,
    pub duration: Duration,
    pub request_method: Option<String>,
    /// Request path, without the query string.
    pub request_uri: Option<String>,
    pub status: Option<StatusCode>,
    pub content_type: Option<String>,
    /// The `content-length` header when set, the body size sent otherwise.
    pub content_length: Option<u64>,
    pub errors: Vec<NoticedError>,
    pub attributes: Vec<(String, String)>,
    /// The status was classified as an error by the [`StatusPolicy`].
    pub status_error: bool,
}

impl TransactionEvent {
    /// Noticed errors plus one if the status counts as an error.
    pub fn error_count(&self) -> usize {
        self.errors.len() + usize::from(self.status_error)
    }
}

/// Which response codes count as errors: `>= 400` unless ignored.
#[derive(Clone, Debug)]
pub struct StatusPolicy {
    ignore: Vec<StatusCode>,
}

impl StatusPolicy {
    /// A policy that ignores nothing.
    pub fn strict() -> Self {
        Self { ignore: Vec::new() }
    }

    pub fn ignore(mut self, code: StatusCode) -> Self {
        self.ignore.push(code);
        self
    }

    pub fn is_error(&self, code: StatusCode) -> bool {
        code.as_u16() >= 400 && !self.ignore.contains(&code)
    }
}

/// Ignores `404 Not Found`.
impl Default for StatusPolicy {
    fn default() -> Self {
        Self::strict().ignore(StatusCode::NOT_FOUND)
    }
}

pub(crate) type OnEnd = Arc<dyn Fn(TransactionEvent) + Send + Sync>;

/// A backend transaction that accumulates a [`TransactionEvent`] and hands
/// it to `on_end` when it ends.
pub(crate) struct EventTransaction {
    event: Mutex<TransactionEvent>,
    started: Instant,
    policy: StatusPolicy,
    on_end: OnEnd,
}

impl EventTransaction {
    pub(crate) fn new(name: &str, policy: StatusPolicy, on_end: OnEnd) -> Self {
        Self {
            event: Mutex::new(TransactionEvent { name: name.to_owned(), ..Default::default() }),
            started: Instant::now(),
            policy,
            on_end,
        }
    }
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl Transaction for EventTransaction {
    fn set_name(&self, name: &str) {
        self.event.lock().name = name.to_owned();
    }

    fn notice_error(&self, error: &(dyn StdError + 'static)) {
        self.event.lock().errors.push(NoticedError::from_error(error));
    }

    fn add_attribute(&self, key: &str, value: &str) {
        self.event.lock().attributes.push((key.to_owned(), value.to_owned()));
    }

    fn set_web_request(&self, request: &WebRequest<'_>) {
        let mut event = self.event.lock();
        event.is_web = true;
        event.request_method = Some(request.method.to_string());
        event.request_uri = Some(request.uri.path().to_owned());
    }

    fn set_web_response(&self, status: StatusCode, headers: &HeaderMap) {
        let mut event = self.event.lock();
        event.status = Some(status);
        event.content_type = header_str(headers, CONTENT_TYPE).map(str::to_owned);
        if let Some(len) = header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()) {
            event.content_length = Some(len);
        }
    }

    fn set_response_size(&self, bytes: u64) {
        let mut event = self.event.lock();
        if event.content_length.is_none() {
            event.content_length = Some(bytes);
        }
    }

    fn end(&self) {
        let event = {
            let mut event = self.event.lock();
            event.duration = self.started.elapsed();
            event.status_error = event.is_web
                && event.status.is_some_and(|code| self.policy.is_error(code));
            std::mem::take(&mut *event)
        };
        (self.on_end)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("charge failed")]
    struct ChargeFailed(#[source] io::Error);

    #[test]
    fn default_policy_ignores_404_only() {
        let policy = StatusPolicy::default();
        assert!(!policy.is_error(StatusCode::OK));
        assert!(!policy.is_error(StatusCode::NOT_FOUND));
        assert!(policy.is_error(StatusCode::BAD_REQUEST));
        assert!(policy.is_error(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(StatusPolicy::strict().is_error(StatusCode::NOT_FOUND));
    }

    #[test]
    fn noticed_error_keeps_source_chain() {
        let err = ChargeFailed(io::Error::other("card declined"));
        let noticed = NoticedError::from_error(&err);
        assert_eq!(noticed.message, "charge failed");
        assert_eq!(noticed.causes, vec!["card declined".to_owned()]);
    }

    #[test]
    fn status_error_and_noticed_errors_are_counted_separately() {
        let event = TransactionEvent {
            errors: vec![NoticedError::default()],
            status_error: true,
            ..Default::default()
        };
        assert_eq!(event.error_count(), 2);
    }

    fn capturing(name: &str) -> (Arc<Mutex<Option<TransactionEvent>>>, EventTransaction) {
        let done: Arc<Mutex<Option<TransactionEvent>>> = Arc::default();
        let sink = Arc::clone(&done);
        let txn = EventTransaction::new(
            name,
            StatusPolicy::default(),
            Arc::new(move |event| *sink.lock() = Some(event)),
        );
        (done, txn)
    }

    #[test]
    fn status_error_requires_a_web_transaction() {
        let (done, txn) = capturing("job");
        txn.set_web_response(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new());
        txn.end();

        let event = done.lock().take().unwrap();
        assert!(!event.is_web);
        assert!(!event.status_error);
    }

    #[test]
    fn content_length_falls_back_to_body_size() {
        let (done, txn) = capturing("GET a");
        txn.set_web_response(StatusCode::OK, &HeaderMap::new());
        txn.set_response_size(7);
        txn.end();
        assert_eq!(done.lock().take().unwrap().content_length, Some(7));
    }

    #[test]
    fn content_length_header_wins_over_body_size() {
        let (done, txn) = capturing("HEAD a");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "42".parse().unwrap());
        txn.set_web_response(StatusCode::OK, &headers);
        txn.set_response_size(0);
        txn.end();
        assert_eq!(done.lock().take().unwrap().content_length, Some(42));
    }
}
