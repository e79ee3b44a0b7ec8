//! In-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::event::{EventTransaction, StatusPolicy, TransactionEvent};
use super::{Application, Transaction, WebRequest};

/// An [`Application`] that keeps every finished transaction in memory.
///
/// Clones share the same storage, so keep one clone to inspect what the
/// middleware recorded:
///
/// ```rust
/// use bytes::Bytes;
/// use tsu_apm::{Context, Router, apm::Recorder, middleware::Instrument};
///
/// fn hello(ctx: &mut Context) { ctx.write_str("hi"); }
///
/// let recorder = Recorder::new();
/// let app = Router::new()
///     .layer(Instrument::new(recorder.clone()))
///     .get("/hello", hello);
///
/// app.handle(http::Request::get("/hello").body(Bytes::new()).unwrap());
/// let name = &recorder.transactions()[0].name;
/// assert!(name.starts_with("GET ") && name.ends_with("::hello"));
/// ```
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    started: AtomicUsize,
    finished: Mutex<Vec<TransactionEvent>>,
    policy: StatusPolicy,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StatusPolicy) -> Self {
        Self {
            inner: Arc::new(Inner { policy, ..Default::default() }),
        }
    }

    /// Number of transactions started so far.
    pub fn started(&self) -> usize {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Finished transactions, in the order they ended.
    pub fn transactions(&self) -> Vec<TransactionEvent> {
        self.inner.finished.lock().clone()
    }

    /// The most recently finished transaction.
    pub fn last(&self) -> Option<TransactionEvent> {
        self.inner.finished.lock().last().cloned()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<TransactionEvent> {
        std::mem::take(&mut *self.inner.finished.lock())
    }
}

impl Application for Recorder {
    fn start_transaction(&self, name: &str, _request: &WebRequest<'_>) -> Option<Box<dyn Transaction>> {
        self.inner.started.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(&self.inner);
        Some(Box::new(EventTransaction::new(
            name,
            self.inner.policy.clone(),
            Arc::new(move |event| inner.finished.lock().push(event)),
        )))
    }
}
