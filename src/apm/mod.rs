//! Transaction contracts and the per-request handle.
//!
//! The APM backend is a collaborator: it implements [`Application`] (a
//! transaction factory) and [`Transaction`] (one request's unit of work).
//! Two backends ship with the crate: [`Recorder`] keeps finished
//! transactions in memory and [`LogReporter`] emits them as `tracing`
//! events.
//!
//! Application code never touches a backend transaction directly. It gets a
//! [`Txn`] handle from the request context, which is always usable:
//!
//! ```rust
//! use tsu_apm::Context;
//!
//! fn checkout(ctx: &mut Context) {
//!     let txn = ctx.transaction(); // no-op when nothing is bound
//!     if let Err(e) = charge_card() {
//!         txn.notice_error(&e);
//!     }
//!     ctx.write_str("ok");
//! }
//! # fn charge_card() -> std::io::Result<()> { Ok(()) }
//! ```

mod event;
mod log;
mod recorder;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::debug;

use crate::context::Context;
use crate::request::Request;

pub use event::{NoticedError, StatusPolicy, TransactionEvent};
pub use log::LogReporter;
pub use recorder::Recorder;

/// A factory for transactions.
pub trait Application: Send + Sync + 'static {
    /// Starts a transaction named `name` for `request`.
    ///
    /// Returning `None` means "not instrumenting right now": the request
    /// proceeds exactly as if no instrumentation were installed. Backends
    /// that sample by method or path decide here.
    fn start_transaction(&self, name: &str, request: &WebRequest<'_>) -> Option<Box<dyn Transaction>>;
}

/// One request's unit of work, as seen by the backend.
///
/// Methods take `&self`: a backend transaction is reached through a shared
/// handle and is responsible for its own interior mutability.
pub trait Transaction: Send + Sync {
    fn set_name(&self, name: &str);
    fn notice_error(&self, error: &(dyn StdError + 'static));
    fn add_attribute(&self, key: &str, value: &str);
    /// Marks the transaction as a web transaction and captures the request.
    fn set_web_request(&self, request: &WebRequest<'_>);
    /// Captures the response status and headers at commit.
    fn set_web_response(&self, status: StatusCode, headers: &HeaderMap);
    /// Body bytes sent, reported once when the request finishes.
    fn set_response_size(&self, _bytes: u64) {}
    fn end(&self);
}

/// The request attributes a transaction captures.
#[derive(Clone, Copy, Debug)]
pub struct WebRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a> From<&'a Request> for WebRequest<'a> {
    fn from(req: &'a Request) -> Self {
        Self { method: req.method(), uri: req.uri(), headers: req.headers() }
    }
}

/// An [`Application`] that never instruments.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disabled;

impl Application for Disabled {
    fn start_transaction(&self, _name: &str, _request: &WebRequest<'_>) -> Option<Box<dyn Transaction>> {
        None
    }
}

/// Error noticed on a transaction when a handler panics.
#[derive(Debug, thiserror::Error)]
#[error("panic: {0}")]
pub struct PanicError(pub String);

// ── Txn ───────────────────────────────────────────────────────────────────────

/// Handle to the current request's transaction.
///
/// Cloning is cheap and yields another handle to the same transaction.
/// [`Txn::noop`] (also `Default`) is a handle bound to nothing: every call
/// on it does nothing, so call sites never branch on instrumentation.
///
/// Once the transaction has ended, every call is ignored.
#[derive(Clone, Default)]
pub struct Txn {
    inner: Option<Arc<Shared>>,
}

struct Shared {
    txn: Box<dyn Transaction>,
    named: AtomicBool,
    responded: AtomicBool,
    ended: AtomicBool,
}

impl Txn {
    pub fn noop() -> Self {
        Self::default()
    }

    pub(crate) fn new(txn: Box<dyn Transaction>) -> Self {
        Self {
            inner: Some(Arc::new(Shared {
                txn,
                named: AtomicBool::new(false),
                responded: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            })),
        }
    }

    /// Whether this handle is bound to nothing.
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    fn live(&self) -> Option<&Shared> {
        let shared = self.inner.as_deref()?;
        if shared.ended.load(Ordering::Acquire) {
            debug!("transaction already ended, ignoring call");
            return None;
        }
        Some(shared)
    }

    /// Names the transaction. The middleware will not rename it afterwards.
    pub fn set_name(&self, name: &str) {
        if let Some(shared) = self.live() {
            shared.named.store(true, Ordering::Release);
            shared.txn.set_name(name);
        }
    }

    /// Records an application error. Does not change the HTTP response.
    pub fn notice_error(&self, error: &(dyn StdError + 'static)) {
        if let Some(shared) = self.live() {
            shared.txn.notice_error(error);
        }
    }

    /// Attaches a custom attribute.
    pub fn add_attribute(&self, key: &str, value: &str) {
        if let Some(shared) = self.live() {
            shared.txn.add_attribute(key, value);
        }
    }

    pub(crate) fn name_fixed(&self) -> bool {
        self.inner.as_deref().is_some_and(|s| s.named.load(Ordering::Acquire))
    }

    /// Names the transaction without fixing the name.
    pub(crate) fn rename(&self, name: &str) {
        if let Some(shared) = self.live() {
            shared.txn.set_name(name);
        }
    }

    pub(crate) fn set_web_request(&self, request: &WebRequest<'_>) {
        if let Some(shared) = self.live() {
            shared.txn.set_web_request(request);
        }
    }

    /// Attributes the response. Only the first call per transaction counts.
    pub(crate) fn set_web_response(&self, status: StatusCode, headers: &HeaderMap) {
        if let Some(shared) = self.live() {
            if !shared.responded.swap(true, Ordering::AcqRel) {
                shared.txn.set_web_response(status, headers);
            }
        }
    }

    pub(crate) fn set_response_size(&self, bytes: u64) {
        if let Some(shared) = self.live() {
            shared.txn.set_response_size(bytes);
        }
    }

    /// Ends the transaction. Only the first call counts.
    pub(crate) fn end(&self) {
        if let Some(shared) = self.inner.as_deref() {
            if !shared.ended.swap(true, Ordering::AcqRel) {
                shared.txn.end();
            }
        }
    }
}

impl fmt::Debug for Txn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.as_deref() {
            None => f.write_str("Txn(noop)"),
            Some(shared) => f
                .debug_struct("Txn")
                .field("named", &shared.named.load(Ordering::Relaxed))
                .field("responded", &shared.responded.load(Ordering::Relaxed))
                .field("ended", &shared.ended.load(Ordering::Relaxed))
                .finish(),
        }
    }
}

/// Returns the transaction bound to the request, or [`Txn::noop`].
pub fn transaction(ctx: &Context) -> Txn {
    ctx.extensions().get::<Txn>().cloned().unwrap_or_default()
}

/// Starts a `GET` web transaction on `app` for `path`.
#[cfg(test)]
pub(crate) fn start_web(app: &dyn Application, name: &str, path: &str) -> Option<Box<dyn Transaction>> {
    let uri: Uri = path.parse().unwrap();
    let headers = HeaderMap::new();
    let request = WebRequest { method: &Method::GET, uri: &uri, headers: &headers };
    let txn = app.start_transaction(name, &request)?;
    txn.set_web_request(&request);
    Some(txn)
}
