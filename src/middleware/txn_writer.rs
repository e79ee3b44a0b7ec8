//! The transaction-observing response writer.

use http::{HeaderMap, StatusCode};

use crate::apm::Txn;
use crate::response::Response;
use crate::writer::ResponseWriter;

/// Decorates the request's sink and attributes the committed status to the
/// transaction.
///
/// The inner sink alone decides when output commits: status changes are
/// forwarded untouched, and attribution happens the moment the inner sink
/// reports itself written. What the transaction records is therefore the
/// status the client receives, whether the sink buffers headers until the
/// first body write or commits on the first `write_header`.
pub(crate) struct TxnWriter {
    inner: Box<dyn ResponseWriter>,
    txn: Txn,
    committed: bool,
}

impl TxnWriter {
    pub(crate) fn new(inner: Box<dyn ResponseWriter>, txn: Txn) -> Self {
        let committed = inner.written();
        Self { inner, txn, committed }
    }

    fn observe_commit(&mut self) {
        if !self.committed && self.inner.written() {
            self.committed = true;
            self.txn.set_web_response(self.inner.status(), self.inner.headers());
        }
    }
}

impl ResponseWriter for TxnWriter {
    fn headers(&self) -> &HeaderMap { self.inner.headers() }
    fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        self.observe_commit();
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let n = self.inner.write(data);
        self.observe_commit();
        n
    }

    fn write_header_now(&mut self) {
        self.inner.write_header_now();
        self.observe_commit();
    }

    fn flush(&mut self) {
        self.inner.flush();
        self.observe_commit();
    }

    fn status(&self) -> StatusCode { self.inner.status() }
    fn written(&self) -> bool { self.inner.written() }
    fn size(&self) -> usize { self.inner.size() }

    fn finish(self: Box<Self>) -> Response {
        self.inner.finish()
    }

    fn into_inner(self: Box<Self>) -> Box<dyn ResponseWriter> {
        self.inner
    }
}

/// Finalize hook. Attributes the pending status and headers of a response
/// that never committed (a no-op when the wrapper already attributed a
/// committed one), then reports the body size.
pub(crate) fn finalize(writer: &dyn ResponseWriter, txn: &Txn, status: StatusCode) {
    txn.set_web_response(status, writer.headers());
    txn.set_response_size(writer.size() as u64);
}
