//! The response-writing capability surface and the default buffered sink.
//!
//! # Commit semantics
//!
//! Headers and status stay mutable until the writer *commits*: the first
//! body write (even an empty one), or an explicit [`write_header_now`] /
//! [`flush`]. Until then [`write_header`] may be called any number of times
//! and the last call wins. After commit, status changes are ignored.
//!
//! ```text
//! write_header(200)   pending = 200
//! write_header(500)   pending = 500
//! write(b"oops")      commit → 500 is final
//! write_header(201)   ignored, warning logged
//! ```
//!
//! Decorators (see [`middleware::instrument`](crate::middleware::instrument))
//! wrap a `Box<dyn ResponseWriter>` and must forward every call, so the
//! innermost sink alone decides *when* a commit happens.
//!
//! [`write_header`]: ResponseWriter::write_header
//! [`write_header_now`]: ResponseWriter::write_header_now
//! [`flush`]: ResponseWriter::flush

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use tracing::warn;

use crate::response::Response;

/// A sink for one HTTP response.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    /// Mutable headers. Whether changes after commit reach the client is up
    /// to the sink.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the pending status. Ignored once committed.
    fn write_header(&mut self, status: StatusCode);

    /// Commits (if not yet committed) and appends `data` to the body.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Commits without writing a body.
    fn write_header_now(&mut self);

    /// Pushes buffered output toward the client. Implies commit.
    fn flush(&mut self) {
        self.write_header_now();
    }

    /// The status in effect: pending before commit, final after.
    fn status(&self) -> StatusCode;

    /// Whether the response has been committed.
    fn written(&self) -> bool;

    /// Body bytes written so far.
    fn size(&self) -> usize;

    /// Consumes the sink, producing the response the transport will send.
    fn finish(self: Box<Self>) -> Response;

    /// Consumes a decorator and returns the sink it wraps. A terminal sink
    /// returns itself.
    fn into_inner(self: Box<Self>) -> Box<dyn ResponseWriter>;
}

/// The host's default sink: buffers status, headers and body in memory and
/// defers header commit until the first body write.
#[derive(Debug)]
pub struct BufferedWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    committed: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            committed: false,
        }
    }
}

impl Default for BufferedWriter {
    fn default() -> Self { Self::new() }
}

impl ResponseWriter for BufferedWriter {
    fn headers(&self) -> &HeaderMap { &self.headers }
    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    fn write_header(&mut self, status: StatusCode) {
        if self.committed {
            if status != self.status {
                warn!(
                    committed = self.status.as_u16(),
                    wanted = status.as_u16(),
                    "headers were already written, ignoring status change"
                );
            }
            return;
        }
        self.status = status;
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.committed = true;
        self.body.extend_from_slice(data);
        data.len()
    }

    fn write_header_now(&mut self) {
        self.committed = true;
    }

    fn status(&self) -> StatusCode { self.status }
    fn written(&self) -> bool { self.committed }
    fn size(&self) -> usize { self.body.len() }

    fn finish(self: Box<Self>) -> Response {
        let BufferedWriter { status, headers, body, .. } = *self;
        Response { status, headers, body: body.freeze() }
    }

    fn into_inner(self: Box<Self>) -> Box<dyn ResponseWriter> { self }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_200_and_uncommitted() {
        let w = BufferedWriter::new();
        assert_eq!(w.status(), StatusCode::OK);
        assert!(!w.written());
        assert_eq!(w.size(), 0);
    }

    #[test]
    fn last_status_before_commit_wins() {
        let mut w = BufferedWriter::new();
        w.write_header(StatusCode::OK);
        w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        w.write(b"body");

        assert!(w.written());
        assert_eq!(w.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_after_commit_is_ignored() {
        let mut w = BufferedWriter::new();
        w.write(b"");
        w.write_header(StatusCode::CREATED);

        assert!(w.written());
        assert_eq!(w.status(), StatusCode::OK);
    }

    #[test]
    fn flush_commits_without_body() {
        let mut w = BufferedWriter::new();
        w.write_header(StatusCode::ACCEPTED);
        w.flush();
        w.write_header(StatusCode::BAD_REQUEST);

        let res = Box::new(w).finish();
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert!(res.body().is_empty());
    }

    #[test]
    fn finish_keeps_headers_and_body() {
        let mut w = BufferedWriter::new();
        w.headers_mut().insert("x-trace", "abc".parse().unwrap());
        assert_eq!(w.write(b"hello "), 6);
        w.write(b"world");

        let res = Box::new(w).finish();
        assert_eq!(res.body(), b"hello world");
        assert_eq!(res.header("x-trace"), Some("abc"));
    }
}
