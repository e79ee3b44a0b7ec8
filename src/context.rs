//! The per-request exchange object.

use std::mem;
use std::sync::Arc;

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Extensions, StatusCode};

use crate::apm::Txn;
use crate::request::Request;
use crate::response::{ContentType, IntoResponse};
use crate::writer::{BufferedWriter, ResponseWriter};

/// Route metadata captured when the router matched the request.
#[derive(Clone, Debug)]
pub struct RouteInfo {
    pub(crate) pattern: Arc<str>,
    pub(crate) handler_name: Arc<str>,
}

impl RouteInfo {
    /// The registered path pattern, e.g. `/users/{id}`.
    pub fn pattern(&self) -> &str { &self.pattern }

    /// The name recorded for the handler at registration time.
    pub fn handler_name(&self) -> &str { &self.handler_name }
}

/// Everything one request's handler chain shares: the request, the current
/// response sink, the matched route and typed per-request extensions.
///
/// A `Context` is created by the router for exactly one request and is only
/// ever reachable through `&mut` from that request's chain.
pub struct Context {
    request: Request,
    writer: Box<dyn ResponseWriter>,
    route: Option<RouteInfo>,
    handler_name: Option<Arc<str>>,
    extensions: Extensions,
}

impl Context {
    pub(crate) fn new(request: Request, route: Option<RouteInfo>) -> Self {
        let handler_name = route.as_ref().map(|r| Arc::clone(&r.handler_name));
        Self {
            request,
            writer: Box::new(BufferedWriter::new()),
            route,
            handler_name,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request { &self.request }

    /// Shortcut for `ctx.request().param(key)`.
    pub fn param(&self, key: &str) -> Option<&str> { self.request.param(key) }

    /// The matched route, `None` when the request fell through to the
    /// not-found handler.
    pub fn route(&self) -> Option<&RouteInfo> { self.route.as_ref() }

    /// The name of the handler serving this request.
    ///
    /// Starts as the registered name of the matched handler and reflects any
    /// [`set_handler_name`](Self::set_handler_name) made since.
    pub fn handler_name(&self) -> Option<&str> { self.handler_name.as_deref() }

    /// Overrides the handler name for the rest of the chain.
    pub fn set_handler_name(&mut self, name: impl Into<Arc<str>>) {
        self.handler_name = Some(name.into());
    }

    pub fn writer(&self) -> &dyn ResponseWriter { &*self.writer }
    pub fn writer_mut(&mut self) -> &mut dyn ResponseWriter { &mut *self.writer }

    /// Replaces the sink with a decorator around it.
    ///
    /// Everything written afterwards, including values returned by handlers,
    /// goes through the decorator.
    pub fn wrap_writer<F>(&mut self, wrap: F)
    where
        F: FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
    {
        let inner = mem::replace(&mut self.writer, Box::new(BufferedWriter::new()));
        self.writer = wrap(inner);
    }

    /// Undoes the outermost [`wrap_writer`](Self::wrap_writer): the current
    /// decorator is dropped and the sink it wrapped takes its place.
    pub fn unwrap_writer(&mut self) {
        let outer = mem::replace(&mut self.writer, Box::new(BufferedWriter::new()));
        self.writer = outer.into_inner();
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// The transaction bound to this request, or a no-op stand-in.
    pub fn transaction(&self) -> Txn {
        crate::apm::transaction(self)
    }

    /// Sets the pending status without writing a body.
    pub fn status(&mut self, code: StatusCode) {
        self.writer.write_header(code);
    }

    /// Writes `s` to the body, committing the response.
    pub fn write_str(&mut self, s: &str) -> usize {
        self.writer.write(s.as_bytes())
    }

    /// Writes a plain-text body with the given status.
    pub fn string(&mut self, code: StatusCode, body: &str) {
        self.writer.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(ContentType::Text.as_str()),
        );
        self.writer.write_header(code);
        self.writer.write(body.as_bytes());
    }

    /// Writes a complete response value through the sink.
    pub fn respond(&mut self, response: impl IntoResponse) {
        response.into_response().write_to(&mut *self.writer);
    }

    pub(crate) fn into_writer(self) -> Box<dyn ResponseWriter> {
        self.writer
    }
}
