//! Radix-tree request router and handler-chain dispatch.
//!
//! One tree per HTTP method. O(path-length) lookup. Routes are matched
//! *before* the middleware chain runs, so every middleware already sees the
//! matched pattern and handler name on the [`Context`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::context::{Context, RouteInfo};
use crate::error::Error;
use crate::handler::{BoxedHandler, BoxedMiddleware, Handler, Middleware, Next};
use crate::naming::HandlerNames;
use crate::request::Request;
use crate::response::Response;

struct Route {
    handler: BoxedHandler,
    info: RouteInfo,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve)
/// or drive it directly with [`Router::handle`]. Registration methods return
/// `self` so they chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    middleware: Vec<BoxedMiddleware>,
    names: HandlerNames,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            names: HandlerNames::default(),
            not_found: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax — `ctx.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path is rejected by the radix tree (conflicting or
    /// malformed pattern). Use [`try_on`](Self::try_on) to handle that case.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_on(method, path, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible form of [`on`](Self::on).
    pub fn try_on(mut self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        let (id, type_name) = handler.handler_type();
        let info = RouteInfo {
            pattern: Arc::from(path),
            handler_name: self.names.resolve(id, type_name),
        };
        let route = Route { handler: handler.into_boxed_handler(), info };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .map_err(|source| Error::InvalidRoute { path: path.to_owned(), source })?;
        Ok(self)
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Appends a middleware that runs ahead of every handler, matched or not.
    ///
    /// Middleware run in the order they were added.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Routes one request through the middleware chain and its handler.
    ///
    /// A panic escaping the chain is logged and recovered: the client gets
    /// `500` unless the response was already committed, in which case the
    /// committed response is sent as is.
    pub fn handle(&self, req: http::Request<Bytes>) -> Response {
        let (parts, body) = req.into_parts();
        let method = parts.method.clone();

        let (endpoint, params, info) = match self.lookup(&method, parts.uri.path()) {
            Some((route, params)) => (&*route.handler, params, Some(route.info.clone())),
            None => (&*self.not_found, HashMap::new(), None),
        };

        let mut ctx = Context::new(Request::new(parts, body, params), info);
        let next = Next::new(&self.middleware, endpoint);

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| next.run(&mut ctx))) {
            error!(
                method = %method,
                path = ctx.request().path(),
                panic = panic_message(&*payload),
                "handler panicked"
            );
            let writer = ctx.writer_mut();
            if !writer.written() {
                writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
                writer.write_header_now();
            }
        }

        ctx.into_writer().finish()
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn not_found(ctx: &mut Context) {
    ctx.status(StatusCode::NOT_FOUND);
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
