//! Handler and middleware traits, type erasure, and the `Next` invoker.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one radix tree per
//! method, so each is hidden behind a trait object:
//!
//! ```text
//! fn hello(ctx: &mut Context) { … }           ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                   ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                   ← stored as BoxedHandler
//!        ↓
//! handler.call(&mut ctx)  at request time      ← one vtable dispatch
//! ```
//!
//! Handlers are plain synchronous functions. The server runs each request's
//! whole chain on the blocking pool, start to finish, on one thread.

use std::any::{TypeId, type_name};
use std::sync::Arc;

use crate::context::Context;
use crate::response::Reply;

// ── Internal types ────────────────────────────────────────────────────────────

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: &mut Context);
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the signature:
///
/// ```text
/// fn name(ctx: &mut Context) -> impl Reply
/// ```
///
/// where [`Reply`] is `()` (the handler wrote through the context) or any
/// [`IntoResponse`](crate::IntoResponse) value.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;

    /// Identity of the concrete handler type, used for naming.
    #[doc(hidden)]
    fn handler_type(&self) -> (TypeId, &'static str);
}

mod private {
    pub trait Sealed {}
}

impl<F, R> private::Sealed for F
where
    F: Fn(&mut Context) -> R + Send + Sync + 'static,
    R: Reply,
{
}

impl<F, R> Handler for F
where
    F: Fn(&mut Context) -> R + Send + Sync + 'static,
    R: Reply,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }

    fn handler_type(&self) -> (TypeId, &'static str) {
        (TypeId::of::<F>(), type_name::<F>())
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, R> ErasedHandler for FnHandler<F>
where
    F: Fn(&mut Context) -> R,
    R: Reply,
{
    fn call(&self, ctx: &mut Context) {
        (self.0)(ctx).reply(ctx);
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Code that runs around the rest of the handler chain.
///
/// Implemented for closures of the form `Fn(&mut Context, Next<'_>)` and for
/// dedicated types such as [`Instrument`](crate::middleware::Instrument).
/// Calling [`Next::run`] hands control to the rest of the chain; returning
/// without calling it short-circuits the request.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context, next: Next<'_>);
}

impl<F> Middleware for F
where
    F: Fn(&mut Context, Next<'_>) + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        self(ctx, next)
    }
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The remainder of the chain: middleware not yet run, then the endpoint.
pub struct Next<'a> {
    middleware: &'a [BoxedMiddleware],
    endpoint: &'a (dyn ErasedHandler + Send + Sync),
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        middleware: &'a [BoxedMiddleware],
        endpoint: &'a (dyn ErasedHandler + Send + Sync),
    ) -> Self {
        Self { middleware, endpoint }
    }

    /// Runs the rest of the chain to completion.
    pub fn run(self, ctx: &mut Context) {
        match self.middleware.split_first() {
            Some((first, rest)) => first.handle(ctx, Next::new(rest, self.endpoint)),
            None => self.endpoint.call(ctx),
        }
    }
}
