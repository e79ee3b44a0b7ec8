//! # tsu-apm
//!
//! A minimal HTTP framework for Rust services behind a reverse proxy, with
//! request-scoped APM transactions built in.
//!
//! ## The contract
//!
//! nginx handles TLS, rate limiting, slow clients, and body-size limits.
//! tsu does not. What is left is routing, a handler chain, and knowing what
//! every request did:
//!
//! - Radix-tree routing — O(path-length) lookup via [`matchit`]
//! - A middleware chain around synchronous handlers
//! - One transaction per request: name, status, errors, timing
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use tsu_apm::{Context, Router, Server, apm::LogReporter, middleware::Instrument};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .layer(Instrument::new(LogReporter::new()))
//!         .get("/users/{id}", get_user)
//!         .post("/users", create_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! fn get_user(ctx: &mut Context) -> String {
//!     format!(r#"{{"id":"{}"}}"#, ctx.param("id").unwrap_or("unknown"))
//! }
//!
//! fn create_user(ctx: &mut Context) {
//!     if ctx.request().body().is_empty() {
//!         let err = std::io::Error::other("empty body");
//!         ctx.transaction().notice_error(&err);
//!         ctx.status(StatusCode::BAD_REQUEST);
//!         return;
//!     }
//!     ctx.string(StatusCode::CREATED, "created");
//! }
//! ```
//!
//! The transactions above are named after the handlers that served them,
//! e.g. `GET my_app::get_user`. See [`middleware::Instrument`] for the
//! lifecycle and [`apm`] for the backend contracts.

mod context;
mod error;
mod handler;
mod naming;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod apm;
pub mod middleware;

pub use context::{Context, RouteInfo};
pub use error::Error;
pub use handler::{Handler, Middleware, Next};
pub use naming::UNNAMED_HANDLER;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Reply, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use writer::{BufferedWriter, ResponseWriter};
