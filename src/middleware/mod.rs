//! Middleware layer.
//!
//! Middleware wraps the handler chain and is the place for cross-cutting
//! concerns. Any `Fn(&mut Context, Next<'_>)` closure is middleware; install
//! it with [`Router::layer`](crate::Router::layer).
//!
//! Built-in middleware:
//! - [`Instrument`] — one APM transaction per request: name, status,
//!   errors, timing

pub mod instrument;
mod txn_writer;

pub use instrument::{Instrument, InstrumentConfig};
pub use crate::naming::Naming;
