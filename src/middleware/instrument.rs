//! APM transaction middleware.
//!
//! One transaction per request:
//!
//! ```text
//! request ──▶ Instrument ──▶ start_transaction("GET app::hello")
//!                 │          bind Txn into ctx, wrap the writer
//!                 ▼
//!            next.run(ctx)   handlers write, notice errors
//!                 │
//!                 ▼          attribute pending status and body size
//!            Instrument ──▶  resolve final name, end(), unwrap the writer
//! ```
//!
//! Without an application (or with [`InstrumentConfig::enabled`] off, or
//! when the application declines to start a transaction) the middleware only
//! calls `next.run(ctx)`: nothing is allocated, nothing is wrapped.

use std::env;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, trace, warn};

use super::txn_writer::{TxnWriter, finalize};
use crate::apm::{Application, PanicError, Txn, WebRequest};
use crate::context::Context;
use crate::handler::{Middleware, Next};
use crate::naming::Naming;
use crate::router::panic_message;

/// Instrumentation settings.
#[derive(Clone, Debug)]
pub struct InstrumentConfig {
    /// Master switch. Default `true`.
    pub enabled: bool,
    /// How transactions are named. Default [`Naming::Handler`].
    pub naming: Naming,
    /// Notice a panic escaping the chain as an error. Default `false`.
    pub record_panics: bool,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self { enabled: true, naming: Naming::Handler, record_panics: false }
    }
}

impl InstrumentConfig {
    /// Reads `TSU_APM_ENABLED`, `TSU_APM_NAMING` and `TSU_APM_RECORD_PANICS`.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// keep their defaults too.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("TSU_APM_ENABLED") {
            config.enabled = parse_or_default("TSU_APM_ENABLED", &v, parse_bool, config.enabled);
        }
        if let Some(v) = lookup("TSU_APM_NAMING") {
            config.naming = parse_or_default("TSU_APM_NAMING", &v, |s| s.parse().ok(), config.naming);
        }
        if let Some(v) = lookup("TSU_APM_RECORD_PANICS") {
            config.record_panics =
                parse_or_default("TSU_APM_RECORD_PANICS", &v, parse_bool, config.record_panics);
        }
        config
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_or_default<T: std::fmt::Display + Copy>(
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    default: T,
) -> T {
    parse(value).unwrap_or_else(|| {
        warn!(key, value, %default, "invalid instrumentation setting, using default");
        default
    })
}

/// Middleware that wraps every request in an APM transaction.
///
/// Install it first so it sees the whole chain:
///
/// ```rust
/// use tsu_apm::{Context, Router, apm::LogReporter, middleware::Instrument};
///
/// fn hello(ctx: &mut Context) { ctx.write_str("hello"); }
///
/// let app = Router::new()
///     .layer(Instrument::new(LogReporter::new()))
///     .get("/hello", hello);
/// ```
#[derive(Clone, Default)]
pub struct Instrument {
    app: Option<Arc<dyn Application>>,
    config: InstrumentConfig,
}

impl Instrument {
    pub fn new(app: impl Application) -> Self {
        Self { app: Some(Arc::new(app)), config: InstrumentConfig::default() }
    }

    /// Instruments with `app` if present; passes requests straight through
    /// otherwise.
    pub fn from_option(app: Option<Arc<dyn Application>>) -> Self {
        Self { app, config: InstrumentConfig::default() }
    }

    /// A middleware that never instruments.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: InstrumentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn naming(mut self, naming: Naming) -> Self {
        self.config.naming = naming;
        self
    }

    pub fn record_panics(mut self, record: bool) -> Self {
        self.config.record_panics = record;
        self
    }

    fn application(&self) -> Option<&dyn Application> {
        self.app.as_deref().filter(|_| self.config.enabled)
    }
}

impl Middleware for Instrument {
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        let Some(app) = self.application() else {
            return next.run(ctx);
        };

        let provisional = self.config.naming.transaction_name(ctx);
        let request = WebRequest::from(ctx.request());
        let Some(txn) = app.start_transaction(&provisional, &request) else {
            trace!(name = %provisional, "application declined transaction");
            return next.run(ctx);
        };
        let txn = Txn::new(txn);

        txn.set_web_request(&request);
        ctx.extensions_mut().insert(txn.clone());
        ctx.wrap_writer(|inner| Box::new(TxnWriter::new(inner, txn.clone())));
        let wrapper = ctx.writer() as *const _ as *const ();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| next.run(ctx)));

        // The router answers an uncommitted panicking request with 500.
        let status = match outcome {
            Ok(()) => ctx.writer().status(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        finalize(ctx.writer(), &txn, status);

        if !txn.name_fixed() {
            let name = self.config.naming.transaction_name(ctx);
            if name != provisional {
                txn.rename(&name);
            }
        }

        if let Err(payload) = &outcome {
            if self.config.record_panics {
                txn.notice_error(&PanicError(panic_message(&**payload).to_owned()));
            }
        }

        txn.end();
        ctx.extensions_mut().remove::<Txn>();
        if ptr::addr_eq(ctx.writer(), wrapper) {
            ctx.unwrap_writer();
        } else {
            debug!("response writer re-wrapped inside the chain, leaving it in place");
        }

        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_config_defaults_when_unset() {
        let config = InstrumentConfig::from_lookup(lookup(&[]));
        assert!(config.enabled);
        assert_eq!(config.naming, Naming::Handler);
        assert!(!config.record_panics);
    }

    #[test]
    fn env_config_reads_every_setting() {
        let config = InstrumentConfig::from_lookup(lookup(&[
            ("TSU_APM_ENABLED", "off"),
            ("TSU_APM_NAMING", "route"),
            ("TSU_APM_RECORD_PANICS", "1"),
        ]));
        assert!(!config.enabled);
        assert_eq!(config.naming, Naming::Route);
        assert!(config.record_panics);
    }

    #[test]
    fn env_config_ignores_garbage() {
        let config = InstrumentConfig::from_lookup(lookup(&[
            ("TSU_APM_ENABLED", "maybe"),
            ("TSU_APM_NAMING", "path"),
        ]));
        assert!(config.enabled);
        assert_eq!(config.naming, Naming::Handler);
    }

    #[test]
    fn disabled_config_bypasses_application() {
        let recorder = crate::apm::Recorder::new();
        let mw = Instrument::new(recorder.clone())
            .config(InstrumentConfig { enabled: false, ..Default::default() });
        assert!(mw.application().is_none());
        assert_eq!(recorder.started(), 0);
    }
}
