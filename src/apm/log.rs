//! Backend that reports finished transactions as `tracing` events.

use std::sync::Arc;

use tracing::{info, warn};

use super::event::{EventTransaction, StatusPolicy, TransactionEvent};
use super::{Application, Transaction, WebRequest};

/// An [`Application`] that logs every finished transaction under the
/// `tsu_apm::transaction` target: `info` when healthy, `warn` when the
/// transaction carries errors.
#[derive(Clone, Debug, Default)]
pub struct LogReporter {
    policy: StatusPolicy,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StatusPolicy) -> Self {
        Self { policy }
    }
}

impl Application for LogReporter {
    fn start_transaction(&self, name: &str, _request: &WebRequest<'_>) -> Option<Box<dyn Transaction>> {
        Some(Box::new(EventTransaction::new(name, self.policy.clone(), Arc::new(report))))
    }
}

fn report(event: TransactionEvent) {
    let status = event.status.map(|s| s.as_u16()).unwrap_or_default();
    let duration_ms = event.duration.as_secs_f64() * 1000.0;
    let method = event.request_method.as_deref().unwrap_or("-");
    let uri = event.request_uri.as_deref().unwrap_or("-");

    if event.error_count() > 0 {
        let first_error = event.errors.first().map(|e| e.message.as_str()).unwrap_or("");
        warn!(
            target: "tsu_apm::transaction",
            name = %event.name,
            method,
            uri,
            status,
            duration_ms,
            errors = event.error_count(),
            first_error,
            "transaction finished with errors"
        );
    } else {
        info!(
            target: "tsu_apm::transaction",
            name = %event.name,
            method,
            uri,
            status,
            duration_ms,
            "transaction finished"
        );
    }
}
