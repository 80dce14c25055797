//! Worker Execution Unit - runs one event through its handlers.
//!
//! [`execute`] owns the [`WorkerToken`] for the whole execution. The token is
//! dropped, and so returned to the pool, when the execution finishes, when a
//! handler fails, or when the task running it is cancelled.
//!
//! Handlers for an event run one after another in registration order. A
//! handler that returns an error or panics is logged and the next handler
//! still runs; nothing escapes to the dispatch loop.

use crate::event::Event;
use crate::handler::{Handler, HandlerError, HandlerOutcome};
use crate::pool::WorkerToken;
use crate::registry::HandlerRegistry;
use crate::stats::DispatchStats;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A handler failure recorded during one execution.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler_name: String,
    pub error: HandlerError,
}

/// What happened to one event.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Category of the event (empty for malformed events)
    pub category: String,

    /// Number of handlers invoked
    pub handlers_invoked: usize,

    /// Failures, in invocation order
    pub failures: Vec<HandlerFailure>,

    /// True when the event was malformed or had no handlers
    pub skipped: bool,
}

impl ExecutionReport {
    /// True if every invoked handler succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Process one event while holding `token`.
pub async fn execute(
    event: Arc<Event>,
    token: WorkerToken,
    registry: Arc<HandlerRegistry>,
    stats: Arc<DispatchStats>,
) -> ExecutionReport {
    let report = run_handlers(&event, &registry, &stats).await;

    drop(token);
    stats.record_completed();

    report
}

async fn run_handlers(
    event: &Event,
    registry: &HandlerRegistry,
    stats: &DispatchStats,
) -> ExecutionReport {
    let mut report = ExecutionReport {
        category: event.category.clone(),
        ..Default::default()
    };

    if !event.is_well_formed() {
        debug!(event = ?event, "Skipping malformed event");
        report.skipped = true;
        stats.record_skipped();
        return report;
    }

    let handlers = match registry.handlers_for(&event.category) {
        Some(handlers) => handlers,
        None => {
            debug!(category = %event.category, "No handlers registered for category");
            report.skipped = true;
            stats.record_skipped();
            return report;
        }
    };

    debug!(
        category = %event.category,
        handler_count = handlers.len(),
        "Processing event"
    );

    for handler in handlers {
        report.handlers_invoked += 1;

        match invoke(handler.as_ref(), event).await {
            Ok(outcome) => {
                stats.record_invocation(false);
                debug!(
                    handler = %handler.name(),
                    message = %outcome.message,
                    "Handler succeeded"
                );
            }
            Err(err) => {
                stats.record_invocation(true);
                error!(
                    category = %event.category,
                    handler = %handler.name(),
                    error = %err,
                    "Error processing event"
                );
                report.failures.push(HandlerFailure {
                    handler_name: handler.name().to_string(),
                    error: err,
                });
            }
        }
    }

    if !report.is_success() {
        warn!(
            category = %event.category,
            handlers_invoked = report.handlers_invoked,
            failures = report.failure_count(),
            "Event processed with failures"
        );
    }

    report
}

/// Run a handler, turning a panic into [`HandlerError::Panicked`].
async fn invoke(
    handler: &dyn Handler,
    event: &Event,
) -> Result<HandlerOutcome, HandlerError> {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
