//! Handler capability for Switchyard.
//!
//! Handlers are actions run in response to events. The [`Handler`] trait is
//! the only thing the router knows about them: it gets a name for logging and
//! an async `handle` call per event. What a handler does with the event is its
//! own business.
//!
//! ## Built-in Handlers
//!
//! - [`LogHandler`]: Structured logging of events
//!
//! ## Writing a Handler
//!
//! ```rust,ignore
//! use switchyard::{Event, Handler, HandlerError, HandlerOutcome};
//! use async_trait::async_trait;
//!
//! struct PruneImages;
//!
//! #[async_trait]
//! impl Handler for PruneImages {
//!     fn name(&self) -> &str {
//!         "prune-images"
//!     }
//!
//!     async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError> {
//!         // ...
//!         Ok(HandlerOutcome::success(self.name(), "pruned"))
//!     }
//! }
//! ```

pub mod log;

use crate::event::Event;
use async_trait::async_trait;
use thiserror::Error;

pub use log::LogHandler;

/// Errors a handler can report for a single event.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The event lacked something the handler needs
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while handling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The handler panicked; the router caught the unwind
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Generic handler failure
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Result of a successful handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Name of the handler that produced this outcome
    pub handler_name: String,

    /// Human-readable message describing what happened
    pub message: String,
}

impl HandlerOutcome {
    /// Create a success outcome with a message
    pub fn success(handler_name: &str, message: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.to_string(),
            message: message.into(),
        }
    }
}

/// The handler capability.
///
/// Implementations must be `Send + Sync`: one handler instance is shared by
/// every worker that processes its category, possibly at the same time.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs (e.g. "log", "prune-images")
    fn name(&self) -> &str;

    /// Handle one event.
    ///
    /// An `Err` is logged by the router and does not stop the remaining
    /// handlers registered for the same category.
    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rejecting;

    #[async_trait]
    impl Handler for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError> {
            Err(HandlerError::InvalidEvent(format!(
                "no digest on {}",
                event.category
            )))
        }
    }

    #[tokio::test]
    async fn test_handler_error_display() {
        let err = Rejecting.handle(&Event::new("image.pull")).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid event: no digest on image.pull");

        let err = HandlerError::Failed("disk full".into());
        assert_eq!(err.to_string(), "handler failed: disk full");
    }

    #[test]
    fn test_handler_outcome() {
        let outcome = HandlerOutcome::success("test", "Done");
        assert_eq!(outcome.handler_name, "test");
        assert_eq!(outcome.message, "Done");
    }
}
