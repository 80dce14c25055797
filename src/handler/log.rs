//! Log Handler - structured logging of events.
//!
//! [`LogHandler`] writes each event it receives through `tracing`, tagged with
//! a prefix so several log handlers can be told apart (e.g. "audit", "debug").

use super::{Handler, HandlerError, HandlerOutcome};
use crate::event::Event;
use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn, Level};

/// A handler that logs events using structured logging.
#[derive(Debug, Clone)]
pub struct LogHandler {
    prefix: String,
    level: Level,
}

impl LogHandler {
    /// Create a LogHandler with the default "event" prefix at INFO level
    pub fn new() -> Self {
        Self {
            prefix: "event".to_string(),
            level: Level::INFO,
        }
    }

    /// Create a LogHandler with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::new()
        }
    }

    /// Emit at a different level
    pub fn at_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for LogHandler {
    fn default() -> Self {
        Self::new()
    }
}

// tracing macros need a constant level, hence the match
macro_rules! log_event {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::TRACE => trace!($($arg)+),
            Level::DEBUG => debug!($($arg)+),
            Level::INFO => info!($($arg)+),
            Level::WARN => warn!($($arg)+),
            _ => error!($($arg)+),
        }
    };
}

#[async_trait]
impl Handler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, HandlerError> {
        let attributes = serde_json::to_string(&event.attributes)?;
        let source = event.source.as_deref().unwrap_or("-");

        log_event!(
            self.level,
            prefix = %self.prefix,
            category = %event.category,
            source = %source,
            attributes = %attributes,
            "[{}] {}",
            self.prefix,
            event.category
        );

        Ok(HandlerOutcome::success(
            self.name(),
            format!("Logged {} with prefix '{}'", event.category, self.prefix),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_handler() {
        let handler = LogHandler::new();
        let event = Event::new("image.pull").with_attribute("image", "alpine");

        let outcome = handler.handle(&event).await.unwrap();
        assert_eq!(outcome.handler_name, "log");
        assert!(outcome.message.contains("image.pull"));
        assert!(outcome.message.contains("event"));
    }

    #[tokio::test]
    async fn test_log_handler_with_prefix_and_level() {
        let handler = LogHandler::with_prefix("audit").at_level(Level::DEBUG);
        assert_eq!(handler.prefix(), "audit");
        assert_eq!(handler.level(), Level::DEBUG);

        let outcome = handler.handle(&Event::new("image.delete")).await.unwrap();
        assert!(outcome.message.contains("audit"));
    }
}
