//! Handler Registry - category to ordered handler list.
//!
//! Handlers are registered through a [`RegistryBuilder`] at startup; calling
//! [`RegistryBuilder::build`] freezes the mapping into a [`HandlerRegistry`]
//! that is never mutated again and can be shared between workers without
//! locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard::{HandlerRegistry, LogHandler};
//! use std::sync::Arc;
//!
//! let registry = HandlerRegistry::builder()
//!     .on("image.pull", Arc::new(LogHandler::with_prefix("audit")))
//!     .on("image.pull", Arc::new(LogHandler::new()))
//!     .on("image.delete", Arc::new(LogHandler::new()))
//!     .build();
//! ```

use crate::handler::Handler;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builder collecting handler registrations before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Vec<Arc<dyn Handler>>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a category.
    ///
    /// Multiple handlers can be registered for the same category; they run
    /// sequentially in registration order.
    pub fn on(mut self, category: &str, handler: Arc<dyn Handler>) -> Self {
        self.register(category, handler);
        self
    }

    /// Non-consuming form of [`on`](Self::on), for registering in a loop.
    pub fn register(&mut self, category: &str, handler: Arc<dyn Handler>) {
        debug!(
            category = %category,
            handler = %handler.name(),
            "Registering handler"
        );

        self.handlers
            .entry(category.to_string())
            .or_default()
            .push(handler);
    }

    /// Freeze the registrations.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable mapping from category to the handlers registered for it.
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry with no handlers; every event is a no-op.
    pub fn empty() -> Self {
        RegistryBuilder::new().build()
    }

    /// Handlers for a category, in registration order.
    ///
    /// `None` means nothing is registered, which is not an error.
    pub fn handlers_for(&self, category: &str) -> Option<&[Arc<dyn Handler>]> {
        self.handlers.get(category).map(Vec::as_slice)
    }

    pub fn has_handlers(&self, category: &str) -> bool {
        self.handlers.contains_key(category)
    }

    /// Number of categories with at least one handler.
    pub fn category_count(&self) -> usize {
        self.handlers.len()
    }

    /// Total number of registrations across all categories.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Registered categories, sorted for stable output.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        categories.sort_unstable();
        categories
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for category in self.categories() {
            let names: Vec<&str> = self.handlers[category].iter().map(|h| h.name()).collect();
            map.entry(&category, &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::LogHandler;

    #[test]
    fn test_registry_registration() {
        let registry = HandlerRegistry::builder()
            .on("image.pull", Arc::new(LogHandler::new()))
            .on("image.pull", Arc::new(LogHandler::with_prefix("audit")))
            .on("image.delete", Arc::new(LogHandler::new()))
            .build();

        assert!(registry.has_handlers("image.pull"));
        assert!(registry.has_handlers("image.delete"));
        assert!(!registry.has_handlers("image.push"));
        assert_eq!(registry.category_count(), 2);
        assert_eq!(registry.handler_count(), 3);
        assert_eq!(registry.categories(), vec!["image.delete", "image.pull"]);
    }

    #[test]
    fn test_lookup_preserves_registration_order() {
        let first = Arc::new(LogHandler::with_prefix("first"));
        let second = Arc::new(LogHandler::with_prefix("second"));

        let registry = HandlerRegistry::builder()
            .on("image.pull", first.clone())
            .on("image.pull", second.clone())
            .build();

        let handlers = registry.handlers_for("image.pull").unwrap();
        assert_eq!(handlers.len(), 2);
        assert!(Arc::ptr_eq(
            &handlers[0],
            &(first as Arc<dyn Handler>)
        ));
        assert!(Arc::ptr_eq(
            &handlers[1],
            &(second as Arc<dyn Handler>)
        ));
    }

    #[test]
    fn test_unknown_category_is_none() {
        let registry = HandlerRegistry::empty();
        assert!(registry.handlers_for("anything").is_none());
        assert_eq!(registry.handler_count(), 0);
    }

    #[test]
    fn test_register_in_loop() {
        let mut builder = RegistryBuilder::new();
        for category in ["a", "b", "a"] {
            builder.register(category, Arc::new(LogHandler::new()));
        }
        let registry = builder.build();
        assert_eq!(registry.handlers_for("a").map(<[_]>::len), Some(2));
        assert_eq!(format!("{:?}", registry), r#"{"a": ["log", "log"], "b": ["log"]}"#);
    }
}
