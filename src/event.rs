//! Core event type for Switchyard.
//!
//! An [`Event`] is an immutable record carrying one routing discriminant, its
//! `category`, plus an open bag of attributes the router never interprets.
//! Sources produce events, the router moves them around as `Arc<Event>`, and
//! handlers read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An event flowing through the router.
///
/// # Example
///
/// ```json
/// {
///   "category": "image.pull",
///   "source": "docker",
///   "attributes": { "image": "alpine:3.20", "digest": "sha256:..." },
///   "timestamp": "2026-10-17T10:00:00Z"
/// }
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Event {
    /// Routing key. An empty category marks the event as malformed.
    #[serde(default)]
    pub category: String,

    /// Origin of the event (e.g. "docker", "registry")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Category-specific data, opaque to the router
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,

    /// When the event was produced upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    /// Create an event with a category and no attributes.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            source: None,
            attributes: Map::new(),
            timestamp: None,
        }
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a single attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace the attribute bag with the fields of a JSON object.
    ///
    /// Non-object values are stored under a single `"value"` key.
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = match attributes {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// An event is routable only when it carries a non-blank category.
    pub fn is_well_formed(&self) -> bool {
        !self.category.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_deserialize() {
        let json_str = r#"{
            "category": "image.pull",
            "source": "docker",
            "attributes": {"image": "alpine:3.20"}
        }"#;

        let event: Event = serde_json::from_str(json_str).unwrap();
        assert_eq!(event.category, "image.pull");
        assert_eq!(event.source.as_deref(), Some("docker"));
        assert_eq!(event.attribute("image"), Some(&json!("alpine:3.20")));
        assert!(event.timestamp.is_none());
        assert!(event.is_well_formed());
    }

    #[test]
    fn test_missing_category_is_malformed() {
        let event: Event = serde_json::from_str(r#"{"source": "docker"}"#).unwrap();
        assert_eq!(event.category, "");
        assert!(!event.is_well_formed());

        assert!(!Event::new("   ").is_well_formed());
    }

    #[test]
    fn test_event_serialize_omits_empty_fields() {
        let json_str = serde_json::to_string(&Event::new("container.start")).unwrap();
        assert_eq!(json_str, r#"{"category":"container.start"}"#);
    }

    #[test]
    fn test_event_builder() {
        let ts: DateTime<Utc> = "2026-10-17T10:00:00Z".parse().unwrap();
        let event = Event::new("image.push")
            .with_source("registry")
            .with_attribute("tag", "latest")
            .with_attribute("size", 1024)
            .with_timestamp(ts);

        assert_eq!(event.source.as_deref(), Some("registry"));
        assert_eq!(event.attributes.len(), 2);
        assert_eq!(event.attribute("size"), Some(&json!(1024)));
        assert_eq!(event.timestamp, Some(ts));
    }

    #[test]
    fn test_with_attributes_wraps_scalars() {
        let event = Event::new("x").with_attributes(json!(42));
        assert_eq!(event.attribute("value"), Some(&json!(42)));

        let event = Event::new("x").with_attributes(json!({"a": 1, "b": 2}));
        assert_eq!(event.attributes.len(), 2);

        let event = Event::new("x").with_attributes(Value::Null);
        assert!(event.attributes.is_empty());
    }
}
