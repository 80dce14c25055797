//! # Switchyard
//!
//! A bounded-concurrency event router: events arrive from an upstream source,
//! are classified by category, and are handed to the handlers registered for
//! that category, with at most `pool_size` events in flight at once.
//!
//! ## Architecture
//!
//! ```text
//! EventSource -> EventQueue -> dispatch loop -> WorkerPool -> execute -> Handlers
//! ```
//!
//! ## Modules
//!
//! - [`event`]: The event record routed by category
//! - [`handler`]: Handler trait and built-in handlers
//! - [`registry`]: Immutable category to handler mapping
//! - [`queue`]: Bounded FIFO between source and router
//! - [`pool`]: Worker tokens bounding concurrency
//! - [`worker`]: Runs one event through its handlers
//! - [`router`]: Lifecycle and dispatch loop
//! - [`source`]: Event source adapters
//! - [`config`]: TOML configuration

pub mod config;
pub mod event;
pub mod handler;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod router;
pub mod source;
pub mod stats;
pub mod worker;

// Re-export commonly used types at crate root
pub use config::{RouterConfig, SwitchyardConfig};
pub use event::Event;
pub use handler::{Handler, HandlerError, HandlerOutcome, LogHandler};
pub use pool::{WorkerPool, WorkerToken};
pub use queue::{EventQueue, EventSink};
pub use registry::{HandlerRegistry, RegistryBuilder};
pub use router::{Router, RouterError, RouterState};
pub use source::{BroadcastSource, EventSource, LineSource, SourceError};
