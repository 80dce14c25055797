//! Event Router - queue, worker pool and registry behind a start/stop lifecycle.
//!
//! The [`Router`] subscribes its event queue to an [`EventSource`] and runs a
//! single dispatch loop that drains the queue. For every event the loop
//! acquires a worker token, spawns the execution, and moves on without waiting
//! for it, so at most `pool_size` events are handled at once.
//!
//! # Architecture
//!
//! ```text
//!  EventSource ──▶ EventQueue ──▶ dispatch loop ──acquire──▶ WorkerPool
//!  (subscribe)     (bounded)      (sequential)                  │
//!                                      │ spawn(event, token)    │
//!                                      ▼                        │
//!                                execute ──▶ HandlerRegistry    │
//!                                      │        [h1, h2, ...]   │
//!                                      └──── drop(token) ───────┘
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!   Stopped ──start()──▶ Started ──stop()──▶ Stopped
//!      │                    │
//!      └──── shutdown() ────┴──────▶ ShutDown
//! ```
//!
//! `start()` spawns the dispatch loop (once) and subscribes the queue.
//! `stop()` only detaches the source: in-flight executions finish normally
//! and the loop idles on the empty queue. Dropping the router, or calling
//! [`Router::shutdown`], ends the loop. `ShutDown` is final.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard::{BroadcastSource, Event, HandlerRegistry, LogHandler, Router, RouterConfig};
//! use std::sync::Arc;
//!
//! let registry = HandlerRegistry::builder()
//!     .on("image.pull", Arc::new(LogHandler::with_prefix("audit")))
//!     .build();
//! let source = Arc::new(BroadcastSource::new("docker"));
//!
//! let router = Router::new(RouterConfig::default(), registry, source.clone())?;
//! router.start().await?;
//! source.publish(Event::new("image.pull")).await;
//! router.stop().await?;
//! ```

use crate::config::{ConfigError, RouterConfig};
use crate::event::Event;
use crate::pool::{PoolError, WorkerPool};
use crate::queue::{EventQueue, EventSink};
use crate::registry::HandlerRegistry;
use crate::source::{EventSource, SourceError};
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::worker;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often shutdown checks whether accepted events have completed.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Errors surfaced by the router's public operations.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Subscribing to or unsubscribing from the source failed
    #[error("event source error: {0}")]
    Source(#[from] SourceError),

    /// `start()` was called while already started
    #[error("router is already started")]
    AlreadyStarted,

    /// `start()` was called after `shutdown()` ended the dispatch loop
    #[error("router has been shut down")]
    ShutDown,

    /// The construction parameters were rejected
    #[error("invalid router configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Lifecycle state of a [`Router`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Stopped,
    Started,
    /// Dispatch loop ended by [`Router::shutdown`]
    ShutDown,
}

/// Bounded-concurrency event router.
pub struct Router {
    registry: Arc<HandlerRegistry>,
    pool: Arc<WorkerPool>,
    stats: Arc<DispatchStats>,
    source: Arc<dyn EventSource>,
    sink: EventSink,
    /// Held until the first `start()` hands it to the dispatch loop
    queue: Mutex<Option<EventQueue>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// Async lock so start/stop are serialized across the source calls
    state: tokio::sync::Mutex<RouterState>,
}

impl Router {
    /// Build a router. Nothing runs until [`start`](Router::start).
    pub fn new(
        config: RouterConfig,
        registry: HandlerRegistry,
        source: Arc<dyn EventSource>,
    ) -> Result<Self, RouterError> {
        config.validate()?;

        let (sink, queue) = EventQueue::bounded(config.queue_capacity);
        let pool = WorkerPool::with_timeout(config.pool_size, config.acquire_timeout());

        info!(
            source = %source.name(),
            queue_capacity = config.queue_capacity,
            pool_size = config.pool_size,
            categories = ?registry.categories(),
            "Event router created"
        );

        Ok(Self {
            registry: Arc::new(registry),
            pool: Arc::new(pool),
            stats: Arc::new(DispatchStats::new()),
            source,
            sink,
            queue: Mutex::new(Some(queue)),
            dispatcher: Mutex::new(None),
            state: tokio::sync::Mutex::new(RouterState::Stopped),
        })
    }

    /// Begin routing: launch the dispatch loop and subscribe to the source.
    ///
    /// Fails with [`RouterError::AlreadyStarted`] if already started,
    /// [`RouterError::ShutDown`] after [`shutdown`](Router::shutdown), or with
    /// the source's error if subscription fails (the router stays stopped).
    pub async fn start(&self) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        match *state {
            RouterState::Started => {
                warn!(source = %self.source.name(), "Start requested on a started router");
                return Err(RouterError::AlreadyStarted);
            }
            RouterState::ShutDown => {
                warn!(source = %self.source.name(), "Start requested on a shut down router");
                return Err(RouterError::ShutDown);
            }
            RouterState::Stopped => {}
        }

        info!(source = %self.source.name(), "Starting event router.");
        self.spawn_dispatcher();
        self.source.subscribe(self.sink.clone()).await?;

        *state = RouterState::Started;
        Ok(())
    }

    /// Stop routing by unsubscribing from the source.
    ///
    /// A no-op if the router is not started. In-flight executions are not
    /// cancelled.
    pub async fn stop(&self) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        if *state != RouterState::Started {
            return Ok(());
        }

        self.detach().await?;
        *state = RouterState::Stopped;
        Ok(())
    }

    async fn detach(&self) -> Result<(), RouterError> {
        self.source.unsubscribe(&self.sink).await?;
        info!(
            source = %self.source.name(),
            in_flight = self.pool.in_use(),
            "Event router stopped"
        );
        Ok(())
    }

    /// Stop, let everything already accepted finish, then end the dispatch
    /// loop.
    ///
    /// Waits up to `grace` for queued and in-flight events to complete.
    /// Returns `true` if they all did; anything left after `grace` is
    /// abandoned. The router cannot be restarted afterwards.
    pub async fn shutdown(&self, grace: Duration) -> Result<bool, RouterError> {
        {
            let mut state = self.state.lock().await;
            if *state == RouterState::Started {
                self.detach().await?;
            }
            *state = RouterState::ShutDown;
        }

        let drained = tokio::time::timeout(grace, self.drained()).await.is_ok();

        if let Some(handle) = lock(&self.dispatcher).take() {
            handle.abort();
        }
        self.pool.close();

        let stats = self.stats.snapshot();
        if drained {
            info!(
                events_received = stats.events_received,
                events_completed = stats.events_completed,
                handler_failures = stats.handler_failures,
                "Event router shut down"
            );
        } else {
            warn!(
                pending = self.sink.accepted().saturating_sub(stats.events_completed),
                in_flight = self.pool.in_use(),
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace period elapsed with events still pending"
            );
        }

        Ok(drained)
    }

    /// Resolves once every accepted event has completed.
    async fn drained(&self) {
        while self.stats.snapshot().events_completed < self.sink.accepted() {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    pub async fn state(&self) -> RouterState {
        *self.state.lock().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Sink feeding this router's queue, for producers that are not an
    /// [`EventSource`].
    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    fn spawn_dispatcher(&self) {
        let mut dispatcher = lock(&self.dispatcher);
        if dispatcher.is_some() {
            return;
        }

        let Some(queue) = lock(&self.queue).take() else {
            // already handed out and later aborted by shutdown()
            return;
        };

        *dispatcher = Some(tokio::spawn(dispatch_loop(
            queue,
            self.pool.clone(),
            self.registry.clone(),
            self.stats.clone(),
        )));
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.dispatcher).take() {
            handle.abort();
        }
    }
}

/// Drain the queue, one event at a time, launching an execution per event.
async fn dispatch_loop(
    mut queue: EventQueue,
    pool: Arc<WorkerPool>,
    registry: Arc<HandlerRegistry>,
    stats: Arc<DispatchStats>,
) {
    debug!("Dispatch loop running");

    while let Some(event) = queue.recv().await {
        stats.record_received();
        log_dequeued(&event);

        let token = match pool.acquire().await {
            Ok(token) => token,
            Err(PoolError::Closed) => {
                debug!("Worker pool closed, ending dispatch loop");
                break;
            }
        };

        tokio::spawn(worker::execute(
            event,
            token,
            registry.clone(),
            stats.clone(),
        ));
    }

    debug!("Dispatch loop finished");
}

fn log_dequeued(event: &Event) {
    debug!(
        category = %event.category,
        source = event.source.as_deref().unwrap_or("-"),
        "Dequeued event"
    );
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
