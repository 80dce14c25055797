//! Event sources - the upstream side of the router.
//!
//! An [`EventSource`] delivers events into any [`EventSink`] subscribed to it
//! until that sink is unsubscribed. How a source talks to its upstream engine
//! (sockets, TLS, credentials) is the source's own concern.
//!
//! Two adapters ship with the crate:
//!
//! - [`BroadcastSource`]: in-process hub; every published event goes to every
//!   subscribed sink
//! - [`LineSource`]: reads newline-delimited JSON events from an async reader
//!   (stdin, a file, a socket) and forwards them to a single subscriber

use crate::event::Event;
use crate::queue::EventSink;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors raised while attaching to or detaching from a source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The sink was never subscribed, or was already removed
    #[error("sink is not subscribed to source '{0}'")]
    NotSubscribed(String),

    /// The source cannot take another subscriber
    #[error("source '{0}' already has a subscriber")]
    AlreadySubscribed(String),

    /// The source's input is gone and it cannot produce events anymore
    #[error("source '{0}' is exhausted")]
    Exhausted(String),

    /// Upstream connection failure
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Something that produces events into subscribed sinks.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Start delivering events into `sink`.
    async fn subscribe(&self, sink: EventSink) -> Result<(), SourceError>;

    /// Stop delivering events into `sink`.
    async fn unsubscribe(&self, sink: &EventSink) -> Result<(), SourceError>;
}

/// In-process event hub.
///
/// [`publish`](BroadcastSource::publish) waits on each full sink in turn, so a
/// slow router slows the publisher down rather than losing events.
pub struct BroadcastSource {
    name: String,
    sinks: Mutex<Vec<EventSink>>,
}

impl BroadcastSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Deliver an event to every subscribed sink.
    ///
    /// Returns the number of sinks that accepted it. Sinks whose queue has
    /// been dropped are pruned.
    pub async fn publish(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let sinks = self.snapshot();
        let mut delivered = 0;

        for sink in sinks {
            match sink.send(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(source = %self.name, "Pruning closed sink");
                    self.remove(&sink);
                }
            }
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn snapshot(&self) -> Vec<EventSink> {
        self.lock().clone()
    }

    fn remove(&self, sink: &EventSink) -> bool {
        let mut sinks = self.lock();
        let before = sinks.len();
        sinks.retain(|s| !s.same_queue(sink));
        sinks.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EventSink>> {
        // the guarded Vec is valid after any panic, so recover from poisoning
        self.sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventSource for BroadcastSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self, sink: EventSink) -> Result<(), SourceError> {
        self.lock().push(sink);
        debug!(source = %self.name, "Sink subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, sink: &EventSink) -> Result<(), SourceError> {
        if self.remove(sink) {
            debug!(source = %self.name, "Sink unsubscribed");
            Ok(())
        } else {
            Err(SourceError::NotSubscribed(self.name.clone()))
        }
    }
}

/// Newline-delimited JSON reader.
///
/// Each non-blank line must deserialize into an [`Event`]; lines that don't
/// are logged and skipped. The reader is consumed by the first subscription,
/// so a `LineSource` can feed one router once.
pub struct LineSource<R> {
    name: String,
    reader: Mutex<Option<R>>,
    pump: Mutex<Option<(EventSink, JoinHandle<()>)>>,
    /// Set to the forwarded count when the reader hits end of input
    done: watch::Sender<Option<u64>>,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: Mutex::new(Some(reader)),
            pump: Mutex::new(None),
            done: watch::channel(None).0,
        }
    }

    /// True once the reader has hit end of input.
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait until the reader reaches end of input and return the number of
    /// events forwarded.
    ///
    /// Never resolves if the source is unsubscribed before reaching the end.
    pub async fn finished(&self) -> u64 {
        let mut done = self.done.subscribe();
        let forwarded = match done.wait_for(Option::is_some).await {
            Ok(count) => count.unwrap_or(0),
            // the sender lives in self, so this only happens during drop
            Err(_) => 0,
        };
        forwarded
    }
}

#[async_trait]
impl<R> EventSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self, sink: EventSink) -> Result<(), SourceError> {
        if lock(&self.pump).is_some() {
            return Err(SourceError::AlreadySubscribed(self.name.clone()));
        }
        let reader = lock(&self.reader)
            .take()
            .ok_or_else(|| SourceError::Exhausted(self.name.clone()))?;

        let handle = tokio::spawn(pump_lines(
            self.name.clone(),
            reader,
            sink.clone(),
            self.done.clone(),
        ));
        *lock(&self.pump) = Some((sink, handle));

        info!(source = %self.name, "Reading events");
        Ok(())
    }

    async fn unsubscribe(&self, sink: &EventSink) -> Result<(), SourceError> {
        let mut pump = lock(&self.pump);
        let subscribed = pump
            .as_ref()
            .is_some_and(|(current, _)| current.same_queue(sink));
        if !subscribed {
            return Err(SourceError::NotSubscribed(self.name.clone()));
        }

        if let Some((_, handle)) = pump.take() {
            handle.abort();
        }
        debug!(source = %self.name, "Sink unsubscribed");
        Ok(())
    }
}

async fn pump_lines<R>(
    name: String,
    reader: R,
    sink: EventSink,
    done: watch::Sender<Option<u64>>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(source = %name, error = %e, "Read error, stopping source");
                break;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(source = %name, line = line_no, error = %e, "Skipping unparseable event");
                continue;
            }
        };

        if sink.send(event).await.is_err() {
            debug!(source = %name, "Queue closed, stopping source");
            break;
        }
        forwarded += 1;
    }

    info!(source = %name, events = forwarded, "End of input");
    done.send_replace(Some(forwarded));
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
