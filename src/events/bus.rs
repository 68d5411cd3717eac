//! In-process event bus
//!
//! Producers call [`EventBus::publish`], which only enqueues. A supervised
//! drain task takes items off the queue in publish order and hands each one to
//! every subscriber of its topic, one subscriber at a time. A subscriber that
//! fails or panics is logged and skipped; the rest still run.

use super::{Action, BusEvent};
use crate::error::{PaladinError, PaladinResult};
use crate::{EVENT_BUS_TARGET, Error};
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A handler registered under a topic
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used when logging failures
    fn name(&self) -> &str;

    /// Handle one event. Signals carry no payload beyond their topic.
    async fn handle(&self, event: BusEvent) -> Result<(), Error>;
}

/// Adapter turning an async closure into a [`Subscriber`]
pub struct FnSubscriber<F> {
    name: String,
    handler: F,
}

impl<F> FnSubscriber<F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: BusEvent) -> Result<(), Error> {
        (self.handler)(event).await
    }
}

/// Async single-process queue with named-topic fan-out
#[derive(Clone)]
pub struct EventBus(Arc<BusInner>);

struct BusInner {
    topics: DashMap<String, Vec<Arc<dyn Subscriber>>>,
    sender: parking_lot::Mutex<Option<UnboundedSender<BusEvent>>>,
    // Outlives any single drain task so a restarted one resumes the same queue
    receiver: AsyncMutex<UnboundedReceiver<BusEvent>>,
    process: AtomicBool,
    supervisor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    pending: AtomicUsize,
    processed: AtomicUsize,
    idle: Notify,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.0.topics.len())
            .field("pending", &self.pending())
            .field("processed", &self.processed())
            .field("running", &self.is_running())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self(Arc::new(BusInner {
            topics: DashMap::new(),
            sender: parking_lot::Mutex::new(Some(tx)),
            receiver: AsyncMutex::new(rx),
            process: AtomicBool::new(false),
            supervisor: parking_lot::Mutex::new(None),
            pending: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            idle: Notify::new(),
        }))
    }

    /// Register `subscriber` under `topic`. Registering twice delivers twice.
    pub fn subscribe(&self, topic: impl Into<String>, subscriber: Arc<dyn Subscriber>) {
        let topic = topic.into();
        debug!(target: EVENT_BUS_TARGET, topic = %topic, handler = %subscriber.name(), "Subscribed");
        self.0.topics.entry(topic).or_default().push(subscriber);
    }

    /// Register an async closure under `topic`
    pub fn subscribe_fn<F, Fut>(&self, topic: impl Into<String>, name: impl Into<String>, handler: F)
    where
        F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.subscribe(topic, Arc::new(FnSubscriber::new(name, handler)));
    }

    /// Number of subscribers currently registered under `topic`
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.0.topics.get(topic).map_or(0, |subs| subs.len())
    }

    /// Enqueue an action or a bare topic signal.
    ///
    /// Returns as soon as the item is queued. If the bus has been started and
    /// its drain task is gone, a new one is spawned.
    ///
    /// # Errors
    /// Returns [`PaladinError::BusClosed`] once the bus has been shut down.
    pub fn publish(&self, event: impl Into<BusEvent>) -> PaladinResult<()> {
        let event = event.into();
        {
            let sender = self.0.sender.lock();
            let Some(tx) = sender.as_ref() else {
                warn!(target: EVENT_BUS_TARGET, topic = %event.topic(), "Dropping event published after shutdown");
                return Err(PaladinError::BusClosed);
            };
            self.0.pending.fetch_add(1, Ordering::SeqCst);
            if tx.send(event).is_err() {
                self.0.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(PaladinError::BusClosed);
            }
        }

        if self.0.process.load(Ordering::SeqCst) {
            self.ensure_running();
        }
        Ok(())
    }

    /// Publish an action on its own topic
    ///
    /// # Errors
    /// Returns [`PaladinError::BusClosed`] once the bus has been shut down.
    pub fn publish_action(&self, action: Action) -> PaladinResult<()> {
        self.publish(action)
    }

    /// Start delivering queued and future events
    pub fn start(&self) {
        self.0.process.store(true, Ordering::SeqCst);
        self.ensure_running();
        info!(target: EVENT_BUS_TARGET, "Event bus started");
    }

    /// Whether a supervisor task is alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0
            .supervisor
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Items queued but not yet delivered
    #[must_use]
    pub fn pending(&self) -> usize {
        self.0.pending.load(Ordering::SeqCst)
    }

    /// Items fully delivered since creation
    #[must_use]
    pub fn processed(&self) -> usize {
        self.0.processed.load(Ordering::SeqCst)
    }

    /// Wait until every queued item has been delivered
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.0.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting events, deliver everything still queued, then stop.
    ///
    /// In-flight subscribers run to completion.
    pub async fn shutdown(&self) {
        let sender = self.0.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let queued = self.pending();
        info!(target: EVENT_BUS_TARGET, queued = queued, "Event bus shutting down");

        if queued > 0 {
            self.0.process.store(true, Ordering::SeqCst);
            self.ensure_running();
        }

        let handle = self.0.supervisor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(target: EVENT_BUS_TARGET, "Event bus supervisor ended abnormally: {e}");
            }
        }
        self.0.process.store(false, Ordering::SeqCst);
        info!(target: EVENT_BUS_TARGET, processed = self.processed(), "Event bus stopped");
    }

    fn ensure_running(&self) {
        let mut supervisor = self.0.supervisor.lock();
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(target: EVENT_BUS_TARGET, "No async runtime available to run the event bus");
            return;
        };
        if supervisor.is_some() {
            warn!(target: EVENT_BUS_TARGET, "Event bus supervisor was not running, restarting it");
        }
        *supervisor = Some(runtime.spawn(supervise(Arc::clone(&self.0))));
    }
}

/// Keep a drain task alive until the queue is closed and empty
async fn supervise(inner: Arc<BusInner>) {
    loop {
        let drain = tokio::spawn(drain(Arc::clone(&inner)));
        match drain.await {
            Ok(()) => break,
            Err(e) if e.is_panic() && inner.process.load(Ordering::SeqCst) => {
                error!(target: EVENT_BUS_TARGET, "Event drain task panicked, restarting");
            }
            Err(e) => {
                error!(target: EVENT_BUS_TARGET, "Event drain task stopped: {e}");
                break;
            }
        }
    }
}

async fn drain(inner: Arc<BusInner>) {
    let mut rx = inner.receiver.lock().await;
    while let Some(event) = rx.recv().await {
        dispatch(&inner, event).await;
        inner.processed.fetch_add(1, Ordering::SeqCst);
        if inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.idle.notify_waiters();
        }
    }
    debug!(target: EVENT_BUS_TARGET, "Event queue closed");
}

/// Deliver `event` to each subscriber of its topic in turn
async fn dispatch(inner: &BusInner, event: BusEvent) {
    let subscribers: Vec<Arc<dyn Subscriber>> = inner
        .topics
        .get(event.topic())
        .map(|subs| subs.clone())
        .unwrap_or_default();

    if subscribers.is_empty() {
        debug!(target: EVENT_BUS_TARGET, topic = %event.topic(), "No subscribers for topic");
        return;
    }

    for subscriber in subscribers {
        let name = subscriber.name().to_string();
        let delivered = event.clone();
        // Each handler runs in its own task so a panic stays contained
        let outcome = tokio::spawn(async move { subscriber.handle(delivered).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                target: EVENT_BUS_TARGET,
                topic = %event.topic(),
                handler = %name,
                event = ?event,
                "Subscriber failed: {e}"
            ),
            Err(e) => error!(
                target: EVENT_BUS_TARGET,
                topic = %event.topic(),
                handler = %name,
                event = ?event,
                "Subscriber panicked: {e}"
            ),
        }
    }
}
