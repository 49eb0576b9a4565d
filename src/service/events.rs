//! Event fan-out for task services
//!
//! Every event goes onto a broadcast channel. Raw receivers can be taken with
//! [`EventBus::subscribe`]; registered handlers are invoked by a single
//! dispatcher task so a slow or panicking handler never blocks a worker.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::{EventType, TaskEvent};

/// Callback invoked for matching task events
pub type EventHandler<O> = Arc<dyn Fn(&TaskEvent<O>) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription<O> {
    filter: Option<EventType>,
    handler: EventHandler<O>,
}

impl<O> Subscription<O> {
    fn matches(&self, event: EventType) -> bool {
        self.filter.is_none_or(|f| f == event)
    }
}

pub(crate) struct EventBus<O> {
    sender: broadcast::Sender<TaskEvent<O>>,
    // Receiver reserved for the dispatcher, created up front so nothing
    // emitted before `start` is lost
    dispatch_rx: Mutex<Option<broadcast::Receiver<TaskEvent<O>>>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription<O>>>,
    next_subscription: AtomicU64,
}

impl<O: Clone + Send + Sync + 'static> EventBus<O> {
    pub(crate) fn new(buffer: usize) -> Self {
        let (sender, dispatch_rx) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Publish an event. Having no receivers is not an error.
    pub(crate) fn emit(&self, event: TaskEvent<O>) {
        self.sender.send(event).ok();
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<TaskEvent<O>> {
        self.sender.subscribe()
    }

    pub(crate) fn add_handler(
        &self,
        filter: Option<EventType>,
        handler: EventHandler<O>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Subscription { filter, handler });
        id
    }

    pub(crate) fn remove_handler(&self, id: SubscriptionId) -> bool {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn dispatch(&self, event: &TaskEvent<O>) {
        // Snapshot so handlers may (un)subscribe from inside a callback
        let handlers: Vec<EventHandler<O>> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.matches(event.event))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    task_id = %event.task_id,
                    event = ?event.event,
                    "event handler panicked"
                );
            }
        }
    }

    /// Spawn the dispatcher. Returns `None` if it was already started.
    pub(crate) fn spawn_dispatcher(
        self: &Arc<Self>,
        stop: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let mut rx = self
            .dispatch_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let bus = Arc::clone(self);

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => bus.dispatch(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event dispatcher lagged, handlers missed events");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        // Deliver whatever was emitted before the stop
                        loop {
                            match rx.try_recv() {
                                Ok(event) => bus.dispatch(&event),
                                Err(TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            tracing::debug!("event dispatcher stopped");
        }))
    }
}
