//! Lifecycle observers.

use std::sync::{Arc, RwLock};

use {tokio::sync::broadcast, tracing::debug};

use crate::Directive;

/// Observer of directive lifecycle transitions.
///
/// Callbacks run on whichever task caused the transition (the processor's
/// worker, or the caller of a completion handle) and must return quickly.
pub trait DirectiveListener: Send + Sync {
    fn on_requested(&self, _directive: &Arc<Directive>) {}
    fn on_completed(&self, _directive: &Arc<Directive>) {}
    fn on_failed(&self, _directive: &Arc<Directive>, _description: &str) {}
    fn on_canceled(&self, _directive: &Arc<Directive>) {}
}

/// One lifecycle transition.
#[derive(Debug, Clone)]
pub enum DirectiveEvent {
    /// The directive is about to be handed to its handler.
    Requested { directive: Arc<Directive> },
    Completed { directive: Arc<Directive> },
    Failed {
        directive: Arc<Directive>,
        description: String,
    },
    /// The directive was superseded by a turn scrub.
    Canceled { directive: Arc<Directive> },
}

impl DirectiveEvent {
    pub fn directive(&self) -> &Arc<Directive> {
        match self {
            Self::Requested { directive }
            | Self::Completed { directive }
            | Self::Failed { directive, .. }
            | Self::Canceled { directive } => directive,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Requested { .. } => "requested",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Canceled { .. } => "canceled",
        }
    }

    /// Whether this is the directive's last event.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Requested { .. })
    }

    fn deliver(&self, listener: &dyn DirectiveListener) {
        match self {
            Self::Requested { directive } => listener.on_requested(directive),
            Self::Completed { directive } => listener.on_completed(directive),
            Self::Failed {
                directive,
                description,
            } => listener.on_failed(directive, description),
            Self::Canceled { directive } => listener.on_canceled(directive),
        }
    }
}

/// Registered listeners. Fan-out takes a snapshot so listeners may add or
/// remove listeners from inside a callback.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn DirectiveListener>>>,
}

impl ListenerSet {
    pub fn add(&self, listener: Arc<dyn DirectiveListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn DirectiveListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn emit(&self, event: &DirectiveEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        debug!(
            event = event.label(),
            message_id = %event.directive().message_id,
            count = listeners.len(),
            "directive lifecycle event"
        );
        for listener in &listeners {
            event.deliver(listener.as_ref());
        }
    }
}

/// Listener that republishes every transition on a broadcast channel, for
/// consumers that prefer a stream of [`DirectiveEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<DirectiveEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectiveEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: DirectiveEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

impl DirectiveListener for EventBroadcaster {
    fn on_requested(&self, directive: &Arc<Directive>) {
        self.publish(DirectiveEvent::Requested {
            directive: Arc::clone(directive),
        });
    }

    fn on_completed(&self, directive: &Arc<Directive>) {
        self.publish(DirectiveEvent::Completed {
            directive: Arc::clone(directive),
        });
    }

    fn on_failed(&self, directive: &Arc<Directive>, description: &str) {
        self.publish(DirectiveEvent::Failed {
            directive: Arc::clone(directive),
            description: description.to_string(),
        });
    }

    fn on_canceled(&self, directive: &Arc<Directive>) {
        self.publish(DirectiveEvent::Canceled {
            directive: Arc::clone(directive),
        });
    }
}
