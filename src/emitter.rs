//! Named event source with explicit subscription handles

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Handler invoked with the event payload.
pub type EventHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Handle returned when a handler is bound to an event.
///
/// Unbinding goes through this handle rather than through function
/// identity, so the caller never has to re-derive the original closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Binding {
    id: u64,
    handler: EventHandler,
    once: bool,
}

/// A source of discrete named events.
///
/// Serves two roles in the crate: the external event sources that listener
/// modules bind to, and the lifecycle event channel every registry exposes.
#[derive(Default)]
pub struct Emitter {
    bindings: RwLock<HashMap<String, Vec<Binding>>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&self, event: &str, handler: EventHandler, once: bool) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut bindings) = self.bindings.write() {
            bindings
                .entry(event.to_string())
                .or_default()
                .push(Binding { id, handler, once });
        }
        SubscriptionId(id)
    }

    /// Bind a persistent handler to an event.
    pub fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        self.bind(event, handler, false)
    }

    /// Bind a handler that fires at most once.
    pub fn once(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        self.bind(event, handler, true)
    }

    /// Remove a binding by handle. Returns whether a binding was removed.
    pub fn unsubscribe(&self, event: &str, subscription: SubscriptionId) -> bool {
        let Ok(mut bindings) = self.bindings.write() else {
            return false;
        };
        let Some(list) = bindings.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|binding| binding.id != subscription.0);
        before != list.len()
    }

    /// Invoke every handler bound to `event`, in subscription order.
    ///
    /// Single-fire bindings are dropped before their handler runs, so a
    /// handler that re-emits the same event cannot fire itself twice.
    /// Handlers run outside the internal lock and may freely subscribe or
    /// unsubscribe.
    pub fn emit(&self, event: &str, payload: &serde_json::Value) {
        let handlers: Vec<EventHandler> = {
            let Ok(mut bindings) = self.bindings.write() else {
                return;
            };
            let Some(list) = bindings.get_mut(event) else {
                return;
            };
            let snapshot = list.iter().map(|b| Arc::clone(&b.handler)).collect();
            list.retain(|b| !b.once);
            snapshot
        };
        for handler in handlers {
            handler(payload);
        }
    }

    /// Number of handlers currently bound to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.bindings
            .read()
            .ok()
            .and_then(|b| b.get(event).map(Vec::len))
            .unwrap_or(0)
    }
}
