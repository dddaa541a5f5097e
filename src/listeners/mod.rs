//! Event listener modules and their registry
//!
//! A listener module names an emitter and an event; the registry is the
//! only party that binds and unbinds it. Bindings are tracked by the
//! subscription handle the emitter returns, so removal never has to
//! re-derive the bound closure.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::emitter::{Emitter, EventHandler, SubscriptionId};
use crate::errors::{Error, Result};
use crate::loader::ModuleLoader;
use crate::module::{Module, ModuleEntry};
use crate::registry::{ModuleRegistry, Registry};
use crate::unique_map::UniqueMap;

/// Binding semantics for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerKind {
    /// Fires on every emission.
    On,
    /// Fires at most once.
    #[default]
    Once,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::On => "on",
            ListenerKind::Once => "once",
        }
    }
}

impl FromStr for ListenerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on" => Ok(ListenerKind::On),
            "once" => Ok(ListenerKind::Once),
            other => Err(Error::InvalidListenerKind(other.to_string())),
        }
    }
}

/// An event-driven module bound to a named emitter.
pub trait Listener: Module {
    /// Id of the emitter this listener binds to.
    fn emitter(&self) -> &str;

    /// Event name on that emitter.
    fn event(&self) -> &str;

    fn kind(&self) -> ListenerKind {
        ListenerKind::default()
    }

    /// Invoked with the event payload.
    fn exec(&self, payload: &serde_json::Value);
}

struct Binding {
    emitter: String,
    event: String,
    subscription: SubscriptionId,
}

/// Registry of event listener modules.
pub struct ListenerRegistry {
    base: ModuleRegistry<dyn Listener>,
    emitters: RwLock<UniqueMap<Arc<Emitter>>>,
    bindings: RwLock<HashMap<String, Binding>>,
}

impl ListenerRegistry {
    pub fn new(loader: Arc<dyn ModuleLoader<dyn Listener>>, config: RegistryConfig) -> Self {
        Self {
            base: ModuleRegistry::new(loader, config),
            emitters: RwLock::new(UniqueMap::new()),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Register a named event source. Fails if the id is taken.
    pub fn add_emitter(&self, id: impl Into<String>, emitter: Arc<Emitter>) -> Result<()> {
        let mut emitters = self
            .emitters
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        emitters.insert(id, emitter)
    }

    pub fn add_emitters(
        &self,
        emitters: impl IntoIterator<Item = (String, Arc<Emitter>)>,
    ) -> Result<()> {
        for (id, emitter) in emitters {
            self.add_emitter(id, emitter)?;
        }
        Ok(())
    }

    pub fn emitter(&self, id: &str) -> Option<Arc<Emitter>> {
        self.emitters.read().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl Registry for ListenerRegistry {
    type Module = dyn Listener;

    fn base(&self) -> &ModuleRegistry<dyn Listener> {
        &self.base
    }

    /// Base registration plus binding the listener to its emitter. The
    /// emitter is resolved first, so a failed bind leaves no
    /// half-registered module behind.
    fn register(&self, entry: ModuleEntry<dyn Listener>, is_reload: bool) -> Result<()> {
        let listener = Arc::clone(entry.instance());
        let emitter_id = listener.emitter().to_string();
        let emitter = self
            .emitter(&emitter_id)
            .ok_or_else(|| Error::EmitterNotFound(emitter_id.clone()))?;

        self.base.insert(entry, is_reload)?;

        let event = listener.event().to_string();
        let id = listener.id().to_string();
        let kind = listener.kind();
        let handler: EventHandler = {
            let listener = Arc::clone(&listener);
            Arc::new(move |payload| listener.exec(payload))
        };
        let subscription = match kind {
            ListenerKind::On => emitter.on(&event, handler),
            ListenerKind::Once => emitter.once(&event, handler),
        };
        debug!(listener = %id, emitter = %emitter_id, event = %event, kind = kind.as_str(), "bound listener");

        let mut bindings = self
            .bindings
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        bindings.insert(
            id,
            Binding {
                emitter: emitter_id,
                event,
                subscription,
            },
        );
        Ok(())
    }

    /// Base removal plus explicit unbinding: the emitter holds its own
    /// reference to the handler, which deleting the map entry alone would
    /// not release.
    fn remove_with(&self, id: &str, is_reload: bool) -> Result<ModuleEntry<dyn Listener>> {
        let entry = self.base.take(id, is_reload)?;
        let binding = {
            let mut bindings = self
                .bindings
                .write()
                .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
            bindings.remove(id)
        };
        if let Some(binding) = binding {
            let emitter = self
                .emitter(&binding.emitter)
                .ok_or_else(|| Error::EmitterNotFound(binding.emitter.clone()))?;
            // A once binding that already fired leaves a dead handle;
            // unsubscribing is then a no-op.
            emitter.unsubscribe(&binding.event, binding.subscription);
            debug!(listener = %id, emitter = %binding.emitter, event = %binding.event, "unbound listener");
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_kind_from_str() {
        assert_eq!("on".parse::<ListenerKind>().unwrap(), ListenerKind::On);
        assert_eq!("once".parse::<ListenerKind>().unwrap(), ListenerKind::Once);
        let err = "always".parse::<ListenerKind>().unwrap_err();
        assert!(matches!(err, Error::InvalidListenerKind(kind) if kind == "always"));
    }

    #[test]
    fn listener_kind_defaults_to_once() {
        assert_eq!(ListenerKind::default(), ListenerKind::Once);
    }
}
