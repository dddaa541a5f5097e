//! Base module trait and the registry-owned entry wrapper

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{Error, Result};

/// The base unit of dynamically registered behavior.
///
/// Implementing this trait is what makes a type loadable by a registry;
/// the compile-time bound replaces any runtime "is this a module" check.
pub trait Module: Send + Sync {
    /// Unique identifier within the owning registry. Must be non-empty.
    fn id(&self) -> &str;

    /// Explicit category, if the module declares one.
    fn category(&self) -> Option<&str> {
        None
    }

    /// Whether `reload` may replace this instance.
    fn reloadable(&self) -> bool {
        true
    }
}

/// A registered module together with the state the registry keeps for it.
///
/// The registry is the sole writer of the source path and the effective
/// category; modules only declare them.
pub struct ModuleEntry<M: ?Sized> {
    instance: Arc<M>,
    category: Option<String>,
    source: Option<PathBuf>,
}

impl<M: ?Sized + Module> ModuleEntry<M> {
    /// Wrap a module instance, validating its id.
    pub fn new(instance: Arc<M>) -> Result<Self> {
        if instance.id().is_empty() {
            return Err(Error::WrongType {
                value: "id".to_string(),
                expected: "non-empty string",
            });
        }
        let category = instance.category().map(str::to_owned);
        Ok(Self {
            instance,
            category,
            source: None,
        })
    }

    pub fn instance(&self) -> &Arc<M> {
        &self.instance
    }

    pub fn id(&self) -> &str {
        self.instance.id()
    }

    /// Effective category: the declared one, or the one the registry
    /// inferred from the source location.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn reloadable(&self) -> bool {
        self.instance.reloadable()
    }

    /// Where this module was loaded from; absent for inline registrations.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub(crate) fn set_source(&mut self, source: PathBuf) {
        self.source = Some(source);
    }

    pub(crate) fn set_category(&mut self, category: String) {
        self.category = Some(category);
    }
}

impl<M: ?Sized + Module> std::fmt::Debug for ModuleEntry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("id", &self.id())
            .field("category", &self.category)
            .field("source", &self.source)
            .finish()
    }
}

impl<M: ?Sized> Clone for ModuleEntry<M> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            category: self.category.clone(),
            source: self.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        id: &'static str,
    }

    impl Module for Dummy {
        fn id(&self) -> &str {
            self.id
        }
    }

    #[test]
    fn rejects_empty_id() {
        let err = ModuleEntry::new(Arc::new(Dummy { id: "" })).unwrap_err();
        assert!(matches!(err, Error::WrongType { .. }));
    }

    #[test]
    fn defaults() {
        let entry = ModuleEntry::new(Arc::new(Dummy { id: "ping" })).unwrap();
        assert_eq!(entry.id(), "ping");
        assert!(entry.reloadable());
        assert!(entry.category().is_none());
        assert!(entry.source().is_none());
    }
}
