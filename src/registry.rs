//! Module registry: load, register, remove, reload
//!
//! `ModuleRegistry` owns the live module instances of one kind. The
//! [`Registry`] trait carries the shared lifecycle (scan, load, reload,
//! remove-all) as provided methods built on top of `register`/`remove`,
//! which specializations override to add their own side effects: the
//! command registry indexes aliases, the listener registry binds emitters.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::emitter::Emitter;
use crate::errors::{Error, Result};
use crate::loader::{self, ModuleLoader};
use crate::module::{Module, ModuleEntry};
use crate::unique_map::UniqueMap;

/// Lifecycle event names emitted on a registry's event channel.
pub mod events {
    pub const MODULE_CREATED: &str = "module_created";
    pub const MODULE_DELETED: &str = "module_deleted";
    pub const MODULE_RELOADED: &str = "module_reloaded";
}

/// Shared state and base behavior for a registry of modules of kind `M`.
pub struct ModuleRegistry<M: ?Sized + Module> {
    modules: RwLock<UniqueMap<ModuleEntry<M>>>,
    loader: Arc<dyn ModuleLoader<M>>,
    root: PathBuf,
    automate_categories: bool,
    events: Emitter,
}

impl<M: ?Sized + Module> ModuleRegistry<M> {
    pub fn new(loader: Arc<dyn ModuleLoader<M>>, config: RegistryConfig) -> Self {
        Self {
            modules: RwLock::new(UniqueMap::new()),
            loader,
            root: config.path,
            automate_categories: config.automate_categories,
            events: Emitter::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn automate_categories(&self) -> bool {
        self.automate_categories
    }

    pub fn loader(&self) -> &Arc<dyn ModuleLoader<M>> {
        &self.loader
    }

    /// Lifecycle event channel (`module_created` / `module_deleted` /
    /// `module_reloaded`).
    pub fn events(&self) -> &Emitter {
        &self.events
    }

    /// Look up a registered module by id.
    pub fn get(&self, id: &str) -> Option<ModuleEntry<M>> {
        self.modules.read().ok()?.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules
            .read()
            .ok()
            .map(|m| m.contains(id))
            .unwrap_or(false)
    }

    /// Ids of every registered module, in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.modules
            .read()
            .ok()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.modules.read().ok().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Base registration: insert into the module map and announce the
    /// module unless this is the second half of a reload.
    pub fn insert(&self, entry: ModuleEntry<M>, is_reload: bool) -> Result<()> {
        let id = entry.id().to_string();
        let category = entry.category().map(str::to_owned);
        {
            let mut modules = self
                .modules
                .write()
                .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
            modules.insert(id.clone(), entry)?;
        }
        debug!(module = %id, "registered module");
        if !is_reload {
            self.events
                .emit(events::MODULE_CREATED, &json!({ "id": id, "category": category }));
        }
        Ok(())
    }

    /// Base removal: take the module out of the map, invalidate its cached
    /// loader state, and announce the deletion unless part of a reload.
    pub fn take(&self, id: &str, is_reload: bool) -> Result<ModuleEntry<M>> {
        let entry = {
            let mut modules = self
                .modules
                .write()
                .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
            modules
                .remove(id)
                .ok_or_else(|| Error::ModuleNotFound(id.to_string()))?
        };
        if let Some(source) = entry.source() {
            self.loader.invalidate(source);
        }
        info!(module = %id, "removed module");
        if !is_reload {
            self.events.emit(
                events::MODULE_DELETED,
                &json!({ "id": id, "category": entry.category() }),
            );
        }
        Ok(entry)
    }
}

/// The registry lifecycle, shared by every specialization.
///
/// Implementors provide `base` plus, where needed, overridden
/// `register`/`remove_with`; the load and reload paths always go through
/// those two so specialization side effects are never bypassed.
#[async_trait]
pub trait Registry: Send + Sync {
    type Module: ?Sized + Module;

    fn base(&self) -> &ModuleRegistry<Self::Module>;

    /// Register an already-built entry. Fails fast on a duplicate id.
    fn register(&self, entry: ModuleEntry<Self::Module>, is_reload: bool) -> Result<()> {
        self.base().insert(entry, is_reload)
    }

    /// Register a module instance with no source path (inline
    /// registration). Such a module cannot be reloaded.
    fn register_module(&self, module: Arc<Self::Module>) -> Result<()> {
        self.register(ModuleEntry::new(module)?, false)
    }

    /// Remove a module, optionally as the first half of a reload.
    fn remove_with(&self, id: &str, is_reload: bool) -> Result<ModuleEntry<Self::Module>> {
        self.base().take(id, is_reload)
    }

    /// Remove a module by id.
    fn remove(&self, id: &str) -> Result<ModuleEntry<Self::Module>> {
        self.remove_with(id, false)
    }

    /// Remove every registered module.
    fn remove_all(&self) -> Result<()> {
        for id in self.base().ids() {
            self.remove_with(&id, false)?;
        }
        Ok(())
    }

    /// Every leaf file beneath the registry's root directory.
    fn scan_sources(&self) -> Result<Vec<PathBuf>> {
        loader::scan_sources(self.base().root())
    }

    /// Load a single source. Unrecognized files yield `Ok(None)`.
    async fn load_one(&self, path: &Path, is_reload: bool) -> Result<Option<ModuleEntry<Self::Module>>> {
        let base = self.base();
        let Some(instance) = base.loader().load(path).await? else {
            return Ok(None);
        };
        let mut entry = ModuleEntry::new(instance)?;
        entry.set_source(path.to_path_buf());
        if base.automate_categories() && entry.category().is_none() {
            let parent = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|name| name.to_str());
            if let Some(category) = parent {
                entry.set_category(category.to_string());
            }
        }
        self.register(entry.clone(), is_reload)?;
        Ok(Some(entry))
    }

    /// Scan the root directory and load every accepted source in scan
    /// order. The first failing source aborts the remainder:
    /// misconfiguration is expected to fail loudly at startup.
    async fn load_filtered<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&Path) -> bool + Send + Sync,
    {
        for path in self.scan_sources()? {
            if filter(&path) {
                self.load_one(&path, false).await?;
            }
        }
        Ok(())
    }

    /// Load every source beneath the root directory.
    async fn load_all(&self) -> Result<()> {
        self.load_filtered(|_| true).await
    }

    /// Tear down a module and load it again from its source.
    ///
    /// A non-reloadable module is a no-op (`Ok(None)`). A module with no
    /// source path fails before anything is torn down, so it stays
    /// registered. The old instance is fully removed before the new one is
    /// constructed.
    async fn reload(&self, id: &str) -> Result<Option<ModuleEntry<Self::Module>>> {
        let entry = self
            .base()
            .get(id)
            .ok_or_else(|| Error::ModuleNotFound(id.to_string()))?;
        if !entry.reloadable() {
            return Ok(None);
        }
        let Some(source) = entry.source().map(Path::to_path_buf) else {
            return Err(Error::ModuleHasNoSource(id.to_string()));
        };
        self.remove_with(id, true)?;
        let reloaded = self.load_one(&source, true).await?;
        info!(module = %id, "reloaded module");
        self.base()
            .events()
            .emit(events::MODULE_RELOADED, &json!({ "id": id }));
        Ok(reloaded)
    }

    /// Reload every module in registration order, silently skipping
    /// non-reloadable and sourceless modules.
    async fn reload_all(&self) -> Result<()> {
        for id in self.base().ids() {
            let Some(entry) = self.base().get(&id) else {
                continue;
            };
            if !entry.reloadable() || entry.source().is_none() {
                continue;
            }
            self.reload(&id).await?;
        }
        Ok(())
    }
}

/// The unspecialized registry: no registration side effects beyond the
/// base map bookkeeping.
pub struct GenericRegistry {
    base: ModuleRegistry<dyn Module>,
}

impl GenericRegistry {
    pub fn new(loader: Arc<dyn ModuleLoader<dyn Module>>, config: RegistryConfig) -> Self {
        Self {
            base: ModuleRegistry::new(loader, config),
        }
    }
}

#[async_trait]
impl Registry for GenericRegistry {
    type Module = dyn Module;

    fn base(&self) -> &ModuleRegistry<dyn Module> {
        &self.base
    }
}
