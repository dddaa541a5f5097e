//! Module loaders and source discovery
//!
//! A loader turns a source path into a module instance, or into nothing at
//! all when the file is not a module. Two implementations are provided:
//! a registration-list loader for modules linked at compile time, and a
//! shared-library loader backed by `libloading`.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use libloading::Library;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{Error, Result};
use crate::module::Module;

/// Yields module instances from source paths.
///
/// Returning `Ok(None)` means the path is not a recognized module source
/// and must be skipped silently; `Err` is reserved for real faults.
#[async_trait]
pub trait ModuleLoader<M: ?Sized>: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Option<Arc<M>>>;

    /// Drop any cached state for a source so a subsequent load re-reads it
    /// fresh. Called by the registry when the module is removed.
    fn invalidate(&self, _path: &Path) {}
}

/// Recursively walk `root` and return every leaf file path.
///
/// Directories are traversed but not returned. Enumeration order depends on
/// the platform's directory iteration; callers must not rely on it.
pub fn scan_sources(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry
            .map_err(|e| Error::Loader(format!("failed to scan '{}': {}", root.display(), e)))?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Factory producing a module instance.
pub type ModuleFactory<M> = Arc<dyn Fn() -> Arc<M> + Send + Sync>;

/// Loader over an explicit registration list.
///
/// Modules are linked into the binary and announced by path; loading is a
/// table lookup. Paths with no registered factory are skipped.
pub struct StaticLoader<M: ?Sized> {
    factories: RwLock<HashMap<PathBuf, ModuleFactory<M>>>,
}

impl<M: ?Sized + Module> StaticLoader<M> {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Announce a module source: `factory` is invoked each time `path` is
    /// loaded.
    pub fn provide<F>(&self, path: impl Into<PathBuf>, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<M> + Send + Sync + 'static,
    {
        let mut factories = self
            .factories
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        factories.insert(path.into(), Arc::new(factory));
        Ok(())
    }
}

impl<M: ?Sized + Module> Default for StaticLoader<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: ?Sized + Module> ModuleLoader<M> for StaticLoader<M> {
    async fn load(&self, path: &Path) -> Result<Option<Arc<M>>> {
        let factory = self
            .factories
            .read()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?
            .get(path)
            .cloned();
        Ok(factory.map(|f| f()))
    }
}

/// C-ABI constructor a module library must export.
///
/// The returned pointer must come from `Box::into_raw`; a null return means
/// the library declined to produce a module.
pub type ModuleCtor<M: ?Sized> = unsafe extern "C" fn() -> *mut M;

/// Cache of live library handles.
///
/// A handle is never dropped while the cache is alive: retiring a path, or
/// replacing its entry on a fresh load, moves the handle aside instead of
/// unmapping it, since module instances built from a library reference code
/// in its mapping. Retired handles are released only when the cache itself
/// drops.
struct RetiringCache<H> {
    active: HashMap<PathBuf, H>,
    retired: Vec<H>,
}

impl<H> RetiringCache<H> {
    fn new() -> Self {
        Self {
            active: HashMap::new(),
            retired: Vec::new(),
        }
    }

    fn insert(&mut self, path: PathBuf, handle: H) {
        if let Some(displaced) = self.active.insert(path, handle) {
            self.retired.push(displaced);
        }
    }

    /// Move a path's handle to the retired list. Returns whether one was
    /// active.
    fn retire(&mut self, path: &Path) -> bool {
        match self.active.remove(path) {
            Some(handle) => {
                self.retired.push(handle);
                true
            }
            None => false,
        }
    }
}

/// Loader for shared-library modules.
///
/// Files without a platform dylib extension or without the expected
/// constructor symbol are skipped. Loaded libraries are kept alive in a
/// cache keyed by path; `invalidate` retires the mapping so the next load
/// maps the file fresh, without unmapping the old library while instances
/// built from it may still be alive. Retired mappings are released only
/// when the loader drops, by which point every instance must be gone.
pub struct LibraryLoader<M: ?Sized> {
    symbol: Vec<u8>,
    libraries: RwLock<RetiringCache<Library>>,
    _marker: PhantomData<fn() -> Arc<M>>,
}

impl<M: ?Sized + Module> LibraryLoader<M> {
    /// `symbol` names the exported constructor, e.g. `floe_module_init`.
    pub fn new(symbol: impl Into<Vec<u8>>) -> Self {
        Self {
            symbol: symbol.into(),
            libraries: RwLock::new(RetiringCache::new()),
            _marker: PhantomData,
        }
    }

    fn is_library(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("so") | Some("dll") | Some("dylib")
        )
    }
}

#[async_trait]
impl<M: ?Sized + Module> ModuleLoader<M> for LibraryLoader<M> {
    async fn load(&self, path: &Path) -> Result<Option<Arc<M>>> {
        if !Self::is_library(path) {
            return Ok(None);
        }

        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::Loader(format!("failed to load '{}': {}", path.display(), e)))?;

        let ctor: ModuleCtor<M> = match unsafe { library.get::<ModuleCtor<M>>(&self.symbol) } {
            Ok(symbol) => *symbol,
            // No constructor symbol: a library, but not one of ours.
            Err(_) => {
                debug!(path = %path.display(), "no module constructor, skipping");
                return Ok(None);
            }
        };

        let raw = unsafe { ctor() };
        if raw.is_null() {
            return Ok(None);
        }
        let instance: Arc<M> = unsafe { Arc::from(Box::from_raw(raw)) };

        info!(path = %path.display(), id = instance.id(), "loaded module library");

        let mut libraries = self
            .libraries
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        libraries.insert(path.to_path_buf(), library);

        Ok(Some(instance))
    }

    fn invalidate(&self, path: &Path) {
        if let Ok(mut libraries) = self.libraries.write() {
            if libraries.retire(path) {
                debug!(path = %path.display(), "retired cached library");
            }
        }
    }
}
