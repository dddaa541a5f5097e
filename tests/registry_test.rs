//! Module registry lifecycle tests
//! Run with: cargo test --test registry_test

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use floe::{
    Error, GenericRegistry, Module, ModuleLoader, Registry, RegistryConfig, StaticLoader,
};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

struct TestModule {
    id: String,
    reloadable: bool,
    category: Option<String>,
}

impl TestModule {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            reloadable: true,
            category: None,
        }
    }

    fn pinned(id: &str) -> Self {
        Self {
            reloadable: false,
            ..Self::new(id)
        }
    }
}

impl Module for TestModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn reloadable(&self) -> bool {
        self.reloadable
    }
}

fn provide(loader: &StaticLoader<dyn Module>, path: &Path, id: &str) {
    let id = id.to_string();
    loader
        .provide(path, move || {
            let module: Arc<dyn Module> = Arc::new(TestModule::new(&id));
            module
        })
        .unwrap();
}

/// A module directory with two recognized sources and one stray file.
fn module_dir() -> (tempfile::TempDir, Arc<StaticLoader<dyn Module>>) {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(StaticLoader::<dyn Module>::new());

    let util = dir.path().join("util");
    std::fs::create_dir(&util).unwrap();
    let ping = util.join("ping.rs");
    let pong = util.join("pong.rs");
    std::fs::write(&ping, "").unwrap();
    std::fs::write(&pong, "").unwrap();
    std::fs::write(dir.path().join("README.md"), "not a module").unwrap();

    provide(&loader, &ping, "ping");
    provide(&loader, &pong, "pong");
    (dir, loader)
}

#[tokio::test]
async fn load_all_registers_every_recognized_source() {
    ensure_init();
    let (dir, loader) = module_dir();
    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));

    assert!(registry.scan_sources().unwrap().len() >= 3);

    registry.load_all().await.unwrap();
    assert_eq!(registry.base().len(), 2);
    assert!(registry.base().contains("ping"));
    assert!(registry.base().contains("pong"));

    let ping = registry.base().get("ping").unwrap();
    assert!(ping.source().is_some());
}

#[tokio::test]
async fn duplicate_id_fails_and_leaves_the_registry_unchanged() {
    ensure_init();
    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    let registry = GenericRegistry::new(loader, RegistryConfig::new("./unused"));

    registry.register_module(Arc::new(TestModule::new("ping"))).unwrap();
    let err = registry
        .register_module(Arc::new(TestModule::new("ping")))
        .unwrap_err();
    assert!(matches!(err, Error::NotUnique(id) if id == "ping"));
    assert_eq!(registry.base().len(), 1);
}

#[tokio::test]
async fn remove_all_empties_the_registry() {
    ensure_init();
    let (dir, loader) = module_dir();
    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));
    registry.load_all().await.unwrap();
    assert!(!registry.base().is_empty());

    registry.remove_all().unwrap();
    assert_eq!(registry.base().len(), 0);
}

#[tokio::test]
async fn removed_ids_are_reusable() {
    ensure_init();
    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    let registry = GenericRegistry::new(loader, RegistryConfig::new("./unused"));

    registry.register_module(Arc::new(TestModule::new("ping"))).unwrap();
    registry.remove("ping").unwrap();
    registry.register_module(Arc::new(TestModule::new("ping"))).unwrap();
    assert_eq!(registry.base().len(), 1);
}

#[tokio::test]
async fn removing_a_missing_module_fails() {
    ensure_init();
    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    let registry = GenericRegistry::new(loader, RegistryConfig::new("./unused"));

    let err = registry.remove("ghost").unwrap_err();
    assert!(matches!(err, Error::ModuleNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn reload_tears_down_and_loads_a_fresh_instance() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("ping.rs");
    std::fs::write(&source, "").unwrap();

    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    let loads = Arc::new(AtomicUsize::new(0));
    {
        let loads = Arc::clone(&loads);
        loader
            .provide(&source, move || {
                loads.fetch_add(1, Ordering::SeqCst);
                let module: Arc<dyn Module> = Arc::new(TestModule::new("ping"));
                module
            })
            .unwrap();
    }

    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));
    registry.load_all().await.unwrap();
    let old = registry.base().get("ping").unwrap();

    let reloaded = registry.reload("ping").await.unwrap().unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(old.instance(), reloaded.instance()));
    assert_eq!(registry.base().len(), 1);
}

#[tokio::test]
async fn reload_of_a_non_reloadable_module_is_a_no_op() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("clear.rs");
    std::fs::write(&source, "").unwrap();

    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    loader
        .provide(&source, || {
            let module: Arc<dyn Module> = Arc::new(TestModule::pinned("clear"));
            module
        })
        .unwrap();

    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));
    registry.load_all().await.unwrap();
    let before = registry.base().get("clear").unwrap();

    let outcome = registry.reload("clear").await.unwrap();
    assert!(outcome.is_none());
    let after = registry.base().get("clear").unwrap();
    assert!(Arc::ptr_eq(before.instance(), after.instance()));
}

#[tokio::test]
async fn reload_without_a_source_fails_and_keeps_the_module() {
    ensure_init();
    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    let registry = GenericRegistry::new(loader, RegistryConfig::new("./unused"));

    registry.register_module(Arc::new(TestModule::new("inline"))).unwrap();
    let err = registry.reload("inline").await.unwrap_err();
    assert!(matches!(err, Error::ModuleHasNoSource(id) if id == "inline"));
    assert!(registry.base().contains("inline"));
}

#[tokio::test]
async fn categories_are_inferred_from_the_parent_directory() {
    ensure_init();
    let (dir, loader) = module_dir();
    let registry = GenericRegistry::new(
        loader,
        RegistryConfig::new(dir.path()).with_automate_categories(true),
    );
    registry.load_all().await.unwrap();

    let ping = registry.base().get("ping").unwrap();
    assert_eq!(ping.category(), Some("util"));
}

#[tokio::test]
async fn categories_stay_absent_without_automation() {
    ensure_init();
    let (dir, loader) = module_dir();
    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));
    registry.load_all().await.unwrap();

    let ping = registry.base().get("ping").unwrap();
    assert_eq!(ping.category(), None);
}

#[tokio::test]
async fn reload_all_skips_pinned_and_sourceless_modules() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let ping_src = dir.path().join("ping.rs");
    let clear_src = dir.path().join("clear.rs");
    std::fs::write(&ping_src, "").unwrap();
    std::fs::write(&clear_src, "").unwrap();

    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    let ping_loads = Arc::new(AtomicUsize::new(0));
    {
        let loads = Arc::clone(&ping_loads);
        loader
            .provide(&ping_src, move || {
                loads.fetch_add(1, Ordering::SeqCst);
                let module: Arc<dyn Module> = Arc::new(TestModule::new("ping"));
                module
            })
            .unwrap();
    }
    loader
        .provide(&clear_src, || {
            let module: Arc<dyn Module> = Arc::new(TestModule::pinned("clear"));
            module
        })
        .unwrap();

    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));
    registry.load_all().await.unwrap();
    registry
        .register_module(Arc::new(TestModule::new("inline")))
        .unwrap();

    let old_ping = registry.base().get("ping").unwrap();
    let old_clear = registry.base().get("clear").unwrap();
    let old_inline = registry.base().get("inline").unwrap();

    registry.reload_all().await.unwrap();

    // Only the reloadable, source-backed module was replaced.
    assert_eq!(registry.base().len(), 3);
    assert_eq!(ping_loads.load(Ordering::SeqCst), 2);
    let new_ping = registry.base().get("ping").unwrap();
    assert!(!Arc::ptr_eq(old_ping.instance(), new_ping.instance()));
    let new_clear = registry.base().get("clear").unwrap();
    assert!(Arc::ptr_eq(old_clear.instance(), new_clear.instance()));
    let new_inline = registry.base().get("inline").unwrap();
    assert!(Arc::ptr_eq(old_inline.instance(), new_inline.instance()));
}

struct RecordingLoader {
    inner: StaticLoader<dyn Module>,
    seen: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl ModuleLoader<dyn Module> for RecordingLoader {
    async fn load(&self, path: &Path) -> floe::Result<Option<Arc<dyn Module>>> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        self.inner.load(path).await
    }
}

#[tokio::test]
async fn load_filtered_never_hands_rejected_paths_to_the_loader() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let ping = dir.path().join("ping.rs");
    let notes = dir.path().join("notes.txt");
    std::fs::write(&ping, "").unwrap();
    std::fs::write(&notes, "").unwrap();

    let inner = StaticLoader::<dyn Module>::new();
    inner
        .provide(&ping, || {
            let module: Arc<dyn Module> = Arc::new(TestModule::new("ping"));
            module
        })
        .unwrap();
    let loader = Arc::new(RecordingLoader {
        inner,
        seen: Mutex::new(Vec::new()),
    });
    let dyn_loader: Arc<dyn ModuleLoader<dyn Module>> = loader.clone();
    let registry = GenericRegistry::new(dyn_loader, RegistryConfig::new(dir.path()));

    registry
        .load_filtered(|path| path.extension().and_then(|ext| ext.to_str()) == Some("rs"))
        .await
        .unwrap();

    assert_eq!(registry.base().len(), 1);
    assert!(registry.base().contains("ping"));
    let seen = loader.seen.lock().unwrap();
    assert_eq!(*seen, vec![ping]);
}

struct ExplodingLoader {
    inner: StaticLoader<dyn Module>,
    explode: PathBuf,
}

#[async_trait]
impl ModuleLoader<dyn Module> for ExplodingLoader {
    async fn load(&self, path: &Path) -> floe::Result<Option<Arc<dyn Module>>> {
        if path == self.explode {
            return Err(Error::Loader("broken module source".to_string()));
        }
        self.inner.load(path).await
    }
}

#[tokio::test]
async fn a_broken_source_aborts_the_whole_batch() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("ping.rs");
    let bad = dir.path().join("broken.rs");
    std::fs::write(&good, "").unwrap();
    std::fs::write(&bad, "").unwrap();

    let inner = StaticLoader::<dyn Module>::new();
    inner
        .provide(&good, || {
            let module: Arc<dyn Module> = Arc::new(TestModule::new("ping"));
            module
        })
        .unwrap();
    let loader = Arc::new(ExplodingLoader {
        inner,
        explode: bad,
    });

    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));
    let err = registry.load_all().await.unwrap_err();
    assert!(matches!(err, Error::Loader(_)));
}

#[tokio::test]
async fn lifecycle_events_fire_once_per_transition() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("ping.rs");
    std::fs::write(&source, "").unwrap();

    let loader = Arc::new(StaticLoader::<dyn Module>::new());
    loader
        .provide(&source, || {
            let module: Arc<dyn Module> = Arc::new(TestModule::new("ping"));
            module
        })
        .unwrap();
    let registry = GenericRegistry::new(loader, RegistryConfig::new(dir.path()));

    let created = Arc::new(AtomicUsize::new(0));
    let deleted = Arc::new(AtomicUsize::new(0));
    let reloaded = Arc::new(AtomicUsize::new(0));
    for (event, counter) in [
        ("module_created", &created),
        ("module_deleted", &deleted),
        ("module_reloaded", &reloaded),
    ] {
        let counter = Arc::clone(counter);
        registry.base().events().on(
            event,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    registry.load_all().await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);

    // A reload suppresses the create/delete pair and announces itself once.
    registry.reload("ping").await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(deleted.load(Ordering::SeqCst), 0);
    assert_eq!(reloaded.load(Ordering::SeqCst), 1);

    registry.remove("ping").unwrap();
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
}
