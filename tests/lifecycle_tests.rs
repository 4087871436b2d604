//! Lifecycle Tests
//!
//! End-to-end tests of the plugin manager: validation before mutation,
//! replacement ordering, reloads, directory loading and shutdown.
//!
//! Run: cargo nextest run --test lifecycle_tests

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use plugin_host::config::HostConfig;
use plugin_host::services::MemoryDatabase;
use plugin_host::{
    BoxError, FactoryLoader, FnPlugin, ManagerEvent, Plugin, PluginContext, PluginError,
    PluginManager, ResourceOverrides,
};
use serde_json::json;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

type Journal = Arc<Mutex<Vec<String>>>;
type Contexts = Arc<Mutex<Vec<PluginContext>>>;

/// Loader whose `recording` factory appends `init:<name>@<version>` and
/// `cleanup:<name>@<version>` to the journal and keeps every context.
fn recording_loader(journal: &Journal, contexts: &Contexts) -> FactoryLoader {
    let journal = Arc::clone(journal);
    let contexts = Arc::clone(contexts);
    FactoryLoader::new().with_factory("recording", move |metadata| {
        let label = format!("{}@{}", metadata.name, metadata.version);
        let init_journal = Arc::clone(&journal);
        let cleanup_journal = Arc::clone(&journal);
        let contexts = Arc::clone(&contexts);
        let init_label = label.clone();
        Arc::new(
            FnPlugin::builder(metadata)
                .on_initialize(move |context| {
                    init_journal
                        .lock()
                        .unwrap()
                        .push(format!("init:{init_label}"));
                    contexts.lock().unwrap().push(context);
                    async { Ok::<(), BoxError>(()) }.boxed()
                })
                .on_cleanup(move || {
                    cleanup_journal
                        .lock()
                        .unwrap()
                        .push(format!("cleanup:{label}"));
                    async { Ok::<(), BoxError>(()) }.boxed()
                })
                .build(),
        ) as Arc<dyn Plugin>
    })
}

/// Log output for a failing test: `RUST_LOG=plugin_host=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    manager: PluginManager,
    journal: Journal,
    contexts: Contexts,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_database(None)
    }

    fn with_database(database: Option<Arc<MemoryDatabase>>) -> Self {
        init_tracing();
        let journal = Journal::default();
        let contexts = Contexts::default();
        let loader = Arc::new(recording_loader(&journal, &contexts));
        let mut builder = PluginManager::builder(loader);
        if let Some(database) = database {
            builder = builder.database(database);
        }
        Self {
            manager: builder.build().unwrap(),
            journal,
            contexts,
            dir: TempDir::new().unwrap(),
        }
    }

    /// Writes `manifest` to `<dir>/<subdir>/plugin.json`.
    fn write_at(&self, subdir: &str, mut manifest: serde_json::Value) -> PathBuf {
        manifest["entry"] = json!("recording");
        if manifest.get("version").is_none() {
            manifest["version"] = json!("1.0.0");
        }
        let plugin_dir = self.dir.path().join(subdir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("plugin.json"), manifest.to_string()).unwrap();
        plugin_dir
    }

    fn write(&self, manifest: serde_json::Value) -> PathBuf {
        let name = manifest["name"].as_str().unwrap().to_string();
        self.write_at(&name, manifest)
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn last_context(&self) -> PluginContext {
        self.contexts.lock().unwrap().last().cloned().unwrap()
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn invalidated<T>(result: Result<T, PluginError>) -> bool {
    matches!(result, Err(PluginError::ContextInvalidated { .. }))
}

// =============================================================================
// Validation
// =============================================================================

mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_names_load() {
        let h = Harness::new();
        let path = h.write(json!({
            "name": "orders",
            "allowedTables": ["users", "order_items"],
            "allowedTopics": ["order.created"],
            "allowedBuckets": ["invoices"]
        }));
        h.manager.load_plugin(&path, None).await.unwrap();
        assert!(h.manager.is_loaded("orders"));
    }

    #[tokio::test]
    async fn test_invalid_plugin_name_rejected() {
        let h = Harness::new();
        let path = h.write_at("upper", json!({"name": "Orders"}));
        let err = h.manager.load_plugin(&path, None).await.unwrap_err();
        assert!(matches!(err, PluginError::InvalidNamingConvention { kind: "plugin", .. }));
        assert!(h.manager.get_plugin_names().is_empty());
        assert!(h.journal().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_declared_resource_rejected() {
        let h = Harness::new();
        let path = h.write(json!({"name": "orders", "allowedBuckets": ["192.168.0.1"]}));
        let err = h.manager.load_plugin(&path, None).await.unwrap_err();
        assert!(matches!(err, PluginError::InvalidNamingConvention { kind: "bucket", .. }));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_invalid_override_rejected() {
        let h = Harness::new();
        let path = h.write(json!({"name": "orders", "allowedTables": ["users"]}));
        let overrides = ResourceOverrides::new().tables(["user-data"]);
        let err = h
            .manager
            .load_plugin(&path, Some(overrides))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidNamingConvention { kind: "table", .. }));
        assert_eq!(err.plugin_name(), Some("orders"));
        assert!(h.manager.get_plugin_resource_overrides("orders").is_none());
    }

    #[tokio::test]
    async fn test_malformed_manifest() {
        let h = Harness::new();
        let path = h.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = h.manager.load_plugin(&path, None).await.unwrap_err();
        assert!(matches!(err, PluginError::InvalidPluginFormat { .. }));
    }

    #[tokio::test]
    async fn test_missing_dependency_no_mutation() {
        let h = Harness::new();
        let mut events = h.manager.subscribe();
        let path = h.write(json!({"name": "reports", "dependencies": ["warehouse"]}));

        let err = h.manager.load_plugin(&path, None).await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::DependencyNotFound { ref plugin, ref dependency }
                if plugin == "reports" && dependency == "warehouse"
        ));
        assert!(!h.manager.is_loaded("reports"));
        assert!(h.manager.get_all_plugins().is_empty());
        assert!(h.journal().is_empty());

        match events.recv().await.unwrap() {
            ManagerEvent::PluginError { error, .. } => {
                assert!(matches!(*error, PluginError::DependencyNotFound { .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_self_dependency() {
        let h = Harness::new();
        let path = h.write(json!({"name": "loop", "dependencies": ["loop"]}));
        let err = h.manager.load_plugin(&path, None).await.unwrap_err();
        assert!(matches!(err, PluginError::SelfDependency { .. }));
    }

    #[tokio::test]
    async fn test_circular_dependency_keeps_loaded_instance() {
        let h = Harness::new();
        let a = h.write(json!({"name": "a"}));
        let b = h.write(json!({"name": "b", "dependencies": ["a"]}));
        h.manager.load_plugin(&a, None).await.unwrap();
        h.manager.load_plugin(&b, None).await.unwrap();

        h.write(json!({"name": "a", "version": "2.0.0", "dependencies": ["b"]}));
        let err = h.manager.load_plugin(&a, None).await.unwrap_err();
        match err {
            PluginError::CircularDependency { chain, .. } => {
                assert!(chain.contains(&"a".to_string()));
                assert!(chain.contains(&"b".to_string()));
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(h.manager.get_plugin("a").unwrap().metadata().version, "1.0.0");
        assert_eq!(h.journal(), vec!["init:a@1.0.0", "init:b@1.0.0"]);
    }
}

// =============================================================================
// Load / unload / reload
// =============================================================================

mod transition_tests {
    use super::*;

    #[tokio::test]
    async fn test_double_load_single_entry_cleanup_first() {
        let h = Harness::new();
        let first = h.write_at("v1", json!({"name": "dup", "version": "1.0.0"}));
        let second = h.write_at("v2", json!({"name": "dup", "version": "2.0.0"}));

        h.manager.load_plugin(&first, None).await.unwrap();
        h.manager.load_plugin(&second, None).await.unwrap();

        assert_eq!(h.manager.get_plugin_names(), vec!["dup"]);
        assert_eq!(
            h.journal(),
            vec!["init:dup@1.0.0", "cleanup:dup@1.0.0", "init:dup@2.0.0"]
        );
        assert!(h.manager.find_plugin_by_path(&second).is_some());
        assert!(h.manager.find_plugin_by_path(&first).is_none());
        assert_eq!(h.manager.metrics().loaded_plugins, 1);
    }

    #[tokio::test]
    async fn test_context_invalid_after_unload() {
        let database = Arc::new(MemoryDatabase::new());
        let h = Harness::with_database(Some(database));
        let path = h.write(json!({"name": "p", "allowedTables": ["users"]}));
        h.manager.load_plugin(&path, None).await.unwrap();

        let context = h.last_context();
        let db = context.database().unwrap().clone();
        let bus = context.event_bus().clone();
        assert!(context.is_valid());

        h.manager.unload_plugin("p").await.unwrap();

        assert!(!context.is_valid());
        assert!(invalidated(context.get_dependencies()));
        assert!(invalidated(context.get_dependency("anything")));
        assert!(invalidated(context.database()));
        assert!(invalidated(context.resources()));
        assert!(invalidated(bus.emit("x", json!(1))));
        assert!(invalidated(bus.on("x", |_| {})));
        assert!(invalidated(db.execute_query("SELECT * FROM users", &[]).await));
        assert!(invalidated(db.get_allowed_tables()));
    }

    #[tokio::test]
    async fn test_reload_yields_fresh_context() {
        let h = Harness::new();
        let path = h.write(json!({"name": "p"}));
        h.manager.load_plugin(&path, None).await.unwrap();
        let before = h.last_context();

        h.write(json!({"name": "p", "version": "1.1.0"}));
        let plugin = h.manager.reload_plugin("p", None).await.unwrap();
        let after = h.last_context();

        assert_eq!(plugin.metadata().version, "1.1.0");
        assert!(!before.is_valid());
        assert!(after.is_valid());
        assert_eq!(
            h.journal(),
            vec!["init:p@1.0.0", "cleanup:p@1.0.0", "init:p@1.1.0"]
        );
    }

    #[tokio::test]
    async fn test_unload_dependency_is_allowed() {
        let h = Harness::new();
        let a = h.write(json!({"name": "a"}));
        let b = h.write(json!({"name": "b", "dependencies": ["a"]}));
        h.manager.load_plugin(&a, None).await.unwrap();
        h.manager.load_plugin(&b, None).await.unwrap();
        let b_context = h.last_context();

        h.manager.unload_plugin("a").await.unwrap();
        assert_eq!(h.manager.get_plugin_names(), vec!["b"]);
        assert!(b_context.get_dependency("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notifications_in_order() {
        let h = Harness::new();
        let mut events = h.manager.subscribe();
        let path = h.write(json!({"name": "p"}));

        h.manager.load_plugin(&path, None).await.unwrap();
        h.manager.reload_plugin("p", None).await.unwrap();
        h.manager.unload_plugin("p").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                ManagerEvent::PluginLoaded(_) => "loaded",
                ManagerEvent::PluginUnloaded(_) => "unloaded",
                ManagerEvent::PluginError { .. } => "error",
            });
        }
        assert_eq!(kinds, vec!["loaded", "unloaded", "loaded", "unloaded"]);
    }

    #[tokio::test]
    async fn test_unload_all() {
        let h = Harness::new();
        for name in ["a", "b", "c"] {
            let path = h.write(json!({"name": name}));
            h.manager.load_plugin(&path, None).await.unwrap();
        }

        h.manager.unload_all().await.unwrap();
        assert!(h.manager.get_plugin_names().is_empty());
        let mut cleanups: Vec<String> = h
            .journal()
            .into_iter()
            .filter(|entry| entry.starts_with("cleanup:"))
            .collect();
        cleanups.sort();
        assert_eq!(cleanups, vec!["cleanup:a@1.0.0", "cleanup:b@1.0.0", "cleanup:c@1.0.0"]);
    }
}

// =============================================================================
// Overrides
// =============================================================================

mod override_tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_clear_roundtrip() {
        let h = Harness::new();
        let overrides = ResourceOverrides::new()
            .tables(["users"])
            .map_table("users", "accounts")
            .topics(["events"]);

        h.manager
            .set_plugin_resource_overrides("p", overrides.clone())
            .unwrap();
        assert_eq!(h.manager.get_plugin_resource_overrides("p"), Some(overrides));

        h.manager.clear_plugin_resource_overrides("p");
        assert_eq!(h.manager.get_plugin_resource_overrides("p"), None);
    }

    #[tokio::test]
    async fn test_override_change_reloads_in_background() {
        let database = Arc::new(MemoryDatabase::new());
        let h = Harness::with_database(Some(Arc::clone(&database)));
        let path = h.write(json!({"name": "reports", "allowedTables": ["users"]}));
        h.manager.load_plugin(&path, None).await.unwrap();
        let original = h.last_context();
        assert_eq!(
            original
                .database()
                .unwrap()
                .prepare("SELECT * FROM users")
                .unwrap(),
            "SELECT * FROM reports_users"
        );

        let handle = h
            .manager
            .set_plugin_resource_overrides(
                "reports",
                ResourceOverrides::new().map_table("users", "accounts"),
            )
            .unwrap()
            .expect("plugin is loaded, so a reload starts");
        assert_eq!(handle.plugin(), "reports");
        assert!(handle.wait().await.unwrap().is_some());

        assert!(!original.is_valid());
        let remapped = h.last_context();
        let db = remapped.database().unwrap();
        assert_eq!(
            db.prepare("SELECT * FROM users").unwrap(),
            "SELECT * FROM reports_accounts"
        );
        assert_eq!(db.get_allowed_tables().unwrap(), vec!["users"]);

        let handle = h
            .manager
            .clear_plugin_resource_overrides("reports")
            .expect("plugin is loaded, so a reload starts");
        assert!(handle.wait().await.unwrap().is_some());
        assert_eq!(
            h.last_context()
                .database()
                .unwrap()
                .prepare("SELECT * FROM users")
                .unwrap(),
            "SELECT * FROM reports_users"
        );
        assert_eq!(h.manager.metrics().reloads, 2);
    }

    #[tokio::test]
    async fn test_failed_background_reload_is_broadcast() {
        let h = Harness::new();
        let path = h.write(json!({"name": "p"}));
        h.manager.load_plugin(&path, None).await.unwrap();
        let mut events = h.manager.subscribe();

        std::fs::remove_file(path.join("plugin.json")).unwrap();
        let handle = h
            .manager
            .set_plugin_resource_overrides("p", ResourceOverrides::new())
            .unwrap()
            .unwrap();
        assert!(handle.wait().await.is_err());

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if let ManagerEvent::PluginError { error, .. } = event {
                saw_error |= matches!(*error, PluginError::InvalidPluginFormat { .. });
            }
        }
        assert!(saw_error);
        assert!(!h.manager.is_loaded("p"));
    }

    #[tokio::test]
    async fn test_shutdown_before_background_reload_keeps_plugin_unloaded() {
        let h = Harness::new();
        let path = h.write(json!({"name": "alpha", "allowedTables": ["users"]}));
        h.manager.load_plugin(&path, None).await.unwrap();

        let handle = h
            .manager
            .set_plugin_resource_overrides("alpha", ResourceOverrides::new().tables(["orders"]))
            .unwrap()
            .expect("plugin is loaded, so a reload starts");
        h.manager.unload_all().await.unwrap();
        assert!(h.manager.get_plugin_names().is_empty());

        assert!(handle.wait().await.unwrap().is_none());
        assert!(h.manager.get_plugin_names().is_empty());
        assert_eq!(h.journal(), vec!["init:alpha@1.0.0", "cleanup:alpha@1.0.0"]);
        assert_eq!(h.manager.metrics().reloads, 0);
        assert!(h.manager.get_plugin_resource_overrides("alpha").is_some());
    }

    #[tokio::test]
    async fn test_unload_before_background_reload_keeps_plugin_unloaded() {
        let h = Harness::new();
        let path = h.write(json!({"name": "beta"}));
        h.manager.load_plugin(&path, None).await.unwrap();

        let handle = h.manager.clear_plugin_resource_overrides("beta").unwrap();
        h.manager.unload_plugin("beta").await.unwrap();

        assert!(handle.wait().await.unwrap().is_none());
        assert!(!h.manager.is_loaded("beta"));

        let reloaded = h.manager.reload_plugin("beta", None).await.unwrap();
        assert_eq!(reloaded.name(), "beta");
    }
}

// =============================================================================
// Directory loading
// =============================================================================

mod directory_tests {
    use super::*;

    #[tokio::test]
    async fn test_dependencies_load_first() {
        let h = Harness::new();
        h.write(json!({"name": "analytics", "dependencies": ["storage", "auth"]}));
        h.write(json!({"name": "auth", "dependencies": ["storage"]}));
        h.write(json!({"name": "storage"}));

        let loaded = h
            .manager
            .load_plugins_from_directory(h.path())
            .await
            .unwrap();
        assert_eq!(loaded, vec!["storage", "auth", "analytics"]);
        assert_eq!(
            h.journal(),
            vec![
                "init:storage@1.0.0",
                "init:auth@1.0.0",
                "init:analytics@1.0.0"
            ]
        );
    }

    #[tokio::test]
    async fn test_unresolvable_plugins_reported_together() {
        let h = Harness::new();
        h.write(json!({"name": "base"}));
        h.write(json!({"name": "orphan", "dependencies": ["missing"]}));
        h.write(json!({"name": "ping", "dependencies": ["pong"]}));
        h.write(json!({"name": "pong", "dependencies": ["ping"]}));

        let err = h
            .manager
            .load_plugins_from_directory(h.path())
            .await
            .unwrap_err();
        match err {
            PluginError::DependencyResolution { unresolved } => {
                assert_eq!(unresolved, vec!["orphan", "ping", "pong"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.manager.get_plugin_names(), vec!["base"]);
    }

    #[tokio::test]
    async fn test_directory_uses_stored_overrides() {
        let database = Arc::new(MemoryDatabase::new());
        let h = Harness::with_database(Some(database));
        h.write(json!({"name": "ledger", "allowedTables": ["entries"]}));
        h.manager
            .set_plugin_resource_overrides(
                "ledger",
                ResourceOverrides::new().map_table("entries", "entries_v2"),
            )
            .unwrap();

        h.manager
            .load_plugins_from_directory(h.path())
            .await
            .unwrap();
        assert_eq!(
            h.last_context()
                .database()
                .unwrap()
                .prepare("DELETE FROM entries")
                .unwrap(),
            "DELETE FROM ledger_entries_v2"
        );
    }

    #[tokio::test]
    async fn test_missing_directory_loads_nothing() {
        let h = Harness::new();
        let loaded = h
            .manager
            .load_plugins_from_directory(h.path().join("absent"))
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_configured_plugins_dir() {
        let h = Harness::new();
        h.write(json!({"name": "audit"}));

        let manager = PluginManager::builder(Arc::new(recording_loader(&h.journal, &h.contexts)))
            .config(HostConfig::new().with_plugins_dir(h.path()))
            .build()
            .unwrap();
        assert_eq!(manager.load_configured_plugins().await.unwrap(), vec!["audit"]);
        assert!(manager.is_loaded("audit"));

        let unconfigured = &h.manager;
        assert!(unconfigured.load_configured_plugins().await.unwrap().is_empty());
    }
}
