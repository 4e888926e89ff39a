//! Dynamic plugin loading for the hook dispatch engine.
//!
//! Plugins are shared libraries exporting `create_plugin` (see
//! [`hook_dispatch::create_plugin!`]). Loading runs in two phases so every
//! plugin has registered its listeners before any plugin's `init` runs.
//! Unloading calls `shutdown` and then removes every listener the plugin
//! registered through its context.

mod ledger;

pub use ledger::PluginScope;

use hook_dispatch::{HookDispatch, Plugin, PluginError};
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const PLUGIN_EXTENSIONS: [&str; 3] = ["so", "dll", "dylib"];

// ============================================================================
// Plugin Manager
// ============================================================================

/// Owns loaded plugins and the libraries backing them.
pub struct PluginManager {
    dispatch: Arc<HookDispatch>,
    plugins: RwLock<HashMap<String, LoadedPlugin>>,
    plugin_directory: PathBuf,
}

/// A plugin that finished both loading phases.
struct LoadedPlugin {
    // Dropped before `_library` so plugin code is never unmapped under it.
    plugin: Box<dyn Plugin>,
    scope: Arc<PluginScope>,
    _library: Option<Library>,
    metadata: PluginMetadata,
}

/// A plugin created from its library but not yet initialized.
struct PartiallyLoadedPlugin {
    plugin: Box<dyn Plugin>,
    scope: Arc<PluginScope>,
    library: Option<Library>,
    metadata: PluginMetadata,
}

#[derive(Debug, Clone)]
struct PluginMetadata {
    name: String,
    version: String,
    path: Option<PathBuf>,
    loaded_at: SystemTime,
}

impl PluginManager {
    pub fn new(dispatch: Arc<HookDispatch>, plugin_directory: impl AsRef<Path>) -> Self {
        Self {
            dispatch,
            plugins: RwLock::new(HashMap::new()),
            plugin_directory: plugin_directory.as_ref().to_path_buf(),
        }
    }

    pub fn dispatch(&self) -> Arc<HookDispatch> {
        self.dispatch.clone()
    }

    pub fn plugin_directory(&self) -> &Path {
        &self.plugin_directory
    }

    /// Opens a library and creates its plugin instance without initializing it.
    async fn load_plugin_instance(
        &self,
        plugin_path: impl AsRef<Path>,
    ) -> Result<PartiallyLoadedPlugin, PluginError> {
        let plugin_path = plugin_path.as_ref();
        debug!("🔌 Loading plugin instance from: {}", plugin_path.display());

        let library = unsafe {
            Library::new(plugin_path).map_err(|e| {
                PluginError::InitializationFailed(format!("Failed to load library: {}", e))
            })?
        };

        let plugin = {
            let create_plugin: Symbol<unsafe extern "C" fn() -> *mut dyn Plugin> = unsafe {
                library.get(b"create_plugin").map_err(|e| {
                    PluginError::InitializationFailed(format!(
                        "Failed to find create_plugin function: {}",
                        e
                    ))
                })?
            };

            let plugin_ptr = unsafe { create_plugin() };
            if plugin_ptr.is_null() {
                return Err(PluginError::InitializationFailed(
                    "create_plugin returned null pointer".to_string(),
                ));
            }
            unsafe { Box::from_raw(plugin_ptr) }
        };

        self.prepare(plugin, Some(library), Some(plugin_path.to_path_buf()))
            .await
    }

    /// Wraps a plugin instance with its scope and metadata.
    async fn prepare(
        &self,
        plugin: Box<dyn Plugin>,
        library: Option<Library>,
        path: Option<PathBuf>,
    ) -> Result<PartiallyLoadedPlugin, PluginError> {
        let name = plugin.name().to_string();
        let version = plugin.version().to_string();

        if self.plugins.read().await.contains_key(&name) {
            // Plugin first, library second.
            drop(plugin);
            drop(library);
            return Err(PluginError::ExecutionError(format!(
                "Plugin {} is already loaded",
                name
            )));
        }

        debug!("🔌 Created plugin instance: {} v{}", name, version);

        Ok(PartiallyLoadedPlugin {
            plugin,
            scope: Arc::new(PluginScope::new(name.clone(), self.dispatch.clone())),
            library,
            metadata: PluginMetadata {
                name,
                version,
                path,
                loaded_at: SystemTime::now(),
            },
        })
    }

    /// Runs `pre_init`. On failure the plugin's partial registrations are
    /// released.
    async fn pre_init(&self, partial: &mut PartiallyLoadedPlugin) -> Result<(), PluginError> {
        let result = partial.plugin.pre_init(partial.scope.clone()).await;
        match &result {
            Ok(()) => info!(
                "📝 Plugin {} pre-initialized, registered {} listeners",
                partial.metadata.name,
                partial.scope.registration_count()
            ),
            Err(e) => {
                error!("Plugin {} pre-initialization failed: {}", partial.metadata.name, e);
                partial.scope.release_all();
            }
        }
        result
    }

    /// Runs `init` and stores the plugin. On failure the plugin's
    /// registrations are released.
    async fn finish(&self, mut partial: PartiallyLoadedPlugin) -> Result<String, PluginError> {
        if let Err(e) = partial.plugin.init(partial.scope.clone()).await {
            error!("Plugin {} initialization failed: {}", partial.metadata.name, e);
            partial.scope.release_all();
            return Err(e);
        }

        let name = partial.metadata.name.clone();
        info!("✅ Plugin {} initialized successfully", name);

        let loaded = LoadedPlugin {
            plugin: partial.plugin,
            scope: partial.scope,
            _library: partial.library,
            metadata: partial.metadata,
        };
        self.plugins.write().await.insert(name.clone(), loaded);
        Ok(name)
    }

    /// Loads and initializes a single plugin library.
    ///
    /// When loading several plugins, prefer [`PluginManager::load_all_plugins`]
    /// so every plugin registers before any plugin initializes.
    pub async fn load_plugin(&self, plugin_path: impl AsRef<Path>) -> Result<String, PluginError> {
        let plugin_path = plugin_path.as_ref();
        info!("🔌 Loading single plugin from: {}", plugin_path.display());

        let mut partial = self.load_plugin_instance(plugin_path).await?;
        self.pre_init(&mut partial).await?;
        self.finish(partial).await
    }

    /// Loads a plugin linked into the host instead of a shared library.
    pub async fn load_static_plugin(&self, plugin: Box<dyn Plugin>) -> Result<String, PluginError> {
        let mut partial = self.prepare(plugin, None, None).await?;
        self.pre_init(&mut partial).await?;
        self.finish(partial).await
    }

    /// Lists plugin libraries in the plugin directory.
    pub async fn discover_plugins(&self) -> Result<Vec<PluginDiscovery>, PluginError> {
        if !self.plugin_directory.exists() {
            warn!(
                "⚠️ Plugin directory does not exist: {}",
                self.plugin_directory.display()
            );
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.plugin_directory)
            .await
            .map_err(|e| {
                PluginError::InitializationFailed(format!("Failed to read plugin directory: {}", e))
            })?;

        let loaded = self.plugins.read().await;
        let mut discoveries = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            PluginError::InitializationFailed(format!("Failed to read directory entry: {}", e))
        })? {
            let path = entry.path();
            let is_library = path
                .extension()
                .map(|ext| PLUGIN_EXTENSIONS.iter().any(|known| ext == *known))
                .unwrap_or(false);
            if !is_library {
                continue;
            }

            let name = path
                .file_stem()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let is_loaded = loaded
                .values()
                .any(|plugin| plugin.metadata.path.as_deref() == Some(path.as_path()));

            discoveries.push(PluginDiscovery {
                name,
                path,
                is_loaded,
            });
        }

        discoveries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(discoveries)
    }

    /// Loads every discovered plugin: all libraries first, then every
    /// `pre_init`, then every `init`. Failing plugins are logged and skipped.
    pub async fn load_all_plugins(&self) -> Result<Vec<String>, PluginError> {
        let discoveries = self.discover_plugins().await?;
        let mut partially_loaded = Vec::new();
        let mut failed_plugins = Vec::new();

        info!(
            "🔌 Starting two-phase plugin loading for {} discovered plugins",
            discoveries.len()
        );

        for discovery in discoveries.into_iter().filter(|d| !d.is_loaded) {
            match self.load_plugin_instance(&discovery.path).await {
                Ok(partial) => partially_loaded.push(partial),
                Err(e) => {
                    error!("Failed to load plugin instance {}: {}", discovery.name, e);
                    failed_plugins.push((discovery.name, e));
                }
            }
        }

        info!("📝 Registering listeners for {} plugins", partially_loaded.len());
        let mut registered = Vec::new();
        for mut partial in partially_loaded {
            match self.pre_init(&mut partial).await {
                Ok(()) => registered.push(partial),
                Err(e) => failed_plugins.push((partial.metadata.name.clone(), e)),
            }
        }

        info!("🔧 Initializing {} plugins", registered.len());
        let mut loaded_plugins = Vec::new();
        for partial in registered {
            let name = partial.metadata.name.clone();
            match self.finish(partial).await {
                Ok(name) => loaded_plugins.push(name),
                Err(e) => failed_plugins.push((name, e)),
            }
        }

        if !failed_plugins.is_empty() {
            warn!("⚠️ Failed to load {} plugins", failed_plugins.len());
            for (name, error) in &failed_plugins {
                warn!("  {}: {}", name, error);
            }
        }

        info!(
            "Two-phase loading complete: {} plugins loaded from {}",
            loaded_plugins.len(),
            self.plugin_directory.display()
        );

        Ok(loaded_plugins)
    }

    /// Shuts a plugin down and removes its listeners.
    pub async fn unload_plugin(&self, plugin_name: &str) -> Result<(), PluginError> {
        let loaded = self.plugins.write().await.remove(plugin_name);
        let Some(loaded) = loaded else {
            return Err(PluginError::NotFound(plugin_name.to_string()));
        };

        info!("🛑 Unloading plugin: {}", plugin_name);
        Self::teardown(loaded).await;
        info!("Plugin {} unloaded successfully", plugin_name);
        Ok(())
    }

    /// Unloads every plugin.
    pub async fn shutdown_all(&self) -> Result<(), PluginError> {
        let drained: Vec<LoadedPlugin> = self.plugins.write().await.drain().map(|(_, p)| p).collect();
        info!("🛑 Shutting down {} plugins", drained.len());

        for loaded in drained {
            Self::teardown(loaded).await;
        }

        info!("All plugins shut down");
        Ok(())
    }

    async fn teardown(mut loaded: LoadedPlugin) {
        if let Err(e) = loaded.plugin.shutdown(loaded.scope.clone()).await {
            error!("Error shutting down plugin {}: {}", loaded.metadata.name, e);
        }
        loaded.scope.release_all();
    }

    pub async fn get_loaded_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_plugin_info(&self, plugin_name: &str) -> Option<PluginInfo> {
        let plugins = self.plugins.read().await;
        plugins.get(plugin_name).map(|loaded| PluginInfo {
            name: loaded.metadata.name.clone(),
            version: loaded.metadata.version.clone(),
            path: loaded.metadata.path.clone(),
            loaded_at: loaded.metadata.loaded_at,
            listener_count: loaded.scope.registration_count(),
        })
    }

    pub async fn get_plugin_stats(&self) -> PluginSystemStats {
        let plugins = self.plugins.read().await;
        let mut infos: Vec<PluginInfo> = plugins
            .values()
            .map(|loaded| PluginInfo {
                name: loaded.metadata.name.clone(),
                version: loaded.metadata.version.clone(),
                path: loaded.metadata.path.clone(),
                loaded_at: loaded.metadata.loaded_at,
                listener_count: loaded.scope.registration_count(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));

        PluginSystemStats {
            total_plugins: infos.len(),
            total_listeners: infos.iter().map(|info| info.listener_count).sum(),
            plugins: infos,
        }
    }
}

// ============================================================================
// Discovery and Statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct PluginDiscovery {
    pub name: String,
    pub path: PathBuf,
    pub is_loaded: bool,
}

/// Information about a loaded plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    /// `None` for plugins linked into the host.
    pub path: Option<PathBuf>,
    pub loaded_at: SystemTime,
    pub listener_count: usize,
}

#[derive(Debug, Clone)]
pub struct PluginSystemStats {
    pub total_plugins: usize,
    pub total_listeners: usize,
    pub plugins: Vec<PluginInfo>,
}

/// Creates a plugin manager over an existing dispatch root.
pub fn create_plugin_manager(
    dispatch: Arc<HookDispatch>,
    plugin_directory: impl AsRef<Path>,
) -> PluginManager {
    PluginManager::new(dispatch, plugin_directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hook_dispatch::{
        create_hook_dispatch, ChatTriggers, CommandArgs, CommandListener, ConsoleHost, EngineServices,
        EventListener, HookMode, HookResult, LogLevel, LoopbackEngine, PluginContext, ReturnAction,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatch() -> (Arc<LoopbackEngine>, Arc<HookDispatch>) {
        let engine = Arc::new(LoopbackEngine::new());
        engine.add_game_event("round_end");
        let dispatch = create_hook_dispatch(EngineServices::from_engine(engine.clone()), ChatTriggers::default());
        (engine, dispatch)
    }

    struct TestPlugin {
        name: &'static str,
        inits: Arc<AtomicUsize>,
        fail_init: bool,
    }

    impl TestPlugin {
        fn new(name: &'static str, inits: Arc<AtomicUsize>) -> Self {
            Self {
                name,
                inits,
                fail_init: false,
            }
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        async fn pre_init(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
            context.add_command_listener(
                "kick",
                CommandListener::new(|_, _, _| HookResult::Handled),
                HookMode::Pre,
            )?;
            context.create_command(&format!("sm_{}", self.name), "Test command", 0, 0)?;
            context.hook_event(
                "round_end",
                EventListener::new(|_, _, _| HookResult::Continue),
                HookMode::Post,
            )?;
            Ok(())
        }

        async fn init(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
            if self.fail_init {
                return Err(PluginError::InitializationFailed("refusing to start".to_string()));
            }
            self.inits.fetch_add(1, Ordering::SeqCst);
            context.log(LogLevel::Info, "Test plugin initialized");
            Ok(())
        }

        async fn shutdown(&mut self, _context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_plugin_manager_creation() {
        let (_engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch, "./test_plugins");
        assert!(manager.get_loaded_plugins().await.is_empty());
        assert_eq!(manager.get_plugin_stats().await.total_plugins, 0);
    }

    #[tokio::test]
    async fn test_unload_removes_plugin_listeners() {
        let (engine, dispatch) = dispatch();
        let manager = create_plugin_manager(dispatch.clone(), "./test_plugins");
        let inits = Arc::new(AtomicUsize::new(0));

        let name = manager
            .load_static_plugin(Box::new(TestPlugin::new("blocker", inits.clone())))
            .await
            .unwrap();
        assert_eq!(name, "blocker");
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(engine.command_exists("sm_blocker"));

        let info = manager.get_plugin_info("blocker").await.unwrap();
        assert_eq!(info.listener_count, 3);
        assert!(info.path.is_none());

        let args = CommandArgs::tokenize("kick 3");
        assert_eq!(
            dispatch.commands.dispatch_con_command(-1, &args, HookMode::Pre),
            ReturnAction::Supercede
        );

        manager.unload_plugin("blocker").await.unwrap();
        assert_eq!(
            dispatch.commands.dispatch_con_command(-1, &args, HookMode::Pre),
            ReturnAction::Ignored
        );
        assert!(!engine.command_exists("sm_blocker"));
        assert!(dispatch.events.find("round_end").is_none());

        assert!(matches!(
            manager.unload_plugin("blocker").await,
            Err(PluginError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_plugin_rejected() {
        let (_engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch, "./test_plugins");
        let inits = Arc::new(AtomicUsize::new(0));

        manager
            .load_static_plugin(Box::new(TestPlugin::new("dup", inits.clone())))
            .await
            .unwrap();
        let err = manager
            .load_static_plugin(Box::new(TestPlugin::new("dup", inits)))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::ExecutionError(_)));
        assert_eq!(manager.get_loaded_plugins().await, vec!["dup".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_init_releases_registrations() {
        let (engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch.clone(), "./test_plugins");
        let mut plugin = TestPlugin::new("broken", Arc::new(AtomicUsize::new(0)));
        plugin.fail_init = true;

        assert!(manager.load_static_plugin(Box::new(plugin)).await.is_err());
        assert!(manager.get_loaded_plugins().await.is_empty());
        assert!(!engine.command_exists("sm_broken"));
        assert!(dispatch.commands.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_all_unloads_everything() {
        let (_engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch.clone(), "./test_plugins");
        let inits = Arc::new(AtomicUsize::new(0));
        for name in ["one", "two"] {
            manager
                .load_static_plugin(Box::new(TestPlugin::new(name, inits.clone())))
                .await
                .unwrap();
        }

        let stats = manager.get_plugin_stats().await;
        assert_eq!(stats.total_plugins, 2);
        assert_eq!(stats.total_listeners, 6);

        manager.shutdown_all().await.unwrap();
        assert!(manager.get_loaded_plugins().await.is_empty());
        assert!(dispatch.commands.is_empty());
        assert!(dispatch.events.is_empty());
    }

    #[tokio::test]
    async fn test_plugin_discovery_filters_libraries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.so"), b"").unwrap();
        std::fs::write(dir.path().join("beta.dll"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let (_engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch, dir.path());
        let discoveries = manager.discover_plugins().await.unwrap();
        let names: Vec<&str> = discoveries.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(discoveries.iter().all(|d| !d.is_loaded));
    }

    #[tokio::test]
    async fn test_invalid_library_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("garbage.so"), b"not a shared object").unwrap();

        let (_engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch, dir.path());
        let loaded = manager.load_all_plugins().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_discovers_nothing() {
        let (_engine, dispatch) = dispatch();
        let manager = PluginManager::new(dispatch, "./definitely_missing_plugins");
        assert!(manager.discover_plugins().await.unwrap().is_empty());
        assert!(manager.load_all_plugins().await.unwrap().is_empty());
    }
}
