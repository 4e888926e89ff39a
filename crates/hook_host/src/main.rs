//! Standalone host for the hook dispatch engine.
//!
//! Runs the dispatch tables over an in-process loopback engine, loads
//! plugins, and feeds console lines from stdin through the command hooks
//! until a shutdown signal or `quit`.

mod cli;
mod config;
mod console;
mod logging;
mod signals;

use anyhow::Context;
use cli::CliArgs;
use config::AppConfig;
use console::ConsoleTransport;
use hook_dispatch::{create_hook_dispatch, install_global, EngineServices, HookDispatch, LoopbackEngine};
use plugin_system::PluginManager;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

// ============================================================================
// Application
// ============================================================================

pub struct Application {
    config: AppConfig,
    load_plugins: bool,
    dispatch: Arc<HookDispatch>,
    plugins: PluginManager,
    console: ConsoleTransport,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Configuration comes before logging so the level can be applied.
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(plugin_dir) = args.plugin_dir {
            config.plugins.directory = plugin_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config.validate().context("Configuration validation failed")?;
        logging::setup_logging(&config.logging)?;

        let engine = Arc::new(LoopbackEngine::new());
        for name in &config.engine.game_events {
            engine.add_game_event(name);
        }
        for name in &config.engine.convars {
            engine.add_convar(name);
        }
        for (caller, flags) in config.admin_callers() {
            engine.set_admin_flags(caller, flags);
        }

        let dispatch = create_hook_dispatch(EngineServices::from_engine(engine.clone()), config.chat.clone());
        if install_global(dispatch.clone()).is_err() {
            warn!("⚠️ A global hook dispatch was already installed");
        }

        let plugins = PluginManager::new(dispatch.clone(), &config.plugins.directory);
        let console = ConsoleTransport::new(engine, dispatch.clone());

        info!(
            "📂 Config: {} | Plugins: {}",
            args.config_path.display(),
            config.plugins.directory
        );

        Ok(Self {
            load_plugins: config.plugins.auto_load && !args.no_plugins,
            config,
            dispatch,
            plugins,
            console,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("🖥️ Starting hook host");
        info!("  🔌 Plugin directory: {}", self.config.plugins.directory);
        info!("  🗺️ Game events: {}", self.config.engine.game_events.len());

        if self.load_plugins {
            let loaded = self.plugins.load_all_plugins().await?;
            info!("🔌 {} plugins loaded", loaded.len());
        } else {
            info!("🔌 Plugin loading disabled");
        }

        info!("🛑 Type quit or press Ctrl+C to shut down");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let shutdown = signals::wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("Signal handling failed: {}", e);
                    }
                    break;
                }
                line = lines.next_line() => {
                    match line? {
                        Some(line) if matches!(line.trim(), "quit" | "exit") => break,
                        Some(line) => {
                            let outcome = self.console.execute_line(-1, &line);
                            tracing::debug!("{:?}", outcome);
                        }
                        None => {
                            info!("Console input closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("🛑 Shutting down");
        self.plugins.shutdown_all().await?;
        info!("📊 Final state: {:?}", self.dispatch);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Host error: {:#}", e);
        std::process::exit(1);
    }
}
