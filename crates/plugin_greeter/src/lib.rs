use async_trait::async_trait;
use hook_dispatch::{
    create_plugin, CommandCallingContext, CommandListener, DispatchError, EventListener, HookMode,
    HookResult, LogLevel, PluginContext, PluginError, SimplePlugin,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// Greeter Plugin
// ============================================================================

/// Welcomes players and answers `sm_greet` and the `hello` chat command.
pub struct GreeterPlugin {
    name: String,
    welcome_count: Arc<AtomicU32>,
    greet_count: Arc<AtomicU32>,
}

impl GreeterPlugin {
    pub fn new() -> Self {
        Self {
            name: "greeter".to_string(),
            welcome_count: Arc::new(AtomicU32::new(0)),
            greet_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn welcome_count(&self) -> u32 {
        self.welcome_count.load(Ordering::Relaxed)
    }

    pub fn greet_count(&self) -> u32 {
        self.greet_count.load(Ordering::Relaxed)
    }
}

impl Default for GreeterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimplePlugin for GreeterPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn register_listeners(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        context.create_command("sm_greet", "Greets everyone on the server", 0, 0)?;

        let greets = self.greet_count.clone();
        context.add_command_listener(
            "sm_greet",
            CommandListener::new(move |caller, _, args| {
                let count = greets.fetch_add(1, Ordering::Relaxed) + 1;
                info!("👋 Greeting #{} from caller {} {}", count, caller, args.arg_s());
                HookResult::Handled
            }),
            HookMode::Pre,
        )?;

        // Chat-only: a console `hello` falls through to the engine.
        let greets = self.greet_count.clone();
        context.add_command_listener(
            "hello",
            CommandListener::new(move |caller, calling_context, _| {
                if calling_context != CommandCallingContext::Chat {
                    return HookResult::Continue;
                }
                greets.fetch_add(1, Ordering::Relaxed);
                info!("👋 Hello to you too, caller {}", caller);
                HookResult::Handled
            }),
            HookMode::Pre,
        )?;

        let welcomes = self.welcome_count.clone();
        let hooked = context.hook_event(
            "player_connect",
            EventListener::new(move |_, _, _| {
                welcomes.fetch_add(1, Ordering::Relaxed);
                HookResult::Continue
            }),
            HookMode::Post,
        );
        match hooked {
            Ok(()) => {}
            Err(DispatchError::InvalidKey(name)) => {
                warn!("⚠️ Engine has no {} event, connection welcomes disabled", name)
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    async fn on_init(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        context.log(LogLevel::Info, "👋 Greeter ready to welcome players");
        Ok(())
    }

    async fn on_shutdown(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        context.log(
            LogLevel::Info,
            &format!(
                "👋 Greeter leaving after {} welcomes and {} greetings",
                self.welcome_count(),
                self.greet_count()
            ),
        );
        Ok(())
    }
}

create_plugin!(GreeterPlugin);
