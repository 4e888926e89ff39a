//! Per-plugin registration tracking.

use hook_dispatch::{
    CommandListener, DispatchError, EventListener, HookDispatch, HookMode, LogLevel,
    MessageListener, OutputListener, PluginContext,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// One registration made on behalf of a plugin.
#[derive(Clone)]
enum Registration {
    CommandListener {
        name: String,
        listener: CommandListener,
        mode: HookMode,
    },
    Command {
        name: String,
    },
    Event {
        name: String,
        listener: EventListener,
        mode: HookMode,
    },
    Output {
        classname: String,
        output: String,
        listener: OutputListener,
        mode: HookMode,
    },
    Message {
        id: i32,
        listener: MessageListener,
        mode: HookMode,
    },
}

impl Registration {
    fn undo(&self, dispatch: &HookDispatch) -> Result<(), DispatchError> {
        match self {
            Registration::CommandListener { name, listener, mode } => {
                dispatch.commands.remove_listener(name, listener, *mode)
            }
            Registration::Command { name } => dispatch.commands.destroy_command(name),
            Registration::Event { name, listener, mode } => {
                dispatch.events.unhook_event(name, listener, *mode)
            }
            Registration::Output {
                classname,
                output,
                listener,
                mode,
            } => dispatch.outputs.unhook_output(classname, output, listener, *mode),
            Registration::Message { id, listener, mode } => {
                dispatch.messages.unhook_message(*id, listener, *mode)
            }
        }
    }
}

/// The [`PluginContext`] handed to one plugin.
///
/// Every successful registration is recorded so [`PluginScope::release_all`]
/// can take it back when the plugin goes away.
pub struct PluginScope {
    plugin_name: String,
    dispatch: Arc<HookDispatch>,
    ledger: Mutex<Vec<Registration>>,
}

impl PluginScope {
    pub fn new(plugin_name: impl Into<String>, dispatch: Arc<HookDispatch>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            dispatch,
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Registrations still held for the plugin.
    pub fn registration_count(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Removes everything the plugin registered, newest first.
    ///
    /// Entries the plugin already removed on its own are skipped. Returns
    /// the number of registrations actually removed.
    pub fn release_all(&self) -> usize {
        let registrations: Vec<Registration> = std::mem::take(&mut *self.ledger.lock());
        let plugin_name = &self.plugin_name;
        let mut released = 0;

        for registration in registrations.iter().rev() {
            match registration.undo(&self.dispatch) {
                Ok(()) => released += 1,
                Err(e) => debug!("🗑️ {} skipped stale registration: {}", plugin_name, e),
            }
        }

        info!("🗑️ Released {} registrations held by {}", released, plugin_name);
        released
    }

    fn record(&self, result: Result<(), DispatchError>, registration: Registration) -> Result<(), DispatchError> {
        match result {
            Ok(()) => {
                self.ledger.lock().push(registration);
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ {} registration rejected: {}", self.plugin_name(), e);
                Err(e)
            }
        }
    }
}

impl PluginContext for PluginScope {
    fn dispatch(&self) -> Arc<HookDispatch> {
        self.dispatch.clone()
    }

    fn log(&self, level: LogLevel, message: &str) {
        let plugin = &self.plugin_name;
        match level {
            LogLevel::Error => error!("[{}] {}", plugin, message),
            LogLevel::Warn => warn!("[{}] {}", plugin, message),
            LogLevel::Info => info!("[{}] {}", plugin, message),
            LogLevel::Debug => debug!("[{}] {}", plugin, message),
            LogLevel::Trace => trace!("[{}] {}", plugin, message),
        }
    }

    fn add_command_listener(
        &self,
        name: &str,
        listener: CommandListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let result = self.dispatch.commands.add_listener(name, listener.clone(), mode);
        self.record(
            result,
            Registration::CommandListener {
                name: name.to_string(),
                listener,
                mode,
            },
        )
    }

    fn create_command(
        &self,
        name: &str,
        description: &str,
        flags: i64,
        admin_flags: u64,
    ) -> Result<(), DispatchError> {
        let result = self
            .dispatch
            .commands
            .create_command(name, description, flags, admin_flags);
        self.record(result, Registration::Command { name: name.to_string() })
    }

    fn hook_event(&self, name: &str, listener: EventListener, mode: HookMode) -> Result<(), DispatchError> {
        let result = self.dispatch.events.hook_event(name, listener.clone(), mode);
        self.record(
            result,
            Registration::Event {
                name: name.to_string(),
                listener,
                mode,
            },
        )
    }

    fn hook_output(
        &self,
        classname: &str,
        output: &str,
        listener: OutputListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let result = self
            .dispatch
            .outputs
            .hook_output(classname, output, listener.clone(), mode);
        self.record(
            result,
            Registration::Output {
                classname: classname.to_string(),
                output: output.to_string(),
                listener,
                mode,
            },
        )
    }

    fn hook_message(&self, id: i32, listener: MessageListener, mode: HookMode) -> Result<(), DispatchError> {
        let result = self.dispatch.messages.hook_message(id, listener.clone(), mode);
        self.record(result, Registration::Message { id, listener, mode })
    }
}
