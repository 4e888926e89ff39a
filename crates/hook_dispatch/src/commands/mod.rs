//! Console command dispatch.
//!
//! Commands are keyed by name, case-insensitively. Listeners registered with
//! an empty name land in the global registry, which sees every command
//! before any per-name listener in `Pre` and after every per-name listener
//! in `Post`.

mod args;
mod chat;

pub use args::CommandArgs;
pub use chat::ChatDispatch;

use crate::config::ChatTriggers;
use crate::engine::{AccessControl, ConsoleHost};
use crate::error::DispatchError;
use crate::listener::{Listener, ListenerRegistry};
use crate::result::{HookMode, HookResult, ReturnAction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CommandCallingContext {
    Console = 0,
    Chat = 1,
}

/// Command listener: `(caller, context, args)`.
///
/// `caller` is the player slot plus one; `0` is the server console.
pub type CommandCallback =
    dyn Fn(i32, CommandCallingContext, &CommandArgs) -> HookResult + Send + Sync;

pub type CommandListener = Listener<CommandCallback>;

impl Listener<CommandCallback> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(i32, CommandCallingContext, &CommandArgs) -> HookResult + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(callback))
    }
}

/// One known command and its listeners.
pub struct ConCommandInfo {
    name: String,
    description: Mutex<String>,
    admin_flags: AtomicU64,
    callbacks: [ListenerRegistry<CommandCallback>; 2],
    native: bool,
    owned: AtomicBool,
}

impl ConCommandInfo {
    fn new(name: &str, native: bool) -> Self {
        Self {
            name: name.to_string(),
            description: Mutex::new(String::new()),
            admin_flags: AtomicU64::new(0),
            callbacks: Default::default(),
            native,
            owned: AtomicBool::new(false),
        }
    }

    /// Name as first registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description.lock().clone()
    }

    /// Flags a caller needs at least one of; `0` means unrestricted.
    pub fn admin_flags(&self) -> u64 {
        self.admin_flags.load(Ordering::Acquire)
    }

    /// True if the engine already had this command when the entry was made.
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// True if [`CommandTable::create_command`] registered it with the engine.
    pub fn is_owned(&self) -> bool {
        self.owned.load(Ordering::Acquire)
    }

    pub fn listeners(&self, mode: HookMode) -> &ListenerRegistry<CommandCallback> {
        &self.callbacks[mode.index()]
    }

    fn is_unused(&self) -> bool {
        !self.is_owned() && self.callbacks.iter().all(ListenerRegistry::is_empty)
    }
}

impl fmt::Debug for ConCommandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConCommandInfo")
            .field("name", &self.name)
            .field("admin_flags", &self.admin_flags())
            .field("native", &self.native)
            .field("owned", &self.is_owned())
            .finish()
    }
}

/// Command lookup table plus the global registries.
pub struct CommandTable {
    console: Arc<dyn ConsoleHost>,
    access: Arc<dyn AccessControl>,
    triggers: ChatTriggers,
    global: [ListenerRegistry<CommandCallback>; 2],
    commands: Mutex<HashMap<String, Arc<ConCommandInfo>>>,
}

impl CommandTable {
    pub fn new(
        console: Arc<dyn ConsoleHost>,
        access: Arc<dyn AccessControl>,
        triggers: ChatTriggers,
    ) -> Self {
        Self {
            console,
            access,
            triggers,
            global: Default::default(),
            commands: Mutex::new(HashMap::new()),
        }
    }

    pub fn triggers(&self) -> &ChatTriggers {
        &self.triggers
    }

    /// Entry for `name`, if any listener or creation made one.
    pub fn find(&self, name: &str) -> Option<Arc<ConCommandInfo>> {
        self.commands.lock().get(&name.to_lowercase()).cloned()
    }

    /// Registers a listener. An empty `name` targets the global registry.
    ///
    /// Listening on a command that does not exist yet creates an entry for
    /// it, so the listener fires once something registers the command.
    pub fn add_listener(
        &self,
        name: &str,
        listener: CommandListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let registered = if name.is_empty() {
            self.global[mode.index()].register(listener)
        } else {
            let info = {
                let mut commands = self.commands.lock();
                commands
                    .entry(name.to_lowercase())
                    .or_insert_with(|| {
                        let native = self.console.command_exists(name);
                        debug!("📝 Tracking command {} (native: {})", name, native);
                        Arc::new(ConCommandInfo::new(name, native))
                    })
                    .clone()
            };
            info.listeners(mode).register(listener)
        };

        if registered {
            Ok(())
        } else {
            Err(DispatchError::DuplicateListener(describe(name, mode)))
        }
    }

    /// Removes a listener added with [`CommandTable::add_listener`].
    pub fn remove_listener(
        &self,
        name: &str,
        listener: &CommandListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        if name.is_empty() {
            return if self.global[mode.index()].unregister(listener) {
                Ok(())
            } else {
                Err(DispatchError::ListenerNotFound(describe(name, mode)))
            };
        }

        let key = name.to_lowercase();
        let mut commands = self.commands.lock();
        let Some(info) = commands.get(&key).cloned() else {
            warn!("⚠️ No listeners tracked for command {}", name);
            return Err(DispatchError::InvalidKey(name.to_string()));
        };

        if !info.listeners(mode).unregister(listener) {
            return Err(DispatchError::ListenerNotFound(describe(name, mode)));
        }

        if info.is_unused() {
            commands.remove(&key);
        }
        Ok(())
    }

    /// Registers a new command with the engine and tracks it as owned.
    pub fn create_command(
        &self,
        name: &str,
        description: &str,
        flags: i64,
        admin_flags: u64,
    ) -> Result<(), DispatchError> {
        if name.is_empty() {
            return Err(DispatchError::InvalidKey(name.to_string()));
        }
        if self.console.convar_exists(name) || self.console.command_exists(name) {
            return Err(DispatchError::CommandExists(name.to_string()));
        }

        let mut commands = self.commands.lock();
        let key = name.to_lowercase();
        if commands.get(&key).is_some_and(|info| info.is_owned()) {
            return Err(DispatchError::CommandExists(name.to_string()));
        }

        if !self.console.register_command(name, description, flags) {
            return Err(DispatchError::NativeRegistrationFailed(name.to_string()));
        }

        let info = commands
            .entry(key)
            .or_insert_with(|| Arc::new(ConCommandInfo::new(name, false)));
        *info.description.lock() = description.to_string();
        info.admin_flags.store(admin_flags, Ordering::Release);
        info.owned.store(true, Ordering::Release);

        info!("📝 Created command {} (admin flags {:#x})", name, admin_flags);
        Ok(())
    }

    /// Removes a command from the engine.
    ///
    /// A tracked entry is dropped together with its listeners. The engine
    /// registration is only reverted for commands this table created, or for
    /// untracked engine commands.
    pub fn destroy_command(&self, name: &str) -> Result<(), DispatchError> {
        if !self.console.command_exists(name) {
            return Err(DispatchError::InvalidKey(name.to_string()));
        }

        let removed = self.commands.lock().remove(&name.to_lowercase());
        match removed {
            Some(info) => {
                if info.is_owned() {
                    self.console.unregister_command(name);
                }
            }
            None => {
                self.console.unregister_command(name);
            }
        }

        info!("📝 Destroyed command {}", name);
        Ok(())
    }

    /// True if the engine knows a command by this name.
    pub fn is_valid_command(&self, name: &str) -> bool {
        self.console.command_exists(name)
    }

    /// Runs the listeners of one phase: global then per-name in `Pre`,
    /// per-name then global in `Post`.
    pub fn execute_command_callbacks(
        &self,
        name: &str,
        caller: i32,
        args: &CommandArgs,
        mode: HookMode,
        context: CommandCallingContext,
    ) -> HookResult {
        debug!("📡 Command {} [{}] from caller {}", name, mode, caller);

        match mode {
            HookMode::Pre => {
                let global = self.run_global(caller, args, mode, context);
                if global >= HookResult::Stop {
                    return HookResult::Stop;
                }
                global.escalate(self.run_named(name, caller, args, mode, context))
            }
            HookMode::Post => self
                .run_named(name, caller, args, mode, context)
                .escalate(self.run_global(caller, args, mode, context)),
        }
    }

    fn run_global(
        &self,
        caller: i32,
        args: &CommandArgs,
        mode: HookMode,
        context: CommandCallingContext,
    ) -> HookResult {
        let mut result = HookResult::Continue;
        for listener in self.global[mode.index()].iter() {
            let verdict = (listener.callback())(caller, context, args);
            if verdict >= HookResult::Stop {
                return HookResult::Stop;
            }
            result = result.escalate(verdict);
        }
        result
    }

    fn run_named(
        &self,
        name: &str,
        caller: i32,
        args: &CommandArgs,
        mode: HookMode,
        context: CommandCallingContext,
    ) -> HookResult {
        let Some(info) = self.find(name) else {
            return HookResult::Continue;
        };

        if !self.has_access(caller, &info) {
            debug!("🚫 Caller {} lacks access to {}", caller, info.name());
            return HookResult::Continue;
        }

        let mut result = HookResult::Continue;
        for listener in info.listeners(mode).iter() {
            let verdict = (listener.callback())(caller, context, args);
            if mode == HookMode::Pre && verdict.suppresses() {
                return verdict;
            }
            result = result.escalate(verdict);
        }
        result
    }

    /// Console dispatch hook.
    ///
    /// `slot` is the engine player slot of the sender, `-1` for the server
    /// console. Chat commands typed after a trigger in `say` or `say_team`
    /// are dispatched as well.
    pub fn dispatch_con_command(&self, slot: i32, args: &CommandArgs, mode: HookMode) -> ReturnAction {
        if args.is_empty() {
            return ReturnAction::Ignored;
        }

        let caller = slot + 1;
        let result = self.execute_command_callbacks(
            args.name(),
            caller,
            args,
            mode,
            CommandCallingContext::Console,
        );
        if result.suppresses() {
            return ReturnAction::Supercede;
        }

        // Public triggers still show the chat line; silent ones hide it.
        match self.dispatch_say(caller, args, mode) {
            Some(chat) if chat.suppress_echo => ReturnAction::Supercede,
            _ => ReturnAction::Ignored,
        }
    }

    /// Client command hook. Only runs the `Pre` phase.
    pub fn on_client_command(&self, slot: i32, args: &CommandArgs) -> ReturnAction {
        if args.is_empty() {
            return ReturnAction::Ignored;
        }

        let result = self.execute_command_callbacks(
            args.name(),
            slot + 1,
            args,
            HookMode::Pre,
            CommandCallingContext::Console,
        );
        if result.suppresses() {
            ReturnAction::Supercede
        } else {
            ReturnAction::Ignored
        }
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    /// Global listeners for one phase.
    pub fn global_listeners(&self, mode: HookMode) -> &ListenerRegistry<CommandCallback> {
        &self.global[mode.index()]
    }

    fn has_access(&self, caller: i32, info: &ConCommandInfo) -> bool {
        let required = info.admin_flags();
        required == 0 || caller == 0 || self.access.admin_flags(caller) & required != 0
    }
}

impl Drop for CommandTable {
    fn drop(&mut self) {
        for info in self.commands.get_mut().values() {
            if info.is_owned() {
                self.console.unregister_command(info.name());
            }
        }
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.len())
            .field("global_pre", &self.global[0].len())
            .field("global_post", &self.global[1].len())
            .finish()
    }
}

fn describe(name: &str, mode: HookMode) -> String {
    if name.is_empty() {
        format!("global command listener ({})", mode)
    } else {
        format!("command {} ({})", name, mode)
    }
}
