//! # Hook Dispatch
//!
//! Interception dispatch engine for game server plugins.
//!
//! An engine hook transport calls into this crate right before a built-in
//! action happens (`Pre`) and right after it (`Post`). Plugins register
//! listeners on four kinds of interception points:
//!
//! - **Commands**, keyed by case-insensitive name, plus a global registry
//! - **Game events**, keyed by name, with payload duplication for `Post`
//! - **Entity outputs**, keyed by `(classname, output)` with wildcards
//! - **User messages**, keyed by numeric id, plus a global registry
//!
//! Each listener returns a [`HookResult`]. The running verdict of a dispatch
//! is the maximum result seen, and a `Pre` verdict of `Handled` or `Stop`
//! tells the transport to suppress the real action.
//!
//! ## Quick Start
//!
//! ```rust
//! use hook_dispatch::*;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(LoopbackEngine::new());
//! let dispatch = create_hook_dispatch(EngineServices::from_engine(engine), ChatTriggers::default());
//!
//! dispatch
//!     .commands
//!     .add_listener("kick", CommandListener::new(|_, _, _| HookResult::Stop), HookMode::Pre)
//!     .unwrap();
//!
//! let args = CommandArgs::tokenize("kick 5");
//! let action = dispatch.commands.dispatch_con_command(-1, &args, HookMode::Pre);
//! assert_eq!(action, ReturnAction::Supercede);
//! ```
//!
//! ## Threading
//!
//! Dispatch runs synchronously on whichever thread the transport calls from.
//! Registration may happen on any thread; each table guards its structure
//! with a mutex that is never held while a listener runs, so listeners may
//! register and unregister listeners themselves.

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod forwards;
pub mod listener;
pub mod loopback;
pub mod messages;
pub mod outputs;
pub mod plugin;
pub mod result;

pub use commands::{
    ChatDispatch, CommandArgs, CommandCallingContext, CommandListener, CommandTable, ConCommandInfo,
};
pub use config::ChatTriggers;
pub use engine::{AccessControl, ConsoleHost, EngineServices, GameEventHandle, GameEventHost};
pub use error::{DispatchError, PluginError};
pub use events::{EventCopy, EventHookOutcome, EventInfo, EventListener, EventTable};
pub use forwards::Forwards;
pub use listener::{Listener, ListenerRegistry};
pub use loopback::LoopbackEngine;
pub use messages::{MessageHandle, MessageListener, MessageTable, UserMessage};
pub use outputs::{OutputFire, OutputFiring, OutputListener, OutputTable};
pub use plugin::{LogLevel, Plugin, PluginContext, SimplePlugin};
pub use result::{HookMode, HookResult, ReturnAction};

// Used by `create_plugin!`.
pub use async_trait::async_trait;
#[doc(hidden)]
pub use futures;

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Dispatch Root
// ============================================================================

/// One table per interception kind, sharing one set of engine services.
pub struct HookDispatch {
    pub commands: CommandTable,
    pub events: EventTable,
    pub outputs: OutputTable,
    pub messages: MessageTable,
    pub forwards: Forwards,
    services: EngineServices,
}

impl HookDispatch {
    pub fn new(services: EngineServices, triggers: ChatTriggers) -> Self {
        Self {
            commands: CommandTable::new(services.console.clone(), services.access.clone(), triggers),
            events: EventTable::new(services.events.clone()),
            outputs: OutputTable::new(),
            messages: MessageTable::new(),
            forwards: Forwards::new(),
            services,
        }
    }

    pub fn services(&self) -> &EngineServices {
        &self.services
    }
}

impl fmt::Debug for HookDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatch")
            .field("commands", &self.commands)
            .field("events", &self.events)
            .field("outputs", &self.outputs)
            .field("messages", &self.messages)
            .finish()
    }
}

/// Creates a shared dispatch root.
pub fn create_hook_dispatch(services: EngineServices, triggers: ChatTriggers) -> Arc<HookDispatch> {
    Arc::new(HookDispatch::new(services, triggers))
}

// ============================================================================
// Process-wide Instance
// ============================================================================

static GLOBAL: OnceCell<Arc<HookDispatch>> = OnceCell::new();

/// Makes `dispatch` reachable through [`global`] for hook trampolines that
/// cannot carry a context pointer. Fails if one is already installed.
pub fn install_global(dispatch: Arc<HookDispatch>) -> Result<(), Arc<HookDispatch>> {
    GLOBAL.set(dispatch)?;
    info!("🔧 Global hook dispatch installed");
    Ok(())
}

/// The instance passed to [`install_global`], if any.
pub fn global() -> Option<&'static Arc<HookDispatch>> {
    GLOBAL.get()
}
