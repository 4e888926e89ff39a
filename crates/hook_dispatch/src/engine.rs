//! Collaborator traits for the host engine.
//!
//! The dispatch tables never talk to an engine directly. Everything they need
//! from it (console registration, game event allocation, caller privileges)
//! goes through these traits, so the same tables run inside a real server
//! hook transport or against [`crate::loopback::LoopbackEngine`].

use std::fmt;
use std::sync::Arc;

/// Opaque handle to an engine-owned game event object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameEventHandle(pub usize);

impl fmt::Display for GameEventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Console command and console variable registry.
pub trait ConsoleHost: Send + Sync {
    /// True if the engine knows a command by this name.
    fn command_exists(&self, name: &str) -> bool;

    /// True if the engine knows a console variable by this name.
    fn convar_exists(&self, name: &str) -> bool;

    /// Registers a command the engine routes back into the dispatch hook.
    fn register_command(&self, name: &str, description: &str, flags: i64) -> bool;

    /// Removes a command from the engine.
    fn unregister_command(&self, name: &str) -> bool;
}

/// Game event manager.
///
/// Events passed to [`GameEventHost::duplicate_event`] and
/// [`GameEventHost::free_event`] follow the engine's ownership rules: every
/// handle returned by `create_event` or `duplicate_event` must reach exactly
/// one of `fire_event` or `free_event`.
pub trait GameEventHost: Send + Sync {
    /// Name of a live event.
    fn event_name(&self, event: GameEventHandle) -> Option<String>;

    /// Asks the engine to route events named `name` through the dispatch
    /// hook. Returns `false` if the engine has no such event.
    fn listen(&self, name: &str) -> bool;

    /// Drops every subscription made through [`GameEventHost::listen`].
    fn stop_listening(&self);

    fn create_event(&self, name: &str, force: bool) -> Option<GameEventHandle>;

    /// Broadcasts and takes ownership of the event.
    fn fire_event(&self, event: GameEventHandle, dont_broadcast: bool);

    /// Sends the event to one client. Ownership stays with the caller.
    fn fire_event_to_client(&self, event: GameEventHandle, slot: i32);

    fn duplicate_event(&self, event: GameEventHandle) -> Option<GameEventHandle>;

    fn free_event(&self, event: GameEventHandle);
}

/// Privilege lookup for command access checks.
pub trait AccessControl: Send + Sync {
    /// Admin flag bitmask of a caller (`0` is the server console).
    fn admin_flags(&self, caller: i32) -> u64;
}

/// Everything the dispatch tables need from the engine.
#[derive(Clone)]
pub struct EngineServices {
    pub console: Arc<dyn ConsoleHost>,
    pub events: Arc<dyn GameEventHost>,
    pub access: Arc<dyn AccessControl>,
}

impl EngineServices {
    pub fn new(
        console: Arc<dyn ConsoleHost>,
        events: Arc<dyn GameEventHost>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            console,
            events,
            access,
        }
    }

    /// Uses one object for all three collaborators.
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: ConsoleHost + GameEventHost + AccessControl + 'static,
    {
        Self {
            console: engine.clone(),
            events: engine.clone(),
            access: engine,
        }
    }
}

impl fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineServices").finish_non_exhaustive()
    }
}
