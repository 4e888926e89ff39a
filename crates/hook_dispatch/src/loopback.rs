//! In-process engine used by the standalone host and by tests.
//!
//! `LoopbackEngine` keeps commands, console variables and game events in
//! plain maps. Fired events are queued instead of broadcast; a transport
//! drains them with [`LoopbackEngine::take_fired`] and runs them through the
//! event dispatch hooks itself.

use crate::engine::{AccessControl, ConsoleHost, GameEventHandle, GameEventHost};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct LoopbackCommand {
    description: String,
    flags: i64,
}

/// Event handed to [`GameEventHost::fire_event`] or
/// [`GameEventHost::fire_event_to_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredEvent {
    pub event: GameEventHandle,
    pub name: String,
    pub dont_broadcast: bool,
    /// Receiving client slot, `None` for a broadcast.
    pub target: Option<i32>,
}

#[derive(Debug, Default)]
pub struct LoopbackEngine {
    commands: Mutex<HashMap<String, LoopbackCommand>>,
    convars: Mutex<HashSet<String>>,
    known_events: Mutex<HashSet<String>>,
    listening: Mutex<HashSet<String>>,
    live_events: Mutex<HashMap<GameEventHandle, String>>,
    fired: Mutex<Vec<FiredEvent>>,
    admins: Mutex<HashMap<i32, u64>>,
    next_event: AtomicUsize,
    freed: AtomicUsize,
    duplicated: AtomicUsize,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command the engine already provides.
    pub fn add_native_command(&self, name: &str, description: &str) {
        self.commands.lock().insert(
            name.to_lowercase(),
            LoopbackCommand {
                description: description.to_string(),
                flags: 0,
            },
        );
    }

    pub fn add_convar(&self, name: &str) {
        self.convars.lock().insert(name.to_lowercase());
    }

    /// Declares a game event the engine can create and route.
    pub fn add_game_event(&self, name: &str) {
        self.known_events.lock().insert(name.to_string());
    }

    pub fn set_admin_flags(&self, caller: i32, flags: u64) {
        self.admins.lock().insert(caller, flags);
    }

    pub fn command_description(&self, name: &str) -> Option<String> {
        self.commands
            .lock()
            .get(&name.to_lowercase())
            .map(|command| command.description.clone())
    }

    pub fn command_flags(&self, name: &str) -> Option<i64> {
        self.commands
            .lock()
            .get(&name.to_lowercase())
            .map(|command| command.flags)
    }

    pub fn is_listening(&self, name: &str) -> bool {
        self.listening.lock().contains(name)
    }

    pub fn is_live(&self, event: GameEventHandle) -> bool {
        self.live_events.lock().contains_key(&event)
    }

    /// Number of event objects currently allocated.
    pub fn live_event_count(&self) -> usize {
        self.live_events.lock().len()
    }

    /// Number of successful `free_event` calls.
    pub fn freed_count(&self) -> usize {
        self.freed.load(Ordering::Relaxed)
    }

    /// Number of successful `duplicate_event` calls.
    pub fn duplicated_count(&self) -> usize {
        self.duplicated.load(Ordering::Relaxed)
    }

    /// Drains the events fired since the last call, oldest first.
    pub fn take_fired(&self) -> Vec<FiredEvent> {
        std::mem::take(&mut *self.fired.lock())
    }

    fn allocate(&self, name: &str) -> GameEventHandle {
        let event = GameEventHandle(self.next_event.fetch_add(1, Ordering::Relaxed) + 1);
        self.live_events.lock().insert(event, name.to_string());
        event
    }
}

impl ConsoleHost for LoopbackEngine {
    fn command_exists(&self, name: &str) -> bool {
        self.commands.lock().contains_key(&name.to_lowercase())
    }

    fn convar_exists(&self, name: &str) -> bool {
        self.convars.lock().contains(&name.to_lowercase())
    }

    fn register_command(&self, name: &str, description: &str, flags: i64) -> bool {
        let mut commands = self.commands.lock();
        let key = name.to_lowercase();
        if commands.contains_key(&key) {
            return false;
        }
        debug!("🖥️ Loopback registered command {}", name);
        commands.insert(
            key,
            LoopbackCommand {
                description: description.to_string(),
                flags,
            },
        );
        true
    }

    fn unregister_command(&self, name: &str) -> bool {
        let removed = self.commands.lock().remove(&name.to_lowercase()).is_some();
        if removed {
            debug!("🖥️ Loopback removed command {}", name);
        }
        removed
    }
}

impl GameEventHost for LoopbackEngine {
    fn event_name(&self, event: GameEventHandle) -> Option<String> {
        self.live_events.lock().get(&event).cloned()
    }

    fn listen(&self, name: &str) -> bool {
        if !self.known_events.lock().contains(name) {
            return false;
        }
        self.listening.lock().insert(name.to_string());
        true
    }

    fn stop_listening(&self) {
        self.listening.lock().clear();
    }

    fn create_event(&self, name: &str, force: bool) -> Option<GameEventHandle> {
        if !force && !self.known_events.lock().contains(name) {
            return None;
        }
        Some(self.allocate(name))
    }

    fn fire_event(&self, event: GameEventHandle, dont_broadcast: bool) {
        let Some(name) = self.event_name(event) else {
            return;
        };
        trace!("🖥️ Loopback queued {} ({})", name, event);
        self.fired.lock().push(FiredEvent {
            event,
            name,
            dont_broadcast,
            target: None,
        });
    }

    fn fire_event_to_client(&self, event: GameEventHandle, slot: i32) {
        let Some(name) = self.event_name(event) else {
            return;
        };
        self.fired.lock().push(FiredEvent {
            event,
            name,
            dont_broadcast: false,
            target: Some(slot),
        });
    }

    fn duplicate_event(&self, event: GameEventHandle) -> Option<GameEventHandle> {
        let name = self.event_name(event)?;
        self.duplicated.fetch_add(1, Ordering::Relaxed);
        Some(self.allocate(&name))
    }

    fn free_event(&self, event: GameEventHandle) {
        if self.live_events.lock().remove(&event).is_some() {
            self.freed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl AccessControl for LoopbackEngine {
    fn admin_flags(&self, caller: i32) -> u64 {
        self.admins.lock().get(&caller).copied().unwrap_or(0)
    }
}
