//! Game event dispatch.
//!
//! Each hooked event name owns an [`EventHook`] with separate `Pre` and
//! `Post` registries. Entries are reference counted: every listener holds one
//! reference and every in-flight Pre/Post pair holds another, so an entry
//! whose last listener unhooks mid-dispatch survives until its `Post` runs.
//!
//! The table also hands plugins reusable [`EventInfo`] wrappers for events
//! they create and fire themselves.

mod lifecycle;

pub use lifecycle::{EventCopy, EventHookOutcome};

use crate::engine::{GameEventHandle, GameEventHost};
use crate::error::DispatchError;
use crate::listener::{Listener, ListenerRegistry};
use crate::result::{HookMode, HookResult};
use lifecycle::EventFrame;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// An event as seen by listeners and by plugins that fire their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventInfo {
    pub event: GameEventHandle,
    pub dont_broadcast: bool,
}

/// Event listener: `(name, event, dont_broadcast)`.
///
/// Pre listeners may flip `event.dont_broadcast`; the transport reruns the
/// broadcast with the new value.
pub type EventCallback = dyn Fn(&str, &mut EventInfo, bool) -> HookResult + Send + Sync;

pub type EventListener = Listener<EventCallback>;

impl Listener<EventCallback> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &mut EventInfo, bool) -> HookResult + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(callback))
    }
}

/// Listeners for one event name.
pub struct EventHook {
    name: String,
    callbacks: [ListenerRegistry<EventCallback>; 2],
    ref_count: AtomicU32,
    needs_copy: AtomicBool,
}

impl EventHook {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            callbacks: Default::default(),
            ref_count: AtomicU32::new(0),
            needs_copy: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listeners(&self, mode: HookMode) -> &ListenerRegistry<EventCallback> {
        &self.callbacks[mode.index()]
    }

    /// Registered listeners plus in-flight dispatches.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Set while a `Post` listener is hooked; the payload is then duplicated
    /// during `Pre` so `Post` can still read it.
    pub fn needs_copy(&self) -> bool {
        self.needs_copy.load(Ordering::Acquire)
    }

    fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one reference and reports whether it was the last.
    fn release(&self) -> bool {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl fmt::Debug for EventHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHook")
            .field("name", &self.name)
            .field("pre", &self.callbacks[0].len())
            .field("post", &self.callbacks[1].len())
            .field("ref_count", &self.ref_count())
            .field("needs_copy", &self.needs_copy())
            .finish()
    }
}

/// Event hooks, the Pre/Post correlation stack and the wrapper free-list.
pub struct EventTable {
    host: Arc<dyn GameEventHost>,
    hooks: Mutex<HashMap<String, Arc<EventHook>>>,
    stack: Mutex<Vec<EventFrame>>,
    free_events: Mutex<Vec<Box<EventInfo>>>,
}

impl EventTable {
    pub fn new(host: Arc<dyn GameEventHost>) -> Self {
        Self {
            host,
            hooks: Mutex::new(HashMap::new()),
            stack: Mutex::new(Vec::new()),
            free_events: Mutex::new(Vec::new()),
        }
    }

    /// Hooks a listener on `name`.
    ///
    /// Fails with [`DispatchError::InvalidKey`] if the engine does not know
    /// the event.
    pub fn hook_event(
        &self,
        name: &str,
        listener: EventListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        if !self.host.listen(name) {
            warn!("⚠️ Cannot hook unknown event {}", name);
            return Err(DispatchError::InvalidKey(name.to_string()));
        }

        let mut hooks = self.hooks.lock();
        let hook = hooks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(EventHook::new(name)));

        if !hook.listeners(mode).register(listener) {
            return Err(DispatchError::DuplicateListener(format!("event {} ({})", name, mode)));
        }
        if mode == HookMode::Post {
            hook.needs_copy.store(true, Ordering::Release);
        }
        hook.acquire();

        debug!("📝 Hooked event {} ({}), refs {}", name, mode, hook.ref_count());
        Ok(())
    }

    /// Unhooks a listener. The entry goes away with its last reference.
    pub fn unhook_event(
        &self,
        name: &str,
        listener: &EventListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let mut hooks = self.hooks.lock();
        let Some(hook) = hooks.get(name).cloned() else {
            return Err(DispatchError::InvalidKey(name.to_string()));
        };

        if !hook.listeners(mode).unregister(listener) {
            return Err(DispatchError::ListenerNotFound(format!("event {} ({})", name, mode)));
        }
        if mode == HookMode::Post && hook.listeners(HookMode::Post).is_empty() {
            hook.needs_copy.store(false, Ordering::Release);
        }

        if hook.release() {
            debug!("🗑️ Event {} has no listeners left", name);
            hooks.remove(name);
        }
        Ok(())
    }

    /// Entry for `name`, if hooked.
    pub fn find(&self, name: &str) -> Option<Arc<EventHook>> {
        self.hooks.lock().get(name).cloned()
    }

    /// Number of hooked event names.
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }

    /// Creates an engine event wrapped for plugin use.
    ///
    /// The wrapper must come back through [`EventTable::fire_event`] or
    /// [`EventTable::cancel_event`].
    pub fn create_event(&self, name: &str, force: bool) -> Option<Box<EventInfo>> {
        let Some(event) = self.host.create_event(name, force) else {
            warn!("⚠️ Engine refused to create event {}", name);
            return None;
        };

        let mut info = self
            .free_events
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(EventInfo { event, dont_broadcast: false }));
        info.event = event;
        info.dont_broadcast = false;
        Some(info)
    }

    /// Fires a created event. The engine takes ownership of the payload.
    pub fn fire_event(&self, info: Box<EventInfo>, dont_broadcast: bool) {
        self.host.fire_event(info.event, dont_broadcast);
        self.free_events.lock().push(info);
    }

    /// Sends a created event to a single client. The wrapper stays valid.
    pub fn fire_event_to_client(&self, info: &EventInfo, slot: i32) {
        self.host.fire_event_to_client(info.event, slot);
    }

    /// Frees a created event without firing it.
    pub fn cancel_event(&self, info: Box<EventInfo>) {
        self.host.free_event(info.event);
        self.free_events.lock().push(info);
    }

    /// Wrappers waiting for reuse.
    pub fn free_list_len(&self) -> usize {
        self.free_events.lock().len()
    }
}

impl Drop for EventTable {
    fn drop(&mut self) {
        if !self.hooks.get_mut().is_empty() {
            self.host.stop_listening();
        }
    }
}

impl fmt::Debug for EventTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTable")
            .field("hooks", &self.len())
            .field("depth", &self.depth())
            .field("free_events", &self.free_list_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackEngine;

    fn table() -> (Arc<LoopbackEngine>, EventTable) {
        let engine = Arc::new(LoopbackEngine::new());
        engine.add_game_event("player_death");
        engine.add_game_event("round_start");
        (engine.clone(), EventTable::new(engine))
    }

    fn noop() -> EventListener {
        EventListener::new(|_, _, _| HookResult::Continue)
    }

    #[test]
    fn test_hook_counts_references() {
        let (engine, table) = table();
        let (pre, post) = (noop(), noop());
        table.hook_event("player_death", pre.clone(), HookMode::Pre).unwrap();
        let hook = table.find("player_death").unwrap();
        assert!(!hook.needs_copy());

        table.hook_event("player_death", post.clone(), HookMode::Post).unwrap();
        assert_eq!(hook.ref_count(), 2);
        assert!(hook.needs_copy());
        assert!(engine.is_listening("player_death"));

        table.unhook_event("player_death", &pre, HookMode::Pre).unwrap();
        assert_eq!(hook.ref_count(), 1);
        table.unhook_event("player_death", &post, HookMode::Post).unwrap();
        assert!(table.find("player_death").is_none());
    }

    #[test]
    fn test_pre_only_entry_stops_copying() {
        let (engine, table) = table();
        let (pre, post) = (noop(), noop());
        table.hook_event("round_start", pre, HookMode::Pre).unwrap();
        table.hook_event("round_start", post.clone(), HookMode::Post).unwrap();
        table.unhook_event("round_start", &post, HookMode::Post).unwrap();

        let hook = table.find("round_start").unwrap();
        assert!(!hook.needs_copy());

        let event = engine.create_event("round_start", false).unwrap();
        table.on_fire_event(event, false);
        table.on_fire_event_post(event, false);
        assert_eq!(engine.duplicated_count(), 0);
        assert_eq!(table.depth(), 0);
    }

    #[test]
    fn test_hook_errors() {
        let (_engine, table) = table();
        let listener = noop();
        assert!(matches!(
            table.hook_event("bogus", listener.clone(), HookMode::Pre),
            Err(DispatchError::InvalidKey(_))
        ));

        table.hook_event("round_start", listener.clone(), HookMode::Pre).unwrap();
        assert!(matches!(
            table.hook_event("round_start", listener.clone(), HookMode::Pre),
            Err(DispatchError::DuplicateListener(_))
        ));
        assert_eq!(table.find("round_start").unwrap().ref_count(), 1);

        assert!(matches!(
            table.unhook_event("round_start", &listener, HookMode::Post),
            Err(DispatchError::ListenerNotFound(_))
        ));
        assert!(matches!(
            table.unhook_event("player_death", &listener, HookMode::Pre),
            Err(DispatchError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_created_events_recycle_wrappers() {
        let (engine, table) = table();
        assert!(table.create_event("bogus", false).is_none());

        let first = table.create_event("round_start", false).unwrap();
        let first_event = first.event;
        table.fire_event(first, true);
        assert_eq!(table.free_list_len(), 1);

        let fired = engine.take_fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event, first_event);
        assert!(fired[0].dont_broadcast);

        let second = table.create_event("player_death", false).unwrap();
        assert_eq!(table.free_list_len(), 0);
        assert!(!second.dont_broadcast);
        table.fire_event_to_client(&second, 2);
        assert_eq!(engine.take_fired()[0].target, Some(2));

        let live_before = engine.live_event_count();
        table.cancel_event(second);
        assert_eq!(engine.live_event_count(), live_before - 1);
        assert_eq!(table.free_list_len(), 1);
    }

    #[test]
    fn test_drop_stops_listening() {
        let (engine, table) = table();
        table.hook_event("round_start", noop(), HookMode::Post).unwrap();
        drop(table);
        assert!(!engine.is_listening("round_start"));
    }
}
