//! Pre/Post correlation for fired events.
//!
//! The transport calls [`EventTable::on_fire_event`] before the engine
//! broadcasts an event and [`EventTable::on_fire_event_post`] after it, for
//! every event, hooked or not. Each `Pre` pushes a frame and each `Post` pops
//! one, so a listener that fires another event from inside its callback
//! nests cleanly.

use super::{EventHook, EventInfo, EventTable};
use crate::engine::{GameEventHandle, GameEventHost};
use crate::error::DispatchError;
use crate::result::{HookMode, HookResult, ReturnAction};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Duplicated event payload owned by the dispatch engine.
///
/// Created between `Pre` and `Post` so `Post` listeners can read an event
/// the engine has already freed. Dropping it returns the payload to the
/// engine's free function.
pub struct EventCopy {
    handle: GameEventHandle,
    host: Arc<dyn GameEventHost>,
}

impl EventCopy {
    fn duplicate(host: &Arc<dyn GameEventHost>, event: GameEventHandle) -> Option<Self> {
        let handle = host.duplicate_event(event)?;
        Some(Self {
            handle,
            host: host.clone(),
        })
    }

    pub fn handle(&self) -> GameEventHandle {
        self.handle
    }

    /// Frees the duplicate now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for EventCopy {
    fn drop(&mut self) {
        trace!("🗑️ Releasing event copy {}", self.handle);
        self.host.free_event(self.handle);
    }
}

impl fmt::Debug for EventCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventCopy").field(&self.handle).finish()
    }
}

/// One in-flight Pre/Post pair. `hook` is `None` when nothing listens.
pub(super) struct EventFrame {
    hook: Option<Arc<EventHook>>,
    copy: Option<EventCopy>,
    superseded: bool,
}

impl EventFrame {
    fn empty() -> Self {
        Self {
            hook: None,
            copy: None,
            superseded: false,
        }
    }
}

/// What the transport should do after the `Pre` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHookOutcome {
    /// `Handled` means rerun the broadcast with `dont_broadcast` below;
    /// `Supercede` means the event was freed and must not be broadcast.
    pub action: ReturnAction,
    pub dont_broadcast: bool,
}

impl EventHookOutcome {
    fn ignored(dont_broadcast: bool) -> Self {
        Self {
            action: ReturnAction::Ignored,
            dont_broadcast,
        }
    }
}

impl EventTable {
    /// `Pre` dispatch for an event the engine is about to broadcast.
    pub fn on_fire_event(&self, event: GameEventHandle, dont_broadcast: bool) -> EventHookOutcome {
        let name = self.host.event_name(event).unwrap_or_default();

        let hook = {
            let hooks = self.hooks.lock();
            hooks.get(&name).cloned().inspect(|hook| hook.acquire())
        };

        let Some(hook) = hook else {
            self.stack.lock().push(EventFrame::empty());
            return EventHookOutcome::ignored(dont_broadcast);
        };

        let frame_index = {
            let mut stack = self.stack.lock();
            stack.push(EventFrame {
                hook: Some(hook.clone()),
                copy: None,
                superseded: false,
            });
            stack.len() - 1
        };

        debug!(
            "📡 Event {} ({}) Pre, dont broadcast: {}, depth {}",
            name,
            event,
            dont_broadcast,
            frame_index + 1
        );

        let mut info = EventInfo {
            event,
            dont_broadcast,
        };
        for listener in hook.listeners(HookMode::Pre).iter() {
            let result = (listener.callback())(&hook.name, &mut info, dont_broadcast);
            if result.suppresses() {
                debug!("🛑 Event {} superseded by a Pre listener", name);
                self.host.free_event(event);
                if let Some(frame) = self.stack.lock().get_mut(frame_index) {
                    frame.superseded = true;
                }
                return EventHookOutcome {
                    action: ReturnAction::Supercede,
                    dont_broadcast: info.dont_broadcast,
                };
            }
        }

        if hook.needs_copy() {
            let copy = EventCopy::duplicate(&self.host, event);
            if let Some(frame) = self.stack.lock().get_mut(frame_index) {
                frame.copy = copy;
            }
        }

        if info.dont_broadcast != dont_broadcast {
            EventHookOutcome {
                action: ReturnAction::Handled,
                dont_broadcast: info.dont_broadcast,
            }
        } else {
            EventHookOutcome::ignored(dont_broadcast)
        }
    }

    /// `Post` dispatch, paired with the most recent unmatched `Pre`.
    ///
    /// # Panics
    ///
    /// Panics if there is no unmatched `Pre`: the transport broke the
    /// pairing and the stack can no longer be trusted.
    pub fn on_fire_event_post(&self, event: GameEventHandle, dont_broadcast: bool) -> HookResult {
        let frame = self.stack.lock().pop();
        let Some(EventFrame {
            hook,
            copy,
            superseded,
        }) = frame
        else {
            panic!("event Post for {} without a matching Pre", event);
        };

        let Some(hook) = hook else {
            return HookResult::Continue;
        };

        let mut result = HookResult::Continue;
        let post = hook.listeners(HookMode::Post);
        if !superseded && !post.is_empty() {
            let target = copy.as_ref().map_or(event, EventCopy::handle);
            trace!("📡 Event {} Post on {}", hook.name, target);

            let mut info = EventInfo {
                event: target,
                dont_broadcast,
            };
            for listener in post.iter() {
                result = result.escalate((listener.callback())(&hook.name, &mut info, dont_broadcast));
            }
        }

        if let Some(copy) = copy {
            copy.release();
        }

        let mut hooks = self.hooks.lock();
        if hook.release()
            && hooks
                .get(&hook.name)
                .is_some_and(|current| Arc::ptr_eq(current, &hook))
        {
            debug!("🗑️ Event {} removed after its last dispatch", hook.name);
            hooks.remove(&hook.name);
        }

        result
    }

    /// Duplicated payload of the innermost in-flight event.
    pub fn current_payload(&self) -> Result<GameEventHandle, DispatchError> {
        self.stack
            .lock()
            .last()
            .and_then(|frame| frame.copy.as_ref())
            .map(EventCopy::handle)
            .ok_or(DispatchError::NoSuchPayload)
    }

    /// Number of unmatched `Pre` calls.
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }
}
