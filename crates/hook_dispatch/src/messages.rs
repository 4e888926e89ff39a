//! Network user message dispatch.
//!
//! Message id `0` addresses the global registries, which run before the
//! per-id listeners of every message.

use crate::error::DispatchError;
use crate::listener::{Listener, ListenerRegistry};
use crate::result::{HookMode, HookResult, ReturnAction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Id that selects the global registries.
pub const GLOBAL_MESSAGE_ID: i32 = 0;

/// Opaque handle to the engine's serialized message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub usize);

/// A message on its way to clients.
///
/// The payload stays owned by whoever called the dispatch hook. Listeners
/// may change the recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    id: i32,
    recipients: u64,
    payload: MessageHandle,
}

impl UserMessage {
    pub fn new(id: i32, recipients: u64, payload: MessageHandle) -> Self {
        Self {
            id,
            recipients,
            payload,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn payload(&self) -> MessageHandle {
        self.payload
    }

    /// Bit `n` set means client slot `n` receives the message.
    pub fn recipients(&self) -> u64 {
        self.recipients
    }

    pub fn set_recipients(&mut self, recipients: u64) {
        self.recipients = recipients;
    }

    pub fn add_recipient(&mut self, slot: u32) {
        if let Some(bit) = 1u64.checked_shl(slot) {
            self.recipients |= bit;
        }
    }

    pub fn remove_recipient(&mut self, slot: u32) {
        if let Some(bit) = 1u64.checked_shl(slot) {
            self.recipients &= !bit;
        }
    }

    pub fn has_recipient(&self, slot: u32) -> bool {
        1u64.checked_shl(slot)
            .is_some_and(|bit| self.recipients & bit != 0)
    }

    pub fn recipient_count(&self) -> u32 {
        self.recipients.count_ones()
    }
}

pub type MessageCallback = dyn Fn(&mut UserMessage) -> HookResult + Send + Sync;

pub type MessageListener = Listener<MessageCallback>;

impl Listener<MessageCallback> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut UserMessage) -> HookResult + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(callback))
    }
}

#[derive(Default)]
struct MessageHooks {
    callbacks: [ListenerRegistry<MessageCallback>; 2],
}

impl MessageHooks {
    fn is_empty(&self) -> bool {
        self.callbacks.iter().all(ListenerRegistry::is_empty)
    }
}

#[derive(Default)]
pub struct MessageTable {
    global: [ListenerRegistry<MessageCallback>; 2],
    hooks: Mutex<HashMap<i32, Arc<MessageHooks>>>,
}

impl MessageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_message(
        &self,
        id: i32,
        listener: MessageListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let registered = if id == GLOBAL_MESSAGE_ID {
            self.global[mode.index()].register(listener)
        } else {
            let mut hooks = self.hooks.lock();
            hooks.entry(id).or_default().callbacks[mode.index()].register(listener)
        };

        if registered {
            Ok(())
        } else {
            Err(DispatchError::DuplicateListener(format!("message {} ({})", id, mode)))
        }
    }

    pub fn unhook_message(
        &self,
        id: i32,
        listener: &MessageListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let not_found = || DispatchError::ListenerNotFound(format!("message {} ({})", id, mode));

        if id == GLOBAL_MESSAGE_ID {
            return if self.global[mode.index()].unregister(listener) {
                Ok(())
            } else {
                Err(not_found())
            };
        }

        let mut hooks = self.hooks.lock();
        let Some(entry) = hooks.get(&id).cloned() else {
            return Err(DispatchError::InvalidKey(id.to_string()));
        };
        if !entry.callbacks[mode.index()].unregister(listener) {
            return Err(not_found());
        }
        if entry.is_empty() {
            hooks.remove(&id);
        }
        Ok(())
    }

    /// Runs the listeners of one phase: global then per-id in `Pre`,
    /// per-id then global in `Post`.
    pub fn execute_message_callbacks(&self, message: &mut UserMessage, mode: HookMode) -> HookResult {
        debug!("📡 User message {} [{}]", message.id(), mode);

        match mode {
            HookMode::Pre => {
                let global = self.run_global(message, mode);
                if global >= HookResult::Stop {
                    return HookResult::Stop;
                }
                global.escalate(self.run_for_id(message, mode))
            }
            HookMode::Post => {
                let own = self.run_for_id(message, mode);
                own.escalate(self.run_global(message, mode))
            }
        }
    }

    fn run_global(&self, message: &mut UserMessage, mode: HookMode) -> HookResult {
        let mut result = HookResult::Continue;
        for listener in self.global[mode.index()].iter() {
            let verdict = (listener.callback())(message);
            if verdict >= HookResult::Stop {
                return HookResult::Stop;
            }
            result = result.escalate(verdict);
        }
        result
    }

    fn run_for_id(&self, message: &mut UserMessage, mode: HookMode) -> HookResult {
        let entry = self.hooks.lock().get(&message.id()).cloned();
        let Some(entry) = entry else {
            return HookResult::Continue;
        };

        let mut result = HookResult::Continue;
        for listener in entry.callbacks[mode.index()].iter() {
            let verdict = (listener.callback())(message);
            if mode == HookMode::Pre && verdict.suppresses() {
                return verdict;
            }
            result = result.escalate(verdict);
        }
        result
    }

    /// Transport entry point: suppress the send when the verdict is
    /// `Handled` or `Stop`.
    pub fn on_send_message(&self, message: &mut UserMessage, mode: HookMode) -> ReturnAction {
        if self.execute_message_callbacks(message, mode).suppresses() {
            ReturnAction::Supercede
        } else {
            ReturnAction::Ignored
        }
    }

    /// Number of ids with per-id listeners.
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }
}

impl fmt::Debug for MessageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTable")
            .field("ids", &self.len())
            .field("global_pre", &self.global[0].len())
            .field("global_post", &self.global[1].len())
            .finish()
    }
}
