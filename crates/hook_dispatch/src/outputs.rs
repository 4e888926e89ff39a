//! Entity output dispatch.
//!
//! Listeners are keyed by `(classname, output)`, and either side may be the
//! wildcard `"*"`. Firing output `O` from an entity of class `C` consults
//! `(C, O)`, `(*, O)`, `(C, *)` and `(*, *)` in that order.

use crate::error::DispatchError;
use crate::listener::{Listener, ListenerRegistry};
use crate::result::{HookMode, HookResult, ReturnAction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const WILDCARD: &str = "*";

/// Key of one output table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputKey {
    pub classname: String,
    pub output: String,
}

impl OutputKey {
    pub fn new(classname: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.classname, self.output)
    }
}

/// One output firing as listeners see it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputFire<'a> {
    pub output: &'a str,
    /// Class of the emitting entity, `None` if the engine gave no caller.
    pub classname: Option<&'a str>,
    pub activator: Option<i32>,
    pub caller: Option<i32>,
    pub delay: f32,
}

pub type OutputCallback = dyn Fn(&OutputFire<'_>) -> HookResult + Send + Sync;

pub type OutputListener = Listener<OutputCallback>;

impl Listener<OutputCallback> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&OutputFire<'_>) -> HookResult + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(callback))
    }
}

#[derive(Default)]
pub struct OutputHooks {
    callbacks: [ListenerRegistry<OutputCallback>; 2],
}

impl OutputHooks {
    pub fn listeners(&self, mode: HookMode) -> &ListenerRegistry<OutputCallback> {
        &self.callbacks[mode.index()]
    }

    fn is_empty(&self) -> bool {
        self.callbacks.iter().all(ListenerRegistry::is_empty)
    }
}

/// Entries matched by a `Pre` dispatch, handed to the matching `Post`.
#[must_use = "pass the firing to on_fire_output_post once the output ran"]
pub struct OutputFiring {
    entries: Vec<Arc<OutputHooks>>,
    result: HookResult,
}

impl OutputFiring {
    /// Escalated `Pre` verdict.
    pub fn result(&self) -> HookResult {
        self.result
    }

    pub fn action(&self) -> ReturnAction {
        if self.result.suppresses() {
            ReturnAction::Supercede
        } else {
            ReturnAction::Ignored
        }
    }

    /// Number of table entries that matched.
    pub fn matched(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for OutputFiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFiring")
            .field("matched", &self.entries.len())
            .field("result", &self.result)
            .finish()
    }
}

#[derive(Default)]
pub struct OutputTable {
    hooks: Mutex<HashMap<OutputKey, Arc<OutputHooks>>>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_output(
        &self,
        classname: &str,
        output: &str,
        listener: OutputListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let key = OutputKey::new(classname, output);
        let mut hooks = self.hooks.lock();
        let entry = hooks.entry(key.clone()).or_default();

        if entry.listeners(mode).register(listener) {
            debug!("📝 Hooked output {} ({})", key, mode);
            Ok(())
        } else {
            Err(DispatchError::DuplicateListener(format!("output {} ({})", key, mode)))
        }
    }

    /// Unhooks a listener, dropping the entry once both phases are empty.
    pub fn unhook_output(
        &self,
        classname: &str,
        output: &str,
        listener: &OutputListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        let key = OutputKey::new(classname, output);
        let mut hooks = self.hooks.lock();
        let Some(entry) = hooks.get(&key).cloned() else {
            warn!("⚠️ No hooks for output {}", key);
            return Err(DispatchError::InvalidKey(key.to_string()));
        };

        if !entry.listeners(mode).unregister(listener) {
            return Err(DispatchError::ListenerNotFound(format!("output {} ({})", key, mode)));
        }
        if entry.is_empty() {
            hooks.remove(&key);
        }
        Ok(())
    }

    /// Matching entries in search order, without duplicates.
    fn collect(&self, classname: Option<&str>, output: &str) -> Vec<Arc<OutputHooks>> {
        let mut keys = Vec::with_capacity(4);
        if let Some(classname) = classname {
            keys.push(OutputKey::new(classname, output));
        }
        keys.push(OutputKey::new(WILDCARD, output));
        if let Some(classname) = classname {
            keys.push(OutputKey::new(classname, WILDCARD));
        }
        keys.push(OutputKey::new(WILDCARD, WILDCARD));

        let hooks = self.hooks.lock();
        let mut entries: Vec<Arc<OutputHooks>> = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(entry) = hooks.get(key) {
                if !entries.iter().any(|seen| Arc::ptr_eq(seen, entry)) {
                    entries.push(entry.clone());
                }
            }
        }
        entries
    }

    /// `Pre` dispatch for an output about to fire.
    ///
    /// A `Stop` only ends the current entry's listeners; the remaining
    /// wildcard tiers still run.
    pub fn on_fire_output(&self, fire: &OutputFire<'_>) -> OutputFiring {
        debug!(
            "📡 Output {} from {}",
            fire.output,
            fire.classname.unwrap_or("unknown caller")
        );

        let entries = self.collect(fire.classname, fire.output);
        let mut result = HookResult::Continue;

        for entry in &entries {
            for listener in entry.listeners(HookMode::Pre).iter() {
                let verdict = (listener.callback())(fire);
                if verdict >= HookResult::Stop {
                    break;
                }
                result = result.escalate(verdict);
            }
        }

        OutputFiring { entries, result }
    }

    /// `Post` dispatch over the entries matched by the paired `Pre`.
    pub fn on_fire_output_post(&self, firing: OutputFiring, fire: &OutputFire<'_>) -> HookResult {
        let mut result = HookResult::Continue;
        for entry in &firing.entries {
            for listener in entry.listeners(HookMode::Post).iter() {
                result = result.escalate((listener.callback())(fire));
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }
}

impl fmt::Debug for OutputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTable").field("hooks", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn fire<'a>(classname: Option<&'a str>, output: &'a str) -> OutputFire<'a> {
        OutputFire {
            output,
            classname,
            activator: Some(1),
            caller: Some(42),
            delay: 0.0,
        }
    }

    fn tagged(log: &Arc<StdMutex<Vec<&'static str>>>, tag: &'static str, result: HookResult) -> OutputListener {
        let log = log.clone();
        OutputListener::new(move |_| {
            log.lock().unwrap().push(tag);
            result
        })
    }

    #[test]
    fn test_search_order() {
        let table = OutputTable::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        table.hook_output("*", "*", tagged(&log, "any", HookResult::Continue), HookMode::Pre).unwrap();
        table.hook_output("button", "*", tagged(&log, "class", HookResult::Continue), HookMode::Pre).unwrap();
        table.hook_output("*", "OnPressed", tagged(&log, "output", HookResult::Continue), HookMode::Pre).unwrap();
        table.hook_output("button", "OnPressed", tagged(&log, "exact", HookResult::Continue), HookMode::Pre).unwrap();

        let firing = table.on_fire_output(&fire(Some("button"), "OnPressed"));
        assert_eq!(firing.matched(), 4);
        assert_eq!(*log.lock().unwrap(), vec!["exact", "output", "class", "any"]);
    }

    #[test]
    fn test_stop_only_ends_its_tier() {
        let table = OutputTable::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        table.hook_output("door", "OnOpen", tagged(&log, "stop", HookResult::Stop), HookMode::Pre).unwrap();
        table.hook_output("door", "OnOpen", tagged(&log, "skipped", HookResult::Handled), HookMode::Pre).unwrap();
        table.hook_output("*", "*", tagged(&log, "wild", HookResult::Changed), HookMode::Pre).unwrap();

        let firing = table.on_fire_output(&fire(Some("door"), "OnOpen"));
        assert_eq!(*log.lock().unwrap(), vec!["stop", "wild"]);
        assert_eq!(firing.result(), HookResult::Changed);
        assert_eq!(firing.action(), ReturnAction::Ignored);
    }

    #[test]
    fn test_handled_suppresses_and_post_reuses_entries() {
        let table = OutputTable::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        table.hook_output("*", "OnTrigger", tagged(&log, "pre", HookResult::Handled), HookMode::Pre).unwrap();
        table.hook_output("*", "OnTrigger", tagged(&log, "post", HookResult::Changed), HookMode::Post).unwrap();

        let fired = fire(Some("trigger_once"), "OnTrigger");
        let firing = table.on_fire_output(&fired);
        assert_eq!(firing.action(), ReturnAction::Supercede);

        // Hooks added between Pre and Post are not visited by this Post.
        let late = tagged(&log, "late", HookResult::Stop);
        table.hook_output("trigger_once", "*", late, HookMode::Post).unwrap();
        assert_eq!(table.on_fire_output_post(firing, &fired), HookResult::Changed);
        assert_eq!(*log.lock().unwrap(), vec!["pre", "post"]);
    }

    #[test]
    fn test_unknown_caller_uses_wildcard_class_only() {
        let table = OutputTable::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        table.hook_output("button", "OnUser1", tagged(&log, "class", HookResult::Continue), HookMode::Pre).unwrap();
        table.hook_output("*", "OnUser1", tagged(&log, "output", HookResult::Continue), HookMode::Pre).unwrap();

        let firing = table.on_fire_output(&fire(None, "OnUser1"));
        assert_eq!(firing.matched(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["output"]);
    }

    #[test]
    fn test_unhook_removes_empty_entries() {
        let table = OutputTable::new();
        let listener = OutputListener::new(|_| HookResult::Continue);
        table.hook_output("*", "*", listener.clone(), HookMode::Pre).unwrap();
        table.hook_output("*", "*", listener.clone(), HookMode::Post).unwrap();
        assert!(matches!(
            table.hook_output("*", "*", listener.clone(), HookMode::Pre),
            Err(DispatchError::DuplicateListener(_))
        ));

        table.unhook_output("*", "*", &listener, HookMode::Pre).unwrap();
        assert_eq!(table.len(), 1);
        table.unhook_output("*", "*", &listener, HookMode::Post).unwrap();
        assert!(table.is_empty());
        assert!(matches!(
            table.unhook_output("*", "*", &listener, HookMode::Post),
            Err(DispatchError::InvalidKey(_))
        ));
    }
}
