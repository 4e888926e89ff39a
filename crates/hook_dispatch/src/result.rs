//! Verdicts returned by listeners and the phase marker shared by every
//! dispatch site.
//!
//! Every table interprets these identically: the running result of a
//! dispatch is the maximum verdict seen so far, and only the `Pre` phase can
//! keep the real engine action from happening.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict a listener returns for one interception.
///
/// The discriminants are the raw values plugins exchange across the C
/// boundary; `2` is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum HookResult {
    /// Let the action run untouched.
    #[default]
    Continue = 0,
    /// Parameters were modified; the action must still run.
    Changed = 1,
    /// The listener handled the action; the real action is suppressed.
    Handled = 3,
    /// Abort immediately (Pre only): skip remaining listeners and the action.
    Stop = 4,
}

impl HookResult {
    /// Returns the more severe of the two verdicts.
    pub fn escalate(self, other: HookResult) -> HookResult {
        self.max(other)
    }

    /// True when the verdict keeps the real action from running.
    pub fn suppresses(self) -> bool {
        self >= HookResult::Handled
    }

    /// Maps a verdict onto what the hook transport should do with the call.
    pub fn to_action(self) -> ReturnAction {
        match self {
            HookResult::Continue => ReturnAction::Ignored,
            HookResult::Changed => ReturnAction::Handled,
            HookResult::Handled | HookResult::Stop => ReturnAction::Supercede,
        }
    }

    /// Converts the raw integer a foreign plugin returned.
    ///
    /// Unknown values are clamped onto the nearest defined verdict.
    pub fn from_raw(raw: i32) -> HookResult {
        match raw {
            i32::MIN..=0 => HookResult::Continue,
            1 | 2 => HookResult::Changed,
            3 => HookResult::Handled,
            _ => HookResult::Stop,
        }
    }
}

impl fmt::Display for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookResult::Continue => "Continue",
            HookResult::Changed => "Changed",
            HookResult::Handled => "Handled",
            HookResult::Stop => "Stop",
        };
        f.write_str(name)
    }
}

/// Which side of the real action a listener runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum HookMode {
    /// Before the engine performs the action.
    Pre = 0,
    /// After the engine performed the action.
    #[default]
    Post = 1,
}

impl HookMode {
    /// Slot of this phase in a `[_; 2]` registry pair.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Builds the phase from the `post` flag plugins pass over the C boundary.
    pub fn from_post_flag(post: bool) -> HookMode {
        if post {
            HookMode::Post
        } else {
            HookMode::Pre
        }
    }
}

impl fmt::Display for HookMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookMode::Pre => f.write_str("Pre"),
            HookMode::Post => f.write_str("Post"),
        }
    }
}

/// Instruction handed back to the hook transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnAction {
    /// Run the real action with its original arguments.
    #[default]
    Ignored,
    /// Run the real action with the arguments the listeners modified.
    Handled,
    /// Skip the real action and return the substitute result.
    Override,
    /// Skip the real action and return the default result.
    Supercede,
}

impl ReturnAction {
    /// True when the real action will not run.
    pub fn skips_original(self) -> bool {
        matches!(self, ReturnAction::Override | ReturnAction::Supercede)
    }
}
