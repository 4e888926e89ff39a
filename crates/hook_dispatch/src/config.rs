//! Chat trigger configuration.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefixes that turn a chat line into a command.
///
/// A public trigger dispatches the command and lets the chat line through; a
/// silent trigger hides the line when a listener handles the command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatTriggers {
    pub public: Vec<String>,
    pub silent: Vec<String>,
}

impl Default for ChatTriggers {
    fn default() -> Self {
        Self {
            public: vec!["!".to_string()],
            silent: vec!["/".to_string()],
        }
    }
}

impl ChatTriggers {
    /// The public trigger `message` starts with, if any.
    pub fn public_prefix<'a>(&'a self, message: &str) -> Option<&'a str> {
        Self::match_prefix(&self.public, message)
    }

    /// The silent trigger `message` starts with, if any.
    pub fn silent_prefix<'a>(&'a self, message: &str) -> Option<&'a str> {
        Self::match_prefix(&self.silent, message)
    }

    /// Rejects empty trigger strings, which would match every chat line.
    pub fn validate(&self) -> Result<(), String> {
        if self.public.iter().chain(&self.silent).any(String::is_empty) {
            return Err("chat triggers must not be empty".to_string());
        }
        Ok(())
    }

    fn match_prefix<'a>(triggers: &'a [String], message: &str) -> Option<&'a str> {
        let found = triggers
            .iter()
            .find(|trigger| !trigger.is_empty() && message.starts_with(trigger.as_str()))
            .map(String::as_str);
        if let Some(prefix) = found {
            debug!("Trigger found, prefix is {}", prefix);
        }
        found
    }
}
