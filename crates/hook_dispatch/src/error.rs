//! Error types for listener registration and plugin lifecycle.
//!
//! None of these are fatal. Registration calls report them as values and
//! log a line; dispatch itself never fails.

/// Errors reported by the dispatch tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No command, event, output or message entry exists under this key
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// The same callback is already registered for this key and phase
    #[error("Listener already registered for {0}")]
    DuplicateListener(String),
    /// The callback is not registered for this key and phase
    #[error("Listener not registered for {0}")]
    ListenerNotFound(String),
    /// The caller lacks the admin flags a command requires
    #[error("Access denied to {0}")]
    AccessDenied(String),
    /// A payload was requested while no event dispatch frame carries one
    #[error("No event payload is active")]
    NoSuchPayload,
    /// A command or console variable already uses this name
    #[error("Command already exists: {0}")]
    CommandExists(String),
    /// The engine refused to register a native command
    #[error("Engine rejected registration of {0}")]
    NativeRegistrationFailed(String),
}

/// Errors that can occur during plugin operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin initialization failed during startup
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Error occurred during plugin execution
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    /// Requested plugin was not found
    #[error("Plugin not found: {0}")]
    NotFound(String),
    /// Runtime error such as panic or system failure
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
    /// A listener registration made by the plugin was rejected
    #[error("Plugin listener error: {0}")]
    Listener(#[from] DispatchError),
}
