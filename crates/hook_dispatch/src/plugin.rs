//! Plugin ABI.
//!
//! Plugins are `cdylib`s exporting `create_plugin` and `destroy_plugin`.
//! Most plugins implement [`SimplePlugin`] and let [`create_plugin!`] build
//! the exports; the loader only ever sees the lower-level [`Plugin`] trait.
//!
//! Listeners registered through a [`PluginContext`] are attributed to the
//! plugin, so a loader can remove them when the plugin unloads.

use crate::commands::CommandListener;
use crate::error::{DispatchError, PluginError};
use crate::events::EventListener;
use crate::messages::MessageListener;
use crate::outputs::OutputListener;
use crate::result::HookMode;
use crate::HookDispatch;
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// Plugin Context
// ============================================================================

/// Log levels for plugin messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// What a plugin gets from its host.
///
/// The registration methods default to registering straight on
/// [`PluginContext::dispatch`]. Hosts that track ownership override them.
pub trait PluginContext: Send + Sync {
    /// The dispatch tables.
    fn dispatch(&self) -> Arc<HookDispatch>;

    /// Logs through the host's logging setup.
    fn log(&self, level: LogLevel, message: &str);

    fn add_command_listener(
        &self,
        name: &str,
        listener: CommandListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        self.dispatch().commands.add_listener(name, listener, mode)
    }

    fn create_command(
        &self,
        name: &str,
        description: &str,
        flags: i64,
        admin_flags: u64,
    ) -> Result<(), DispatchError> {
        self.dispatch()
            .commands
            .create_command(name, description, flags, admin_flags)
    }

    fn hook_event(
        &self,
        name: &str,
        listener: EventListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        self.dispatch().events.hook_event(name, listener, mode)
    }

    fn hook_output(
        &self,
        classname: &str,
        output: &str,
        listener: OutputListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        self.dispatch()
            .outputs
            .hook_output(classname, output, listener, mode)
    }

    fn hook_message(
        &self,
        id: i32,
        listener: MessageListener,
        mode: HookMode,
    ) -> Result<(), DispatchError> {
        self.dispatch().messages.hook_message(id, listener, mode)
    }
}

// ============================================================================
// Plugin Traits
// ============================================================================

/// Low-level plugin interface the loader drives.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Registers listeners. Runs for every plugin before any `init`.
    async fn pre_init(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError>;

    async fn init(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError>;

    async fn shutdown(&mut self, context: Arc<dyn PluginContext>) -> Result<(), PluginError>;
}

/// Convenience interface wrapped by [`create_plugin!`].
#[async_trait]
pub trait SimplePlugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Registers the plugin's listeners through `context`.
    async fn register_listeners(
        &mut self,
        context: Arc<dyn PluginContext>,
    ) -> Result<(), PluginError>;

    async fn on_init(&mut self, _context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Listeners registered through the context are removed by the loader
    /// after this returns.
    async fn on_shutdown(&mut self, _context: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Converts a panic payload caught at the plugin boundary.
pub fn panic_to_error(panic_info: Box<dyn std::any::Any + Send>) -> PluginError {
    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
        format!("Plugin panicked: {}", s)
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        format!("Plugin panicked: {}", s)
    } else {
        "Plugin panicked with unknown error".to_string()
    };
    PluginError::Runtime(message)
}

/// Exports `create_plugin` and `destroy_plugin` for a [`SimplePlugin`]
/// type with a `new()` constructor.
///
/// Every call into the plugin is wrapped in `catch_unwind`, so a panicking
/// plugin reports [`PluginError::Runtime`] instead of unwinding into the
/// host.
#[macro_export]
macro_rules! create_plugin {
    ($plugin_type:ty) => {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        struct PluginWrapper {
            inner: $plugin_type,
        }

        #[$crate::async_trait]
        impl $crate::plugin::Plugin for PluginWrapper {
            fn name(&self) -> &str {
                match catch_unwind(AssertUnwindSafe(|| $crate::plugin::SimplePlugin::name(&self.inner))) {
                    Ok(name) => name,
                    Err(_) => "unknown-plugin-name",
                }
            }

            fn version(&self) -> &str {
                match catch_unwind(AssertUnwindSafe(|| $crate::plugin::SimplePlugin::version(&self.inner))) {
                    Ok(version) => version,
                    Err(_) => "unknown-version",
                }
            }

            async fn pre_init(
                &mut self,
                context: std::sync::Arc<dyn $crate::plugin::PluginContext>,
            ) -> Result<(), $crate::PluginError> {
                catch_unwind(AssertUnwindSafe(|| {
                    $crate::futures::executor::block_on($crate::plugin::SimplePlugin::register_listeners(
                        &mut self.inner,
                        context,
                    ))
                }))
                .map_err($crate::plugin::panic_to_error)?
            }

            async fn init(
                &mut self,
                context: std::sync::Arc<dyn $crate::plugin::PluginContext>,
            ) -> Result<(), $crate::PluginError> {
                catch_unwind(AssertUnwindSafe(|| {
                    $crate::futures::executor::block_on($crate::plugin::SimplePlugin::on_init(
                        &mut self.inner,
                        context,
                    ))
                }))
                .map_err($crate::plugin::panic_to_error)?
            }

            async fn shutdown(
                &mut self,
                context: std::sync::Arc<dyn $crate::plugin::PluginContext>,
            ) -> Result<(), $crate::PluginError> {
                catch_unwind(AssertUnwindSafe(|| {
                    $crate::futures::executor::block_on($crate::plugin::SimplePlugin::on_shutdown(
                        &mut self.inner,
                        context,
                    ))
                }))
                .map_err($crate::plugin::panic_to_error)?
            }
        }

        /// Creates the plugin instance. Returns null if construction panicked.
        ///
        /// # Safety
        ///
        /// The returned pointer must be released with `destroy_plugin`.
        #[no_mangle]
        pub unsafe extern "C" fn create_plugin() -> *mut dyn $crate::plugin::Plugin {
            match catch_unwind(AssertUnwindSafe(|| {
                let plugin = Box::new(PluginWrapper {
                    inner: <$plugin_type>::new(),
                });
                Box::into_raw(plugin) as *mut dyn $crate::plugin::Plugin
            })) {
                Ok(plugin_ptr) => plugin_ptr,
                Err(_) => std::ptr::null_mut::<PluginWrapper>() as *mut dyn $crate::plugin::Plugin,
            }
        }

        /// Destroys a plugin instance made by `create_plugin`.
        ///
        /// # Safety
        ///
        /// `plugin` must come from `create_plugin` and not be used afterwards.
        #[no_mangle]
        pub unsafe extern "C" fn destroy_plugin(plugin: *mut dyn $crate::plugin::Plugin) {
            if plugin.is_null() {
                return;
            }
            let _ = catch_unwind(AssertUnwindSafe(|| {
                let _ = Box::from_raw(plugin);
            }));
        }
    };
}
