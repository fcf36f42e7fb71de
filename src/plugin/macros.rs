//! Plugin Registration Macros
//!
//! Wraps the `inventory::submit!` boilerplate for built-in plugins. Each
//! registration pairs a unique key with an installer that adds the plugin to
//! a [`GatewayPluginsBuilder`](crate::plugin::GatewayPluginsBuilder).
//!
//! # Example
//!
//! ```ignore
//! fn install_audit(builder: &mut GatewayPluginsBuilder, _env: &BuiltinEnv) {
//!     builder.call_finished(PluginDescriptor::new("audit").first(), Arc::new(Audit));
//! }
//!
//! register_builtin_plugin!("audit", install_audit);
//! ```

/// Register a built-in plugin installer with the gateway.
///
/// * `$key` - unique key, also used to order installation
/// * `$install_fn` - `fn(&mut GatewayPluginsBuilder, &BuiltinEnv)`
#[macro_export]
macro_rules! register_builtin_plugin {
    ($key:expr, $install_fn:expr) => {
        ::inventory::submit! {
            $crate::plugin::builtin::BuiltinPlugin::new($key, $install_fn)
        }
    };
}
