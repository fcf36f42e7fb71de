//! Interceptor chains
//!
//! A chain walks an [`OrderedPluginList`] with a cursor. Each plugin receives
//! a [`Next`] handle: calling [`Next::proceed`] runs the remaining plugins and
//! hands their result back, returning without proceeding short-circuits the
//! rest of the chain. The plugin marked `last` is the terminal one and never
//! proceeds.
//!
//! ```text
//! invoke(args) -> p1 --proceed--> p2 --proceed--> p3 (terminal)
//!                   <--result----    <--result----
//! ```
//!
//! Extra arguments are bound once into `A`; plugins read or mutate them
//! through [`Next::args`] / [`Next::args_mut`].

use std::panic::AssertUnwindSafe;

use thiserror::Error;

use super::isolation::call_plugin_preserving_error;
use super::registry::{OrderedPluginList, PluginEntry};

/// Chain-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The cursor ran past the last plugin and nobody produced a result
    #[error("Plugin-point '{point}' has no terminal plugin")]
    Unterminated { point: &'static str },

    /// A plugin panicked; the panic was contained
    #[error("Plugin '{plugin}' at '{point}' panicked: {message}")]
    PluginPanic {
        point: &'static str,
        plugin: String,
        message: String,
    },
}

impl ChainError {
    pub fn point(&self) -> &'static str {
        match self {
            Self::Unterminated { point } | Self::PluginPanic { point, .. } => point,
        }
    }
}

/// Dispatch from the chain to one plugin
pub type Handler<P, A, T, E> = fn(&P, &mut Next<'_, P, A, T, E>) -> Result<T, E>;

/// Continuation handed to each plugin
pub struct Next<'c, P: ?Sized, A, T, E> {
    point: &'static str,
    entries: &'c [PluginEntry<P>],
    cursor: usize,
    args: A,
    handler: Handler<P, A, T, E>,
    produced: Option<T>,
}

impl<'c, P: ?Sized, A, T, E> Next<'c, P, A, T, E>
where
    T: Clone,
    E: From<ChainError>,
{
    /// Run the rest of the chain.
    ///
    /// Past the end, returns the last produced result, or
    /// [`ChainError::Unterminated`] if no plugin ever produced one.
    pub fn proceed(&mut self) -> Result<T, E> {
        let entries = self.entries;
        let Some(entry) = entries.get(self.cursor) else {
            return match &self.produced {
                Some(value) => Ok(value.clone()),
                None => Err(ChainError::Unterminated { point: self.point }.into()),
            };
        };
        self.cursor += 1;

        let handler = self.handler;
        let point = self.point;
        let plugin = &*entry.plugin;
        let result = call_plugin_preserving_error(
            AssertUnwindSafe(|| handler(plugin, self)),
            |message| {
                ChainError::PluginPanic {
                    point,
                    plugin: entry.descriptor.key().to_string(),
                    message,
                }
                .into()
            },
        );

        if let Ok(value) = &result {
            self.produced = Some(value.clone());
        }
        result
    }
}

impl<'c, P: ?Sized, A, T, E> Next<'c, P, A, T, E> {
    pub fn args(&self) -> &A {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut A {
        &mut self.args
    }

    /// Whether a later plugin already produced a result
    pub fn handled(&self) -> bool {
        self.produced.is_some()
    }

    pub fn point(&self) -> &'static str {
        self.point
    }

    /// Key of the plugin currently executing
    pub fn current(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.descriptor.key())
    }
}

/// A plugin-point's resolved chain
pub struct InterceptorChain<P: ?Sized> {
    plugins: OrderedPluginList<P>,
}

impl<P: ?Sized> Clone for InterceptorChain<P> {
    fn clone(&self) -> Self {
        Self {
            plugins: self.plugins.clone(),
        }
    }
}

impl<P: ?Sized> std::fmt::Debug for InterceptorChain<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InterceptorChain").field(&self.plugins).finish()
    }
}

impl<P: ?Sized> InterceptorChain<P> {
    pub fn new(plugins: OrderedPluginList<P>) -> Self {
        Self { plugins }
    }

    pub fn plugins(&self) -> &OrderedPluginList<P> {
        &self.plugins
    }

    /// Run the chain from the first plugin. Returns the chain's result and
    /// the bound arguments, which plugins may have mutated.
    pub fn invoke<A, T, E>(&self, args: A, handler: Handler<P, A, T, E>) -> (Result<T, E>, A)
    where
        T: Clone,
        E: From<ChainError>,
    {
        let mut next = Next {
            point: self.plugins.point(),
            entries: self.plugins.entries(),
            cursor: 0,
            args,
            handler,
            produced: None,
        };
        let result = next.proceed();
        (result, next.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::descriptor::PluginDescriptor;
    use crate::plugin::registry::PluginRegistry;
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Chain(ChainError),
        Rejected(&'static str),
    }

    impl From<ChainError> for TestError {
        fn from(e: ChainError) -> Self {
            TestError::Chain(e)
        }
    }

    type StepNext<'c> = Next<'c, dyn Step, Vec<String>, u32, TestError>;

    trait Step: Send + Sync {
        fn run(&self, next: &mut StepNext<'_>) -> Result<u32, TestError>;
    }

    /// Appends its name, then proceeds and adds one
    struct Counter(&'static str);

    impl Step for Counter {
        fn run(&self, next: &mut StepNext<'_>) -> Result<u32, TestError> {
            next.args_mut().push(self.0.to_string());
            Ok(next.proceed()? + 1)
        }
    }

    /// Terminal: never proceeds
    struct Terminal(u32);

    impl Step for Terminal {
        fn run(&self, next: &mut StepNext<'_>) -> Result<u32, TestError> {
            next.args_mut().push("terminal".to_string());
            Ok(self.0)
        }
    }

    struct Reject;

    impl Step for Reject {
        fn run(&self, _next: &mut StepNext<'_>) -> Result<u32, TestError> {
            Err(TestError::Rejected("stop"))
        }
    }

    struct Panicker;

    impl Step for Panicker {
        fn run(&self, _next: &mut StepNext<'_>) -> Result<u32, TestError> {
            panic!("plugin exploded");
        }
    }

    /// Proceeds twice; the second call sees the exhausted cursor
    struct DoubleProceed;

    impl Step for DoubleProceed {
        fn run(&self, next: &mut StepNext<'_>) -> Result<u32, TestError> {
            let first = next.proceed()?;
            assert!(next.handled());
            let second = next.proceed()?;
            Ok(first + second)
        }
    }

    fn dispatch(step: &dyn Step, next: &mut StepNext<'_>) -> Result<u32, TestError> {
        step.run(next)
    }

    fn entry(d: PluginDescriptor, step: impl Step + 'static) -> (PluginDescriptor, Arc<dyn Step>) {
        (d, Arc::new(step))
    }

    fn chain(steps: Vec<(PluginDescriptor, Arc<dyn Step>)>) -> InterceptorChain<dyn Step> {
        let mut registry: PluginRegistry<dyn Step> = PluginRegistry::new("test.chain");
        for (d, s) in steps {
            registry.register(d, s);
        }
        InterceptorChain::new(registry.resolve().unwrap())
    }

    #[test]
    fn test_terminal_plugin_result_flows_back() {
        let chain = chain(vec![
            entry(PluginDescriptor::new("a"), Counter("a")),
            entry(PluginDescriptor::new("b"), Counter("b")),
            entry(PluginDescriptor::new("end").last(), Terminal(10)),
        ]);
        let (result, log) = chain.invoke(Vec::new(), dispatch);
        assert_eq!(result, Ok(12));
        assert_eq!(log, vec!["a", "b", "terminal"]);
    }

    #[test]
    fn test_missing_terminal_fails() {
        let chain = chain(vec![
            entry(PluginDescriptor::new("a"), Counter("a")),
            entry(PluginDescriptor::new("b"), Counter("b")),
        ]);
        let (result, log) = chain.invoke(Vec::new(), dispatch);
        assert_eq!(
            result,
            Err(TestError::Chain(ChainError::Unterminated { point: "test.chain" }))
        );
        assert_eq!(log, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_chain_fails() {
        let chain = chain(vec![]);
        let (result, _) = chain.invoke(Vec::new(), dispatch);
        assert!(matches!(result, Err(TestError::Chain(ChainError::Unterminated { .. }))));
    }

    #[test]
    fn test_short_circuit_skips_rest() {
        let chain = chain(vec![
            entry(PluginDescriptor::new("a"), Counter("a")),
            entry(PluginDescriptor::new("reject"), Reject),
            entry(PluginDescriptor::new("b"), Counter("b")),
            entry(PluginDescriptor::new("end").last(), Terminal(0)),
        ]);
        let (result, log) = chain.invoke(Vec::new(), dispatch);
        assert_eq!(result, Err(TestError::Rejected("stop")));
        assert_eq!(log, vec!["a"]);
    }

    #[test]
    fn test_proceed_past_end_returns_produced() {
        let chain = chain(vec![
            entry(PluginDescriptor::new("twice"), DoubleProceed),
            entry(PluginDescriptor::new("end").last(), Terminal(5)),
        ]);
        let (result, log) = chain.invoke(Vec::new(), dispatch);
        assert_eq!(result, Ok(10));
        assert_eq!(log, vec!["terminal"]);
    }

    #[test]
    fn test_panic_is_contained() {
        let chain = chain(vec![
            entry(PluginDescriptor::new("a"), Counter("a")),
            entry(PluginDescriptor::new("boom"), Panicker),
            entry(PluginDescriptor::new("end").last(), Terminal(0)),
        ]);
        let (result, log) = chain.invoke(Vec::new(), dispatch);
        match result {
            Err(TestError::Chain(ChainError::PluginPanic { plugin, message, .. })) => {
                assert_eq!(plugin, "boom");
                assert!(message.contains("plugin exploded"));
            }
            other => panic!("expected panic error, got {other:?}"),
        }
        assert_eq!(log, vec!["a"]);
    }
}
