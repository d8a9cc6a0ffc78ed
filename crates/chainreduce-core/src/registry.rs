//! Maps MapReduce ids to plugin factories.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::{self, RunHandle};
use crate::error::ReduceError;
use crate::plugin::BlockMapReducer;
use crate::source::BlockSource;

/// A plugin with its types erased, ready to be started against a source.
///
/// Implemented for every [`BlockMapReducer`], so registries can hold plugins
/// with different accumulator and value types side by side.
#[async_trait]
pub trait Launch<S: BlockSource>: Send {
    async fn launch(
        self: Box<Self>,
        source: Arc<S>,
        config: &EngineConfig,
    ) -> Result<RunHandle, ReduceError>;
}

#[async_trait]
impl<S, P> Launch<S> for P
where
    S: BlockSource,
    P: BlockMapReducer<S>,
{
    async fn launch(
        self: Box<Self>,
        source: Arc<S>,
        config: &EngineConfig,
    ) -> Result<RunHandle, ReduceError> {
        engine::start(source, *self, config).await
    }
}

type Factory<S> = Box<dyn Fn() -> Result<Box<dyn Launch<S>>, ReduceError> + Send + Sync>;

/// Registry of plugin factories, keyed by id, in registration order.
pub struct PluginRegistry<S: BlockSource> {
    entries: Vec<(String, Factory<S>)>,
}

impl<S: BlockSource> PluginRegistry<S> {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    /// Register a factory under `id`.
    ///
    /// The factory runs once per [`create`](Self::create) call, so it is
    /// the place to read per-run settings such as environment variables.
    pub fn register<P, F>(&mut self, id: impl Into<String>, factory: F) -> Result<(), ReduceError>
    where
        P: BlockMapReducer<S>,
        F: Fn() -> Result<P, ReduceError> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.contains(&id) {
            return Err(ReduceError::DuplicatePlugin(id));
        }
        self.entries.push((
            id,
            Box::new(move || factory().map(|p| Box::new(p) as Box<dyn Launch<S>>)),
        ));
        Ok(())
    }

    /// Build a fresh plugin instance for `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn Launch<S>>, ReduceError> {
        match self.entries.iter().find(|(name, _)| name == id) {
            Some((_, factory)) => factory(),
            None => Err(ReduceError::UnknownPlugin {
                id: id.to_string(),
                available: self.ids().map(str::to_string).collect(),
            }),
        }
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().any(|name| name == id)
    }
}

impl<S: BlockSource> Default for PluginRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBlock, MemoryBlockSource};
    use crate::plugin::Emitter;
    use crate::types::{BlockRange, Checkpoint};

    struct Noop;

    #[async_trait]
    impl BlockMapReducer<MemoryBlockSource> for Noop {
        type Accumulator = ();
        type Value = ();

        async fn initialise(&mut self, _: &MemoryBlockSource) -> Result<(), ReduceError> {
            Ok(())
        }

        fn block_range(&self) -> BlockRange {
            BlockRange::bounded(1, 3)
        }

        async fn map(
            &self,
            _: &MemoryBlockSource,
            _: &Emitter<()>,
            _: &MemoryBlock,
        ) -> Result<(), ReduceError> {
            Ok(())
        }

        async fn reduce(&self, _: &MemoryBlockSource, _: &mut (), _: ()) -> Result<(), ReduceError> {
            Ok(())
        }

        async fn finalize(&self, _: (), _: Checkpoint) -> Result<(), ReduceError> {
            Ok(())
        }
    }

    fn registry() -> PluginRegistry<MemoryBlockSource> {
        let mut registry = PluginRegistry::new();
        registry.register("account_pending_payout", || Ok(Noop)).unwrap();
        registry.register("notifications", || Ok(Noop)).unwrap();
        registry
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = registry();
        let err = registry.register("notifications", || Ok(Noop)).unwrap_err();
        assert!(matches!(err, ReduceError::DuplicatePlugin(id) if id == "notifications"));
        assert_eq!(registry.ids().count(), 2);
    }

    #[test]
    fn unknown_id_lists_available_in_order() {
        match registry().create("nope") {
            Err(ReduceError::UnknownPlugin { id, available }) => {
                assert_eq!(id, "nope");
                assert_eq!(available, vec!["account_pending_payout", "notifications"]);
            }
            _ => panic!("expected UnknownPlugin"),
        }
    }

    #[test]
    fn factory_errors_surface() {
        let mut registry = PluginRegistry::<MemoryBlockSource>::new();
        registry
            .register("broken", || -> Result<Noop, ReduceError> {
                Err(ReduceError::Config("missing data dir".into()))
            })
            .unwrap();
        assert!(registry.create("broken").err().unwrap().is_config());
    }

    #[tokio::test]
    async fn launch_runs_the_plugin() {
        let source = Arc::new(MemoryBlockSource::new(10));
        let plugin = registry().create("notifications").unwrap();
        let handle = plugin
            .launch(Arc::clone(&source), &EngineConfig::default().mappers(2))
            .await
            .unwrap();
        handle.wait().await.unwrap();
        assert_eq!(source.fetched(), vec![1, 2, 3]);
    }
}
