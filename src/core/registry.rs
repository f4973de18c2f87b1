use std::collections::HashMap;
use std::sync::Arc;

use crate::core::config::ExecutionConfig;
use crate::core::controller::{ExecutionController, ExecutionHandle};
use crate::core::error::{ExecutionError, Result};
use crate::core::execution::ExecutionLogic;
use crate::core::schema::ExecutionSchema;
use crate::core::value::Params;

/// Builds a fresh logic instance for every execution.
pub type Factory = Arc<dyn Fn() -> Box<dyn ExecutionLogic> + Send + Sync>;

fn boxed<L, F>(factory: F) -> Factory
where
    L: ExecutionLogic,
    F: Fn() -> L + Send + Sync + 'static,
{
    Arc::new(move || -> Box<dyn ExecutionLogic> { Box::new(factory()) })
}

/// One execution type known to the host.
#[derive(Clone)]
pub struct Registration {
    pub id: String,
    pub schema: ExecutionSchema,
    /// Hidden types can be created but are left out of [`ExecutionRegistry::ids`].
    pub hidden: bool,
    factory: Factory,
}

/// Table from stable identifiers to execution factories.
///
/// Built once at start-up and passed around by reference.
#[derive(Clone, Default)]
pub struct ExecutionRegistry {
    entries: HashMap<String, Registration>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the types that need no host collaborators.
    pub fn with_builtins() -> Self {
        use crate::sources::cursor::{CURSOR_LOOP, CursorLoop};
        use crate::sources::debug::{DEBUG_SEND_ERROR, DebugSendError};

        let mut registry = Self::new();
        registry.register(CURSOR_LOOP, CursorLoop::new);
        registry.register_hidden(DEBUG_SEND_ERROR, || DebugSendError);
        registry
    }

    pub fn register<L, F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        L: ExecutionLogic,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.insert(id, boxed(factory), false)
    }

    pub fn register_hidden<L, F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        L: ExecutionLogic,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.insert(id, boxed(factory), true)
    }

    fn insert(&mut self, id: &str, factory: Factory, hidden: bool) -> &mut Self {
        if self.entries.contains_key(id) {
            log::warn!(
                "Warning: Execution type {} was already registered, Overwriting it.",
                id
            );
        }
        let schema = factory().schema();
        self.entries.insert(
            id.to_string(),
            Registration {
                id: id.to_string(),
                schema,
                hidden,
                factory,
            },
        );
        self
    }

    pub fn get(&self, id: &str) -> Option<&Registration> {
        self.entries.get(id)
    }

    pub fn schema(&self, id: &str) -> Option<&ExecutionSchema> {
        self.entries.get(id).map(|r| &r.schema)
    }

    /// Visible identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .entries
            .values()
            .filter(|r| !r.hidden)
            .map(|r| r.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Instantiates `id` with `params`; fails on unknown ids and missing inputs.
    pub fn create(
        &self,
        id: &str,
        params: Params,
        config: ExecutionConfig,
    ) -> Result<(ExecutionController, ExecutionHandle)> {
        let registration = self
            .entries
            .get(id)
            .ok_or_else(|| ExecutionError::UnknownExecutionType(id.to_string()))?;
        let (controller, handle) =
            ExecutionController::from_boxed((registration.factory)(), params, config)?;
        log::debug!("Created execution {} of type {}", controller.id(), id);
        Ok((controller, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::execution::{ExecutionContext, StepOutcome};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ExecutionLogic for Noop {
        fn schema(&self) -> ExecutionSchema {
            crate::schema!("seed -> echo")
        }

        async fn step(&mut self, _ctx: &mut ExecutionContext) -> Result<StepOutcome> {
            Ok(StepOutcome::Finished)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ExecutionRegistry::new();
        registry.register("noop", || Noop);
        assert_eq!(registry.ids(), vec!["noop"]);
        assert_eq!(registry.schema("noop").unwrap().inputs[0].name, "seed");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_hidden_types_are_not_listed_but_creatable() {
        let mut registry = ExecutionRegistry::new();
        registry.register_hidden("noop", || Noop);
        assert!(registry.ids().is_empty());
        assert!(
            registry
                .create("noop", Params::new().with("seed", 1), ExecutionConfig::default())
                .is_ok()
        );
    }

    #[test]
    fn test_create_validates_inputs() {
        let mut registry = ExecutionRegistry::new();
        registry.register("noop", || Noop);
        let err = registry
            .create("noop", Params::new(), ExecutionConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ExecutionError::InvalidInput { .. }));
    }

    #[test]
    fn test_unknown_type() {
        let registry = ExecutionRegistry::new();
        let err = registry
            .create("nope", Params::new(), ExecutionConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, ExecutionError::UnknownExecutionType("nope".into()));
    }

    #[test]
    fn test_builtins() {
        let registry = ExecutionRegistry::with_builtins();
        assert_eq!(registry.ids(), vec!["cursor_loop"]);
        assert!(registry.get("debug_send_error").unwrap().hidden);
    }
}
