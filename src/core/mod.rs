pub mod config;
pub mod controller;
pub mod error;
pub mod execution;
pub mod output;
pub mod registry;
pub mod result;
pub mod schema;
pub mod signal;
pub mod state;
pub mod throttle;
pub mod value;

use std::any::Any;

/// A helper trait that just provides the `as_any` method.
/// Needed for downcasting a boxed `ExecutionLogic` back to its concrete type
/// (kept apart from `ExecutionLogic` so implementors never have to write it).
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
