//! # Ceaseless
//!
//! Cooperative control and throttled output streaming for long-running
//! executions in Rust.
//!
//! ## Features
//!
//! - **Cooperative Control**: pause, resume, stop and custom signals, honoured at iteration boundaries
//! - **Lossy Mailbox**: one pending signal per execution; newer signals replace undelivered ones
//! - **Atomic Batches**: outputs are staged and flushed together, never observed half-written
//! - **Bounded Flushes**: a slow subscriber delays a flush by at most the configured timeout
//! - **Distinct Failure**: faults end in `Failed` with an `error` record, never in `Completed`
//! - **Pick-and-choose Philosophy**: host collaborators (codecs, HTTP) stay behind traits or features
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ceaseless::prelude::*;
//!
//! # async fn demo() -> Result<(), ExecutionError> {
//! let registry = ExecutionRegistry::with_builtins();
//! let params = Params::new().with("length", 4).with("interval", 0.1);
//! let (controller, handle) = registry.create("cursor_loop", params, ExecutionConfig::default())?;
//!
//! let mut outputs = handle.subscribe()?;
//! let task = controller.spawn();
//!
//! while let Some(batch) = outputs.next_batch().await {
//!     if batch.value("cursor") == Some(&Value::Int(3)) {
//!         handle.stop();
//!     }
//! }
//! let termination = task.await.expect("execution task panicked");
//! assert!(termination.is_completed());
//! # Ok(())
//! # }
//! ```
//!
//! A `stop` is a request: it is read at the start of the next iteration. A
//! step blocked on I/O cannot be interrupted and delays the stop for as long
//! as it stays blocked.
//!
//! ## Module Organization
//!
//! - [`core`](crate::core): signals, output sink, throttle, state machine, controller and registry
//! - [`sources`]: ready-made executions (cursor loop, media streamer, remote snapshot, debug)
//! - [`prelude`]: Commonly used types and traits (import with `use ceaseless::prelude::*`)

// ============================================================================
// Modules
// ============================================================================

pub mod core;
pub mod sources;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Control
pub use crate::core::controller::{ExecutionController, ExecutionHandle, Termination};
pub use crate::core::signal::{Signal, SignalChannel, SignalSender};
pub use crate::core::state::ExecutionState;

// Output
pub use crate::core::output::{
    Delivery, OutputBatch, OutputRecord, OutputSink, SinkHandle, Subscription,
};
pub use crate::core::result::{OutputRequest, ResultContract};
pub use crate::core::value::{MediaRef, ParamValue, Params, Value};

// Execution
pub use crate::core::config::ExecutionConfig;
pub use crate::core::error::ExecutionError;
pub use crate::core::execution::{ExecutionContext, ExecutionId, ExecutionLogic, StepOutcome};
pub use crate::core::registry::{ExecutionRegistry, Registration};
pub use crate::core::schema::{ExecutionSchema, Field};
pub use crate::core::throttle::Throttle;

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// The main prelude: imports everything needed to write and drive executions.
///
/// # Example
/// ```rust
/// use ceaseless::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Execution
        ExecutionConfig,
        ExecutionContext,
        // Control
        ExecutionController,
        ExecutionError,
        ExecutionHandle,
        ExecutionLogic,
        ExecutionRegistry,
        ExecutionSchema,
        ExecutionState,
        MediaRef,
        // Output
        OutputBatch,
        OutputRequest,
        Params,
        ResultContract,
        Signal,
        StepOutcome,
        Subscription,
        Termination,
        Value,
    };
    pub use async_trait::async_trait;
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
