use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::core::AsAny;
use crate::core::error::Result;
use crate::core::output::{OutputSink, PROGRESS_KEY};
use crate::core::result::ResultContract;
use crate::core::schema::ExecutionSchema;
use crate::core::signal::Signal;
use crate::core::value::{Params, Value};

/// Identifies one execution for logs and observers.
pub type ExecutionId = Uuid;

/// What a step wants the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep iterating.
    Continue,
    /// The work is exhausted (e.g. the last frame was sent); wrap up normally.
    Finished,
}

/// What a running execution can see and touch.
pub struct ExecutionContext {
    id: ExecutionId,
    iteration: u64,
    interval: Duration,
    pub(crate) sink: OutputSink,
}

impl ExecutionContext {
    pub(crate) fn new(id: ExecutionId, interval: Duration, sink: OutputSink) -> Self {
        Self {
            id,
            iteration: 0,
            interval,
            sink,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Number of completed steps.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn advance(&mut self) {
        self.iteration += 1;
    }

    pub(crate) fn reset_iteration(&mut self) {
        self.iteration = 0;
    }

    /// Target time between two iterations.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        log::debug!("Execution {} interval set to {:?}", self.id, interval);
        self.interval = interval;
    }

    /// Stages an output; it becomes visible at the end of the iteration.
    pub fn publish(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.sink.publish(key, value)
    }

    /// Stages `progress` as a percentage when `total` is known, otherwise as a
    /// plain step counter.
    pub fn publish_progress(&mut self, step: u64, total: Option<u64>) -> Result<()> {
        let value = match total {
            Some(total) if total > 0 => {
                Value::from(step.saturating_mul(100).div_ceil(total).min(100))
            }
            _ => Value::from(step),
        };
        self.sink.publish(PROGRESS_KEY, value)
    }

    /// Whether the subscriber asked for `key`; lets a step skip expensive
    /// outputs nobody will read.
    pub fn is_requested(&self, key: &str) -> bool {
        self.sink.is_requested(key)
    }
}

/// The behaviour of one kind of long-running execution.
///
/// The controller calls [`setup`](ExecutionLogic::setup) once, then
/// [`step`](ExecutionLogic::step) every iteration until a `stop` signal, a
/// [`StepOutcome::Finished`], or an error. [`finish`](ExecutionLogic::finish)
/// produces the terminal value on the normal path only.
///
/// A step is never interrupted: a `stop` is honoured at the next iteration
/// boundary, so a step that blocks on I/O delays it for as long as it blocks.
#[async_trait]
pub trait ExecutionLogic: AsAny + Send + 'static {
    /// Declared inputs and outputs.
    fn schema(&self) -> ExecutionSchema {
        ExecutionSchema::default()
    }

    /// Custom signal kinds this execution understands, besides pause/resume/stop.
    fn signals(&self) -> Vec<String> {
        Vec::new()
    }

    /// Reads inputs and acquires whatever the loop needs.
    async fn setup(&mut self, _params: &Params, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Applies one of the kinds returned by [`signals`](ExecutionLogic::signals).
    async fn on_signal(&mut self, _signal: &Signal, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Computes and publishes one unit of partial work.
    async fn step(&mut self, ctx: &mut ExecutionContext) -> Result<StepOutcome>;

    /// Produces the terminal value.
    async fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<ResultContract> {
        Ok(ResultContract::empty())
    }
}
