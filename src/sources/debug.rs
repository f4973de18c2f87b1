use async_trait::async_trait;

use crate::core::error::{ExecutionError, Result};
use crate::core::execution::{ExecutionContext, ExecutionLogic, StepOutcome};
use crate::core::output::RENDER_KEY;
use crate::core::schema::ExecutionSchema;
use crate::core::value::MediaRef;

pub const DEBUG_SEND_ERROR: &str = "debug_send_error";

pub const DEBUG_ERROR_MESSAGE: &str = "This is a test error message.";

/// Fails on its first step, for exercising observers' error paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugSendError;

#[async_trait]
impl ExecutionLogic for DebugSendError {
    async fn step(&mut self, _ctx: &mut ExecutionContext) -> Result<StepOutcome> {
        Err(ExecutionError::internal(DEBUG_ERROR_MESSAGE))
    }
}

/// Publishes one fixed image as `render`, then finishes.
#[derive(Debug, Clone)]
pub struct DebugSendRender {
    media: MediaRef,
}

impl DebugSendRender {
    pub fn new(media: MediaRef) -> Self {
        Self { media }
    }
}

#[async_trait]
impl ExecutionLogic for DebugSendRender {
    fn schema(&self) -> ExecutionSchema {
        ExecutionSchema::new().output(RENDER_KEY, "The image to show")
    }

    async fn step(&mut self, ctx: &mut ExecutionContext) -> Result<StepOutcome> {
        ctx.publish(RENDER_KEY, self.media.clone())?;
        Ok(StepOutcome::Finished)
    }
}
