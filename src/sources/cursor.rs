use async_trait::async_trait;
use std::time::Duration;

use crate::core::error::{ExecutionError, Result};
use crate::core::execution::{ExecutionContext, ExecutionLogic, StepOutcome};
use crate::core::result::ResultContract;
use crate::core::schema::ExecutionSchema;
use crate::core::signal::Signal;
use crate::core::value::Params;

pub const CURSOR_LOOP: &str = "cursor_loop";

/// Custom signal that flips the direction of travel.
pub const DIRECTION: &str = "direction";

/// Walks a cursor around a sequence of `length` positions forever.
///
/// Each step moves one position forward or backward, wrapping modulo
/// `length`. A `direction` signal reverses travel.
#[derive(Debug, Clone)]
pub struct CursorLoop {
    length: u64,
    cursor: u64,
    forward: bool,
}

impl Default for CursorLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorLoop {
    pub fn new() -> Self {
        Self {
            length: 0,
            cursor: 0,
            forward: true,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    fn advance(&mut self) {
        self.cursor = if self.forward {
            if self.cursor + 1 >= self.length {
                0
            } else {
                self.cursor + 1
            }
        } else if self.cursor == 0 {
            self.length - 1
        } else {
            self.cursor - 1
        };
    }
}

#[async_trait]
impl ExecutionLogic for CursorLoop {
    fn schema(&self) -> ExecutionSchema {
        ExecutionSchema::new()
            .input("length", "Number of positions in the sequence")
            .optional_input("interval", "Seconds between steps")
            .optional_input("forward", "Initial direction of travel (default true)")
            .optional_input("start", "Initial cursor position (default 0)")
            .output("cursor", "Current position")
            .output("iterations", "Steps taken, reported at the end")
    }

    fn signals(&self) -> Vec<String> {
        vec![DIRECTION.to_string()]
    }

    async fn setup(&mut self, params: &Params, ctx: &mut ExecutionContext) -> Result<()> {
        self.length = params.u64("length")?;
        if self.length == 0 {
            return Err(ExecutionError::invalid_input("length", "must be at least 1"));
        }
        let interval = params.f64_or("interval", ctx.interval().as_secs_f64())?;
        let interval = Duration::try_from_secs_f64(interval).map_err(|_| {
            ExecutionError::invalid_input("interval", "must be a non-negative number of seconds")
        })?;
        ctx.set_interval(interval);
        self.forward = params.bool_or("forward", true)?;
        self.cursor = params.u64_or("start", 0)? % self.length;
        Ok(())
    }

    async fn on_signal(&mut self, signal: &Signal, _ctx: &mut ExecutionContext) -> Result<()> {
        // only DIRECTION is registered, the payload is not interpreted
        self.forward = !self.forward;
        log::debug!(
            "Cursor now travelling {} ({})",
            if self.forward { "forward" } else { "backward" },
            signal.kind
        );
        Ok(())
    }

    async fn step(&mut self, ctx: &mut ExecutionContext) -> Result<StepOutcome> {
        self.advance();
        ctx.publish("cursor", self.cursor)?;
        ctx.publish_progress(self.cursor, Some(self.length))?;
        Ok(StepOutcome::Continue)
    }

    async fn finish(&mut self, ctx: &mut ExecutionContext) -> Result<ResultContract> {
        Ok(ResultContract::named([
            ("cursor", self.cursor),
            ("iterations", ctx.iteration()),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(length: u64, forward: bool) -> CursorLoop {
        CursorLoop {
            length,
            cursor: 0,
            forward,
        }
    }

    #[test]
    fn test_forward_wraps() {
        let mut c = cursor(3, true);
        let seen: Vec<u64> = (0..4)
            .map(|_| {
                c.advance();
                c.cursor()
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_backward_wraps() {
        let mut c = cursor(4, false);
        c.advance();
        assert_eq!(c.cursor(), 3);
        c.advance();
        assert_eq!(c.cursor(), 2);
    }

    #[test]
    fn test_single_position_stays_put() {
        let mut c = cursor(1, false);
        c.advance();
        assert_eq!(c.cursor(), 0);
    }

    #[test]
    fn test_full_range_length_does_not_overflow() {
        let mut c = cursor(u64::MAX, false);
        c.cursor = 5;
        c.advance();
        assert_eq!(c.cursor(), 4);

        c.cursor = 0;
        c.advance();
        assert_eq!(c.cursor(), u64::MAX - 1);

        c.forward = true;
        c.advance();
        assert_eq!(c.cursor(), 0);
    }

    async fn setup_error(params: Params) -> Option<ExecutionError> {
        let mut ctx = ExecutionContext::new(
            uuid::Uuid::new_v4(),
            Duration::from_millis(100),
            crate::core::output::OutputSink::new(Duration::from_millis(10), 1),
        );
        CursorLoop::new().setup(&params, &mut ctx).await.err()
    }

    #[tokio::test]
    async fn test_oversized_interval_is_invalid_input() {
        let params = Params::new().with("length", 4).with("interval", 1e30);
        let err = setup_error(params).await.unwrap();
        assert!(matches!(err, ExecutionError::InvalidInput { ref name, .. } if name == "interval"));
    }

    #[tokio::test]
    async fn test_large_finite_interval_is_accepted() {
        let params = Params::new().with("length", 4).with("interval", 3600.0);
        assert_eq!(setup_error(params).await, None);
    }

    #[tokio::test]
    async fn test_negative_interval_is_invalid_input() {
        let params = Params::new().with("length", 4).with("interval", -0.5);
        let err = setup_error(params).await.unwrap();
        assert!(matches!(err, ExecutionError::InvalidInput { ref name, .. } if name == "interval"));
    }
}
