use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::config::ExecutionConfig;
use crate::core::error::{ExecutionError, Result};
use crate::core::execution::{ExecutionContext, ExecutionId, ExecutionLogic, StepOutcome};
use crate::core::output::{ERROR_KEY, OutputSink, SinkHandle, Subscription};
use crate::core::result::{OutputRequest, ResultContract};
use crate::core::signal::{self, PAUSE, RESUME, STOP, Signal, SignalChannel, SignalSender};
use crate::core::state::ExecutionState;
use crate::core::throttle::Throttle;
use crate::core::value::Params;

/// How an execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed(ResultContract),
    Failed(ExecutionError),
}

impl Termination {
    pub fn state(&self) -> ExecutionState {
        match self {
            Termination::Completed(_) => ExecutionState::Completed,
            Termination::Failed(_) => ExecutionState::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Termination::Completed(_))
    }

    pub fn result(&self) -> Option<&ResultContract> {
        match self {
            Termination::Completed(result) => Some(result),
            Termination::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            Termination::Completed(_) => None,
            Termination::Failed(err) => Some(err),
        }
    }
}

/// Drives one execution through its lifecycle.
///
/// Each iteration drains the signal slot without blocking, applies the
/// signal, runs one step, flushes its outputs, then waits on the throttle.
/// Faults from any phase (including panics) end the execution as
/// [`ExecutionState::Failed`] with an `error` record in the last batch.
pub struct ExecutionController {
    id: ExecutionId,
    logic: Box<dyn ExecutionLogic>,
    params: Params,
    custom_signals: BTreeSet<String>,
    signals: SignalChannel,
    ctx: ExecutionContext,
    state: watch::Sender<ExecutionState>,
    config: ExecutionConfig,
    fault: Option<ExecutionError>,
    termination: Option<Termination>,
}

impl ExecutionController {
    /// Validates `params` against the logic's schema and wires up the
    /// controller together with the handle observers use.
    pub fn new<L: ExecutionLogic>(
        logic: L,
        params: Params,
        config: ExecutionConfig,
    ) -> Result<(Self, ExecutionHandle)> {
        Self::from_boxed(Box::new(logic), params, config)
    }

    pub fn from_boxed(
        logic: Box<dyn ExecutionLogic>,
        params: Params,
        config: ExecutionConfig,
    ) -> Result<(Self, ExecutionHandle)> {
        config.validate()?;
        let schema = logic.schema();
        schema.validate_params(&params)?;

        let custom_signals: BTreeSet<String> = logic.signals().into_iter().collect();
        if let Some(kind) = custom_signals.iter().find(|k| signal::is_builtin(k)) {
            return Err(ExecutionError::InvalidConfig(format!(
                "custom signal '{}' shadows a built-in signal",
                kind
            )));
        }

        let id = Uuid::new_v4();
        let mut sink = OutputSink::new(config.flush_timeout(), config.subscriber_capacity);
        sink.declare(schema.output_keys());
        let signals = SignalChannel::new();
        let (state, state_rx) = watch::channel(ExecutionState::Idle);

        let handle = ExecutionHandle {
            id,
            signals: signals.sender(),
            sink: sink.handle(),
            state: state_rx,
        };
        let controller = ExecutionController {
            id,
            logic,
            params,
            custom_signals,
            signals,
            ctx: ExecutionContext::new(id, config.default_interval(), sink),
            state,
            config,
            fault: None,
            termination: None,
        };
        Ok((controller, handle))
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    /// Number of completed steps.
    pub fn iteration(&self) -> u64 {
        self.ctx.iteration()
    }

    /// Downcasts the logic, e.g. to inspect it after termination.
    pub fn logic<T: ExecutionLogic>(&self) -> Option<&T> {
        let logic: &dyn ExecutionLogic = &*self.logic;
        logic.as_any().downcast_ref::<T>()
    }

    /// Runs the whole lifecycle: start, iterate at the throttled rate until
    /// the loop ends, then terminate.
    pub async fn run(&mut self) -> Termination {
        if self.start().await {
            let mut throttle = Throttle::new();
            while self.iterate().await {
                let interval = if self.state() == ExecutionState::Paused {
                    self.config.paused_poll_interval()
                } else {
                    self.ctx.interval()
                };
                throttle.tick(interval).await;
            }
        }
        self.terminate().await
    }

    /// Runs the execution on its own tokio task.
    pub fn spawn(mut self) -> JoinHandle<Termination> {
        tokio::spawn(async move { self.run().await })
    }

    /// `Idle -> Running`, then set-up. Returns whether the loop may begin.
    pub async fn start(&mut self) -> bool {
        if self.state() != ExecutionState::Idle {
            log::warn!("Execution {} was already started", self.id);
            return self.state().is_active();
        }
        self.transition(ExecutionState::Running);
        self.ctx.reset_iteration();
        log::info!("Execution {} started", self.id);

        match guarded(self.logic.setup(&self.params, &mut self.ctx)).await {
            Ok(()) => {
                self.ctx.sink.flush().await;
                true
            }
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    /// One iteration without the throttle wait. Returns whether the loop
    /// should keep going; once it returns `false`, call
    /// [`terminate`](Self::terminate).
    pub async fn iterate(&mut self) -> bool {
        if !self.state().is_active() {
            return false;
        }

        if let Some(signal) = self.signals.try_receive() {
            if let Err(err) = self.dispatch(signal).await {
                self.fail(err);
                return false;
            }
            if !self.state().is_active() {
                return false;
            }
        }

        if self.state() == ExecutionState::Paused {
            return true;
        }

        match guarded(self.logic.step(&mut self.ctx)).await {
            Ok(outcome) => {
                self.ctx.advance();
                self.ctx.sink.flush().await;
                if outcome == StepOutcome::Finished {
                    log::info!(
                        "Execution {} finished its work after {} iteration(s)",
                        self.id,
                        self.ctx.iteration()
                    );
                    self.transition(ExecutionState::Stopping);
                    return false;
                }
                true
            }
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    /// Moves to a terminal state, publishing and flushing the terminal
    /// output. Safe to call more than once; later calls return the same value.
    pub async fn terminate(&mut self) -> Termination {
        if let Some(termination) = &self.termination {
            return termination.clone();
        }

        if self.state() == ExecutionState::Idle {
            self.transition(ExecutionState::Running);
            self.fail(ExecutionError::internal("terminated before it was started"));
        }
        if self.state().is_active() {
            self.transition(ExecutionState::Stopping);
        }

        let termination = match self.fault.take() {
            Some(err) => self.abort(err).await,
            None => match guarded(self.logic.finish(&mut self.ctx)).await {
                Ok(result) => self.complete(result).await,
                Err(err) => self.abort(err).await,
            },
        };
        self.ctx.sink.close();
        self.termination = Some(termination.clone());
        termination
    }

    async fn dispatch(&mut self, signal: Signal) -> Result<()> {
        log::debug!("Execution {} received signal '{}'", self.id, signal.kind);
        match signal.kind.as_str() {
            PAUSE => {
                if self.state() == ExecutionState::Running {
                    self.transition(ExecutionState::Paused);
                } else {
                    log::debug!("Execution {} is already paused", self.id);
                }
                Ok(())
            }
            RESUME => {
                if self.state() == ExecutionState::Paused {
                    self.transition(ExecutionState::Running);
                } else {
                    log::debug!("Execution {} is not paused, ignoring resume", self.id);
                }
                Ok(())
            }
            STOP => {
                self.transition(ExecutionState::Stopping);
                Ok(())
            }
            kind if self.custom_signals.contains(kind) => {
                guarded(self.logic.on_signal(&signal, &mut self.ctx)).await?;
                if self.ctx.sink.has_pending() {
                    self.ctx.sink.flush().await;
                }
                Ok(())
            }
            kind => Err(ExecutionError::ControlProtocol {
                kind: kind.to_string(),
            }),
        }
    }

    fn fail(&mut self, err: ExecutionError) {
        log::error!("Execution {} failed: {}", self.id, err);
        self.ctx.sink.discard_pending();
        if self.state().is_active() {
            self.transition(ExecutionState::Stopping);
        }
        self.fault = Some(err);
    }

    async fn complete(&mut self, result: ResultContract) -> Termination {
        for (key, value) in result.records() {
            if let Err(err) = self.ctx.sink.publish(key, value) {
                return self.abort(err).await;
            }
        }
        self.ctx.sink.flush().await;
        self.transition(ExecutionState::Completed);
        log::info!("Execution {} completed", self.id);
        Termination::Completed(result)
    }

    async fn abort(&mut self, err: ExecutionError) -> Termination {
        self.ctx.sink.discard_pending();
        if let Err(publish_err) = self.ctx.sink.publish(ERROR_KEY, err.to_string()) {
            log::error!(
                "Execution {} could not publish its error record: {}",
                self.id,
                publish_err
            );
        }
        self.ctx.sink.flush().await;
        self.transition(ExecutionState::Failed);
        Termination::Failed(err)
    }

    fn transition(&mut self, next: ExecutionState) {
        let current = self.state();
        let allowed = current.can_transition_to(next);
        debug_assert!(allowed, "invalid transition {current} -> {next}");
        if !allowed {
            log::error!(
                "Execution {}: refusing transition {} -> {}",
                self.id,
                current,
                next
            );
            return;
        }
        log::debug!("Execution {}: {} -> {}", self.id, current, next);
        self.state.send_replace(next);
    }
}

/// Turns a panic inside an execution phase into an internal fault.
async fn guarded<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ExecutionError::Internal(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

/// The controller/observer side of an execution. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionHandle {
    id: ExecutionId,
    signals: SignalSender,
    sink: SinkHandle,
    state: watch::Receiver<ExecutionState>,
}

impl ExecutionHandle {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Delivers `signal` at the next iteration boundary, replacing any
    /// signal that has not been picked up yet.
    pub fn send(&self, signal: Signal) {
        if self.state().is_terminal() {
            log::debug!(
                "Execution {} already terminated, signal '{}' will not be read",
                self.id,
                signal.kind
            );
        }
        self.signals.send(signal);
    }

    pub fn pause(&self) {
        self.send(Signal::pause());
    }

    pub fn resume(&self) {
        self.send(Signal::resume());
    }

    pub fn stop(&self) {
        self.send(Signal::stop());
    }

    pub fn subscribe(&self) -> Result<Subscription> {
        self.sink.subscribe()
    }

    pub fn subscribe_to(&self, request: OutputRequest) -> Result<Subscription> {
        self.sink.subscribe_to(request)
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    /// Waits until the execution reaches `target` or a terminal state.
    pub async fn wait_for_state(&self, target: ExecutionState) -> ExecutionState {
        let mut rx = self.state.clone();
        let reached = rx
            .wait_for(|s| *s == target || s.is_terminal())
            .await
            .map(|s| *s);
        reached.unwrap_or_else(|_| *rx.borrow())
    }

    /// Waits until the execution is completed or failed.
    pub async fn wait_terminal(&self) -> ExecutionState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        reached.unwrap_or_else(|_| *rx.borrow())
    }
}
