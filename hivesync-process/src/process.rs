//! A chain of [`ProcessStep`]s with compensating rollback.
//!
//! The chain runs the current step, keeps it on a completed stack and moves
//! on to whatever step it handed over. When a step fails, every completed
//! step is rolled back in reverse order before the failure is reported.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::ProcessError;
use crate::step::{NextStep, ProcessStep};

/// Externally observable lifecycle of a [`Process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Succeeded,
    Failed { reason: String },
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Succeeded | ProcessState::Failed { .. })
    }
}

/// An ordered chain of steps sharing one context.
pub struct Process<C: Send> {
    name: String,
    context: C,
    next: NextStep<C>,
    completed: Vec<Box<dyn ProcessStep<C>>>,
    state: watch::Sender<ProcessState>,
}

impl<C: Send> Process<C> {
    pub fn new<S>(name: impl Into<String>, context: C, first: S) -> Self
    where
        S: ProcessStep<C> + 'static,
    {
        let (state, _) = watch::channel(ProcessState::Ready);
        Self {
            name: name.into(),
            context,
            next: Some(Box::new(first)),
            completed: Vec::new(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    /// Subscribe to state changes; the receiver sees the terminal state even
    /// after the process is dropped.
    pub fn state(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Drive the chain until it is terminal.
    pub async fn run(&mut self) -> Result<(), ProcessError> {
        if *self.state.borrow() != ProcessState::Ready {
            return Err(ProcessError::failed(format!(
                "process '{}' was already started",
                self.name
            )));
        }
        self.state.send_replace(ProcessState::Running);

        while let Some(mut step) = self.next.take() {
            tracing::debug!(process = %self.name, step = step.name(), "starting step");
            match step.start(&mut self.context).await {
                Ok(next) => {
                    self.completed.push(step);
                    self.next = next;
                }
                Err(err) => {
                    tracing::warn!(
                        process = %self.name,
                        step = step.name(),
                        error = %err,
                        rolled_back = self.completed.len(),
                        "step failed, rolling back completed steps",
                    );
                    self.roll_back_completed().await;
                    let err = ProcessError::Step {
                        process: self.name.clone(),
                        step: step.name().to_string(),
                        source: Box::new(err),
                    };
                    self.state.send_replace(ProcessState::Failed {
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
            }
        }

        tracing::debug!(process = %self.name, steps = self.completed.len(), "process finished");
        self.state.send_replace(ProcessState::Succeeded);
        Ok(())
    }

    async fn roll_back_completed(&mut self) {
        while let Some(mut step) = self.completed.pop() {
            tracing::debug!(process = %self.name, step = step.name(), "rolling back step");
            step.roll_back(&mut self.context).await;
        }
    }
}

/// Type-erased process, as carried by the dependency tree.
#[async_trait]
pub trait Runnable: Send {
    fn name(&self) -> &str;

    /// Run to a terminal state; the error is a human-readable reason.
    async fn run_to_end(self: Box<Self>) -> Result<(), String>;
}

#[async_trait]
impl<C: Send + 'static> Runnable for Process<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_to_end(self: Box<Self>) -> Result<(), String> {
        let mut process = self;
        process.run().await.map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{done, next};

    /// Records `start:<name>` / `rollback:<name>` events in the context.
    struct Recording {
        name: &'static str,
        fail: bool,
        then: Option<Box<Recording>>,
    }

    impl Recording {
        fn ok(name: &'static str) -> Self {
            Self { name, fail: false, then: None }
        }

        fn failing(name: &'static str) -> Self {
            Self { name, fail: true, then: None }
        }

        fn then(mut self, step: Recording) -> Self {
            self.then = Some(Box::new(step));
            self
        }
    }

    #[async_trait]
    impl ProcessStep<Vec<String>> for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&mut self, ctx: &mut Vec<String>) -> Result<NextStep<Vec<String>>, ProcessError> {
            ctx.push(format!("start:{}", self.name));
            if self.fail {
                self.roll_back(ctx).await;
                return Err(ProcessError::failed("boom"));
            }
            match self.then.take() {
                Some(step) => next(*step),
                None => done(),
            }
        }

        async fn roll_back(&mut self, ctx: &mut Vec<String>) {
            ctx.push(format!("rollback:{}", self.name));
        }
    }

    #[tokio::test]
    async fn runs_chain_in_order_and_succeeds() {
        let first = Recording::ok("a").then(Recording::ok("b").then(Recording::ok("c")));
        let mut process = Process::new("chain", Vec::new(), first);
        let state = process.state();

        process.run().await.expect("run");
        assert_eq!(process.context(), &["start:a", "start:b", "start:c"]);
        assert_eq!(*state.borrow(), ProcessState::Succeeded);
    }

    #[tokio::test]
    async fn failure_rolls_back_completed_steps_in_reverse() {
        let first = Recording::ok("a").then(Recording::ok("b").then(Recording::failing("c")));
        let mut process = Process::new("chain", Vec::new(), first);

        let err = process.run().await.expect_err("should fail");
        assert!(err.to_string().contains("failed at step 'c'"), "{err}");
        assert_eq!(
            process.into_context(),
            ["start:a", "start:b", "start:c", "rollback:c", "rollback:b", "rollback:a"]
        );
    }

    #[tokio::test]
    async fn failed_state_is_observable_after_drop() {
        let mut process = Process::new("single", Vec::new(), Recording::failing("only"));
        let state = process.state();
        let _ = process.run().await;
        drop(process);

        let current = state.borrow().clone();
        match current {
            ProcessState::Failed { reason } => assert!(reason.contains("boom")),
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let mut process = Process::new("once", Vec::new(), Recording::ok("a"));
        process.run().await.expect("first run");
        assert!(process.run().await.is_err());
        assert_eq!(process.context().len(), 1);
    }

    #[tokio::test]
    async fn erased_runnable_reports_reason_string() {
        let process = Process::new("erased", Vec::new(), Recording::failing("x"));
        let runnable: Box<dyn Runnable> = Box::new(process);
        assert_eq!(runnable.name(), "erased");
        let reason = runnable.run_to_end().await.expect_err("fails");
        assert!(reason.contains("process 'erased'"));
    }
}
