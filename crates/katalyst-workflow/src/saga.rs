//! Non-durable saga execution: an ordered list of steps, each an
//! `(execute, compensate)` pair, with LIFO best-effort compensation on
//! failure (spec §4.9 points 1-4).

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use crate::state_machine::{WorkflowState, WorkflowStateMachine};

type ExecuteFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Box<dyn Any + Send + Sync>, String>> + Send + Sync>;
type CompensateFn = Arc<dyn Fn(Box<dyn Any + Send + Sync>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// One step of a saga: an opaque `execute` producing a typed result, and a
/// `compensate` consuming that same result to undo the effect. Steps with
/// different result types can live in the same saga because the result is
/// type-erased behind `Any` between the two calls.
#[derive(Clone)]
pub struct Step {
    pub name: String,
    execute: ExecuteFn,
    compensate: CompensateFn,
}

impl Step {
    pub fn new<R, Ex, ExFut, Co, CoFut>(name: impl Into<String>, execute: Ex, compensate: Co) -> Self
    where
        R: Send + Sync + 'static,
        Ex: Fn() -> ExFut + Send + Sync + 'static,
        ExFut: Future<Output = Result<R, String>> + Send + 'static,
        Co: Fn(R) -> CoFut + Send + Sync + 'static,
        CoFut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let execute: ExecuteFn = Arc::new(move || {
            let fut = execute();
            Box::pin(async move { fut.await.map(|r| Box::new(r) as Box<dyn Any + Send + Sync>) })
        });
        let compensate: CompensateFn = Arc::new(move |boxed| {
            let value = *boxed
                .downcast::<R>()
                .expect("saga step compensation received a result of the wrong type");
            Box::pin(compensate(value)) as BoxFuture<'static, Result<(), String>>
        });
        Self {
            name: name.into(),
            execute,
            compensate,
        }
    }
}

/// Accumulates step completions and compensation errors across a run.
#[derive(Debug, Default)]
pub struct SagaContext {
    pub completed_steps: Vec<String>,
    pub errors: Vec<String>,
}

/// A named ordered list of steps (spec §4.9 "a named ordered list of
/// steps").
pub struct Saga {
    pub name: String,
    steps: Vec<Step>,
}

impl Saga {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Runs every step in order. On the first failure, transitions to
    /// `Compensating` and unwinds the completed steps LIFO, then finishes
    /// in `Compensated` regardless of whether every compensation succeeded
    /// (spec §4.9 point 3: "best-effort"). On full success the machine is
    /// left in `Executing`; call [`SagaRun::commit`] to advance it to
    /// `Committed`.
    pub async fn run(&self) -> SagaRun {
        let mut machine = WorkflowStateMachine::new();
        machine.transition(WorkflowState::Executing);

        let mut context = SagaContext::default();
        let mut call_log = Vec::new();
        let mut compensation_stack: Vec<(&Step, Box<dyn Any + Send + Sync>)> = Vec::new();

        for step in &self.steps {
            call_log.push(format!("{}.execute", step.name));
            match (step.execute)().await {
                Ok(result) => {
                    context.completed_steps.push(step.name.clone());
                    compensation_stack.push((step, result));
                }
                Err(reason) => {
                    machine.transition(WorkflowState::Compensating);
                    while let Some((completed, result)) = compensation_stack.pop() {
                        call_log.push(format!("{}.compensate", completed.name));
                        if let Err(err) = (completed.compensate)(result).await {
                            warn!(step = %completed.name, error = %err, "compensation failed");
                            context.errors.push(format!("{}: {}", completed.name, err));
                        }
                    }
                    machine.transition(WorkflowState::Compensated);
                    return SagaRun {
                        machine,
                        context,
                        call_log,
                        failed_step: Some(step.name.clone()),
                        error: Some(reason),
                    };
                }
            }
        }

        SagaRun {
            machine,
            context,
            call_log,
            failed_step: None,
            error: None,
        }
    }
}

/// The outcome of one [`Saga::run`] invocation.
pub struct SagaRun {
    machine: WorkflowStateMachine,
    pub context: SagaContext,
    pub call_log: Vec<String>,
    pub failed_step: Option<String>,
    pub error: Option<String>,
}

impl SagaRun {
    pub fn state(&self) -> WorkflowState {
        self.machine.state()
    }

    /// Advances `Executing -> Committing -> Committed`. Returns `false`
    /// (spec §4.9's boolean-not-throw convention) if the run already ended
    /// in `Compensated` and therefore has nothing to commit.
    pub fn commit(&mut self) -> bool {
        self.machine.transition(WorkflowState::Committing) && self.machine.transition(WorkflowState::Committed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recording_step(name: &'static str, log: Arc<Mutex<Vec<String>>>, fail: bool) -> Step {
        let exec_log = log.clone();
        let comp_log = log;
        Step::new(
            name,
            move || {
                let log = exec_log.clone();
                async move {
                    log.lock().unwrap().push(format!("{name}.execute"));
                    if fail {
                        Err(format!("{name} failed"))
                    } else {
                        Ok(name.to_string())
                    }
                }
            },
            move |result: String| {
                let log = comp_log.clone();
                async move {
                    log.lock().unwrap().push(format!("{result}.compensate"));
                    Ok(())
                }
            },
        )
    }

    /// S6: steps [A, B, C] where C.execute throws. Expected call order:
    /// A.execute, B.execute, C.execute, B.compensate, A.compensate; final
    /// state Compensated.
    #[tokio::test]
    async fn s6_saga_compensation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let saga = Saga::new("s6")
            .step(recording_step("A", log.clone(), false))
            .step(recording_step("B", log.clone(), false))
            .step(recording_step("C", log.clone(), true));

        let run = saga.run().await;

        assert_eq!(run.state(), WorkflowState::Compensated);
        assert_eq!(run.failed_step.as_deref(), Some("C"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "A.execute".to_string(),
                "B.execute".to_string(),
                "C.execute".to_string(),
                "B.compensate".to_string(),
                "A.compensate".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn all_steps_succeed_leaves_machine_executing_until_commit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let saga = Saga::new("ok")
            .step(recording_step("A", log.clone(), false))
            .step(recording_step("B", log.clone(), false));

        let mut run = saga.run().await;
        assert_eq!(run.state(), WorkflowState::Executing);
        assert!(run.commit());
        assert_eq!(run.state(), WorkflowState::Committed);
    }

    #[tokio::test]
    async fn one_compensation_failure_does_not_stop_the_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing_compensate = Step::new(
            "B",
            || async { Ok(()) },
            |_: ()| async { Err("compensate boom".to_string()) },
        );
        let saga = Saga::new("partial")
            .step(recording_step("A", log.clone(), false))
            .step(failing_compensate)
            .step(recording_step("C", log, true));

        let run = saga.run().await;
        assert_eq!(run.state(), WorkflowState::Compensated);
        assert_eq!(run.context.errors.len(), 1);
    }
}
