//! Workflow state machine (spec §3 "Workflow state-machine", §4.9).
//!
//! Transition attempts from an invalid state return `false` instead of
//! throwing; it's the caller's decision what an invalid transition means
//! for them (spec §4.9 "State-machine transitions ... return a boolean
//! instead of throwing").

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Idle,
    Executing,
    Committing,
    Committed,
    Compensating,
    Compensated,
    Failed,
}

impl WorkflowState {
    fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::Executing => "Executing",
            WorkflowState::Committing => "Committing",
            WorkflowState::Committed => "Committed",
            WorkflowState::Compensating => "Compensating",
            WorkflowState::Compensated => "Compensated",
            WorkflowState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub type TransitionListener = Arc<dyn Fn(WorkflowState, WorkflowState) + Send + Sync>;

/// The finite state machine `{Idle, Executing, Committing, Committed,
/// Compensating, Compensated, Failed}` with externally observable
/// transitions (spec §4.9, §9 glossary "Workflow state machine").
pub struct WorkflowStateMachine {
    state: WorkflowState,
    listeners: Vec<TransitionListener>,
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn add_listener(&mut self, listener: TransitionListener) {
        self.listeners.push(listener);
    }

    fn is_allowed(from: WorkflowState, to: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (from, to),
            (Idle, Executing)
                | (Executing, Committing)
                | (Executing, Compensating)
                | (Executing, Failed)
                | (Committing, Committed)
                | (Committing, Failed)
                | (Compensating, Compensated)
        )
    }

    /// Attempts a transition. Returns `false` (without mutating state) if
    /// the transition is not valid from the current state.
    pub fn transition(&mut self, to: WorkflowState) -> bool {
        if !Self::is_allowed(self.state, to) {
            return false;
        }
        let from = self.state;
        self.state = to;
        for listener in &self.listeners {
            listener(from, to);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_executing_is_allowed() {
        let mut machine = WorkflowStateMachine::new();
        assert!(machine.transition(WorkflowState::Executing));
        assert_eq!(machine.state(), WorkflowState::Executing);
    }

    #[test]
    fn committed_to_executing_is_rejected_and_state_is_unchanged() {
        let mut machine = WorkflowStateMachine::new();
        machine.transition(WorkflowState::Executing);
        machine.transition(WorkflowState::Committing);
        machine.transition(WorkflowState::Committed);

        assert!(!machine.transition(WorkflowState::Executing));
        assert_eq!(machine.state(), WorkflowState::Committed);
    }

    #[test]
    fn listeners_observe_every_transition() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();

        let mut machine = WorkflowStateMachine::new();
        machine.add_listener(Arc::new(move |_from, _to| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        machine.transition(WorkflowState::Executing);
        machine.transition(WorkflowState::Compensating);
        machine.transition(WorkflowState::Compensated);

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
