use super::{CancelResult, DecisionId, DecisionState, DecisionStateMachine, MachineBase};
use crate::error::ReplayError;
use helmsman_types::Decision;

/// Holds a terminal decision (complete / fail / cancel workflow). These are
/// never confirmed by a follow-up event the machine must track; the decision
/// is emitted until the service accepts it, and cleared only if initiation
/// fails.
#[derive(Clone, Debug)]
pub(crate) struct TerminalMachine {
    // Kept for the id and the transition log; the state never leaves Created.
    base: MachineBase,
    decision: Option<Decision>,
}

impl TerminalMachine {
    pub fn new(id: DecisionId, decision: Decision) -> Self {
        Self {
            base: MachineBase::new(id),
            decision: Some(decision),
        }
    }
}

impl DecisionStateMachine for TerminalMachine {
    fn id(&self) -> DecisionId {
        self.base.id()
    }

    fn state(&self) -> DecisionState {
        DecisionState::Created
    }

    fn is_done(&self) -> bool {
        self.decision.is_some()
    }

    fn current_decision(&self) -> Option<Decision> {
        self.decision.clone()
    }

    fn on_decision_task_started(&mut self) {}

    fn cancel(&mut self) -> Result<CancelResult, ReplayError> {
        Err(self.base.fail_transition("cancel"))
    }

    fn on_initiated_event(&mut self) -> Result<(), ReplayError> {
        Err(self.base.fail_transition("on_initiated_event"))
    }

    fn on_initiation_failed_event(&mut self) -> Result<(), ReplayError> {
        self.decision = None;
        Ok(())
    }

    fn on_started_event(&mut self) {
        self.base.on_started_event();
    }

    fn on_completion_event(&mut self) -> Result<(), ReplayError> {
        Err(self.base.fail_transition("on_completion_event"))
    }

    fn on_cancellation_initiated_event(&mut self) -> Result<(), ReplayError> {
        Err(self.base.fail_transition("on_cancellation_initiated_event"))
    }

    fn on_cancellation_event(&mut self) -> Result<(), ReplayError> {
        Err(self.base.fail_transition("on_cancellation_event"))
    }

    fn on_cancellation_failure_event(&mut self) -> Result<(), ReplayError> {
        Err(self.base.fail_transition("on_cancellation_failure_event"))
    }

    fn history(&self) -> &[String] {
        self.base.history()
    }
}
