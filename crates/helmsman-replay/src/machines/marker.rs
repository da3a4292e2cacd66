use super::{CancelResult, DecisionId, DecisionState, DecisionStateMachine, MachineBase};
use crate::error::ReplayError;
use helmsman_types::{Decision, RecordMarkerAttributes};

/// Tracks one `RecordMarker` command. Markers are fire-and-forget: the
/// command is emitted once while `Created` and there is nothing to cancel.
#[derive(Clone, Debug)]
pub(crate) struct MarkerMachine {
    base: MachineBase,
    attributes: RecordMarkerAttributes,
}

impl MarkerMachine {
    pub fn new(id: DecisionId, attributes: RecordMarkerAttributes) -> Self {
        Self {
            base: MachineBase::new(id),
            attributes,
        }
    }
}

impl DecisionStateMachine for MarkerMachine {
    fn id(&self) -> DecisionId {
        self.base.id()
    }

    fn state(&self) -> DecisionState {
        self.base.state()
    }

    fn is_done(&self) -> bool {
        self.base.is_done()
    }

    fn current_decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(Decision::RecordMarker(self.attributes.clone())),
            _ => None,
        }
    }

    fn on_decision_task_started(&mut self) {
        self.base.on_decision_task_started();
    }

    fn cancel(&mut self) -> Result<CancelResult, ReplayError> {
        self.base.cancel()
    }

    fn on_initiated_event(&mut self) -> Result<(), ReplayError> {
        self.base.on_initiated_event()
    }

    fn on_initiation_failed_event(&mut self) -> Result<(), ReplayError> {
        self.base.on_initiation_failed_event()
    }

    fn on_started_event(&mut self) {
        self.base.on_started_event();
    }

    fn on_completion_event(&mut self) -> Result<(), ReplayError> {
        self.base.on_completion_event()
    }

    fn on_cancellation_initiated_event(&mut self) -> Result<(), ReplayError> {
        self.base.on_cancellation_initiated_event()
    }

    fn on_cancellation_event(&mut self) -> Result<(), ReplayError> {
        self.base.on_cancellation_event()
    }

    fn on_cancellation_failure_event(&mut self) -> Result<(), ReplayError> {
        self.base.on_cancellation_failure_event()
    }

    fn history(&self) -> &[String] {
        self.base.history()
    }
}
