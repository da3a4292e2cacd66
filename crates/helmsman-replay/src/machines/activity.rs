use super::{CancelResult, DecisionId, DecisionState, DecisionStateMachine, MachineBase};
use crate::error::ReplayError;
use helmsman_types::{
    Decision, RequestCancelActivityTaskAttributes, ScheduleActivityTaskAttributes,
};

/// Tracks one `ScheduleActivityTask` command. Emits the schedule while
/// `Created` and a `RequestCancelActivityTask` while
/// `CanceledAfterInitiated`; activity cancellation always needs the
/// service round-trip.
#[derive(Clone, Debug)]
pub(crate) struct ActivityMachine {
    base: MachineBase,
    schedule_attributes: ScheduleActivityTaskAttributes,
}

impl ActivityMachine {
    pub fn new(id: DecisionId, schedule_attributes: ScheduleActivityTaskAttributes) -> Self {
        Self {
            base: MachineBase::new(id),
            schedule_attributes,
        }
    }

    fn cancel_decision(&self) -> Decision {
        Decision::RequestCancelActivityTask(RequestCancelActivityTaskAttributes {
            activity_id: self.schedule_attributes.activity_id.clone(),
        })
    }
}

impl DecisionStateMachine for ActivityMachine {
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
            DecisionState::Created => Some(Decision::ScheduleActivityTask(
                self.schedule_attributes.clone(),
            )),
            DecisionState::CanceledAfterInitiated => Some(self.cancel_decision()),
            _ => None,
        }
    }

    fn on_decision_task_started(&mut self) {
        if self.base.state() == DecisionState::CanceledAfterInitiated {
            self.base.transition(
                "on_decision_task_started",
                DecisionState::CancellationDecisionSent,
            );
        } else {
            self.base.on_decision_task_started();
        }
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
        if self.base.state() == DecisionState::CancellationDecisionSent {
            // The service refused the cancellation; the activity is live.
            self.base
                .transition("on_cancellation_failure_event", DecisionState::Initiated);
            Ok(())
        } else {
            self.base.on_cancellation_failure_event()
        }
    }

    fn history(&self) -> &[String] {
        self.base.history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_types::ActivityType;

    fn machine() -> ActivityMachine {
        ActivityMachine::new(
            DecisionId::activity(5),
            ScheduleActivityTaskAttributes {
                activity_id: "0".into(),
                activity_type: ActivityType::new("GreetingActivities::compose"),
                ..Default::default()
            },
        )
    }

    #[test]
    fn emits_schedule_while_created_then_nothing() {
        let mut m = machine();
        assert!(matches!(
            m.current_decision(),
            Some(Decision::ScheduleActivityTask(_))
        ));

        m.on_decision_task_started();
        assert_eq!(m.current_decision(), None);
    }

    #[test]
    fn emits_cancel_request_after_initiated_cancellation() {
        let mut m = machine();
        m.on_decision_task_started();
        m.on_initiated_event().unwrap();
        m.cancel().unwrap();

        match m.current_decision() {
            Some(Decision::RequestCancelActivityTask(attrs)) => {
                assert_eq!(attrs.activity_id, "0");
            }
            other => panic!("expected cancel request, got {other:?}"),
        }

        // The next decision task carries the cancel request out.
        m.on_decision_task_started();
        assert_eq!(m.state(), DecisionState::CancellationDecisionSent);
        assert_eq!(m.current_decision(), None);
    }

    #[test]
    fn cancellation_failure_restores_initiated() {
        let mut m = machine();
        m.on_decision_task_started();
        m.on_initiated_event().unwrap();
        m.cancel().unwrap();
        m.on_decision_task_started();

        m.on_cancellation_failure_event().unwrap();
        assert_eq!(m.state(), DecisionState::Initiated);

        m.on_completion_event().unwrap();
        assert!(m.is_done());
    }
}
