use super::{CancelResult, DecisionId, DecisionState, DecisionStateMachine, MachineBase};
use crate::error::ReplayError;
use helmsman_types::{CancelTimerAttributes, Decision, StartTimerAttributes};

/// Tracks one `StartTimer` command. Unlike activities, cancelling a timer is
/// locally effective: the awaiting coroutine is unblocked inline while the
/// `CancelTimer` decision makes its way to the service.
#[derive(Clone, Debug)]
pub(crate) struct TimerMachine {
    base: MachineBase,
    start_attributes: StartTimerAttributes,
    canceled: bool,
}

impl TimerMachine {
    pub fn new(id: DecisionId, start_attributes: StartTimerAttributes) -> Self {
        Self {
            base: MachineBase::new(id),
            start_attributes,
            canceled: false,
        }
    }
}

impl DecisionStateMachine for TimerMachine {
    fn id(&self) -> DecisionId {
        self.base.id()
    }

    fn state(&self) -> DecisionState {
        self.base.state()
    }

    fn is_done(&self) -> bool {
        self.base.state() == DecisionState::Completed || self.canceled
    }

    fn current_decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => {
                Some(Decision::StartTimer(self.start_attributes.clone()))
            }
            DecisionState::CanceledAfterInitiated => {
                Some(Decision::CancelTimer(CancelTimerAttributes {
                    timer_id: self.start_attributes.timer_id.clone(),
                }))
            }
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
        self.canceled = true;
        let result = self.base.cancel()?;
        // Timer cancellation unblocks the waiter immediately regardless of
        // how far the command got.
        Ok(CancelResult {
            fire_callback: true,
            cancel_requested: result.cancel_requested,
        })
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
