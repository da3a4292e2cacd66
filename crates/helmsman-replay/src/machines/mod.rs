//! Per-command state machines.
//!
//! One machine exists per in-flight command, keyed by [`DecisionId`] in the
//! decider's insertion-ordered map. A machine remembers its originating
//! attributes so it can emit (or re-emit) the command while in `Created`,
//! and walks a fixed transition table as history events confirm the
//! command's progress. An event a machine cannot accept in its current
//! state is nondeterministic workflow behavior and fails the decision task
//! with the machine's full transition history attached.

mod activity;
mod marker;
mod terminal;
mod timer;

pub(crate) use activity::ActivityMachine;
pub(crate) use marker::MarkerMachine;
pub(crate) use terminal::TerminalMachine;
pub(crate) use timer::TimerMachine;

use crate::error::ReplayError;
use helmsman_types::Decision;
use std::fmt;

/// Lifecycle of one command, from local creation to service-confirmed
/// completion, with cancellation side branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionState {
    Created,
    DecisionSent,
    CanceledBeforeInitiated,
    Initiated,
    Started,
    CanceledAfterInitiated,
    CanceledAfterStarted,
    CancellationDecisionSent,
    CompletedAfterCancellationDecisionSent,
    Completed,
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What kind of command a [`DecisionId`] addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecisionTarget {
    Activity,
    ChildWorkflow,
    CancelExternalWorkflow,
    SignalExternalWorkflow,
    Timer,
    Marker,
    SelfDecision,
}

/// Uniquely identifies one outstanding command within an execution.
///
/// The event id is the history event id the command occupies (assigned from
/// `next_decision_event_id` at emission), which is what makes replayed
/// events findable again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecisionId {
    pub target: DecisionTarget,
    pub event_id: i64,
}

impl DecisionId {
    pub fn new(target: DecisionTarget, event_id: i64) -> Self {
        Self { target, event_id }
    }

    pub fn activity(event_id: i64) -> Self {
        Self::new(DecisionTarget::Activity, event_id)
    }

    pub fn timer(event_id: i64) -> Self {
        Self::new(DecisionTarget::Timer, event_id)
    }

    pub fn marker(event_id: i64) -> Self {
        Self::new(DecisionTarget::Marker, event_id)
    }

    pub fn self_decision(event_id: i64) -> Self {
        Self::new(DecisionTarget::SelfDecision, event_id)
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.target, self.event_id)
    }
}

/// Result of a local cancellation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CancelResult {
    /// The awaiting coroutine should be completed with a cancellation error
    /// right now: the command never reached the service, or (for timers)
    /// cancellation is locally effective.
    pub fire_callback: bool,
    /// A cancellation decision will be emitted to the service.
    pub cancel_requested: bool,
}

/// Common interface every command machine implements. Handlers that a given
/// command kind can never legally receive fall through to the base table and
/// report an illegal transition.
pub(crate) trait DecisionStateMachine {
    fn id(&self) -> DecisionId;
    fn state(&self) -> DecisionState;
    fn is_done(&self) -> bool;

    /// The command to emit right now, if any. `Created` machines emit their
    /// originating command; `CanceledAfterInitiated` machines emit the
    /// matching cancellation command.
    fn current_decision(&self) -> Option<Decision>;

    /// The engine handed this machine's command to the service.
    fn on_decision_task_started(&mut self);

    fn cancel(&mut self) -> Result<CancelResult, ReplayError>;
    fn on_initiated_event(&mut self) -> Result<(), ReplayError>;
    fn on_initiation_failed_event(&mut self) -> Result<(), ReplayError>;
    fn on_started_event(&mut self);
    fn on_completion_event(&mut self) -> Result<(), ReplayError>;
    fn on_cancellation_initiated_event(&mut self) -> Result<(), ReplayError>;
    fn on_cancellation_event(&mut self) -> Result<(), ReplayError>;
    fn on_cancellation_failure_event(&mut self) -> Result<(), ReplayError>;

    /// Full transition log for diagnostics.
    fn history(&self) -> &[String];
}

/// Shared state + transition table embedded by the concrete machines.
#[derive(Clone, Debug)]
pub(crate) struct MachineBase {
    id: DecisionId,
    state: DecisionState,
    history: Vec<String>,
}

impl MachineBase {
    pub fn new(id: DecisionId) -> Self {
        Self {
            id,
            state: DecisionState::Created,
            history: vec![DecisionState::Created.to_string()],
        }
    }

    pub fn id(&self) -> DecisionId {
        self.id
    }

    pub fn state(&self) -> DecisionState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.state,
            DecisionState::Completed | DecisionState::CompletedAfterCancellationDecisionSent
        )
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn transition(&mut self, action: &str, to: DecisionState) {
        self.history.push(action.to_string());
        self.state = to;
        self.history.push(to.to_string());
    }

    pub fn fail_transition(&mut self, action: &str) -> ReplayError {
        self.history.push(format!("{action} (rejected)"));
        ReplayError::IllegalMachineTransition {
            id: self.id,
            history: self.history.clone(),
        }
    }

    pub fn on_decision_task_started(&mut self) {
        if self.state == DecisionState::Created {
            self.transition("on_decision_task_started", DecisionState::DecisionSent);
        }
    }

    pub fn cancel(&mut self) -> Result<CancelResult, ReplayError> {
        match self.state {
            DecisionState::Created => {
                self.transition("cancel", DecisionState::Completed);
                Ok(CancelResult {
                    fire_callback: true,
                    cancel_requested: false,
                })
            }
            DecisionState::DecisionSent => {
                self.transition("cancel", DecisionState::CanceledBeforeInitiated);
                Ok(CancelResult {
                    fire_callback: false,
                    cancel_requested: true,
                })
            }
            DecisionState::Initiated => {
                self.transition("cancel", DecisionState::CanceledAfterInitiated);
                Ok(CancelResult {
                    fire_callback: false,
                    cancel_requested: true,
                })
            }
            _ => Err(self.fail_transition("cancel")),
        }
    }

    pub fn on_initiated_event(&mut self) -> Result<(), ReplayError> {
        match self.state {
            DecisionState::DecisionSent => {
                self.transition("on_initiated_event", DecisionState::Initiated);
                Ok(())
            }
            DecisionState::CanceledBeforeInitiated => {
                self.transition("on_initiated_event", DecisionState::CanceledAfterInitiated);
                Ok(())
            }
            _ => Err(self.fail_transition("on_initiated_event")),
        }
    }

    pub fn on_initiation_failed_event(&mut self) -> Result<(), ReplayError> {
        match self.state {
            DecisionState::Initiated
            | DecisionState::DecisionSent
            | DecisionState::CanceledBeforeInitiated => {
                self.transition("on_initiation_failed_event", DecisionState::Completed);
                Ok(())
            }
            _ => Err(self.fail_transition("on_initiation_failed_event")),
        }
    }

    pub fn on_started_event(&mut self) {
        self.history.push("on_started_event".to_string());
    }

    pub fn on_completion_event(&mut self) -> Result<(), ReplayError> {
        match self.state {
            DecisionState::CanceledAfterInitiated | DecisionState::Initiated => {
                self.transition("on_completion_event", DecisionState::Completed);
                Ok(())
            }
            DecisionState::CancellationDecisionSent => {
                self.transition(
                    "on_completion_event",
                    DecisionState::CompletedAfterCancellationDecisionSent,
                );
                Ok(())
            }
            _ => Err(self.fail_transition("on_completion_event")),
        }
    }

    pub fn on_cancellation_initiated_event(&mut self) -> Result<(), ReplayError> {
        match self.state {
            DecisionState::CancellationDecisionSent => {
                // Cancellation request acknowledged; no state change.
                self.history.push("on_cancellation_initiated_event".to_string());
                Ok(())
            }
            _ => Err(self.fail_transition("on_cancellation_initiated_event")),
        }
    }

    pub fn on_cancellation_event(&mut self) -> Result<(), ReplayError> {
        match self.state {
            DecisionState::CancellationDecisionSent => {
                self.transition("on_cancellation_event", DecisionState::Completed);
                Ok(())
            }
            _ => Err(self.fail_transition("on_cancellation_event")),
        }
    }

    pub fn on_cancellation_failure_event(&mut self) -> Result<(), ReplayError> {
        match self.state {
            DecisionState::CompletedAfterCancellationDecisionSent => {
                self.transition("on_cancellation_failure_event", DecisionState::Completed);
                Ok(())
            }
            _ => Err(self.fail_transition("on_cancellation_failure_event")),
        }
    }
}
