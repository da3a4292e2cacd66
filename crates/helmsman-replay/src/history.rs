//! Partitions a decision task's flat event list into decision epochs.
//!
//! Each epoch is the run of events leading up to a `DecisionTaskStarted`
//! boundary, plus the decision-produced events of the decisions emitted at
//! the end of that epoch. Decision-produced events are replayed on the next
//! iteration so completion signals reach the workflow after its own
//! commands have been re-established.

use crate::error::ReplayError;
use helmsman_types::{EventType, HistoryEvent};
use std::iter::Peekable;
use std::vec::IntoIter;
use tracing::debug;

/// Events produced by decisions: they always follow a
/// `DecisionTaskCompleted` and correspond 1:1 to commands the worker sent.
pub fn is_decision_event(event_type: EventType) -> bool {
    matches!(
        event_type,
        EventType::ActivityTaskScheduled
            | EventType::ActivityTaskCancelRequested
            | EventType::RequestCancelActivityTaskFailed
            | EventType::TimerStarted
            | EventType::TimerCanceled
            | EventType::CancelTimerFailed
            | EventType::MarkerRecorded
            | EventType::WorkflowExecutionCompleted
            | EventType::WorkflowExecutionFailed
            | EventType::WorkflowExecutionCanceled
            | EventType::WorkflowExecutionContinuedAsNew
            | EventType::StartChildWorkflowExecutionInitiated
            | EventType::RequestCancelExternalWorkflowExecutionInitiated
            | EventType::SignalExternalWorkflowExecutionInitiated
    )
}

/// One epoch of history.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionEvents {
    /// Non-decision events that occurred before this epoch's
    /// `DecisionTaskStarted` boundary.
    pub events: Vec<HistoryEvent>,
    /// Events produced by the decisions emitted at the end of this epoch.
    pub decision_events: Vec<HistoryEvent>,
    /// False only for the final epoch of the current decision task.
    pub replay: bool,
    /// Timestamp of the bounding `DecisionTaskStarted`, the deterministic
    /// "now" for this epoch.
    pub replay_current_time_millis: i64,
    /// The history event id a newly issued command would occupy.
    pub next_decision_event_id: i64,
}

/// Lazily windows a flat event list into [`DecisionEvents`].
pub struct HistoryHelper {
    events: Peekable<IntoIter<HistoryEvent>>,
}

impl HistoryHelper {
    pub fn new(events: Vec<HistoryEvent>) -> Self {
        Self {
            events: events.into_iter().peekable(),
        }
    }
}

impl Iterator for HistoryHelper {
    type Item = Result<DecisionEvents, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.peek()?;

        let mut events = Vec::new();
        let mut replay = true;
        let mut replay_current_time_millis = -1;
        let mut next_decision_event_id = -1;

        while let Some(event) = self.events.next() {
            let event_type = event.event_type();
            if event_type == EventType::DecisionTaskStarted || self.events.peek().is_none() {
                if self.events.peek().is_none() {
                    // Live final epoch. The boundary event itself is consumed;
                    // a new command lands after the DecisionTaskCompleted the
                    // service will append.
                    replay = false;
                    replay_current_time_millis = event.timestamp_millis();
                    next_decision_event_id = event.event_id + 2;
                    break;
                }
                let peeked = self.events.peek().expect("peeked above");
                match peeked.event_type() {
                    EventType::DecisionTaskTimedOut | EventType::DecisionTaskFailed => {
                        // This decision attempt produced nothing durable;
                        // drop the boundary and keep accumulating.
                        continue;
                    }
                    EventType::DecisionTaskCompleted => {
                        replay_current_time_millis = event.timestamp_millis();
                        let completed = self.events.next().expect("peeked above");
                        next_decision_event_id = completed.event_id + 1;
                        break;
                    }
                    other => {
                        return Some(Err(
                            ReplayError::UnexpectedEventAfterDecisionTaskStarted {
                                event_type: other,
                                event_id: peeked.event_id,
                            },
                        ));
                    }
                }
            }
            events.push(event);
        }

        let mut decision_events = Vec::new();
        while let Some(peeked) = self.events.peek() {
            if !is_decision_event(peeked.event_type()) {
                break;
            }
            decision_events.push(self.events.next().expect("peeked above"));
        }

        let result = DecisionEvents {
            events,
            decision_events,
            replay,
            replay_current_time_millis,
            next_decision_event_id,
        };
        debug!(
            replay = result.replay,
            events = result.events.len(),
            decision_events = result.decision_events.len(),
            next_decision_event_id = result.next_decision_event_id,
            "history window"
        );
        Some(Ok(result))
    }
}
