//! The replay decider: drives the history helper, dispatches events onto
//! state machines and the marker/clock subsystems, runs the cooperative
//! scheduler one pass per epoch, and collects the commands the workflow
//! newly issued.

use crate::clock::{ClockContext, DeterministicIds};
use crate::context::{ActivityOptions, WorkflowContext, WorkflowDefinition};
use crate::error::{QueryError, ReplayError};
use crate::futures::CompletionCell;
use crate::history::{DecisionEvents, HistoryHelper};
use crate::machines::{
    ActivityMachine, CancelResult, DecisionId, DecisionStateMachine, MarkerMachine,
    TerminalMachine, TimerMachine,
};
use crate::markers::{
    DEFAULT_VERSION, LOCAL_ACTIVITY_MARKER_NAME, MUTABLE_SIDE_EFFECT_MARKER_NAME, MarkerData,
    MarkerHandler, SIDE_EFFECT_MARKER_NAME, VERSION_MARKER_NAME,
};
use crate::scheduler::{TaskKind, TaskScheduler, poll_once};
use chrono::{DateTime, Utc};
use helmsman_types::event::{
    ActivityTaskCanceledAttributes, ActivityTaskCompletedAttributes,
    ActivityTaskFailedAttributes, ActivityTaskTimedOutAttributes, MarkerRecordedAttributes,
    TimerCanceledAttributes, TimerFiredAttributes, WorkflowExecutionStartedAttributes,
};
use helmsman_types::{
    ActivityFailure, ActivityTimeout, ActivityType, CancelWorkflowExecutionAttributes,
    CancelledError, CompleteWorkflowExecutionAttributes, Decision, EventAttributes,
    FailWorkflowExecutionAttributes, Header, HistoryEvent, RecordMarkerAttributes,
    ScheduleActivityTaskAttributes, StartTimerAttributes, TaskList, TimeoutType, WorkflowError,
    WorkflowExecution, WorkflowQuery, WorkflowType, decode_args, encode_value,
};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::task::Poll;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reason reported on every `FailWorkflowExecution`; the serialized cause
/// travels in the details.
pub const WORKFLOW_FAILURE_REASON: &str = "WorkflowFailureException";

pub(crate) type ActivityOutcome = Result<Option<Vec<u8>>, WorkflowError>;
pub(crate) type TimerOutcome = Result<(), CancelledError>;

/// A started timer: the completion cell plus the start event id (None for
/// zero-delay timers, which complete synchronously).
pub(crate) struct TimerStart {
    pub start_event_id: Option<i64>,
    pub cell: Rc<CompletionCell<TimerOutcome>>,
}

struct PendingActivity {
    cell: Rc<CompletionCell<ActivityOutcome>>,
    activity_type: String,
    activity_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MarkerKind {
    SideEffect,
    MutableSideEffect,
    Version,
}

impl MarkerKind {
    fn name(self) -> &'static str {
        match self {
            Self::SideEffect => SIDE_EFFECT_MARKER_NAME,
            Self::MutableSideEffect => MUTABLE_SIDE_EFFECT_MARKER_NAME,
            Self::Version => VERSION_MARKER_NAME,
        }
    }
}

/// Mutable engine state shared between the decider driver and the workflow
/// context handles. One instance exists per decision task and nothing in it
/// survives the task; the service re-delivers everything as history.
pub(crate) struct DeciderState {
    execution: WorkflowExecution,
    workflow_type: WorkflowType,
    task_list: TaskList,
    machines: IndexMap<DecisionId, Box<dyn DecisionStateMachine>>,
    activity_event_ids: HashMap<String, i64>,
    timer_event_ids: HashMap<String, i64>,
    pending_activities: HashMap<i64, PendingActivity>,
    scheduled_timers: HashMap<i64, Rc<CompletionCell<TimerOutcome>>>,
    side_effect_handler: MarkerHandler,
    mutable_side_effect_handler: MarkerHandler,
    version_handler: MarkerHandler,
    side_effect_counter: i64,
    clock: ClockContext,
    ids: DeterministicIds,
    next_decision_event_id: i64,
    id_counter: i64,
    completed: bool,
    /// Nondeterminism observed from inside a workflow task. The scheduler
    /// pass finishes, then the decider aborts with this instead of treating
    /// the workflow's error as a workflow failure.
    fatal: Option<ReplayError>,
}

impl DeciderState {
    fn new(execution: WorkflowExecution, workflow_type: WorkflowType) -> Self {
        let ids = DeterministicIds::new(&execution.run_id);
        Self {
            execution,
            workflow_type,
            task_list: TaskList::default(),
            machines: IndexMap::new(),
            activity_event_ids: HashMap::new(),
            timer_event_ids: HashMap::new(),
            pending_activities: HashMap::new(),
            scheduled_timers: HashMap::new(),
            side_effect_handler: MarkerHandler::new(SIDE_EFFECT_MARKER_NAME),
            mutable_side_effect_handler: MarkerHandler::new(MUTABLE_SIDE_EFFECT_MARKER_NAME),
            version_handler: MarkerHandler::new(VERSION_MARKER_NAME),
            side_effect_counter: 0,
            clock: ClockContext::new(),
            ids,
            next_decision_event_id: 0,
            id_counter: 0,
            completed: false,
            fatal: None,
        }
    }

    pub fn execution(&self) -> &WorkflowExecution {
        &self.execution
    }

    pub fn workflow_type(&self) -> &WorkflowType {
        &self.workflow_type
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn current_time_millis(&self) -> i64 {
        self.clock.current_time_millis()
    }

    pub fn is_replaying(&self) -> bool {
        self.clock.is_replaying()
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn next_id(&mut self) -> i64 {
        let id = self.id_counter;
        self.id_counter += 1;
        id
    }

    /// Note a fatal replay error raised from workflow-facing code and hand
    /// back a placeholder for the coroutine to unwind with. The placeholder
    /// never reaches the service; the decider aborts with the recorded
    /// error after the pass.
    fn record_fatal(&mut self, error: ReplayError) -> WorkflowError {
        let placeholder = WorkflowError::application(
            "NondeterminismError",
            vec![Value::String(error.to_string())],
        );
        self.fatal.get_or_insert(error);
        placeholder
    }

    fn take_fatal(&mut self) -> Option<ReplayError> {
        self.fatal.take()
    }

    fn insert_machine(
        &mut self,
        machine: Box<dyn DecisionStateMachine>,
    ) -> Result<i64, ReplayError> {
        let id = machine.id();
        if self.machines.contains_key(&id) {
            return Err(ReplayError::DuplicateDecision { id });
        }
        self.machines.insert(id, machine);
        self.next_decision_event_id += 1;
        Ok(id.event_id)
    }

    fn machine_mut(
        &mut self,
        id: DecisionId,
    ) -> Result<&mut Box<dyn DecisionStateMachine>, ReplayError> {
        self.machines
            .get_mut(&id)
            .ok_or(ReplayError::UnknownMachine { id })
    }

    // ── Command emission ──────────────────────────────────────────────

    pub fn schedule_activity(
        &mut self,
        activity_type: &str,
        options: &ActivityOptions,
        input: Option<Vec<u8>>,
    ) -> Result<(i64, Rc<CompletionCell<ActivityOutcome>>), WorkflowError> {
        let activity_id = self.next_id().to_string();
        let attributes = ScheduleActivityTaskAttributes {
            activity_id: activity_id.clone(),
            activity_type: ActivityType::new(activity_type),
            domain: options.domain.clone(),
            task_list: options
                .task_list
                .clone()
                .unwrap_or_else(|| self.task_list.clone()),
            input,
            schedule_to_close_timeout_seconds: options.schedule_to_close_timeout_seconds,
            schedule_to_start_timeout_seconds: options.schedule_to_start_timeout_seconds,
            start_to_close_timeout_seconds: options.start_to_close_timeout_seconds,
            heartbeat_timeout_seconds: options.heartbeat_timeout_seconds,
            retry_policy: options.retry_policy.clone(),
            header: None,
        };
        let id = DecisionId::activity(self.next_decision_event_id);
        let machine = ActivityMachine::new(id, attributes);
        let scheduled_event_id = match self.insert_machine(Box::new(machine)) {
            Ok(event_id) => event_id,
            Err(error) => return Err(self.record_fatal(error)),
        };
        self.activity_event_ids
            .insert(activity_id.clone(), scheduled_event_id);
        let cell = CompletionCell::new();
        self.pending_activities.insert(
            scheduled_event_id,
            PendingActivity {
                cell: Rc::clone(&cell),
                activity_type: activity_type.to_string(),
                activity_id,
            },
        );
        debug!(activity_type, scheduled_event_id, "scheduling activity");
        Ok((scheduled_event_id, cell))
    }

    pub fn request_cancel_activity(&mut self, scheduled_event_id: i64) {
        let result = self
            .machine_mut(DecisionId::activity(scheduled_event_id))
            .and_then(|machine| {
                if machine.is_done() {
                    // Already closed; nothing to cancel.
                    return Ok(CancelResult {
                        fire_callback: false,
                        cancel_requested: false,
                    });
                }
                machine.cancel()
            });
        match result {
            Ok(cancel) => {
                if cancel.fire_callback {
                    if let Some(pending) = self.pending_activities.remove(&scheduled_event_id) {
                        pending
                            .cell
                            .complete(Err(WorkflowError::Cancelled(CancelledError::new())));
                    }
                }
            }
            Err(error) => {
                self.record_fatal(error);
            }
        }
    }

    pub fn create_timer(&mut self, delay_seconds: i64) -> Result<TimerStart, WorkflowError> {
        if delay_seconds < 0 {
            return Err(WorkflowError::application(
                "IllegalArgument",
                vec![Value::String(format!(
                    "negative delay seconds: {delay_seconds}"
                ))],
            ));
        }
        let cell = CompletionCell::new();
        if delay_seconds == 0 {
            cell.complete(Ok(()));
            return Ok(TimerStart {
                start_event_id: None,
                cell,
            });
        }
        let timer_id = self.next_id().to_string();
        let attributes = StartTimerAttributes {
            timer_id: timer_id.clone(),
            start_to_fire_timeout_seconds: delay_seconds,
        };
        let id = DecisionId::timer(self.next_decision_event_id);
        let machine = TimerMachine::new(id, attributes);
        let start_event_id = match self.insert_machine(Box::new(machine)) {
            Ok(event_id) => event_id,
            Err(error) => return Err(self.record_fatal(error)),
        };
        self.timer_event_ids.insert(timer_id, start_event_id);
        self.scheduled_timers
            .insert(start_event_id, Rc::clone(&cell));
        debug!(delay_seconds, start_event_id, "starting timer");
        Ok(TimerStart {
            start_event_id: Some(start_event_id),
            cell,
        })
    }

    pub fn cancel_timer(&mut self, start_event_id: i64, reason: Option<String>) {
        let result = self
            .machine_mut(DecisionId::timer(start_event_id))
            .and_then(|machine| {
                if machine.is_done() {
                    // Fired before the cancellation; the waiter already has
                    // its completion.
                    return Ok(CancelResult {
                        fire_callback: false,
                        cancel_requested: false,
                    });
                }
                machine.cancel()
            });
        match result {
            Ok(cancel) => {
                if cancel.fire_callback {
                    if let Some(cell) = self.scheduled_timers.remove(&start_event_id) {
                        cell.complete(Err(CancelledError { reason }));
                    }
                }
            }
            Err(error) => {
                self.record_fatal(error);
            }
        }
    }

    fn record_marker_decision(
        &mut self,
        marker_name: &str,
        header: Option<Header>,
        details: Option<Vec<u8>>,
    ) -> Result<(), ReplayError> {
        let attributes = RecordMarkerAttributes {
            marker_name: marker_name.to_string(),
            details,
            header,
        };
        let id = DecisionId::marker(self.next_decision_event_id);
        self.insert_machine(Box::new(MarkerMachine::new(id, attributes)))?;
        Ok(())
    }

    pub fn complete_workflow(&mut self, result: Option<Vec<u8>>) -> Result<(), ReplayError> {
        if self.completed {
            return Ok(());
        }
        let decision =
            Decision::CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes { result });
        let id = DecisionId::self_decision(self.next_decision_event_id);
        self.insert_machine(Box::new(TerminalMachine::new(id, decision)))?;
        self.completed = true;
        Ok(())
    }

    pub fn fail_workflow(&mut self, error: &WorkflowError) -> Result<(), ReplayError> {
        if self.completed {
            return Ok(());
        }
        let decision = Decision::FailWorkflowExecution(FailWorkflowExecutionAttributes {
            reason: Some(WORKFLOW_FAILURE_REASON.to_string()),
            details: Some(error.serialize_details()),
        });
        let id = DecisionId::self_decision(self.next_decision_event_id);
        self.insert_machine(Box::new(TerminalMachine::new(id, decision)))?;
        self.completed = true;
        Ok(())
    }

    pub fn cancel_workflow(&mut self, details: Option<Vec<u8>>) -> Result<(), ReplayError> {
        if self.completed {
            return Ok(());
        }
        let decision =
            Decision::CancelWorkflowExecution(CancelWorkflowExecutionAttributes { details });
        let id = DecisionId::self_decision(self.next_decision_event_id);
        self.insert_machine(Box::new(TerminalMachine::new(id, decision)))?;
        self.completed = true;
        Ok(())
    }

    /// Every state machine's currently emit-able command, in emission order.
    fn get_decisions(&self) -> Vec<Decision> {
        self.machines
            .values()
            .filter_map(|machine| machine.current_decision())
            .collect()
    }

    /// CREATED -> DECISION_SENT for every machine that has a command: the
    /// engine handed those commands to the service at this epoch boundary.
    fn notify_decision_sent(&mut self) {
        for machine in self.machines.values_mut() {
            if machine.current_decision().is_some() {
                machine.on_decision_task_started();
            }
        }
    }

    // ── Deterministic randomness ──────────────────────────────────────

    pub fn random_uuid(&mut self) -> Uuid {
        let counter = self.next_id();
        self.ids.uuid_for(counter)
    }

    pub fn new_random(&mut self) -> StdRng {
        let counter = self.next_id();
        self.ids.rng_for(counter)
    }

    // ── Markers ───────────────────────────────────────────────────────

    fn handler(&self, kind: MarkerKind) -> &MarkerHandler {
        match kind {
            MarkerKind::SideEffect => &self.side_effect_handler,
            MarkerKind::MutableSideEffect => &self.mutable_side_effect_handler,
            MarkerKind::Version => &self.version_handler,
        }
    }

    fn handler_mut(&mut self, kind: MarkerKind) -> &mut MarkerHandler {
        match kind {
            MarkerKind::SideEffect => &mut self.side_effect_handler,
            MarkerKind::MutableSideEffect => &mut self.mutable_side_effect_handler,
            MarkerKind::Version => &mut self.version_handler,
        }
    }

    /// Emit a marker decision for `id` so the replayed event-id sequence
    /// matches the original run, and update the handler's bookkeeping.
    fn record_mutable_marker(
        &mut self,
        kind: MarkerKind,
        id: &str,
        data: Option<Vec<u8>>,
    ) -> Result<(), ReplayError> {
        let event_id = self.next_decision_event_id;
        self.handler_mut(kind).note_emitted(id, data.clone());
        let marker = MarkerData::new(id, event_id, data.clone(), 0);
        let header = marker.to_event_header();
        self.record_marker_decision(kind.name(), Some(header), data)
    }

    /// The stored-or-produce pattern shared by side effects and versions.
    fn marker_handle(
        &mut self,
        kind: MarkerKind,
        id: &str,
        producer: impl FnOnce() -> Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, ReplayError> {
        let replaying = self.clock.is_replaying();
        let stored = self.handler(kind).get(id).cloned();
        if stored.is_some() || replaying {
            if let Some(result) = stored {
                if replaying && !result.replayed {
                    self.record_mutable_marker(kind, id, result.data.clone())?;
                }
                return Ok(result.data);
            }
            return Ok(None);
        }
        match producer() {
            Some(data) => {
                self.record_mutable_marker(kind, id, Some(data.clone()))?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    pub fn side_effect(
        &mut self,
        producer: impl FnOnce() -> Result<Vec<u8>, WorkflowError>,
    ) -> Result<Vec<u8>, WorkflowError> {
        let id = self.side_effect_counter.to_string();
        self.side_effect_counter += 1;
        let mut producer_error: Option<WorkflowError> = None;
        let outcome = self.marker_handle(MarkerKind::SideEffect, &id, || match producer() {
            Ok(data) => Some(data),
            Err(error) => {
                producer_error = Some(error);
                None
            }
        });
        match outcome {
            Err(error) => Err(self.record_fatal(error)),
            Ok(Some(data)) => Ok(data),
            Ok(None) => match producer_error.take() {
                Some(error) => Err(error),
                None => Err(self.record_fatal(ReplayError::MissingMarker {
                    marker_name: SIDE_EFFECT_MARKER_NAME.to_string(),
                    marker_id: id,
                })),
            },
        }
    }

    pub fn mutable_side_effect(
        &mut self,
        id: &str,
        producer: impl FnOnce(Option<&[u8]>) -> Result<Option<Vec<u8>>, WorkflowError>,
    ) -> Result<Option<Vec<u8>>, WorkflowError> {
        let replaying = self.clock.is_replaying();
        let stored = self.mutable_side_effect_handler.get(id).cloned();
        if replaying {
            if let Some(result) = stored {
                if !result.replayed {
                    if let Err(error) =
                        self.record_mutable_marker(MarkerKind::MutableSideEffect, id, result.data.clone())
                    {
                        return Err(self.record_fatal(error));
                    }
                }
                return Ok(result.data);
            }
            return Ok(None);
        }
        let current = stored.and_then(|result| result.data);
        match producer(current.as_deref())? {
            Some(new_data) => {
                if let Err(error) =
                    self.record_mutable_marker(MarkerKind::MutableSideEffect, id, Some(new_data.clone()))
                {
                    return Err(self.record_fatal(error));
                }
                Ok(Some(new_data))
            }
            None => Ok(current),
        }
    }

    pub fn get_version(
        &mut self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> Result<i32, WorkflowError> {
        let produced =
            encode_value(&max_supported).expect("integers are always serializable");
        let outcome = match self.marker_handle(MarkerKind::Version, change_id, || Some(produced))
        {
            Ok(outcome) => outcome,
            Err(error) => return Err(self.record_fatal(error)),
        };
        let data = match outcome {
            Some(data) => data,
            None => {
                // Replaying a history that predates this change id: the
                // version is pinned to the default and no marker is ever
                // emitted for it.
                let default = encode_value(&DEFAULT_VERSION)
                    .expect("integers are always serializable");
                self.version_handler.set_data(change_id, Some(default.clone()));
                self.version_handler.mark_replayed(change_id);
                default
            }
        };
        let version: i32 = serde_json::from_slice(&data)
            .map_err(|error| WorkflowError::Payload(error.to_string()))?;
        if version < min_supported || version > max_supported {
            return Err(self.record_fatal(ReplayError::UnsupportedVersion {
                change_id: change_id.to_string(),
                version,
                min_supported,
                max_supported,
            }));
        }
        Ok(version)
    }

    // ── Event handlers ────────────────────────────────────────────────

    fn handle_activity_scheduled(&mut self, event_id: i64) -> Result<(), ReplayError> {
        self.machine_mut(DecisionId::activity(event_id))?
            .on_initiated_event()
    }

    fn handle_activity_started(&mut self, scheduled_event_id: i64) -> Result<(), ReplayError> {
        self.machine_mut(DecisionId::activity(scheduled_event_id))?
            .on_started_event();
        Ok(())
    }

    fn close_activity(
        &mut self,
        scheduled_event_id: i64,
        outcome: ActivityOutcome,
    ) -> Result<(), ReplayError> {
        let done = {
            let machine = self.machine_mut(DecisionId::activity(scheduled_event_id))?;
            machine.on_completion_event()?;
            machine.is_done()
        };
        if done {
            let pending = self
                .pending_activities
                .remove(&scheduled_event_id)
                .ok_or(ReplayError::UnknownScheduledEvent { scheduled_event_id })?;
            pending.cell.complete(outcome);
        }
        Ok(())
    }

    fn handle_activity_completed(
        &mut self,
        attributes: &ActivityTaskCompletedAttributes,
    ) -> Result<(), ReplayError> {
        self.close_activity(attributes.scheduled_event_id, Ok(attributes.result.clone()))
    }

    fn handle_activity_failed(
        &mut self,
        attributes: &ActivityTaskFailedAttributes,
    ) -> Result<(), ReplayError> {
        let pending = self
            .pending_activities
            .get(&attributes.scheduled_event_id)
            .ok_or(ReplayError::UnknownScheduledEvent {
                scheduled_event_id: attributes.scheduled_event_id,
            })?;
        let failure = ActivityFailure {
            scheduled_event_id: attributes.scheduled_event_id,
            activity_type: pending.activity_type.clone(),
            activity_id: pending.activity_id.clone(),
            reason: attributes.reason.clone(),
            details: attributes.details.clone(),
        };
        self.close_activity(
            attributes.scheduled_event_id,
            Err(WorkflowError::Activity(failure)),
        )
    }

    fn handle_activity_timed_out(
        &mut self,
        attributes: &ActivityTaskTimedOutAttributes,
    ) -> Result<(), ReplayError> {
        let timeout = ActivityTimeout {
            scheduled_event_id: attributes.scheduled_event_id,
            timeout_type: attributes.timeout_type.unwrap_or(TimeoutType::StartToClose),
            details: attributes.details.clone(),
        };
        self.close_activity(
            attributes.scheduled_event_id,
            Err(WorkflowError::Timeout(timeout)),
        )
    }

    fn handle_activity_canceled(
        &mut self,
        attributes: &ActivityTaskCanceledAttributes,
    ) -> Result<(), ReplayError> {
        let done = {
            let machine = self.machine_mut(DecisionId::activity(attributes.scheduled_event_id))?;
            machine.on_cancellation_event()?;
            machine.is_done()
        };
        if done {
            if let Some(pending) = self.pending_activities.remove(&attributes.scheduled_event_id)
            {
                pending
                    .cell
                    .complete(Err(WorkflowError::Cancelled(CancelledError::new())));
            }
        }
        Ok(())
    }

    fn activity_event_id(&self, activity_id: &str) -> Result<i64, ReplayError> {
        self.activity_event_ids
            .get(activity_id)
            .copied()
            .ok_or_else(|| ReplayError::MalformedHistory(format!(
                "no scheduled activity with id \"{activity_id}\""
            )))
    }

    fn handle_activity_cancel_requested(&mut self, activity_id: &str) -> Result<(), ReplayError> {
        let event_id = self.activity_event_id(activity_id)?;
        self.machine_mut(DecisionId::activity(event_id))?
            .on_cancellation_initiated_event()
    }

    fn handle_request_cancel_activity_failed(
        &mut self,
        activity_id: &str,
    ) -> Result<(), ReplayError> {
        let event_id = self.activity_event_id(activity_id)?;
        self.machine_mut(DecisionId::activity(event_id))?
            .on_cancellation_failure_event()
    }

    fn handle_timer_started(&mut self, event_id: i64) -> Result<(), ReplayError> {
        self.machine_mut(DecisionId::timer(event_id))?
            .on_initiated_event()
    }

    fn handle_timer_fired(
        &mut self,
        attributes: &TimerFiredAttributes,
    ) -> Result<(), ReplayError> {
        let done = {
            let machine = self.machine_mut(DecisionId::timer(attributes.started_event_id))?;
            machine.on_completion_event()?;
            machine.is_done()
        };
        if done {
            if let Some(cell) = self.scheduled_timers.remove(&attributes.started_event_id) {
                cell.complete(Ok(()));
            }
        }
        Ok(())
    }

    fn handle_timer_canceled(
        &mut self,
        attributes: &TimerCanceledAttributes,
    ) -> Result<(), ReplayError> {
        let done = {
            let machine = self.machine_mut(DecisionId::timer(attributes.started_event_id))?;
            machine.on_cancellation_event()?;
            machine.is_done()
        };
        if done {
            if let Some(cell) = self.scheduled_timers.remove(&attributes.started_event_id) {
                cell.complete(Err(CancelledError::new()));
            }
        }
        Ok(())
    }

    fn handle_cancel_timer_failed(&mut self, timer_id: &str) -> Result<(), ReplayError> {
        let event_id = self
            .timer_event_ids
            .get(timer_id)
            .copied()
            .ok_or_else(|| ReplayError::MalformedHistory(format!(
                "no started timer with id \"{timer_id}\""
            )))?;
        self.machine_mut(DecisionId::timer(event_id))?
            .on_cancellation_failure_event()
    }

    /// Store a recorded marker. Runs more than once for the same event (the
    /// marker pre-pass and the regular decision-event dispatch), which is
    /// what resets the per-epoch replayed flag.
    fn handle_marker_recorded(
        &mut self,
        attributes: &MarkerRecordedAttributes,
        event_id: i64,
    ) -> Result<(), ReplayError> {
        let kind = match attributes.marker_name.as_str() {
            SIDE_EFFECT_MARKER_NAME => MarkerKind::SideEffect,
            MUTABLE_SIDE_EFFECT_MARKER_NAME => MarkerKind::MutableSideEffect,
            VERSION_MARKER_NAME => MarkerKind::Version,
            LOCAL_ACTIVITY_MARKER_NAME => return Ok(()),
            other => {
                warn!(marker_name = other, event_id, "unexpected marker");
                return Ok(());
            }
        };
        let (id, data) = MarkerData::from_attributes(attributes).map_err(|error| {
            ReplayError::MalformedMarker {
                marker_name: attributes.marker_name.clone(),
                event_id,
                message: error.to_string(),
            }
        })?;
        self.handler_mut(kind).store_recorded(id, data);
        Ok(())
    }
}

/// Orchestrates one decision task for one workflow execution.
///
/// Created on receipt of the task, fed the full history via [`decide`],
/// optionally queried, and dropped, which cancels any still-suspended
/// workflow coroutines.
///
/// [`decide`]: ReplayDecider::decide
pub struct ReplayDecider {
    state: Rc<RefCell<DeciderState>>,
    scheduler: TaskScheduler,
    workflow: Rc<dyn WorkflowDefinition>,
    started: bool,
}

impl ReplayDecider {
    pub fn new(
        execution: WorkflowExecution,
        workflow_type: WorkflowType,
        workflow: Rc<dyn WorkflowDefinition>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(DeciderState::new(execution, workflow_type))),
            scheduler: TaskScheduler::new(),
            workflow,
            started: false,
        }
    }

    /// Re-execute the workflow against the full event history and return
    /// the commands it newly issued, in emission order.
    pub fn decide(&mut self, events: Vec<HistoryEvent>) -> Result<Vec<Decision>, ReplayError> {
        let mut helper = HistoryHelper::new(events);
        for epoch in &mut helper {
            if self.process_epoch(epoch?)? {
                break;
            }
        }
        let decisions = self.state.borrow().get_decisions();
        debug!(count = decisions.len(), "collected decisions");
        Ok(decisions)
    }

    fn process_epoch(&mut self, epoch: DecisionEvents) -> Result<bool, ReplayError> {
        {
            let mut state = self.state.borrow_mut();
            state.clock.set_replaying(epoch.replay);
            state.clock.set_time(epoch.replay_current_time_millis)?;
            state.next_decision_event_id = epoch.next_decision_event_id;
        }

        // Markers first, so side-effect and version reads during the
        // scheduler pass observe their recorded values.
        for event in &epoch.decision_events {
            if let EventAttributes::MarkerRecorded(attributes) = &event.attributes {
                if attributes.marker_name != LOCAL_ACTIVITY_MARKER_NAME {
                    self.dispatch(event)?;
                }
            }
        }

        for event in &epoch.events {
            self.dispatch(event)?;
            if self.state.borrow().is_completed() {
                return Ok(true);
            }
        }

        self.scheduler.unblock_all();
        let completions = self.scheduler.run_once();
        self.handle_task_completions(completions)?;
        if let Some(fatal) = self.state.borrow_mut().take_fatal() {
            return Err(fatal);
        }

        if epoch.replay {
            self.state.borrow_mut().notify_decision_sent();
        }

        for event in &epoch.decision_events {
            self.dispatch(event)?;
        }

        Ok(self.state.borrow().is_completed())
    }

    fn dispatch(&mut self, event: &HistoryEvent) -> Result<(), ReplayError> {
        debug!(event_id = event.event_id, event_type = ?event.event_type(), "dispatching");
        let mut state = self.state.borrow_mut();
        match &event.attributes {
            EventAttributes::WorkflowExecutionStarted(attributes) => {
                drop(state);
                self.handle_workflow_started(attributes)
            }
            EventAttributes::WorkflowExecutionCancelRequested(_) => {
                state.cancel_workflow(None)
            }
            EventAttributes::WorkflowExecutionSignaled(attributes) => {
                drop(state);
                self.handle_signaled(&attributes.signal_name, attributes.input.as_deref())
            }
            // Epoch boundary markers; the history helper already consumed
            // their structure.
            EventAttributes::DecisionTaskScheduled(_)
            | EventAttributes::DecisionTaskStarted(_)
            | EventAttributes::DecisionTaskCompleted(_)
            | EventAttributes::DecisionTaskTimedOut(_)
            | EventAttributes::DecisionTaskFailed(_) => Ok(()),
            EventAttributes::ActivityTaskScheduled(_) => {
                state.handle_activity_scheduled(event.event_id)
            }
            EventAttributes::ActivityTaskStarted(attributes) => {
                state.handle_activity_started(attributes.scheduled_event_id)
            }
            EventAttributes::ActivityTaskCompleted(attributes) => {
                state.handle_activity_completed(attributes)
            }
            EventAttributes::ActivityTaskFailed(attributes) => {
                state.handle_activity_failed(attributes)
            }
            EventAttributes::ActivityTaskTimedOut(attributes) => {
                state.handle_activity_timed_out(attributes)
            }
            EventAttributes::ActivityTaskCanceled(attributes) => {
                state.handle_activity_canceled(attributes)
            }
            EventAttributes::ActivityTaskCancelRequested(attributes) => {
                state.handle_activity_cancel_requested(&attributes.activity_id)
            }
            EventAttributes::RequestCancelActivityTaskFailed(attributes) => {
                state.handle_request_cancel_activity_failed(&attributes.activity_id)
            }
            EventAttributes::TimerStarted(_) => state.handle_timer_started(event.event_id),
            EventAttributes::TimerFired(attributes) => state.handle_timer_fired(attributes),
            EventAttributes::TimerCanceled(attributes) => {
                state.handle_timer_canceled(attributes)
            }
            EventAttributes::CancelTimerFailed(attributes) => {
                state.handle_cancel_timer_failed(&attributes.timer_id)
            }
            EventAttributes::MarkerRecorded(attributes) => {
                state.handle_marker_recorded(attributes, event.event_id)
            }
            // Terminal events replayed for completed histories; the
            // terminal machine needs no confirmation.
            EventAttributes::WorkflowExecutionCompleted(_)
            | EventAttributes::WorkflowExecutionFailed(_)
            | EventAttributes::WorkflowExecutionCanceled(_)
            | EventAttributes::WorkflowExecutionTimedOut(_)
            | EventAttributes::WorkflowExecutionTerminated(_)
            | EventAttributes::WorkflowExecutionContinuedAsNew(_) => Ok(()),
            other => Err(ReplayError::UnsupportedEvent {
                event_type: other.event_type(),
                event_id: event.event_id,
            }),
        }
    }

    fn handle_workflow_started(
        &mut self,
        attributes: &WorkflowExecutionStartedAttributes,
    ) -> Result<(), ReplayError> {
        if self.started {
            return Err(ReplayError::MalformedHistory(
                "duplicate WorkflowExecutionStarted".to_string(),
            ));
        }
        self.started = true;
        self.state.borrow_mut().task_list = attributes.task_list.clone();
        let input = decode_args(attributes.input.as_deref())?;
        debug!(workflow_type = %self.state.borrow().workflow_type(), "starting workflow instance");
        let ctx = WorkflowContext::new(Rc::clone(&self.state));
        let future = Rc::clone(&self.workflow).execute(ctx, input);
        self.scheduler.spawn(TaskKind::Workflow, future);
        Ok(())
    }

    fn handle_signaled(
        &mut self,
        signal_name: &str,
        input: Option<&[u8]>,
    ) -> Result<(), ReplayError> {
        let input = decode_args(input)?;
        let ctx = WorkflowContext::new(Rc::clone(&self.state));
        match Rc::clone(&self.workflow).signal(ctx, signal_name, input) {
            Some(future) => {
                let name = signal_name.to_string();
                self.scheduler.spawn(
                    TaskKind::Signal(name),
                    Box::pin(async move {
                        future.await?;
                        Ok(Value::Null)
                    }),
                );
            }
            None => warn!(signal_name, "no signal handler registered"),
        }
        Ok(())
    }

    fn handle_task_completions(
        &mut self,
        completions: Vec<(TaskKind, Result<Value, WorkflowError>)>,
    ) -> Result<(), ReplayError> {
        for (kind, outcome) in completions {
            match kind {
                TaskKind::Workflow => match outcome {
                    Ok(value) => {
                        let result = encode_value(&value)?;
                        self.state.borrow_mut().complete_workflow(Some(result))?;
                    }
                    Err(WorkflowError::Cancelled(cancelled)) => {
                        let details = match &cancelled.reason {
                            Some(reason) => Some(encode_value(reason)?),
                            None => None,
                        };
                        self.state.borrow_mut().cancel_workflow(details)?;
                    }
                    Err(error) => {
                        debug!(%error, "workflow failed");
                        self.state.borrow_mut().fail_workflow(&error)?;
                    }
                },
                TaskKind::Signal(name) => {
                    if let Err(error) = outcome {
                        warn!(signal_name = name, %error, "signal handler failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Answer a query delivery. The full history must have been replayed
    /// via [`decide`](Self::decide) first; the query coroutine is polled
    /// exactly once and must complete within that pass.
    pub fn handle_query(&mut self, query: &WorkflowQuery) -> Result<Vec<u8>, QueryError> {
        if !self.started {
            return Err(QueryError::WorkflowNotStarted);
        }
        let args = decode_args(query.query_args.as_deref()).map_err(|error| {
            QueryError::Failed {
                query_type: query.query_type.clone(),
                message: error.to_string(),
            }
        })?;
        let ctx = WorkflowContext::new(Rc::clone(&self.state));
        let Some(mut future) = Rc::clone(&self.workflow).query(ctx, &query.query_type, args)
        else {
            return Err(QueryError::NotFound {
                query_type: query.query_type.clone(),
            });
        };
        match poll_once(future.as_mut()) {
            Poll::Ready(Ok(value)) => encode_value(&value).map_err(|error| QueryError::Failed {
                query_type: query.query_type.clone(),
                message: error.to_string(),
            }),
            Poll::Ready(Err(error)) => Err(QueryError::Failed {
                query_type: query.query_type.clone(),
                message: error.to_string(),
            }),
            Poll::Pending => Err(QueryError::DidNotComplete {
                query_type: query.query_type.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActivityStub;
    use futures::future::LocalBoxFuture;
    use helmsman_types::event::*;
    use helmsman_types::{
        RemoteFailure, SerializedFailure, deserialize_failure, encode_args,
    };
    use chrono::TimeZone;
    use serde_json::json;
    use similar_asserts::assert_eq;
    use std::cell::{Cell, RefCell};

    const RUN_ID: &str = "0c7c8a73-9a6f-4c3d-8d2f-4b2a8c9f1e11";

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new("wf-id", RUN_ID)
    }

    fn decider(workflow: Rc<dyn WorkflowDefinition>) -> ReplayDecider {
        ReplayDecider::new(execution(), WorkflowType::new("TestWorkflow"), workflow)
    }

    fn event(event_id: i64, at_millis: i64, attributes: EventAttributes) -> HistoryEvent {
        HistoryEvent {
            event_id,
            timestamp: Utc.timestamp_millis_opt(at_millis).unwrap(),
            attributes,
        }
    }

    fn wf_started(event_id: i64, at: i64, input: &[Value]) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
                workflow_type: WorkflowType::new("TestWorkflow"),
                task_list: TaskList::new("test-tasks"),
                input: Some(encode_args(input).unwrap()),
                original_execution_run_id: RUN_ID.to_string(),
                ..Default::default()
            }),
        )
    }

    fn dt_scheduled(event_id: i64, at: i64) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::DecisionTaskScheduled(DecisionTaskScheduledAttributes::default()),
        )
    }

    fn dt_started(event_id: i64, at: i64) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::DecisionTaskStarted(DecisionTaskStartedAttributes {
                scheduled_event_id: event_id - 1,
                ..Default::default()
            }),
        )
    }

    fn dt_completed(event_id: i64, at: i64) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::DecisionTaskCompleted(DecisionTaskCompletedAttributes {
                scheduled_event_id: event_id - 2,
                started_event_id: event_id - 1,
                ..Default::default()
            }),
        )
    }

    fn activity_scheduled(event_id: i64, at: i64, activity_id: &str) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::ActivityTaskScheduled(ActivityTaskScheduledAttributes {
                activity_id: activity_id.to_string(),
                activity_type: ActivityType::new("GreetingActivities::compose"),
                task_list: TaskList::new("test-tasks"),
                input: Some(encode_args(&[json!("Hello"), json!("Bob")]).unwrap()),
                decision_task_completed_event_id: event_id - 1,
                ..Default::default()
            }),
        )
    }

    fn activity_started(event_id: i64, at: i64, scheduled_event_id: i64) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::ActivityTaskStarted(ActivityTaskStartedAttributes {
                scheduled_event_id,
                ..Default::default()
            }),
        )
    }

    fn activity_completed(
        event_id: i64,
        at: i64,
        scheduled_event_id: i64,
        result: &[u8],
    ) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::ActivityTaskCompleted(ActivityTaskCompletedAttributes {
                result: Some(result.to_vec()),
                scheduled_event_id,
                started_event_id: event_id - 1,
                ..Default::default()
            }),
        )
    }

    fn activity_failed(
        event_id: i64,
        at: i64,
        scheduled_event_id: i64,
        details: Vec<u8>,
    ) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::ActivityTaskFailed(ActivityTaskFailedAttributes {
                reason: Some("ActivityFailureException".to_string()),
                details: Some(details),
                scheduled_event_id,
                started_event_id: event_id - 1,
                ..Default::default()
            }),
        )
    }

    fn timer_started(event_id: i64, at: i64, timer_id: &str, seconds: i64) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::TimerStarted(TimerStartedAttributes {
                timer_id: timer_id.to_string(),
                start_to_fire_timeout_seconds: seconds,
                decision_task_completed_event_id: event_id - 1,
            }),
        )
    }

    fn timer_fired(event_id: i64, at: i64, timer_id: &str, started_event_id: i64) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::TimerFired(TimerFiredAttributes {
                timer_id: timer_id.to_string(),
                started_event_id,
            }),
        )
    }

    fn signaled(event_id: i64, at: i64, name: &str, args: &[Value]) -> HistoryEvent {
        event(
            event_id,
            at,
            EventAttributes::WorkflowExecutionSignaled(WorkflowExecutionSignaledAttributes {
                signal_name: name.to_string(),
                input: Some(encode_args(args).unwrap()),
                ..Default::default()
            }),
        )
    }

    // ── Test workflows ────────────────────────────────────────────────

    /// Awaits one activity and returns its result.
    struct GreetingWorkflow;

    impl WorkflowDefinition for GreetingWorkflow {
        fn execute(
            self: Rc<Self>,
            ctx: WorkflowContext,
            input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async move {
                let name = input.first().cloned().unwrap_or(json!("Bob"));
                let stub = ActivityStub::new(
                    &ctx,
                    ActivityOptions {
                        schedule_to_close_timeout_seconds: Some(60),
                        start_to_close_timeout_seconds: Some(60),
                        ..Default::default()
                    },
                );
                let greeting: String = stub
                    .execute("GreetingActivities::compose", &[json!("Hello"), name])
                    .await?;
                Ok(json!(greeting))
            })
        }

        fn query(
            self: Rc<Self>,
            ctx: WorkflowContext,
            name: &str,
            _input: Vec<Value>,
        ) -> Option<LocalBoxFuture<'static, Result<Value, WorkflowError>>> {
            match name {
                "workflow_type" => Some(Box::pin(async move {
                    Ok(json!(ctx.workflow_type().name))
                })),
                "never_finishes" => Some(Box::pin(async move {
                    crate::futures::yield_once().await;
                    Ok(Value::Null)
                })),
                _ => None,
            }
        }
    }

    /// Collects names delivered by signal until told to exit.
    #[derive(Default)]
    struct SignalGreeter {
        queue: RefCell<Vec<String>>,
        exit: Cell<bool>,
    }

    impl WorkflowDefinition for SignalGreeter {
        fn execute(
            self: Rc<Self>,
            ctx: WorkflowContext,
            _input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async move {
                let mut greetings: Vec<String> = Vec::new();
                loop {
                    let state = Rc::clone(&self);
                    ctx.await_till(
                        move || !state.queue.borrow().is_empty() || state.exit.get(),
                        None,
                    )
                    .await?;
                    loop {
                        let name = self.queue.borrow_mut().pop();
                        match name {
                            Some(name) => greetings.push(format!("Hello {name}!")),
                            None => break,
                        }
                    }
                    if self.exit.get() {
                        return Ok(json!(greetings));
                    }
                }
            })
        }

        fn signal(
            self: Rc<Self>,
            _ctx: WorkflowContext,
            name: &str,
            input: Vec<Value>,
        ) -> Option<LocalBoxFuture<'static, Result<(), WorkflowError>>> {
            match name {
                "wait_for_name" => Some(Box::pin(async move {
                    let name = input
                        .first()
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    self.queue.borrow_mut().push(name);
                    Ok(())
                })),
                "exit" => Some(Box::pin(async move {
                    self.exit.set(true);
                    Ok(())
                })),
                _ => None,
            }
        }
    }

    /// Sleeps twice, recording the deterministic clock at each step.
    struct SleepyWorkflow;

    impl WorkflowDefinition for SleepyWorkflow {
        fn execute(
            self: Rc<Self>,
            ctx: WorkflowContext,
            _input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async move {
                let t0 = ctx.current_time_millis();
                ctx.sleep(20).await?;
                let t1 = ctx.current_time_millis();
                ctx.sleep(30).await?;
                let t2 = ctx.current_time_millis();
                Ok(json!([t0, t1, t2]))
            })
        }
    }

    /// Waits on a predicate that never holds, bounded by a timeout.
    struct AwaitTimeoutWorkflow;

    impl WorkflowDefinition for AwaitTimeoutWorkflow {
        fn execute(
            self: Rc<Self>,
            ctx: WorkflowContext,
            _input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async move {
                let unblocked = ctx.await_till(|| false, Some(60)).await?;
                Ok(json!(unblocked))
            })
        }
    }

    /// Version 2 of [`GreetingWorkflow`]: a `get_version` call inserted
    /// before the existing activity step.
    struct VersionedGreetingWorkflow;

    impl WorkflowDefinition for VersionedGreetingWorkflow {
        fn execute(
            self: Rc<Self>,
            ctx: WorkflowContext,
            _input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async move {
                let version = ctx.get_version("feat", -1, 2)?;
                let stub = ActivityStub::new(
                    &ctx,
                    ActivityOptions {
                        schedule_to_close_timeout_seconds: Some(60),
                        start_to_close_timeout_seconds: Some(60),
                        ..Default::default()
                    },
                );
                let greeting: String = stub
                    .execute("GreetingActivities::compose", &[json!("Hello"), json!("Bob")])
                    .await?;
                Ok(json!([version, greeting]))
            })
        }
    }

    /// Returns deterministic randomness so replays can be compared.
    struct RandomWorkflow;

    impl WorkflowDefinition for RandomWorkflow {
        fn execute(
            self: Rc<Self>,
            ctx: WorkflowContext,
            _input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async move {
                use rand::Rng;
                let first = ctx.random_uuid().to_string();
                let second = ctx.random_uuid().to_string();
                let sampled: u64 = ctx.new_random().random();
                Ok(json!([first, second, sampled]))
            })
        }
    }

    // ── Scenario 1: happy path ────────────────────────────────────────

    #[test_log::test]
    fn greeting_first_task_schedules_the_compose_activity() {
        let mut decider = decider(Rc::new(GreetingWorkflow));
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[json!("Bob")]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();

        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::ScheduleActivityTask(attrs) => {
                assert_eq!(attrs.activity_type.name, "GreetingActivities::compose");
                assert_eq!(attrs.activity_id, "0");
                assert_eq!(
                    attrs.input.as_deref(),
                    Some(br#"["Hello","Bob"]"#.as_slice())
                );
                assert_eq!(attrs.task_list.name, "test-tasks");
            }
            other => panic!("expected schedule activity, got {other:?}"),
        }
    }

    #[test_log::test]
    fn greeting_second_task_completes_with_the_activity_result() {
        let mut decider = decider(Rc::new(GreetingWorkflow));
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[json!("Bob")]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                activity_scheduled(5, 1_100, "0"),
                activity_started(6, 1_200, 5),
                activity_completed(7, 1_500, 5, b"\"Hello Bob!\""),
                dt_scheduled(8, 1_500),
                dt_started(9, 1_500),
            ])
            .unwrap();

        assert_eq!(
            decisions,
            vec![Decision::CompleteWorkflowExecution(
                CompleteWorkflowExecutionAttributes {
                    result: Some(b"\"Hello Bob!\"".to_vec()),
                }
            )]
        );
    }

    // ── Scenario 2: activity failure propagation ──────────────────────

    #[test]
    fn uncaught_activity_failure_fails_the_workflow_with_the_original_cause() {
        let cause = SerializedFailure::capture("ComposeError", vec![json!("bad")]).to_bytes();
        let mut decider = decider(Rc::new(GreetingWorkflow));
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[json!("Bob")]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                activity_scheduled(5, 1_100, "0"),
                activity_started(6, 1_200, 5),
                activity_failed(7, 1_500, 5, cause),
                dt_scheduled(8, 1_500),
                dt_started(9, 1_500),
            ])
            .unwrap();

        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::FailWorkflowExecution(attrs) => {
                assert_eq!(attrs.reason.as_deref(), Some(WORKFLOW_FAILURE_REASON));
                match deserialize_failure(attrs.details.as_deref().unwrap()) {
                    RemoteFailure::Application(app) => {
                        assert_eq!(app.class, "ComposeError");
                        assert_eq!(app.args, vec![json!("bad")]);
                        assert!(!app.traceback.is_empty());
                    }
                    other => panic!("expected application failure, got {other:?}"),
                }
            }
            other => panic!("expected fail workflow, got {other:?}"),
        }
    }

    // ── Scenario 3: signal-driven exit ────────────────────────────────

    #[test_log::test]
    fn signals_unblock_the_awaiting_workflow_in_the_same_pass() {
        let mut decider = decider(Rc::new(SignalGreeter::default()));

        // First task: nothing to do yet, the workflow parks on its predicate.
        let first = decider
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();
        assert!(first.is_empty());

        // Second task (fresh decider; nothing survives a decision task).
        let mut decider = decider_for_signals();
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                signaled(5, 2_000, "wait_for_name", &[json!("Bob")]),
                signaled(6, 2_100, "exit", &[]),
                dt_scheduled(7, 2_100),
                dt_started(8, 2_100),
            ])
            .unwrap();

        assert_eq!(
            decisions,
            vec![Decision::CompleteWorkflowExecution(
                CompleteWorkflowExecutionAttributes {
                    result: Some(b"[\"Hello Bob!\"]".to_vec()),
                }
            )]
        );
    }

    fn decider_for_signals() -> ReplayDecider {
        decider(Rc::new(SignalGreeter::default()))
    }

    // ── Scenario 4: sleep deadlines ───────────────────────────────────

    #[test_log::test]
    fn consecutive_sleeps_emit_timers_and_advance_the_clock() {
        // Task 1: the first sleep becomes a StartTimer command.
        let mut decider1 = decider(Rc::new(SleepyWorkflow));
        let first = decider1
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();
        assert_eq!(
            first,
            vec![Decision::StartTimer(StartTimerAttributes {
                timer_id: "0".into(),
                start_to_fire_timeout_seconds: 20,
            })]
        );

        // Task 2: the first timer fired, the second sleep starts its timer.
        let mut decider2 = decider(Rc::new(SleepyWorkflow));
        let second = decider2
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                timer_started(5, 1_100, "0", 20),
                timer_fired(6, 21_000, "0", 5),
                dt_scheduled(7, 21_000),
                dt_started(8, 21_000),
            ])
            .unwrap();
        assert_eq!(
            second,
            vec![Decision::StartTimer(StartTimerAttributes {
                timer_id: "1".into(),
                start_to_fire_timeout_seconds: 30,
            })]
        );

        // Task 3: both timers fired; the recorded clock readings honor the
        // sleep deadlines.
        let mut decider3 = decider(Rc::new(SleepyWorkflow));
        let third = decider3
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                timer_started(5, 1_100, "0", 20),
                timer_fired(6, 21_000, "0", 5),
                dt_scheduled(7, 21_000),
                dt_started(8, 21_000),
                dt_completed(9, 21_100),
                timer_started(10, 21_100, "1", 30),
                timer_fired(11, 51_500, "1", 10),
                dt_scheduled(12, 51_500),
                dt_started(13, 51_500),
            ])
            .unwrap();

        assert_eq!(third.len(), 1);
        match &third[0] {
            Decision::CompleteWorkflowExecution(attrs) => {
                let readings: Vec<i64> =
                    serde_json::from_slice(attrs.result.as_deref().unwrap()).unwrap();
                let (t0, t1, t2) = (readings[0], readings[1], readings[2]);
                assert!(t1 - t0 >= 20_000, "first sleep deadline: {t0} -> {t1}");
                assert!(t2 - t0 >= 50_000, "second sleep deadline: {t0} -> {t2}");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    // ── Scenario 5: await_till timeout ────────────────────────────────

    #[test_log::test]
    fn await_till_timeout_starts_a_timer_and_returns_false() {
        let mut decider1 = decider(Rc::new(AwaitTimeoutWorkflow));
        let first = decider1
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();
        assert_eq!(
            first,
            vec![Decision::StartTimer(StartTimerAttributes {
                timer_id: "0".into(),
                start_to_fire_timeout_seconds: 60,
            })]
        );

        let mut decider2 = decider(Rc::new(AwaitTimeoutWorkflow));
        let second = decider2
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                timer_started(5, 1_100, "0", 60),
                timer_fired(6, 61_500, "0", 5),
                dt_scheduled(7, 61_500),
                dt_started(8, 61_500),
            ])
            .unwrap();

        assert_eq!(
            second,
            vec![Decision::CompleteWorkflowExecution(
                CompleteWorkflowExecutionAttributes {
                    result: Some(b"false".to_vec()),
                }
            )]
        );
    }

    // ── Scenario 6: version compatibility ─────────────────────────────

    #[test_log::test]
    fn replaying_pre_version_history_returns_default_and_emits_no_marker() {
        // History produced by the v1 workflow, which had no get_version.
        let mut decider = decider(Rc::new(VersionedGreetingWorkflow));
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                activity_scheduled(5, 1_100, "0"),
                activity_started(6, 1_200, 5),
                activity_completed(7, 1_500, 5, b"\"Hello Bob!\""),
                dt_scheduled(8, 1_500),
                dt_started(9, 1_500),
            ])
            .unwrap();

        assert!(
            decisions
                .iter()
                .all(|d| !matches!(d, Decision::RecordMarker(_))),
            "no marker command may be emitted for a defaulted version"
        );
        assert_eq!(
            decisions,
            vec![Decision::CompleteWorkflowExecution(
                CompleteWorkflowExecutionAttributes {
                    result: Some(b"[-1,\"Hello Bob!\"]".to_vec()),
                }
            )]
        );
    }

    #[test]
    fn fresh_execution_records_the_maximum_supported_version() {
        let mut decider = decider(Rc::new(VersionedGreetingWorkflow));
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();

        assert_eq!(decisions.len(), 2);
        match &decisions[0] {
            Decision::RecordMarker(attrs) => {
                assert_eq!(attrs.marker_name, VERSION_MARKER_NAME);
                assert_eq!(attrs.details.as_deref(), Some(b"2".as_slice()));
                assert!(attrs.header.is_some());
            }
            other => panic!("expected record marker, got {other:?}"),
        }
        assert!(matches!(&decisions[1], Decision::ScheduleActivityTask(_)));
    }

    // ── Determinism of randomness ─────────────────────────────────────

    #[test]
    fn random_values_are_identical_across_replays() {
        let history = || {
            vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ]
        };

        let mut first = decider(Rc::new(RandomWorkflow));
        let mut second = decider(Rc::new(RandomWorkflow));
        let a = first.decide(history()).unwrap();
        let b = second.decide(history()).unwrap();

        assert_eq!(a, b);
        match &a[0] {
            Decision::CompleteWorkflowExecution(attrs) => {
                let values: Vec<Value> =
                    serde_json::from_slice(attrs.result.as_deref().unwrap()).unwrap();
                assert_ne!(values[0], values[1], "distinct uuids per call");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    // ── Nondeterminism detection ──────────────────────────────────────

    #[test]
    fn completion_for_an_unscheduled_activity_is_nondeterminism() {
        // SleepyWorkflow never schedules an activity, so the recorded
        // ActivityTaskScheduled has no matching machine.
        let mut decider = decider(Rc::new(SleepyWorkflow));
        let err = decider
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                activity_scheduled(5, 1_100, "0"),
                activity_started(6, 1_200, 5),
                activity_completed(7, 1_500, 5, b"\"Hello Bob!\""),
                dt_scheduled(8, 1_500),
                dt_started(9, 1_500),
            ])
            .unwrap_err();

        assert_eq!(
            err,
            ReplayError::UnknownMachine {
                id: DecisionId::activity(5)
            }
        );
    }

    #[test]
    fn clock_regression_across_epochs_is_fatal() {
        let mut decider = decider(Rc::new(SignalGreeter::default()));
        let err = decider
            .decide(vec![
                wf_started(1, 5_000, &[]),
                dt_scheduled(2, 5_000),
                dt_started(3, 5_000),
                dt_completed(4, 5_100),
                signaled(5, 5_200, "exit", &[]),
                dt_scheduled(6, 5_200),
                dt_started(7, 2_000),
            ])
            .unwrap_err();

        assert_eq!(
            err,
            ReplayError::TimeWentBackward {
                current_millis: 5_000,
                observed_millis: 2_000,
            }
        );
    }

    #[test]
    fn duplicate_decision_ids_are_rejected() {
        let mut state = DeciderState::new(execution(), WorkflowType::new("TestWorkflow"));
        state.next_decision_event_id = 5;
        state
            .schedule_activity("a", &ActivityOptions::default(), None)
            .unwrap();

        // Force a collision on the same decision event id.
        state.next_decision_event_id = 5;
        state
            .schedule_activity("b", &ActivityOptions::default(), None)
            .unwrap_err();
        assert_eq!(
            state.take_fatal(),
            Some(ReplayError::DuplicateDecision {
                id: DecisionId::activity(5)
            })
        );
    }

    // ── Cancellation ──────────────────────────────────────────────────

    #[test]
    fn cancel_request_emits_the_terminal_cancel_decision() {
        let mut decider = decider(Rc::new(SignalGreeter::default()));
        let decisions = decider
            .decide(vec![
                wf_started(1, 1_000, &[]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
                dt_completed(4, 1_100),
                event(
                    5,
                    2_000,
                    EventAttributes::WorkflowExecutionCancelRequested(
                        WorkflowExecutionCancelRequestedAttributes::default(),
                    ),
                ),
                dt_scheduled(6, 2_000),
                dt_started(7, 2_000),
            ])
            .unwrap();

        assert_eq!(
            decisions,
            vec![Decision::CancelWorkflowExecution(
                CancelWorkflowExecutionAttributes { details: None }
            )]
        );
    }

    // ── Queries ───────────────────────────────────────────────────────

    #[test]
    fn query_completes_within_one_pass() {
        let mut decider = decider(Rc::new(GreetingWorkflow));
        decider
            .decide(vec![
                wf_started(1, 1_000, &[json!("Bob")]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();

        let result = decider
            .handle_query(&WorkflowQuery {
                query_type: "workflow_type".into(),
                query_args: None,
            })
            .unwrap();
        assert_eq!(result, b"\"TestWorkflow\"".to_vec());
    }

    #[test]
    fn suspending_query_fails_with_did_not_complete() {
        let mut decider = decider(Rc::new(GreetingWorkflow));
        decider
            .decide(vec![
                wf_started(1, 1_000, &[json!("Bob")]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();

        let err = decider
            .handle_query(&WorkflowQuery {
                query_type: "never_finishes".into(),
                query_args: None,
            })
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::DidNotComplete {
                query_type: "never_finishes".into()
            }
        );
    }

    #[test]
    fn unknown_query_reports_not_found() {
        let mut decider = decider(Rc::new(GreetingWorkflow));
        decider
            .decide(vec![
                wf_started(1, 1_000, &[json!("Bob")]),
                dt_scheduled(2, 1_000),
                dt_started(3, 1_000),
            ])
            .unwrap();

        let err = decider
            .handle_query(&WorkflowQuery {
                query_type: "nope".into(),
                query_args: None,
            })
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::NotFound {
                query_type: "nope".into()
            }
        );
    }
}
