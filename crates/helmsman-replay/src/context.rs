//! The surface workflow authors program against.
//!
//! A workflow is an implementation of [`WorkflowDefinition`] driven as a
//! future on the cooperative scheduler. All interaction with the outside
//! world goes through a [`WorkflowContext`] handle: deterministic time and
//! randomness, timers, markers, and activity invocation. Calling wall-clock
//! time, OS randomness, or doing I/O directly inside a workflow breaks
//! replay and must be routed through activities or side effects instead.

use crate::decider::{ActivityOutcome, DeciderState, TimerOutcome};
use crate::futures::{CellFuture, CompletionCell, yield_once};
use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use helmsman_types::{
    RetryPolicy, TaskList, WorkflowError, WorkflowExecution, WorkflowType, decode_value,
    encode_args, encode_value,
};
use rand::rngs::StdRng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use uuid::Uuid;

/// User workflow code: one orchestration method plus optional signal and
/// query dispatch.
///
/// Implementations hold their mutable state behind `RefCell`: the
/// scheduler is single-threaded and only one task runs at a time, so
/// borrows never overlap across tasks.
pub trait WorkflowDefinition: 'static {
    /// The orchestration body. Must be deterministic: same history in, same
    /// commands out. The returned value becomes the workflow result.
    fn execute(
        self: Rc<Self>,
        ctx: WorkflowContext,
        input: Vec<Value>,
    ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>>;

    /// Dispatch a signal by name. Returning `None` means no handler is
    /// registered; the delivery is logged and dropped.
    fn signal(
        self: Rc<Self>,
        ctx: WorkflowContext,
        name: &str,
        input: Vec<Value>,
    ) -> Option<LocalBoxFuture<'static, Result<(), WorkflowError>>> {
        let _ = (ctx, name, input);
        None
    }

    /// Dispatch a query by name. The returned future must complete within
    /// one scheduler pass; queries may read workflow state but never
    /// suspend.
    fn query(
        self: Rc<Self>,
        ctx: WorkflowContext,
        name: &str,
        input: Vec<Value>,
    ) -> Option<LocalBoxFuture<'static, Result<Value, WorkflowError>>> {
        let _ = (ctx, name, input);
        None
    }
}

/// Per-invocation activity options. Timeouts mirror the service contract;
/// an unset task list defaults to the workflow's own.
#[derive(Clone, Debug, Default)]
pub struct ActivityOptions {
    pub domain: Option<String>,
    pub task_list: Option<TaskList>,
    pub schedule_to_close_timeout_seconds: Option<i32>,
    pub schedule_to_start_timeout_seconds: Option<i32>,
    pub start_to_close_timeout_seconds: Option<i32>,
    pub heartbeat_timeout_seconds: Option<i32>,
    pub retry_policy: Option<RetryPolicy>,
}

/// Handle into the deciding execution, cheap to clone into tasks.
#[derive(Clone)]
pub struct WorkflowContext {
    state: Rc<RefCell<DeciderState>>,
}

impl WorkflowContext {
    pub(crate) fn new(state: Rc<RefCell<DeciderState>>) -> Self {
        Self { state }
    }

    pub fn execution(&self) -> WorkflowExecution {
        self.state.borrow().execution().clone()
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.state.borrow().workflow_type().clone()
    }

    /// Deterministic "now": the timestamp of the decision task boundary the
    /// engine is currently applying.
    pub fn now(&self) -> DateTime<Utc> {
        self.state.borrow().now()
    }

    pub fn current_time_millis(&self) -> i64 {
        self.state.borrow().current_time_millis()
    }

    /// Whether the engine is replaying recorded history (as opposed to
    /// executing the live tail of the current decision task).
    pub fn is_replaying(&self) -> bool {
        self.state.borrow().is_replaying()
    }

    /// Replay-stable UUID: derived from the run id and an engine counter,
    /// so every replay observes the same sequence.
    pub fn random_uuid(&self) -> Uuid {
        self.state.borrow_mut().random_uuid()
    }

    /// Replay-stable random generator seeded from a deterministic UUID.
    pub fn new_random(&self) -> StdRng {
        self.state.borrow_mut().new_random()
    }

    /// Read the recorded version for `change_id`, or record `max_supported`
    /// on first live execution. Replays of histories that predate the
    /// change id observe `DEFAULT_VERSION` (-1). The result is validated
    /// against `[min_supported, max_supported]`.
    pub fn get_version(
        &self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> Result<i32, WorkflowError> {
        self.state
            .borrow_mut()
            .get_version(change_id, min_supported, max_supported)
    }

    /// Run `producer` once and record its value; replays return the
    /// recorded value without re-running it.
    ///
    /// The producer must not call back into this context.
    pub fn side_effect<T, F>(&self, producer: F) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let bytes = self
            .state
            .borrow_mut()
            .side_effect(|| encode_value(&producer()).map_err(WorkflowError::from))?;
        Ok(decode_value(Some(&bytes))?)
    }

    /// Like [`side_effect`](Self::side_effect), but keyed by `id` and
    /// re-recorded only when the produced value differs from the stored
    /// one. Returns `None` only when replaying a history with no recorded
    /// marker for `id`.
    ///
    /// The producer must not call back into this context.
    pub fn mutable_side_effect<T, F>(&self, id: &str, producer: F) -> Result<Option<T>, WorkflowError>
    where
        T: Serialize + DeserializeOwned + PartialEq,
        F: FnOnce(Option<&T>) -> T,
    {
        let outcome = self.state.borrow_mut().mutable_side_effect(id, |stored_bytes| {
            let stored: Option<T> = match stored_bytes {
                Some(bytes) => Some(decode_value(Some(bytes))?),
                None => None,
            };
            let produced = producer(stored.as_ref());
            if stored.as_ref() == Some(&produced) {
                Ok(None)
            } else {
                Ok(Some(encode_value(&produced)?))
            }
        })?;
        match outcome {
            Some(bytes) => Ok(Some(decode_value(Some(&bytes))?)),
            None => Ok(None),
        }
    }

    /// Start a timer. A zero delay completes synchronously and carries no
    /// cancellation handle; a negative delay is an error.
    pub fn start_timer(&self, delay_seconds: i64) -> Result<TimerFuture, WorkflowError> {
        let start = self.state.borrow_mut().create_timer(delay_seconds)?;
        let handle = start.start_event_id.map(|start_event_id| TimerHandle {
            start_event_id,
            state: Rc::downgrade(&self.state),
        });
        Ok(TimerFuture {
            cell: start.cell,
            handle,
        })
    }

    /// Suspend the workflow for `delay_seconds` of deterministic time.
    pub async fn sleep(&self, delay_seconds: i64) -> Result<(), WorkflowError> {
        let timer = self.start_timer(delay_seconds)?;
        timer.await.map_err(WorkflowError::from)
    }

    /// Wait until `predicate` holds or the timeout fires. Returns `true`
    /// when the predicate unblocked the wait, `false` on timeout. The
    /// predicate is re-checked once per scheduler pass.
    pub async fn await_till<P>(
        &self,
        predicate: P,
        timeout_seconds: Option<i64>,
    ) -> Result<bool, WorkflowError>
    where
        P: Fn() -> bool,
    {
        let timer = match timeout_seconds {
            Some(seconds) if seconds != 0 => Some(self.start_timer(seconds)?),
            _ => None,
        };
        loop {
            if predicate() {
                if let Some(timer) = &timer {
                    if let Some(handle) = timer.handle() {
                        handle.cancel(None);
                    }
                }
                return Ok(true);
            }
            if let Some(timer) = &timer {
                if timer.fired() {
                    return Ok(false);
                }
            }
            yield_once().await;
        }
    }

    /// Schedule an activity invocation and return a handle to its result.
    pub fn schedule_activity(
        &self,
        activity_type: &str,
        options: &ActivityOptions,
        args: &[Value],
    ) -> Result<ActivityHandle, WorkflowError> {
        let input = encode_args(args)?;
        let (scheduled_event_id, cell) =
            self.state
                .borrow_mut()
                .schedule_activity(activity_type, options, Some(input))?;
        Ok(ActivityHandle {
            scheduled_event_id,
            cell,
            state: Rc::downgrade(&self.state),
        })
    }
}

/// Future for a started timer. Also exposes the fired flag and the
/// cancellation handle without consuming the future.
pub struct TimerFuture {
    cell: Rc<CompletionCell<TimerOutcome>>,
    handle: Option<TimerHandle>,
}

impl TimerFuture {
    /// None for zero-delay timers, which complete synchronously.
    pub fn handle(&self) -> Option<&TimerHandle> {
        self.handle.as_ref()
    }

    /// Whether the timer has fired (or been cancelled).
    pub fn fired(&self) -> bool {
        self.cell.is_complete()
    }
}

impl Future for TimerFuture {
    type Output = TimerOutcome;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.cell.try_take() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

/// Cancels a pending timer; the awaiting coroutine observes a
/// [`CancelledError`] chaining the given reason.
pub struct TimerHandle {
    start_event_id: i64,
    state: Weak<RefCell<DeciderState>>,
}

impl TimerHandle {
    pub fn cancel(&self, reason: Option<String>) {
        if let Some(state) = self.state.upgrade() {
            state.borrow_mut().cancel_timer(self.start_event_id, reason);
        }
    }
}

/// Handle to a scheduled activity's eventual result.
pub struct ActivityHandle {
    scheduled_event_id: i64,
    cell: Rc<CompletionCell<ActivityOutcome>>,
    state: Weak<RefCell<DeciderState>>,
}

impl ActivityHandle {
    pub fn scheduled_event_id(&self) -> i64 {
        self.scheduled_event_id
    }

    /// Request cancellation. Activity cancellation requires a service
    /// round-trip unless the schedule command was never sent.
    pub fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            state
                .borrow_mut()
                .request_cancel_activity(self.scheduled_event_id);
        }
    }

    /// Await and decode the activity result.
    pub async fn result<T: DeserializeOwned>(self) -> Result<T, WorkflowError> {
        let payload = CellFuture::new(self.cell).await?;
        Ok(decode_value(payload.as_deref())?)
    }
}

/// Invokes activities of one configuration as futures.
pub struct ActivityStub {
    ctx: WorkflowContext,
    options: ActivityOptions,
}

impl ActivityStub {
    pub fn new(ctx: &WorkflowContext, options: ActivityOptions) -> Self {
        Self {
            ctx: ctx.clone(),
            options,
        }
    }

    pub async fn execute<T: DeserializeOwned>(
        &self,
        activity_type: &str,
        args: &[Value],
    ) -> Result<T, WorkflowError> {
        self.ctx
            .schedule_activity(activity_type, &self.options, args)?
            .result()
            .await
    }
}
