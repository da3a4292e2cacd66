//! The cooperative task scheduler.
//!
//! Single-threaded: exactly one task of a workflow execution runs at a
//! time, and control transfers only at explicit suspension points. The
//! decider runs one pass per epoch: first all events are dispatched (which
//! fills completion cells), then every suspended task is unblocked, then
//! the pass drains the ready queue, polling each task once.
//!
//! The ready queue is FIFO. Tasks spawned while dispatching an epoch's
//! events (signal handlers) enter the queue before the tasks `unblock_all`
//! re-enqueues, so a signal handler observes-and-mutates state before the
//! workflow's predicate re-check in the same pass.

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use helmsman_types::WorkflowError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// What a scheduled task is, for completion routing and diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TaskKind {
    /// The main coroutine; its return value completes the workflow.
    Workflow,
    /// Spawned per delivered signal; the return value is discarded.
    Signal(String),
}

pub(crate) type TaskFuture = LocalBoxFuture<'static, Result<Value, WorkflowError>>;

struct TaskEntry {
    kind: TaskKind,
    future: Option<TaskFuture>,
}

/// Poll a future exactly once with a no-op waker.
pub(crate) fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(noop_waker_ref());
    future.poll(&mut cx)
}

#[derive(Default)]
pub(crate) struct TaskScheduler {
    tasks: Vec<TaskEntry>,
    ready: Vec<usize>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and enqueue it for the next pass.
    pub fn spawn(&mut self, kind: TaskKind, future: TaskFuture) {
        debug!(?kind, "spawning task");
        self.tasks.push(TaskEntry {
            kind,
            future: Some(future),
        });
        self.ready.push(self.tasks.len() - 1);
    }

    /// Enqueue every live task, in creation order, behind anything already
    /// queued. Called by the decider after each event batch so suspended
    /// predicates are re-checked.
    pub fn unblock_all(&mut self) {
        for index in 0..self.tasks.len() {
            if self.tasks[index].future.is_some() && !self.ready.contains(&index) {
                self.ready.push(index);
            }
        }
    }

    /// Drain the current ready queue, polling each task once. Returns the
    /// tasks that finished during this pass with their outcomes.
    pub fn run_once(&mut self) -> Vec<(TaskKind, Result<Value, WorkflowError>)> {
        let queue = std::mem::take(&mut self.ready);
        let mut completions = Vec::new();
        for index in queue {
            let Some(future) = self.tasks[index].future.as_mut() else {
                continue;
            };
            match poll_once(future.as_mut()) {
                Poll::Ready(outcome) => {
                    self.tasks[index].future = None;
                    completions.push((self.tasks[index].kind.clone(), outcome));
                }
                Poll::Pending => {}
            }
        }
        completions
    }

    /// Drop every task. Dropping a future is how a coroutine observes
    /// cancellation; called when the decision context is torn down.
    pub fn cancel_all(&mut self) {
        for task in &mut self.tasks {
            task.future = None;
        }
        self.ready.clear();
    }

    pub fn has_live_tasks(&self) -> bool {
        self.tasks.iter().any(|t| t.future.is_some())
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::futures::{CellFuture, CompletionCell};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn tasks_complete_in_fifo_order() {
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = TaskScheduler::new();

        let o = Rc::clone(&order);
        scheduler.spawn(
            TaskKind::Workflow,
            Box::pin(async move {
                o.borrow_mut().push("workflow");
                Ok(Value::Null)
            }),
        );
        let o = Rc::clone(&order);
        scheduler.spawn(
            TaskKind::Signal("s".into()),
            Box::pin(async move {
                o.borrow_mut().push("signal");
                Ok(Value::Null)
            }),
        );

        let completions = scheduler.run_once();
        assert_eq!(completions.len(), 2);
        assert_eq!(*order.borrow(), vec!["workflow", "signal"]);
        assert!(!scheduler.has_live_tasks());
    }

    #[test]
    fn suspended_task_stays_until_unblocked_with_a_result() {
        let cell: Rc<CompletionCell<i64>> = CompletionCell::new();
        let mut scheduler = TaskScheduler::new();

        let waiting = Rc::clone(&cell);
        scheduler.spawn(
            TaskKind::Workflow,
            Box::pin(async move {
                let value = CellFuture::new(waiting).await;
                Ok(json!(value))
            }),
        );

        assert!(scheduler.run_once().is_empty());
        assert!(scheduler.has_live_tasks());

        // Nothing queued: another pass is a no-op even though the cell fills.
        cell.complete(9);
        assert!(scheduler.run_once().is_empty());

        scheduler.unblock_all();
        let completions = scheduler.run_once();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].1.as_ref().unwrap(), &json!(9));
    }

    #[test]
    fn signals_spawned_during_dispatch_run_before_resumed_tasks() {
        let flag = Rc::new(RefCell::new(false));
        let observed = Rc::new(RefCell::new(None::<bool>));
        let mut scheduler = TaskScheduler::new();

        // Workflow suspends once, then records what it sees.
        let f = Rc::clone(&flag);
        let o = Rc::clone(&observed);
        scheduler.spawn(
            TaskKind::Workflow,
            Box::pin(async move {
                crate::futures::yield_once().await;
                *o.borrow_mut() = Some(*f.borrow());
                Ok(Value::Null)
            }),
        );
        scheduler.run_once();

        // Signal arrives: spawned first, then everyone is unblocked.
        let f = Rc::clone(&flag);
        scheduler.spawn(
            TaskKind::Signal("set_flag".into()),
            Box::pin(async move {
                *f.borrow_mut() = true;
                Ok(Value::Null)
            }),
        );
        scheduler.unblock_all();
        scheduler.run_once();

        assert_eq!(*observed.borrow(), Some(true));
    }
}
