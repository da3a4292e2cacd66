//! One-shot completion cells, the suspension primitive of the engine.
//!
//! Workflow code awaits a [`CellFuture`] over a shared [`CompletionCell`];
//! the decider fills cells while dispatching history events. There are no
//! real wakers: the scheduler re-polls suspended tasks once per epoch, which
//! is when a filled cell is observed.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

#[derive(Debug)]
enum CellState<T> {
    Empty,
    Ready(T),
    Taken,
}

/// Single-producer, single-consumer, single-value slot.
#[derive(Debug)]
pub(crate) struct CompletionCell<T> {
    state: RefCell<CellState<T>>,
}

impl<T> CompletionCell<T> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(CellState::Empty),
        })
    }

    /// Fill the cell. Returns false if it was already completed (the value
    /// is dropped; first completion wins).
    pub fn complete(&self, value: T) -> bool {
        let mut state = self.state.borrow_mut();
        match *state {
            CellState::Empty => {
                *state = CellState::Ready(value);
                true
            }
            _ => false,
        }
    }

    /// Whether the cell has ever been completed. Stays true after the value
    /// is taken, so "has this fired" checks remain valid.
    pub fn is_complete(&self) -> bool {
        !matches!(*self.state.borrow(), CellState::Empty)
    }

    pub fn try_take(&self) -> Option<T> {
        let mut state = self.state.borrow_mut();
        match std::mem::replace(&mut *state, CellState::Taken) {
            CellState::Ready(value) => Some(value),
            CellState::Empty => {
                *state = CellState::Empty;
                None
            }
            CellState::Taken => None,
        }
    }
}

/// Future that resolves once its cell is completed.
pub(crate) struct CellFuture<T> {
    cell: Rc<CompletionCell<T>>,
}

impl<T> CellFuture<T> {
    pub fn new(cell: Rc<CompletionCell<T>>) -> Self {
        Self { cell }
    }
}

impl<T> Future for CellFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.cell.try_take() {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}

/// Suspends until the next scheduler pass: pending on the first poll, ready
/// on the next. `await_till` yields through this between predicate checks.
pub(crate) fn yield_once() -> YieldOnce {
    YieldOnce { polled: false }
}

pub(crate) struct YieldOnce {
    polled: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.polled {
            Poll::Ready(())
        } else {
            self.polled = true;
            Poll::Pending
        }
    }
}
