// src/connection/inflight.rs

//! Tracks the commands a session has sent but not yet matched to a response.
//!
//! The pending queue, the current slot and the closed flag share one lock, so
//! moving a command from the queue into the slot and draining both at shutdown
//! are each a single step. A command is therefore always in exactly one place:
//! the queue, the slot, or the caller's hands after a drain.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct State<C> {
    pending: VecDeque<Arc<C>>,
    current: Option<Arc<C>>,
    closed: bool,
}

/// The outcome of waiting for the next command.
#[derive(Debug)]
pub(crate) enum Take<C> {
    Ready(Arc<C>),
    Closed,
}

/// Everything removed from a session at shutdown, in the order it must be failed.
#[derive(Debug)]
pub(crate) struct Drained<C> {
    /// True only for the call that flipped the state to closed.
    pub newly_closed: bool,
    pub current: Option<Arc<C>>,
    pub pending: Vec<Arc<C>>,
}

impl<C> Drained<C> {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct InFlight<C> {
    state: Mutex<State<C>>,
    // `notify_one` stores a permit when nobody is waiting, so a push that lands
    // between the consumer's empty check and its `.await` is not missed.
    available: Notify,
    closed_signal: Notify,
}

impl<C> InFlight<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                current: None,
                closed: false,
            }),
            available: Notify::new(),
            closed_signal: Notify::new(),
        }
    }

    /// Appends to the tail. Hands the command back if the session is closed.
    pub fn push(&self, command: Arc<C>) -> Result<(), Arc<C>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(command);
            }
            state.pending.push_back(command);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Waits for the head of the queue and installs it as current.
    ///
    /// Cancel safe: the pop and the slot update happen under the lock after the
    /// wake-up, never across an `.await`.
    pub async fn take_next_as_current(&self) -> Take<C> {
        loop {
            if let Some(take) = self.try_take_next_as_current() {
                return take;
            }
            self.available.notified().await;
        }
    }

    /// Non-blocking variant: `None` means the queue is empty and still open.
    pub fn try_take_next_as_current(&self) -> Option<Take<C>> {
        let mut state = self.state.lock();
        if state.closed {
            return Some(Take::Closed);
        }
        let next = state.pending.pop_front()?;
        state.current = Some(next.clone());
        Some(Take::Ready(next))
    }

    pub fn current(&self) -> Option<Arc<C>> {
        self.state.lock().current.clone()
    }

    /// Replaces the current slot. Hands a command back if the state is
    /// closed; clearing the slot always succeeds.
    pub fn set_current(&self, command: Option<Arc<C>>) -> Result<(), Arc<C>> {
        let mut state = self.state.lock();
        match command {
            Some(command) if state.closed => Err(command),
            command => {
                state.current = command;
                Ok(())
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Resolves once the state has been closed.
    pub async fn wait_closed(&self) {
        let notified = self.closed_signal.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent close is not missed.
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Marks the state closed and takes ownership of everything in it. Waiters
    /// are woken and observe the closed flag.
    pub fn close_and_drain(&self) -> Drained<C> {
        let drained = {
            let mut state = self.state.lock();
            let newly_closed = !state.closed;
            state.closed = true;
            Drained {
                newly_closed,
                current: state.current.take(),
                pending: state.pending.drain(..).collect(),
            }
        };
        self.closed_signal.notify_waiters();
        self.available.notify_waiters();
        // A consumer that is between its check and `notified()` would miss
        // `notify_waiters`; the stored permit covers it.
        self.available.notify_one();
        drained
    }
}
