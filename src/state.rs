use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Failure, GuardError};

pub(crate) enum State<R> {
    Pending,
    Ready { result: R, at: Instant },
    Closed,
}

impl<R> Default for State<R> {
    fn default() -> Self {
        State::Pending
    }
}

/// What the caller observed once the race resolved.
pub(crate) enum Verdict<T, E> {
    Succeeded(T),
    Failed(Failure<E>),
    TimedOut,
}

impl<T, E> From<Result<T, Failure<E>>> for Verdict<T, E> {
    fn from(result: Result<T, Failure<E>>) -> Self {
        match result {
            Ok(value) => Verdict::Succeeded(value),
            Err(failure) => Verdict::Failed(failure),
        }
    }
}

impl<T, E> Verdict<T, E> {
    /// `Ok` for an on-time success, otherwise the primary's own cause.
    pub(crate) fn into_result(self, timeout: Duration) -> Result<T, GuardError<E>> {
        match self {
            Verdict::Succeeded(value) => Ok(value),
            Verdict::Failed(failure) => Err(GuardError::Operation(failure)),
            Verdict::TimedOut => Err(GuardError::Timeout(timeout)),
        }
    }
}

/// Single-delivery hand-off between a worker and the caller waiting on it.
///
/// Whichever side moves the state out of `Pending` first wins: the worker by
/// publishing a result, the caller by closing the slot at the deadline.
pub(crate) struct Slot<R> {
    inner: Arc<(Mutex<State<R>>, Condvar)>,
}

impl<R> Clone for Slot<R> {
    fn clone(&self) -> Self {
        Slot {
            inner: self.inner.clone(),
        }
    }
}

impl<R> Slot<R> {
    pub(crate) fn new() -> Self {
        Slot {
            inner: Arc::new((Mutex::default(), Condvar::new())),
        }
    }

    /// Publishes the worker's result. Returns `false` if the caller has
    /// already given up, in which case `result` is dropped.
    pub(crate) fn complete(&self, result: R) -> bool {
        let (lock, ready) = &*self.inner;
        let mut state = lock.lock();

        match *state {
            State::Pending => {
                *state = State::Ready {
                    result,
                    at: Instant::now(),
                };
                ready.notify_one();
                true
            }
            State::Ready { .. } | State::Closed => false,
        }
    }

    /// Blocks until a result is published or `deadline` passes, then closes
    /// the slot. A result stamped at or after `deadline` counts as late.
    pub(crate) fn wait_until(&self, deadline: Instant) -> Option<R> {
        let (lock, ready) = &*self.inner;
        let mut state = lock.lock();

        loop {
            match std::mem::replace(&mut *state, State::Closed) {
                State::Ready { result, at } if at < deadline => return Some(result),
                State::Ready { .. } | State::Closed => return None,
                State::Pending => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    *state = State::Pending;
                    ready.wait_until(&mut state, deadline);
                }
            }
        }
    }
}
