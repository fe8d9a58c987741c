use std::fmt;

use crate::error::GuardError;

/// The single result of one guarded call.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum Outcome<T, E> {
    /// The primary operation returned in time.
    Success(T),
    /// The primary timed out or failed and the fallback produced this value.
    Fallback(T),
    Error(GuardError<E>),
}

impl<T, E> Outcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) | Outcome::Fallback(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        self.into_result().ok()
    }

    pub fn error(&self) -> Option<&GuardError<E>> {
        match self {
            Outcome::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Collapses `Success` and `Fallback` into `Ok`.
    pub fn into_result(self) -> Result<T, GuardError<E>> {
        match self {
            Outcome::Success(value) | Outcome::Fallback(value) => Ok(value),
            Outcome::Error(err) => Err(err),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Fallback(value) => Outcome::Fallback(f(value)),
            Outcome::Error(err) => Outcome::Error(err),
        }
    }
}

/// Renders the value, or the error message, as a plain-text body.
impl<T: fmt::Display, E: fmt::Display> fmt::Display for Outcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(value) | Outcome::Fallback(value) => value.fmt(f),
            Outcome::Error(err) => err.fmt(f),
        }
    }
}
