use std::any::Any;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ConfigError {
    #[error("Timeout must be greater than zero")]
    ZeroTimeout,
    #[error("In-flight limit must be greater than zero")]
    ZeroInFlightLimit,
}

/// Why a single operation, primary or fallback, did not produce a value.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum Failure<E> {
    #[error("{0}")]
    Error(E),
    #[error("panicked: {0}")]
    Panic(String),
    #[error("cancelled before completion")]
    Cancelled,
}

impl<E> Failure<E> {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Failure::Panic(panic_message(payload))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Failure::Error(_) => "error",
            Failure::Panic(_) => "panic",
            Failure::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum GuardError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Operation failed: {0}")]
    Operation(Failure<E>),
    #[error("Fallback failed: {0}")]
    Fallback(Failure<E>),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl<E> GuardError<E> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            GuardError::Timeout(_) => "timeout",
            GuardError::Operation(_) => "operation",
            GuardError::Fallback(_) => "fallback",
            GuardError::ResourceExhausted(_) => "resource_exhausted",
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => String::from("unknown panic payload"),
        },
    }
}
