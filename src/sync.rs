use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::error::{ConfigError, Failure, GuardError};
use crate::permit::InFlight;
use crate::state::{Slot, Verdict};
use crate::{GuardConfig, Outcome};

type FallbackFn<T, E> = dyn Fn() -> Result<T, E> + Send + Sync;

/// Runs blocking operations on a dedicated thread per call and waits for them
/// no longer than the configured timeout.
///
/// A timed out thread is abandoned, not killed: it keeps running until the
/// operation returns and its result is thrown away.
pub struct SyncGuard<T, E> {
    config: GuardConfig,
    fallback: Option<Arc<FallbackFn<T, E>>>,
    in_flight: InFlight,
}

impl<T, E> Clone for SyncGuard<T, E> {
    fn clone(&self) -> Self {
        SyncGuard {
            config: self.config.clone(),
            fallback: self.fallback.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<T, E> SyncGuard<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(SyncGuard {
            in_flight: InFlight::new(config.max_in_flight),
            config,
            fallback: None,
        })
    }

    /// Registers the fallback used by [`SyncGuard::call`].
    pub fn with_fallback<G>(mut self, fallback: G) -> Self
    where
        G: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Primary operations still running, abandoned ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.running()
    }

    /// Runs `operation` with the registered fallback, if there is one.
    pub fn call<F>(&self, operation: F) -> Outcome<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let fallback = self.fallback.clone();
        self.run(move |_| operation(), fallback.map(|f| move || f()))
    }

    /// Runs `operation`, falling back to `fallback` for this call only.
    pub fn execute<F, G>(&self, operation: F, fallback: G) -> Outcome<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        G: FnOnce() -> Result<T, E>,
    {
        self.run(move |_| operation(), Some(fallback))
    }

    /// Like [`SyncGuard::execute`], but the operation gets a token that is
    /// cancelled once the deadline passes.
    pub fn execute_with_token<F, G>(&self, operation: F, fallback: Option<G>) -> Outcome<T, E>
    where
        F: FnOnce(CancelToken) -> Result<T, E> + Send + 'static,
        G: FnOnce() -> Result<T, E>,
    {
        self.run(operation, fallback)
    }

    fn run<F, G>(&self, operation: F, fallback: Option<G>) -> Outcome<T, E>
    where
        F: FnOnce(CancelToken) -> Result<T, E> + Send + 'static,
        G: FnOnce() -> Result<T, E>,
    {
        match self.race(operation) {
            Ok(verdict) => self.resolve(verdict, fallback),
            Err(reason) => {
                tracing::warn!(guard = self.config.name, %reason, "call rejected");
                Outcome::Error(GuardError::ResourceExhausted(reason))
            }
        }
    }

    fn race<F>(&self, operation: F) -> Result<Verdict<T, E>, String>
    where
        F: FnOnce(CancelToken) -> Result<T, E> + Send + 'static,
    {
        let permit = self.in_flight.try_acquire()?;
        let deadline = self.config.deadline(Instant::now());
        let slot = Slot::new();
        let token = CancelToken::new();

        let name = self.config.name;
        let worker_slot = slot.clone();
        let worker_token = token.clone();
        thread::Builder::new()
            .name(format!("{name}-worker"))
            .spawn(move || {
                let _permit = permit;
                let result = panic::catch_unwind(AssertUnwindSafe(|| operation(worker_token)))
                    .map_err(Failure::from_panic)
                    .and_then(|result| result.map_err(Failure::Error));

                if !worker_slot.complete(result) {
                    tracing::trace!(guard = name, "discarding late result");
                }
            })
            .map_err(|err| format!("unable to spawn worker thread: {err}"))?;

        match slot.wait_until(deadline) {
            Some(result) => Ok(Verdict::from(result)),
            None => {
                token.cancel();
                Ok(Verdict::TimedOut)
            }
        }
    }

    fn resolve<G>(&self, verdict: Verdict<T, E>, fallback: Option<G>) -> Outcome<T, E>
    where
        G: FnOnce() -> Result<T, E>,
    {
        let cause = match verdict.into_result(self.config.timeout) {
            Ok(value) => return Outcome::Success(value),
            Err(cause) => cause,
        };

        let Some(fallback) = fallback else {
            tracing::debug!(guard = self.config.name, cause = cause.kind(), "no fallback");
            return Outcome::Error(cause);
        };

        tracing::debug!(guard = self.config.name, cause = cause.kind(), "falling back");
        let failure = match panic::catch_unwind(AssertUnwindSafe(fallback)) {
            Ok(Ok(value)) => return Outcome::Fallback(value),
            Ok(Err(err)) => Failure::Error(err),
            Err(payload) => Failure::from_panic(payload),
        };

        tracing::warn!(
            guard = self.config.name,
            failure = failure.kind(),
            "fallback failed"
        );
        Outcome::Error(GuardError::Fallback(failure))
    }
}
