use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::cancel::CancelToken;
use crate::error::{ConfigError, Failure, GuardError};
use crate::permit::TaskSlots;
use crate::state::Verdict;
use crate::{GuardConfig, Outcome};

type FallbackFn<T, E> = dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync;

/// A spawned primary operation. Dropping it before the task has joined
/// cancels the token and aborts the task, whether the deadline fired or the
/// caller dropped the call.
struct Primary<R> {
    handle: JoinHandle<R>,
    token: CancelToken,
    joined: bool,
}

impl<R> Primary<R> {
    fn new(handle: JoinHandle<R>, token: CancelToken) -> Self {
        Primary {
            handle,
            token,
            joined: false,
        }
    }
}

impl<R> Drop for Primary<R> {
    fn drop(&mut self) {
        if !self.joined {
            self.token.cancel();
            self.handle.abort();
        }
    }
}

/// Runs futures as separate tokio tasks and races them against a tokio timer.
///
/// Must be used from within a tokio runtime. A timed out task is cancelled
/// through its [`CancelToken`] and then aborted; futures that never yield
/// cannot be aborted and should go through [`AsyncGuard::execute_blocking`].
pub struct AsyncGuard<T, E> {
    config: GuardConfig,
    fallback: Option<Arc<FallbackFn<T, E>>>,
    in_flight: TaskSlots,
}

impl<T, E> Clone for AsyncGuard<T, E> {
    fn clone(&self) -> Self {
        AsyncGuard {
            config: self.config.clone(),
            fallback: self.fallback.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<T, E> AsyncGuard<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(AsyncGuard {
            in_flight: TaskSlots::new(config.max_in_flight),
            config,
            fallback: None,
        })
    }

    pub fn with_fallback<G, GFut>(mut self, fallback: G) -> Self
    where
        G: Fn() -> GFut + Send + Sync + 'static,
        GFut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move || fallback().boxed()));
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.running()
    }

    pub async fn call<F, Fut>(&self, operation: F) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fallback = self.fallback.clone();
        self.run(move |_| operation(), fallback.map(|f| move || f()))
            .await
    }

    pub async fn execute<F, Fut, G, GFut>(&self, operation: F, fallback: G) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        self.run(move |_| operation(), Some(fallback)).await
    }

    pub async fn execute_with_token<F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: Option<G>,
    ) -> Outcome<T, E>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        self.run(operation, fallback).await
    }

    /// Runs a blocking closure on tokio's blocking pool. The timer keeps
    /// running even when the closure never yields; a timed out closure is
    /// left to finish on its own.
    pub async fn execute_blocking<F, G, GFut>(&self, operation: F, fallback: G) -> Outcome<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        let permit = match self.admit() {
            Ok(permit) => permit,
            Err(rejected) => return rejected,
        };
        let deadline = self.deadline();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            operation()
        });

        let verdict = self.race(Primary::new(handle, CancelToken::new()), deadline).await;
        self.resolve(verdict, Some(fallback)).await
    }

    async fn run<F, Fut, G, GFut>(&self, operation: F, fallback: Option<G>) -> Outcome<T, E>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        let permit = match self.admit() {
            Ok(permit) => permit,
            Err(rejected) => return rejected,
        };
        let deadline = self.deadline();
        let token = CancelToken::new();
        let worker_token = token.clone();
        // the closure itself runs on the task so its panics are captured too
        let handle = tokio::spawn(async move {
            let _permit = permit;
            operation(worker_token).await
        });

        let verdict = self.race(Primary::new(handle, token), deadline).await;
        self.resolve(verdict, fallback).await
    }

    fn deadline(&self) -> Instant {
        Instant::from_std(self.config.deadline(std::time::Instant::now()))
    }

    fn admit(&self) -> Result<OwnedSemaphorePermit, Outcome<T, E>> {
        self.in_flight.try_acquire().map_err(|reason| {
            tracing::warn!(guard = self.config.name, %reason, "call rejected");
            Outcome::Error(GuardError::ResourceExhausted(reason))
        })
    }

    async fn race(&self, mut primary: Primary<Result<T, E>>, deadline: Instant) -> Verdict<T, E> {
        // deadline is polled first so it wins ties
        tokio::select! {
            biased;
            _ = sleep_until(deadline) => Verdict::TimedOut,
            joined = &mut primary.handle => {
                primary.joined = true;
                match joined {
                    Ok(result) => Verdict::from(result.map_err(Failure::Error)),
                    Err(err) if err.is_panic() => {
                        Verdict::Failed(Failure::from_panic(err.into_panic()))
                    }
                    Err(_) => Verdict::Failed(Failure::Cancelled),
                }
            }
        }
    }

    async fn resolve<G, GFut>(&self, verdict: Verdict<T, E>, fallback: Option<G>) -> Outcome<T, E>
    where
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
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
        let failure = match AssertUnwindSafe(async move { fallback().await })
            .catch_unwind()
            .await
        {
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
