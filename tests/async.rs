#![cfg(feature = "async")]

use fallguard::error::{Failure, GuardError};
use fallguard::r#async::AsyncGuard;
use fallguard::{CancelToken, GuardConfig, Outcome};
use parking_lot::Mutex;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const EPSILON_MILLIS: u128 = 40;
const TEST_CONFIG: GuardConfig = GuardConfig::new(Duration::from_millis(100)).with_name("test");

type NoFallback = fn() -> Ready<Result<&'static str, &'static str>>;

async fn service_explodes() -> Result<&'static str, &'static str> {
    panic!("service exploded")
}

async fn fallback_explodes() -> Result<&'static str, &'static str> {
    panic!("fallback exploded")
}

fn guard() -> AsyncGuard<&'static str, &'static str> {
    AsyncGuard::new(TEST_CONFIG).expect("valid config")
}

#[tokio::test]
async fn test_async_fast_success() {
    let t0 = Instant::now();
    let outcome = guard()
        .execute(|| async { Ok("service") }, || async { Ok("fallback") })
        .await;

    assert!(matches!(outcome, Outcome::Success("service")));
    assert!(t0.elapsed().as_millis() < EPSILON_MILLIS);
}

#[tokio::test]
async fn test_async_timeout_triggers_fallback() {
    let t0 = Instant::now();
    let outcome = guard()
        .execute(
            || async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok("service")
            },
            || async { Ok("fallback") },
        )
        .await;

    assert!(matches!(outcome, Outcome::Fallback("fallback")));
    assert!(t0.elapsed() >= Duration::from_millis(100));
    assert!(t0.elapsed().as_millis() < 100 + EPSILON_MILLIS);
}

#[tokio::test]
async fn test_async_failure_and_panic_trigger_fallback() {
    let failed = guard()
        .execute(|| async { Err("broken") }, || async { Ok("fallback") })
        .await;
    assert!(matches!(failed, Outcome::Fallback("fallback")));

    let panicked = guard()
        .execute(service_explodes, || async { Ok("fallback") })
        .await;
    assert!(matches!(panicked, Outcome::Fallback("fallback")));
}

#[tokio::test]
async fn test_async_fallback_failure() {
    let outcome = guard()
        .execute(|| async { Err("primary") }, || async { Err("secondary") })
        .await;
    assert!(matches!(
        outcome,
        Outcome::Error(GuardError::Fallback(Failure::Error("secondary")))
    ));

    let outcome = guard()
        .execute(|| async { Err("primary") }, fallback_explodes)
        .await;
    match outcome {
        Outcome::Error(GuardError::Fallback(Failure::Panic(message))) => {
            assert_eq!(message, "fallback exploded")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_async_without_fallback() {
    let t0 = Instant::now();
    let outcome = guard().call(|| async { Err("primary") }).await;
    assert!(matches!(
        outcome,
        Outcome::Error(GuardError::Operation(Failure::Error("primary")))
    ));
    assert!(t0.elapsed().as_millis() < EPSILON_MILLIS);

    let outcome = guard()
        .execute_with_token(
            |_| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok("service")
            },
            None::<NoFallback>,
        )
        .await;
    assert!(matches!(outcome, Outcome::Error(GuardError::Timeout(_))));
}

#[tokio::test]
async fn test_async_registered_fallback() {
    let guard = guard().with_fallback(|| ready(Ok("I am fallback text")));
    let outcome = guard
        .call(|| async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok("I am service text")
        })
        .await;
    assert_eq!(outcome.to_string(), "I am fallback text");
}

#[tokio::test]
async fn test_async_timed_out_task_is_cancelled() {
    let finished = Arc::new(AtomicBool::new(false));
    let t_finished = finished.clone();
    let guard = guard();

    let outcome = guard
        .execute(
            move || async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                t_finished.store(true, Ordering::SeqCst);
                Ok("late")
            },
            || async { Ok("fallback") },
        )
        .await;
    assert!(matches!(outcome, Outcome::Fallback("fallback")));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!finished.load(Ordering::SeqCst), "aborted task kept running");
    assert_eq!(guard.in_flight(), 0);
}

#[tokio::test]
async fn test_async_token_live_while_within_deadline() {
    let outcome = guard()
        .execute_with_token(
            |token| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(if token.is_cancelled() { "cancelled" } else { "live" })
            },
            None::<NoFallback>,
        )
        .await;

    assert!(matches!(outcome, Outcome::Success("live")));
}

#[tokio::test]
async fn test_async_blocking_operation() {
    let t0 = Instant::now();
    let outcome = guard()
        .execute_blocking(
            || {
                std::thread::sleep(Duration::from_millis(300));
                Ok("service")
            },
            || async { Ok("fallback") },
        )
        .await;

    assert!(matches!(outcome, Outcome::Fallback("fallback")));
    assert!(t0.elapsed().as_millis() < 100 + EPSILON_MILLIS);

    let outcome = guard()
        .execute_blocking(|| Ok("service"), || async { Ok("fallback") })
        .await;
    assert!(matches!(outcome, Outcome::Success("service")));
}

#[tokio::test]
async fn test_async_in_flight_limit() {
    let config = TEST_CONFIG.with_max_in_flight(1);
    let guard = AsyncGuard::<&str, &str>::new(config).expect("valid config");

    let outcome = guard
        .execute_blocking(
            || {
                std::thread::sleep(Duration::from_millis(250));
                Ok("service")
            },
            || async { Ok("fallback") },
        )
        .await;
    assert!(matches!(outcome, Outcome::Fallback("fallback")));

    let rejected = guard
        .execute(|| async { Ok("service") }, || async { Ok("fallback") })
        .await;
    assert!(matches!(
        rejected,
        Outcome::Error(GuardError::ResourceExhausted(_))
    ));
}

#[tokio::test]
async fn test_async_operation_closure_panic_triggers_fallback() {
    let guard = guard();
    let outcome = guard
        .execute(
            || -> Ready<Result<&'static str, &'static str>> { panic!("closure exploded") },
            || async { Ok("fallback") },
        )
        .await;

    assert!(matches!(outcome, Outcome::Fallback("fallback")));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(guard.in_flight(), 0);
}

#[tokio::test]
async fn test_async_blocking_panic_triggers_fallback() {
    let outcome = guard()
        .execute_blocking(
            || -> Result<&'static str, &'static str> { panic!("blocking exploded") },
            || async { Ok("fallback") },
        )
        .await;
    assert!(matches!(outcome, Outcome::Fallback("fallback")));

    let outcome = guard()
        .execute_blocking(
            || -> Result<&'static str, &'static str> { panic!("blocking exploded") },
            fallback_explodes,
        )
        .await;
    assert!(matches!(
        outcome,
        Outcome::Error(GuardError::Fallback(Failure::Panic(_)))
    ));
}

#[tokio::test]
async fn test_async_dropped_call_stops_primary() {
    let finished = Arc::new(AtomicBool::new(false));
    let t_finished = finished.clone();
    let seen_token = Arc::new(Mutex::new(None::<CancelToken>));
    let t_seen_token = seen_token.clone();
    let guard = guard();

    let call = guard.execute_with_token(
        move |token| async move {
            *t_seen_token.lock() = Some(token);
            tokio::time::sleep(Duration::from_millis(300)).await;
            t_finished.store(true, Ordering::SeqCst);
            Ok("service")
        },
        Some(|| async { Ok("fallback") }),
    );
    let dropped = tokio::time::timeout(Duration::from_millis(20), call).await;
    assert!(dropped.is_err(), "call should still have been pending");

    let token = seen_token.lock().take().expect("operation never started");
    assert!(token.is_cancelled());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!finished.load(Ordering::SeqCst), "primary outlived its caller");
    assert_eq!(guard.in_flight(), 0);
}

#[tokio::test]
async fn test_async_unbounded_timeout_does_not_overflow() {
    let guard =
        AsyncGuard::<u8, ()>::new(GuardConfig::new(Duration::MAX)).expect("valid config");
    let outcome = guard.execute(|| async { Ok(1) }, || async { Ok(2) }).await;
    assert!(matches!(outcome, Outcome::Success(1)));
}
