//! Bounded execution with fallback.
//!
//! A guard runs an operation on its own execution unit, races it against a
//! deadline and substitutes a fallback result when the operation is too slow
//! or fails. Each call is independent: nothing is accumulated across calls.
//!
//! ```no_run
//! use fallguard::sync::SyncGuard;
//! use fallguard::GuardConfig;
//! use std::time::Duration;
//!
//! let guard = SyncGuard::<String, String>::new(GuardConfig::new(Duration::from_millis(3000)))
//!     .unwrap()
//!     .with_fallback(|| Ok("I am fallback text".to_owned()));
//!
//! let outcome = guard.call(|| Ok("I am service text".to_owned()));
//! println!("{outcome}");
//! ```
mod cancel;
mod config;
mod permit;
mod state;

pub mod error;
pub mod outcome;
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

pub use cancel::{CancelToken, Cancelled};
pub use config::GuardConfig;
pub use outcome::Outcome;
