//! # Linebell Scheduler
//!
//! Everything a scheduled trigger needs around the actual send.
//!
//! ## Architecture
//! ```text
//! cron / CI trigger
//!   └── run_once
//!         ├── ExclusivityGuard::acquire  (.run.lock, TTL 30min)
//!         ├── Notifier::send             (one attempt, no retry)
//!         └── RunLock release            (also on error / panic)
//! ```

pub mod lock;
pub mod run;

pub use lock::{ExclusivityGuard, RunLock};
pub use run::run_once;
