//! # Linebell Core
//!
//! Shared building blocks for the Linebell notifier:
//! configuration, the error taxonomy, request/outcome types
//! and the `Notifier` trait that channels implement.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::LinebellConfig;
pub use error::{LinebellError, Result};
pub use traits::Notifier;
pub use types::{DispatchOutcome, DispatchRequest, LockRecord};
