//! # Linebell Channels
//! Outbound push channel implementations.

pub mod line;

pub use line::LineNotifier;
