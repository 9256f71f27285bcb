//! Request handlers.

pub mod health;

pub use health::*;
