//! Utility modules shared across the crate: logging setup and a scope guard.

pub mod guard;
pub mod logger;
