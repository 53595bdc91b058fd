//! # scenescope-core
//!
//! Core types shared across all scenescope crates:
//! error types, configuration and the virtual clock used to time animations.

pub mod config;
pub mod error;
pub mod time;

pub use config::*;

pub use error::{ScopeError, ScopeResult};
pub use time::{format_seconds, Clock};
