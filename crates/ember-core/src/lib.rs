//! Ember Core
//!
//! Shared utilities for the Ember rendering engine: logging setup and
//! CPU profiling scopes.

pub mod logging;
pub mod profiling;
