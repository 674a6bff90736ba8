//! Volley Core
//!
//! Shared plumbing for the Volley crates: logging setup, profiling hooks and
//! the hash collections used for bookkeeping.

pub mod alloc;
pub mod logging;
pub mod profiling;
