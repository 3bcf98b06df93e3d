//! System-level modules
//!
//! Currently only the tracing/logging bootstrap lives here; lifecycle handling
//! is in `runtime::lifetime`.

pub mod logging;
