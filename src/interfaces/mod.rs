//! Operator-facing interfaces

pub mod cli;
