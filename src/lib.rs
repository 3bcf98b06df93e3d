//! Clicktrail - first-party click-to-conversion attribution
//!
//! Tracking links resolve to an opaque identifier, the redirect endpoint
//! records the click and keeps a signed per-visitor session, and a
//! conversion trigger distributes fractional credit over the session's
//! identifiers before handing reports to a retrying delivery queue.
//!
//! # Architecture
//! - `tracking`: click recording, consent, bot filtering, weighting, attribution
//! - `session`: signed visitor cookies and their transports
//! - `storage`: SeaORM persistence (definitions, clicks, conversions, jobs)
//! - `queue`: retry policy, report queue and the background scheduler
//! - `reporters`: downstream conversion delivery
//! - `api`: HTTP services and middleware
//! - `interfaces`: operator CLI
//! - `config`: Configuration management
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: logging bootstrap

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod interfaces;
pub mod queue;
pub mod reporters;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod system;
pub mod tracking;
pub mod utils;
