//! Core domain + application logic for the Blinko Telegram relay.
//!
//! This crate is intentionally framework-agnostic. Telegram and the Blinko
//! HTTP API live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notes;
pub mod storage;
pub mod vault;

pub use errors::{Error, Result};
