//! Core domain + application logic for the Herald broadcast bot.
//!
//! This crate is intentionally platform-agnostic. Discord lives behind ports
//! (traits) implemented in the adapter crate, so everything here is testable
//! without a live connection.

pub mod audit;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod mentions;
pub mod ports;
pub mod scheduler;
pub mod targets;
pub mod timeparse;

pub use errors::{Error, RangeError, Result};
