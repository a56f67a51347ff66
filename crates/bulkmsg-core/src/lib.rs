//! Core of the bulk-message dispatch engine.
//!
//! This crate is intentionally transport-agnostic. The messaging gateway and
//! the notification store live behind ports (traits) implemented in adapter
//! crates such as `bulkmsg-gateway`.

pub mod config;
pub mod devices;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod pairing;
pub mod phone;
pub mod ports;
pub mod recipients;
#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
