//! Shared types for the Scanwise services
//!
//! Error taxonomy, the scan event bus, and configuration loading used by the
//! analysis engine and any future members.

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
