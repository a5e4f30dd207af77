//! Core types and utilities for voice-relay
//!
//! This crate provides the error type, configuration, logging setup and the
//! per-user session store shared by the other voice-relay crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod utils;

pub use error::{Error, Result};
