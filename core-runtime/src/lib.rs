//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playlist mirror core:
//! - Logging and tracing infrastructure
//! - Configuration management (capabilities, sync tuning, credentials)
//!
//! ## Overview
//!
//! Every other `core-*` and `provider-*` crate reads its settings from the
//! [`CoreConfig`](config::CoreConfig) built here and logs through the
//! subscriber installed by [`init_logging`](logging::init_logging).

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
