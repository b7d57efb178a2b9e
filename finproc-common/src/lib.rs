//! # finproc Common Library
//!
//! Shared code for the finance document-processing services:
//! - Error type
//! - Bootstrap configuration loading and resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use config::{ConfigOverrides, ServiceConfig, TomlConfig};
pub use error::{Error, Result};
