//! # NanoRadio Common Library
//!
//! Shared code for the NanoRadio player crates:
//! - Common error type
//! - Configuration file resolution and TOML loading
//! - Stream URL parsing

pub mod config;
pub mod error;
pub mod url;

pub use error::{Error, Result};
pub use url::StreamUrl;
