//! # Virtual Tourist Common Library
//!
//! Shared code for the vtour crates:
//! - Error type
//! - Configuration loading (TOML bootstrap, root folder and API key resolution)
//! - Database bootstrap (connection options, schema creation)
//! - Timestamp and UUID helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
