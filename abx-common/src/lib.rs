//! # ABX Common Library
//!
//! Shared code for the ABX experiment service including:
//! - Database schema and initialization
//! - Domain models (tests, variants, events) and their enums
//! - Error taxonomy
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
