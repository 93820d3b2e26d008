//! Foundation module - Core utilities shared by the rest of the crate
//!
//! - Logging setup

pub mod logging;
