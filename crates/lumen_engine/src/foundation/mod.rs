//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Logging setup
//! - The fatal error path
//! - Color values and sRGB conversion

pub mod color;
pub mod fail;
pub mod logging;
