//! Common Utilities and Types Library
//! 
//! This crate provides the GSM primitive types and utilities shared by the
//! transceiver bridge crates.

pub mod types;
pub mod utils;

// Re-export commonly used items
pub use types::*;
pub use utils::*;
