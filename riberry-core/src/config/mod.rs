//! Configuration types
//!
//! Board-agnostic configuration structures. The daemon deserializes them
//! from TOML; every field has a default so partial files are valid.

pub mod types;

pub use types::*;
