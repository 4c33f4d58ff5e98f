//! Configuration loading
//!
//! The default configuration is compiled in; a file on disk replaces it
//! when given on the command line. Either way the result is validated
//! before any hardware is touched.

pub mod loader;

pub use loader::load;
