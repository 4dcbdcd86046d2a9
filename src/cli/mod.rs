//! CLI-specific functionality for dockhand
//!
//! Argument parsing and the translation of flags into configuration
//! overrides and pipeline options.

pub mod args;

pub use args::Args;
