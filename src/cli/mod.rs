//! Command Line Interface (CLI) layer for safetree.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for single-product, single-file
//! and batch inspection. It wires user-provided options to the library
//! functionality exposed via `safetree::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
