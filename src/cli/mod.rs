//! Command-line interface for mlops-forge.
//!
//! Provides commands for generating the MLOps project, provisioning
//! resources and submitting the pipeline.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
