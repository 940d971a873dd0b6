//! mlops-forge: MLOps project generator for ML workflows.
//!
//! This library converts a declared machine-learning workflow (annotated
//! Python component functions plus a workflow manifest) into a deployable
//! MLOps project: containerized components, a compiled pipeline
//! specification, CI/CD build configuration and infrastructure
//! provisioning artifacts.

// Core modules
pub mod cli;
pub mod component;
pub mod config;
pub mod error;
pub mod infra;
pub mod manifest;
pub mod orchestrator;
pub mod pipeline;
pub mod process;
pub mod source;
pub mod spec;
pub mod utils;

// Re-export commonly used error types
pub use error::{
    ComponentError, InfraError, ManifestError, OrchestratorError, ParameterError, PipelineError,
    ProcessError, SourceError, ValidationError,
};
