//! Error types for mlops-forge operations.
//!
//! Defines error types for all major subsystems:
//! - Parameter normalization and type mapping
//! - Python function extraction
//! - Workflow manifest loading and validation
//! - Component/pipeline spec validation
//! - Component and pipeline synthesis and formalization
//! - Infrastructure artifact generation
//! - External process execution

use thiserror::Error;

/// Errors that can occur while normalizing component or pipeline parameters.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Parameter name must be a string, got '{0}'")]
    NameNotString(String),

    #[error("Duplicate parameter '{0}' found")]
    Duplicate(String),

    #[error("Unsupported type '{type_name}' for parameter '{name}' - only primitive types are supported")]
    UnsupportedType { name: String, type_name: String },

    #[error("Missing type annotation for parameter '{0}'")]
    MissingAnnotation(String),
}

/// Errors that can occur while extracting a function definition from a
/// Python source file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No top-level function definition found in '{0}'")]
    NoFunctionDefinition(String),

    #[error("Unterminated parameter list for function '{0}'")]
    UnterminatedSignature(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading or validating a workflow manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest validation failed: {0}")]
    Validation(String),

    #[error("A cloud schedule requires CI/CD mode - enable use_ci_cd to use Cloud Scheduler")]
    ScheduleRequiresCiCd,

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while validating component descriptors and
/// pipeline structure.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Component '{0}' not found - no matching descriptor in the staging directory")]
    UnknownComponent(String),

    #[error("Step for component '{step}' is missing required key '{key}'")]
    MalformedStep { step: String, key: String },

    #[error("Parameter mapping entry '{0}' must be a 2-element [component_param, pipeline_param] pair")]
    MalformedMapping(String),

    #[error("Parameter mapping must be string-to-string, entry '{0}' is invalid")]
    NonStringMapping(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during component synthesis and formalization.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Component scaffold not found at '{0}' - redeclare the component and rerun generation")]
    ScaffoldNotFound(String),

    #[error("Component '{0}' has no captured source code")]
    MissingSource(String),

    #[error("Source extraction error: {0}")]
    Source(#[from] SourceError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during pipeline synthesis and formalization.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline scaffold not found at '{0}' - redeclare the pipeline and rerun generation")]
    ScaffoldNotFound(String),

    #[error("Duplicate step '{0}' - component names must be unique within a pipeline")]
    DuplicateStep(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Dependency cycle detected involving step '{0}'")]
    DependencyCycle(String),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while generating infrastructure artifacts.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while executing an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Command '{command}' exited with non-zero status {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("Command '{command}' was terminated by a signal")]
    Terminated { command: String },

    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

/// Errors surfaced by the end-to-end orchestration driver.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Infrastructure error: {0}")]
    Infra(#[from] InfraError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
