//! Staging of the pipeline declaration.
//!
//! Validates the declared steps against the staged components, normalizes
//! the pipeline-level parameters, checks the dependency graph, and persists
//! the resulting `PipelineSpec` as the pipeline scaffold. The formalizer
//! consumes that scaffold exactly once.

use crate::config::ProjectLayout;
use crate::error::PipelineError;
use crate::manifest::PipelineDecl;
use crate::spec::{normalize, validate_pipeline_structure, PipelineSpec, StepGraph};
use crate::utils;

/// Validates the pipeline declaration and writes the staged pipeline spec.
pub fn create_pipeline_scaffold(
    decl: &PipelineDecl,
    known_component_names: &[String],
    layout: &ProjectLayout,
) -> Result<PipelineSpec, PipelineError> {
    let params = normalize(&decl.params)?;
    let steps = validate_pipeline_structure(&decl.steps, known_component_names)?;
    // Reject unknown dependencies and cycles before anything is persisted.
    StepGraph::build(&steps)?;

    let spec = PipelineSpec {
        name: decl.resolved_name().to_string(),
        description: decl.description.clone(),
        params,
        steps,
    };
    utils::write_file(&layout.staged_pipeline(), &serde_yaml::to_string(&spec)?)?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::params::RawParameter;
    use crate::spec::pipeline::StepDecl;
    use tempfile::TempDir;

    fn sample_decl() -> PipelineDecl {
        PipelineDecl {
            name: Some("training-pipeline".to_string()),
            description: Some("Trains and deploys.".to_string()),
            params: vec![
                RawParameter::new("bq_table", "str"),
                RawParameter::new("data_path", "str"),
            ],
            steps: vec![
                StepDecl::new("create_dataset", &[("bq_table", "bq_table")]),
                StepDecl::new("train_model", &[("data_path", "data_path")]),
            ],
        }
    }

    #[test]
    fn test_scaffold_persists_validated_spec() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let known = vec!["create_dataset".to_string(), "train_model".to_string()];

        let spec = create_pipeline_scaffold(&sample_decl(), &known, &layout).expect("valid");
        assert_eq!(spec.name, "training-pipeline");
        assert_eq!(spec.params[0].param_type, "String");
        assert!(layout.staged_pipeline().is_file());

        let text = utils::read_file(&layout.staged_pipeline()).expect("read scaffold");
        let loaded: PipelineSpec = serde_yaml::from_str(&text).expect("scaffold parses");
        assert_eq!(loaded, spec);
    }

    #[test]
    fn test_scaffold_rejects_unknown_component() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let known = vec!["create_dataset".to_string()];

        let err = create_pipeline_scaffold(&sample_decl(), &known, &layout)
            .expect_err("train_model was never staged");
        assert!(err.to_string().contains("train_model"));
        assert!(!layout.staged_pipeline().exists());
    }

    #[test]
    fn test_scaffold_rejects_cycles() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let known = vec!["a".to_string(), "b".to_string()];
        let decl = PipelineDecl {
            name: None,
            description: None,
            params: vec![],
            steps: vec![
                StepDecl::new("a", &[]).with_depends_on(&["b"]),
                StepDecl::new("b", &[]).with_depends_on(&["a"]),
            ],
        };

        let err = create_pipeline_scaffold(&decl, &known, &layout).expect_err("cycle");
        assert!(matches!(err, PipelineError::DependencyCycle(_)));
    }
}
