//! The pipeline spec: component wiring, runtime parameters and step
//! resource extensions.

use serde::{Deserialize, Serialize};

use crate::spec::params::ParameterSpec;

/// Pipeline name used when the manifest declares none.
pub const DEFAULT_PIPELINE_NAME: &str = "mlopsforge-pipeline";

/// One pipeline step as declared in the workflow manifest, before
/// structural validation.
///
/// The mapping entries are kept as raw YAML values so malformed shapes
/// (wrong arity, non-string elements) can be reported precisely instead of
/// failing opaquely at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDecl {
    /// Name of the component this step runs.
    pub component: String,
    /// Pairs of `[component_param, pipeline_param]`.
    #[serde(default)]
    pub mapping: Option<Vec<serde_yaml::Value>>,
    /// Explicit upstream steps. Empty means "after the previous step".
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Custom compute/accelerator configuration for this step.
    #[serde(default)]
    pub resources: Option<StepResources>,
}

impl StepDecl {
    /// Creates a step declaration with a well-formed mapping.
    pub fn new(component: impl Into<String>, mapping: &[(&str, &str)]) -> Self {
        let mapping = mapping
            .iter()
            .map(|(component_param, pipeline_param)| {
                serde_yaml::Value::Sequence(vec![
                    serde_yaml::Value::String((*component_param).to_string()),
                    serde_yaml::Value::String((*pipeline_param).to_string()),
                ])
            })
            .collect();
        Self {
            component: component.into(),
            mapping: Some(mapping),
            depends_on: Vec::new(),
            resources: None,
        }
    }

    /// Adds explicit upstream dependencies.
    pub fn with_depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Attaches custom resource requirements.
    pub fn with_resources(mut self, resources: StepResources) -> Self {
        self.resources = Some(resources);
        self
    }
}

/// Custom compute configuration for a resourced step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResources {
    /// Machine type for the custom training job.
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_count: Option<u32>,
    #[serde(default = "default_replica_count")]
    pub replica_count: u32,
}

fn default_machine_type() -> String {
    "n1-standard-4".to_string()
}

fn default_replica_count() -> u32 {
    1
}

impl Default for StepResources {
    fn default() -> Self {
        Self {
            machine_type: default_machine_type(),
            accelerator_type: None,
            accelerator_count: None,
            replica_count: default_replica_count(),
        }
    }
}

/// One validated pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub component_name: String,
    /// Pairs of `(component_param, pipeline_param)`.
    pub param_mapping: Vec<(String, String)>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<StepResources>,
}

/// The validated wiring between components, consumed exactly once by the
/// pipeline synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Pipeline-level runtime parameters.
    pub params: Vec<ParameterSpec>,
    /// Steps in declaration order.
    pub steps: Vec<PipelineStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decl_builder_produces_pairs() {
        let step = StepDecl::new("create_dataset", &[("bq_table", "bq_table")]);
        let mapping = step.mapping.expect("mapping present");
        assert_eq!(mapping.len(), 1);
        match &mapping[0] {
            serde_yaml::Value::Sequence(pair) => assert_eq!(pair.len(), 2),
            other => panic!("unexpected mapping entry: {other:?}"),
        }
    }

    #[test]
    fn test_step_resources_defaults() {
        let resources: StepResources = serde_yaml::from_str("accelerator_type: NVIDIA_TESLA_T4")
            .expect("partial resources deserialize");
        assert_eq!(resources.machine_type, "n1-standard-4");
        assert_eq!(resources.replica_count, 1);
        assert_eq!(resources.accelerator_type.as_deref(), Some("NVIDIA_TESLA_T4"));
    }

    #[test]
    fn test_pipeline_spec_yaml_round_trip() {
        let spec = PipelineSpec {
            name: "training-pipeline".to_string(),
            description: None,
            params: vec![],
            steps: vec![PipelineStep {
                component_name: "train_model".to_string(),
                param_mapping: vec![("data_path".to_string(), "data_path".to_string())],
                depends_on: vec!["create_dataset".to_string()],
                resources: None,
            }],
        };
        let yaml = serde_yaml::to_string(&spec).expect("serialize");
        let back: PipelineSpec = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, spec);
    }
}
