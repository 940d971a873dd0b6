//! The component descriptor model.
//!
//! A `ComponentSpec` is the intermediate representation of one pipeline
//! step. It is created in staging form (image sentinel, bootstrap command
//! carrying the captured function source) and rewritten into its final form
//! (registry image reference, canonical launch command) at formalization.

use serde::{Deserialize, Serialize};

use crate::spec::params::ParameterSpec;

/// Image sentinel recorded on a staged descriptor before formalization.
pub const IMAGE_PLACEHOLDER: &str = "TBD";

/// Container execution details of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Image reference; [`IMAGE_PLACEHOLDER`] until formalized.
    pub image: String,
    /// Startup command. Staged: a `sh -c` bootstrap plus the captured
    /// function source. Final: `python3 /pipelines/component/src/<name>.py`.
    pub command: Vec<String>,
    /// Fixed two-flag argument convention. The executor input value is a
    /// runtime-injected placeholder mapping, so entries are raw YAML values.
    pub args: Vec<serde_yaml::Value>,
}

/// Implementation section of a component descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub container: Container,
}

/// The structured descriptor of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Display and on-disk identifier; must be unique within a pipeline.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered, normalized input parameters.
    pub inputs: Vec<ParameterSpec>,
    pub implementation: Implementation,
    /// Per-component image override declared in the manifest. Carried on
    /// the staged descriptor only; consumed and removed at formalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image_override: Option<String>,
}

impl ComponentSpec {
    /// Creates a staged component spec with the image sentinel in place.
    pub fn staged(
        name: impl Into<String>,
        description: Option<String>,
        inputs: Vec<ParameterSpec>,
        command: Vec<String>,
        base_image_override: Option<String>,
    ) -> Self {
        let name = name.into();
        let args = executor_args(&name);
        Self {
            name,
            description,
            inputs,
            implementation: Implementation {
                container: Container {
                    image: IMAGE_PLACEHOLDER.to_string(),
                    command,
                    args,
                },
            },
            base_image_override,
        }
    }

    /// The captured custom source code, stored as the last command element
    /// of a staged descriptor.
    pub fn custom_code(&self) -> Option<&str> {
        self.implementation
            .container
            .command
            .last()
            .map(String::as_str)
    }
}

/// Builds the fixed `--executor_input` / `--function_to_execute` argument
/// list for a component.
pub fn executor_args(name: &str) -> Vec<serde_yaml::Value> {
    let mut placeholder = serde_yaml::Mapping::new();
    placeholder.insert(
        serde_yaml::Value::String("executorInput".to_string()),
        serde_yaml::Value::Null,
    );
    vec![
        serde_yaml::Value::String("--executor_input".to_string()),
        serde_yaml::Value::Mapping(placeholder),
        serde_yaml::Value::String("--function_to_execute".to_string()),
        serde_yaml::Value::String(name.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::params::DEFAULT_DESCRIPTION;

    fn sample_spec() -> ComponentSpec {
        ComponentSpec::staged(
            "create_dataset",
            Some("Loads data.".to_string()),
            vec![ParameterSpec {
                name: "bq_table".to_string(),
                param_type: "String".to_string(),
                description: DEFAULT_DESCRIPTION.to_string(),
            }],
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "pip install pandas".to_string(),
                "def create_dataset(bq_table: str):\n    pass\n".to_string(),
            ],
            None,
        )
    }

    #[test]
    fn test_staged_spec_uses_image_placeholder() {
        let spec = sample_spec();
        assert_eq!(spec.implementation.container.image, IMAGE_PLACEHOLDER);
    }

    #[test]
    fn test_custom_code_is_last_command_element() {
        let spec = sample_spec();
        assert!(spec.custom_code().expect("code present").starts_with("def create_dataset"));
    }

    #[test]
    fn test_executor_args_convention() {
        let args = executor_args("create_dataset");
        assert_eq!(args.len(), 4);
        assert_eq!(args[0], serde_yaml::Value::String("--executor_input".into()));
        assert_eq!(args[2], serde_yaml::Value::String("--function_to_execute".into()));
        assert_eq!(args[3], serde_yaml::Value::String("create_dataset".into()));
    }

    #[test]
    fn test_descriptor_yaml_round_trip() {
        let spec = sample_spec();
        let yaml = serde_yaml::to_string(&spec).expect("serialize");
        let back: ComponentSpec = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, spec);
        // The override field must not appear when unset.
        assert!(!yaml.contains("base_image_override"));
    }
}
