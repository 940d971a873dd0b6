//! Structural validation of component descriptors and pipeline wiring.
//!
//! Pure checks, run before synthesis proceeds: whether a YAML document
//! qualifies as a component descriptor, and whether every step of a
//! pipeline references a known component with a well-formed parameter
//! mapping.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ValidationError;
use crate::spec::pipeline::{PipelineStep, StepDecl};
use crate::utils;

/// Keys a YAML mapping must carry to qualify as a component descriptor.
const REQUIRED_DESCRIPTOR_KEYS: [&str; 3] = ["name", "inputs", "implementation"];

/// Returns true iff the document is a mapping containing all required
/// descriptor keys. Extra keys are ignored.
pub fn is_component_descriptor(doc: &serde_yaml::Value) -> bool {
    match doc.as_mapping() {
        Some(mapping) => REQUIRED_DESCRIPTOR_KEYS
            .iter()
            .all(|key| mapping.contains_key(serde_yaml::Value::from(*key))),
        None => false,
    }
}

/// Lists the staged component descriptor files in a staging directory,
/// filtering out anything that is not genuinely a component descriptor.
pub fn list_staged_components(staging_dir: &Path) -> Result<Vec<PathBuf>, ValidationError> {
    let mut components = Vec::new();
    for entry in WalkDir::new(staging_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| {
            ValidationError::Io(err.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
            }))
        })?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }
        let text = utils::read_file(path)?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&text)?;
        if is_component_descriptor(&doc) {
            components.push(path.to_path_buf());
        }
    }
    Ok(components)
}

/// Names of the staged components (descriptor file stems).
pub fn staged_component_names(staging_dir: &Path) -> Result<Vec<String>, ValidationError> {
    Ok(list_staged_components(staging_dir)?
        .iter()
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()))
        .map(str::to_string)
        .collect())
}

/// Validates the declared steps against the set of known component names
/// and converts them into their checked form.
///
/// Each step must name a known component and carry a mapping; every
/// mapping entry must be a 2-element sequence of strings.
pub fn validate_pipeline_structure(
    steps: &[StepDecl],
    known_component_names: &[String],
) -> Result<Vec<PipelineStep>, ValidationError> {
    let mut validated = Vec::with_capacity(steps.len());
    for step in steps {
        if !known_component_names.contains(&step.component) {
            return Err(ValidationError::UnknownComponent(step.component.clone()));
        }
        let mapping = step.mapping.as_ref().ok_or_else(|| {
            ValidationError::MalformedStep {
                step: step.component.clone(),
                key: "mapping".to_string(),
            }
        })?;
        let mut param_mapping = Vec::with_capacity(mapping.len());
        for entry in mapping {
            let rendered = || {
                serde_yaml::to_string(entry)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_else(|_| format!("{entry:?}"))
            };
            let pair = entry
                .as_sequence()
                .ok_or_else(|| ValidationError::MalformedMapping(rendered()))?;
            if pair.len() != 2 {
                return Err(ValidationError::MalformedMapping(rendered()));
            }
            match (pair[0].as_str(), pair[1].as_str()) {
                (Some(component_param), Some(pipeline_param)) => {
                    param_mapping.push((component_param.to_string(), pipeline_param.to_string()));
                }
                _ => return Err(ValidationError::NonStringMapping(rendered())),
            }
        }
        validated.push(PipelineStep {
            component_name: step.component.clone(),
            param_mapping,
            depends_on: step.depends_on.clone(),
            resources: step.resources.clone(),
        });
    }
    Ok(validated)
}
