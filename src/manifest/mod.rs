//! The workflow manifest: the user-facing declaration of a workflow.
//!
//! A manifest names the component source files, wires them into a pipeline
//! (params, steps, mappings, optional explicit dependencies and custom
//! resources), provides the concrete runtime parameter values and sets the
//! environment options. It is validated up front, before any artifact is
//! written, and resolved once into the immutable [`DefaultsConfig`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{
    DefaultsConfig, GcpConfig, PipelinePaths, ProjectLayout, NO_SCHEDULE, NO_VPC,
};
use crate::error::ManifestError;
use crate::spec::params::{normalize, RawParameter};
use crate::spec::pipeline::{StepDecl, DEFAULT_PIPELINE_NAME};
use crate::utils;

/// One component declaration: a Python source file plus packaging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDecl {
    /// Path to the Python file containing the component function.
    pub source: PathBuf,
    /// Packages installed before the function executes.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Optional container image override for this component. When absent
    /// the shared component base image is used.
    #[serde(default)]
    pub image: Option<String>,
}

/// The pipeline declaration: runtime parameters and ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Pipeline-level runtime parameters.
    #[serde(default)]
    pub params: Vec<RawParameter>,
    /// Steps in declaration order.
    pub steps: Vec<StepDecl>,
}

impl PipelineDecl {
    /// The pipeline name, falling back to the default.
    pub fn resolved_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_PIPELINE_NAME)
    }
}

/// Environment options, all optional with the same defaults the generated
/// project documents in its defaults file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestOptions {
    pub af_registry_location: String,
    pub af_registry_name: String,
    pub base_image: String,
    pub cb_trigger_location: String,
    pub cb_trigger_name: String,
    pub cloud_run_location: String,
    pub cloud_run_name: String,
    pub cloud_schedule_location: String,
    pub cloud_schedule_name: String,
    /// Cron pattern for scheduled retrain runs. Requires CI/CD mode.
    pub schedule_pattern: Option<String>,
    pub cloud_source_repository: String,
    pub cloud_source_repository_branch: String,
    pub cloud_tasks_queue_location: String,
    pub cloud_tasks_queue_name: String,
    pub gs_bucket_location: String,
    /// Bucket name; defaults to `<project_id>-bucket`.
    pub gs_bucket_name: Option<String>,
    /// Service account; defaults to the project's vertex-pipelines account.
    pub pipeline_runner_service_account: Option<String>,
    /// Whether to generate and use the Cloud Build + Cloud Run CI/CD flow.
    pub use_ci_cd: bool,
    /// Strict descriptor naming (lowercase, underscores).
    pub use_vendor_spec: bool,
    pub vpc_connector: Option<String>,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            af_registry_location: "us-central1".to_string(),
            af_registry_name: "vertex-mlops-af".to_string(),
            base_image: "python:3.9-slim".to_string(),
            cb_trigger_location: "us-central1".to_string(),
            cb_trigger_name: "mlopsforge-trigger".to_string(),
            cloud_run_location: "us-central1".to_string(),
            cloud_run_name: "run-pipeline".to_string(),
            cloud_schedule_location: "us-central1".to_string(),
            cloud_schedule_name: "MLOpsForge-schedule".to_string(),
            schedule_pattern: None,
            cloud_source_repository: "MLOpsForge-repo".to_string(),
            cloud_source_repository_branch: "mlopsforge".to_string(),
            cloud_tasks_queue_location: "us-central1".to_string(),
            cloud_tasks_queue_name: "queueing-svc".to_string(),
            gs_bucket_location: "us-central1".to_string(),
            gs_bucket_name: None,
            pipeline_runner_service_account: None,
            use_ci_cd: false,
            use_vendor_spec: false,
            vpc_connector: None,
        }
    }
}

/// The complete workflow manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowManifest {
    /// The GCP project ID.
    pub project_id: String,
    /// Component declarations.
    pub components: Vec<ComponentDecl>,
    /// The pipeline wiring.
    pub pipeline: PipelineDecl,
    /// Concrete runtime parameter values for pipeline submission.
    #[serde(default)]
    pub parameter_values: serde_json::Map<String, serde_json::Value>,
    /// Environment options.
    #[serde(default)]
    pub options: ManifestOptions,
}

impl WorkflowManifest {
    /// Loads a manifest from a YAML file. Component source paths are
    /// interpreted relative to the manifest's directory.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = utils::read_file(path)?;
        let mut manifest: Self = serde_yaml::from_str(&text)?;
        if let Some(base) = path.parent() {
            for component in &mut manifest.components {
                if component.source.is_relative() {
                    component.source = base.join(&component.source);
                }
            }
        }
        Ok(manifest)
    }

    /// Validates the manifest before any artifact is written.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.components.is_empty() {
            return Err(ManifestError::Validation(
                "manifest declares no components".to_string(),
            ));
        }
        if self.pipeline.steps.is_empty() {
            return Err(ManifestError::Validation(
                "pipeline declares no steps".to_string(),
            ));
        }
        if self.options.schedule_pattern.is_some() && !self.options.use_ci_cd {
            return Err(ManifestError::ScheduleRequiresCiCd);
        }
        for component in &self.components {
            if !component.source.is_file() {
                return Err(ManifestError::Validation(format!(
                    "component source '{}' not found",
                    component.source.display()
                )));
            }
        }
        // Surface bad pipeline parameter declarations early.
        normalize(&self.pipeline.params)?;
        Ok(())
    }

    /// Resolves the immutable defaults record for this generation run.
    pub fn resolve_defaults(&self) -> DefaultsConfig {
        let options = &self.options;
        let gs_bucket_name = options
            .gs_bucket_name
            .clone()
            .unwrap_or_else(|| format!("{}-bucket", self.project_id));
        let pipeline_runner_service_account = options
            .pipeline_runner_service_account
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "vertex-pipelines@{}.iam.gserviceaccount.com",
                    self.project_id
                )
            });
        DefaultsConfig {
            gcp: GcpConfig {
                af_registry_location: options.af_registry_location.clone(),
                af_registry_name: options.af_registry_name.clone(),
                base_image: options.base_image.clone(),
                cb_trigger_location: options.cb_trigger_location.clone(),
                cb_trigger_name: options.cb_trigger_name.clone(),
                cloud_run_location: options.cloud_run_location.clone(),
                cloud_run_name: options.cloud_run_name.clone(),
                cloud_schedule_location: options.cloud_schedule_location.clone(),
                cloud_schedule_name: options.cloud_schedule_name.clone(),
                cloud_schedule_pattern: options
                    .schedule_pattern
                    .clone()
                    .unwrap_or_else(|| NO_SCHEDULE.to_string()),
                cloud_source_repository: options.cloud_source_repository.clone(),
                cloud_source_repository_branch: options.cloud_source_repository_branch.clone(),
                cloud_tasks_queue_location: options.cloud_tasks_queue_location.clone(),
                cloud_tasks_queue_name: options.cloud_tasks_queue_name.clone(),
                gs_bucket_location: options.gs_bucket_location.clone(),
                gs_bucket_name: gs_bucket_name.clone(),
                pipeline_runner_service_account,
                project_id: self.project_id.clone(),
                use_ci_cd: options.use_ci_cd,
                vpc_connector: options
                    .vpc_connector
                    .clone()
                    .unwrap_or_else(|| NO_VPC.to_string()),
            },
            pipelines: PipelinePaths {
                parameter_values_path: ProjectLayout::parameter_values_relpath().to_string(),
                pipeline_component_directory: "components".to_string(),
                pipeline_job_spec_path: ProjectLayout::pipeline_job_spec_relpath().to_string(),
                pipeline_region: options.gs_bucket_location.clone(),
                pipeline_storage_path: format!("gs://{gs_bucket_name}/pipeline_root"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;
    use tempfile::TempDir;

    fn write_sample_component(dir: &Path) -> PathBuf {
        let path = dir.join("components/create_dataset.py");
        utils::write_file(
            &path,
            "def create_dataset(bq_table: str):\n    \"\"\"Loads data.\"\"\"\n    pass\n",
        )
        .expect("write component");
        path
    }

    fn sample_manifest_yaml() -> &'static str {
        r#"
project_id: my-project
components:
  - source: components/create_dataset.py
    packages: [pandas]
pipeline:
  name: training-pipeline
  params:
    - name: bq_table
      type: str
  steps:
    - component: create_dataset
      mapping: [[bq_table, bq_table]]
parameter_values:
  bq_table: my-project.dataset.table
"#
    }

    #[test]
    fn test_load_resolves_relative_sources() {
        let dir = TempDir::new().expect("tempdir");
        write_sample_component(dir.path());
        let manifest_path = dir.path().join("workflow.yaml");
        utils::write_file(&manifest_path, sample_manifest_yaml()).expect("write manifest");

        let manifest = WorkflowManifest::load(&manifest_path).expect("load manifest");
        assert!(manifest.components[0].source.is_absolute() || manifest.components[0].source.starts_with(dir.path()));
        manifest.validate().expect("manifest is valid");
    }

    #[test]
    fn test_missing_component_source_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let manifest_path = dir.path().join("workflow.yaml");
        utils::write_file(&manifest_path, sample_manifest_yaml()).expect("write manifest");
        let manifest = WorkflowManifest::load(&manifest_path).expect("load manifest");
        let err = manifest.validate().expect_err("source is missing");
        assert!(err.to_string().contains("create_dataset.py"));
    }

    #[test]
    fn test_schedule_requires_ci_cd() {
        let dir = TempDir::new().expect("tempdir");
        write_sample_component(dir.path());
        let manifest_path = dir.path().join("workflow.yaml");
        let yaml = format!(
            "{}options:\n  schedule_pattern: '59 11 * * 0'\n",
            sample_manifest_yaml()
        );
        utils::write_file(&manifest_path, &yaml).expect("write manifest");
        let manifest = WorkflowManifest::load(&manifest_path).expect("load manifest");
        let err = manifest.validate().expect_err("schedule without CI/CD");
        assert!(matches!(err, ManifestError::ScheduleRequiresCiCd));
    }

    #[test]
    fn test_resolve_defaults_fills_derived_values() {
        let dir = TempDir::new().expect("tempdir");
        write_sample_component(dir.path());
        let manifest_path = dir.path().join("workflow.yaml");
        utils::write_file(&manifest_path, sample_manifest_yaml()).expect("write manifest");
        let manifest = WorkflowManifest::load(&manifest_path).expect("load manifest");

        let defaults = manifest.resolve_defaults();
        assert_eq!(defaults.gcp.gs_bucket_name, "my-project-bucket");
        assert_eq!(
            defaults.gcp.pipeline_runner_service_account,
            "vertex-pipelines@my-project.iam.gserviceaccount.com"
        );
        assert_eq!(defaults.gcp.cloud_schedule_pattern, NO_SCHEDULE);
        assert_eq!(
            defaults.pipelines.pipeline_storage_path,
            "gs://my-project-bucket/pipeline_root"
        );
    }

    #[test]
    fn test_duplicate_pipeline_params_rejected_at_validate() {
        let dir = TempDir::new().expect("tempdir");
        write_sample_component(dir.path());
        let manifest_path = dir.path().join("workflow.yaml");
        let yaml = r#"
project_id: my-project
components:
  - source: components/create_dataset.py
pipeline:
  params:
    - {name: input1, type: str}
    - {name: input1, type: int}
  steps:
    - component: create_dataset
      mapping: [[bq_table, input1]]
"#;
        utils::write_file(&manifest_path, yaml).expect("write manifest");
        let manifest = WorkflowManifest::load(&manifest_path).expect("load manifest");
        let err = manifest.validate().expect_err("duplicate param");
        assert!(err.to_string().contains("input1"));
    }
}
