//! Process-wide generation configuration.
//!
//! This module provides:
//! - `DefaultsConfig`: the immutable record of environment-specific values
//!   (project, registry, bucket, service account, schedule) resolved once
//!   per generation run and threaded explicitly into every synthesizer.
//! - `ProjectLayout`: the path table of the generated project tree.
//!
//! The defaults record is also serialized to `configs/defaults.yaml` inside
//! the generated project, where the generated scripts and services read it
//! back at build/run time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InfraError;
use crate::utils;

/// Name of the generated top-level project directory.
pub const GENERATED_DIR_NAME: &str = "MLOpsForge";

/// Name of the staging directory holding not-yet-formalized descriptors.
pub const STAGING_DIR_NAME: &str = ".mlops-staging";

/// Sentinel recorded when no retrain schedule was requested.
pub const NO_SCHEDULE: &str = "No Schedule Specified";

/// Sentinel recorded when no VPC connector was requested.
pub const NO_VPC: &str = "No VPC Specified";

/// License header stamped on every generated artifact.
pub const GENERATED_LICENSE: &str = "\
# Licensed under the Apache License, Version 2.0 (the \"License\");
# you may not use this file except in compliance with the License.
# You may obtain a copy of the License at
#
#     http://www.apache.org/licenses/LICENSE-2.0
#
# Unless required by applicable law or agreed to in writing, software
# distributed under the License is distributed on an \"AS IS\" BASIS,
# WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
# See the License for the specific language governing permissions and
# limitations under the License.
#
# DISCLAIMER: This code is generated as part of the MLOpsForge output.

";

/// GCP resource values used by the generated artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Region of the Artifact Registry.
    pub af_registry_location: String,
    /// Artifact Registry name where component images are stored.
    pub af_registry_name: String,
    /// Base image the shared component image is built from.
    pub base_image: String,
    /// Location of the Cloud Build trigger.
    pub cb_trigger_location: String,
    /// Name of the Cloud Build trigger.
    pub cb_trigger_name: String,
    /// Location of the Cloud Run pipeline-runner service.
    pub cloud_run_location: String,
    /// Name of the Cloud Run pipeline-runner service.
    pub cloud_run_name: String,
    /// Location of the Cloud Scheduler resource.
    pub cloud_schedule_location: String,
    /// Name of the Cloud Scheduler resource.
    pub cloud_schedule_name: String,
    /// Cron pattern for scheduled retrain runs, or the no-schedule sentinel.
    pub cloud_schedule_pattern: String,
    /// Cloud Source Repository the CI/CD trigger watches.
    pub cloud_source_repository: String,
    /// Branch of the Cloud Source Repository to push to.
    pub cloud_source_repository_branch: String,
    /// Location of the Cloud Tasks queue.
    pub cloud_tasks_queue_location: String,
    /// Name of the Cloud Tasks queue.
    pub cloud_tasks_queue_name: String,
    /// Region of the storage bucket.
    pub gs_bucket_location: String,
    /// Storage bucket where pipeline run metadata is stored.
    pub gs_bucket_name: String,
    /// Service account that submits PipelineJobs.
    pub pipeline_runner_service_account: String,
    /// The GCP project ID.
    pub project_id: String,
    /// Whether the CI/CD (Cloud Build + Cloud Run) flow is active.
    pub use_ci_cd: bool,
    /// VPC connector for the runner service, or the no-VPC sentinel.
    pub vpc_connector: String,
}

/// Pipeline artifact locations recorded in the defaults file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePaths {
    /// Location of the runtime parameter values JSON.
    pub parameter_values_path: String,
    /// Directory containing the formalized component descriptors.
    pub pipeline_component_directory: String,
    /// Location the compiled pipeline spec is written to.
    pub pipeline_job_spec_path: String,
    /// Region the pipeline runs in.
    pub pipeline_region: String,
    /// Storage root for pipeline run metadata.
    pub pipeline_storage_path: String,
}

/// The resolved, immutable configuration for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub gcp: GcpConfig,
    pub pipelines: PipelinePaths,
}

impl DefaultsConfig {
    /// Returns true when a retrain schedule was requested.
    pub fn has_schedule(&self) -> bool {
        self.gcp.cloud_schedule_pattern != NO_SCHEDULE
    }

    /// Returns true when a VPC connector was requested.
    pub fn has_vpc_connector(&self) -> bool {
        self.gcp.vpc_connector != NO_VPC
    }

    /// The shared component base image reference in the Artifact Registry.
    pub fn component_base_image(&self) -> String {
        format!(
            "{}-docker.pkg.dev/{}/{}/components/component_base:latest",
            self.gcp.af_registry_location, self.gcp.project_id, self.gcp.af_registry_name
        )
    }

    /// The pipeline-runner service image reference in the Artifact Registry.
    pub fn run_pipeline_image(&self) -> String {
        format!(
            "{}-docker.pkg.dev/{}/{}/run_pipeline:latest",
            self.gcp.af_registry_location, self.gcp.project_id, self.gcp.af_registry_name
        )
    }

    /// Serializes the record to the generated `configs/defaults.yaml`.
    pub fn write(&self, path: &Path) -> Result<(), InfraError> {
        let mut contents = String::from(GENERATED_LICENSE);
        contents.push_str("# These values are descriptive only - do not change.\n");
        contents.push_str("# Rerun `mlops-forge generate` to change these values.\n");
        contents.push_str(&serde_yaml::to_string(self)?);
        utils::write_file(path, &contents)?;
        Ok(())
    }

    /// Loads a previously written defaults file.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let text = utils::read_file(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Path table for the generated project tree and its staging area.
///
/// The staging directory sits next to the generated root so a rerun can
/// rebuild the project without disturbing in-progress declarations.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    staging: PathBuf,
}

impl ProjectLayout {
    /// Creates the layout rooted under the given output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output = output_dir.into();
        Self {
            root: output.join(GENERATED_DIR_NAME),
            staging: output.join(STAGING_DIR_NAME),
        }
    }

    /// The generated project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The staging directory for temporary descriptors.
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Staging path of a component descriptor, keyed by component name.
    pub fn staged_component(&self, name: &str) -> PathBuf {
        self.staging.join(format!("{name}.yaml"))
    }

    /// Staging path of the pipeline scaffold.
    pub fn staged_pipeline(&self) -> PathBuf {
        self.staging.join("pipeline_scaffold.yaml")
    }

    pub fn defaults_file(&self) -> PathBuf {
        self.root.join("configs/defaults.yaml")
    }

    pub fn cloudbuild_file(&self) -> PathBuf {
        self.root.join("cloudbuild.yaml")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn build_pipeline_spec_script(&self) -> PathBuf {
        self.scripts_dir().join("build_pipeline_spec.sh")
    }

    pub fn build_components_script(&self) -> PathBuf {
        self.scripts_dir().join("build_components.sh")
    }

    pub fn run_pipeline_script(&self) -> PathBuf {
        self.scripts_dir().join("run_pipeline.sh")
    }

    pub fn run_all_script(&self) -> PathBuf {
        self.scripts_dir().join("run_all.sh")
    }

    pub fn create_resources_script(&self) -> PathBuf {
        self.scripts_dir().join("create_resources.sh")
    }

    pub fn pipeline_spec_dir(&self) -> PathBuf {
        self.scripts_dir().join("pipeline_spec")
    }

    pub fn components_dir(&self) -> PathBuf {
        self.root.join("components")
    }

    pub fn component_dir(&self, name: &str) -> PathBuf {
        self.components_dir().join(name)
    }

    pub fn component_descriptor(&self, name: &str) -> PathBuf {
        self.component_dir(name).join("component.yaml")
    }

    pub fn component_base_dir(&self) -> PathBuf {
        self.components_dir().join("component_base")
    }

    pub fn component_base_src_dir(&self) -> PathBuf {
        self.component_base_dir().join("src")
    }

    pub fn task_script(&self, name: &str) -> PathBuf {
        self.component_base_src_dir().join(format!("{name}.py"))
    }

    pub fn component_base_dockerfile(&self) -> PathBuf {
        self.component_base_dir().join("Dockerfile")
    }

    pub fn component_base_requirements(&self) -> PathBuf {
        self.component_base_dir().join("requirements.txt")
    }

    pub fn pipelines_dir(&self) -> PathBuf {
        self.root.join("pipelines")
    }

    pub fn pipeline_file(&self) -> PathBuf {
        self.pipelines_dir().join("pipeline.py")
    }

    pub fn pipeline_runner_file(&self) -> PathBuf {
        self.pipelines_dir().join("pipeline_runner.py")
    }

    pub fn parameter_values_file(&self) -> PathBuf {
        self.pipelines_dir()
            .join("runtime_parameters/pipeline_parameter_values.json")
    }

    pub fn cloud_run_dir(&self) -> PathBuf {
        self.root.join("cloud_run")
    }

    pub fn run_pipeline_svc_dir(&self) -> PathBuf {
        self.cloud_run_dir().join("run_pipeline")
    }

    pub fn queueing_svc_dir(&self) -> PathBuf {
        self.cloud_run_dir().join("queueing_svc")
    }

    pub fn terraform_dir(&self) -> PathBuf {
        self.root.join("provision/terraform")
    }

    pub fn pulumi_dir(&self) -> PathBuf {
        self.root.join("provision/pulumi")
    }

    /// Relative path of the parameter values file, as recorded in defaults.
    pub fn parameter_values_relpath() -> &'static str {
        "pipelines/runtime_parameters/pipeline_parameter_values.json"
    }

    /// Relative path of the compiled pipeline spec, as recorded in defaults.
    pub fn pipeline_job_spec_relpath() -> &'static str {
        "scripts/pipeline_spec/pipeline_job.json"
    }

    /// Every directory the generation run needs to exist up front.
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.staging.clone(),
            self.root.clone(),
            self.components_dir(),
            self.component_base_dir(),
            self.component_base_src_dir(),
            self.root.join("configs"),
            self.pipelines_dir(),
            self.pipelines_dir().join("runtime_parameters"),
            self.scripts_dir(),
            self.pipeline_spec_dir(),
        ]
    }
}
