//! The end-to-end orchestration driver.
//!
//! Runs the strictly sequential generation flow: validate the manifest,
//! bootstrap directories, write the defaults record, stage every component,
//! stage the pipeline, formalize components then the pipeline, and emit the
//! infrastructure artifacts. `run` then provisions resources and either
//! builds/submits locally or pushes to the source repository to fire the
//! CI/CD trigger.
//!
//! Later phases depend on the filesystem side effects of earlier ones
//! (formalizing the pipeline requires the formalized components on disk),
//! so ordering is enforced here and nowhere else.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::component;
use crate::config::{DefaultsConfig, ProjectLayout};
use crate::error::OrchestratorError;
use crate::infra::{cloudbuild, pulumi, services, terraform, ScriptsBuilder};
use crate::manifest::WorkflowManifest;
use crate::pipeline;
use crate::process;
use crate::spec::validate;
use crate::utils;

/// Which provisioning flavor to emit and execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provisioner {
    /// Shell script driving gcloud (the default).
    #[default]
    Gcloud,
    /// Terraform configuration.
    Terraform,
    /// Pulumi program.
    Pulumi,
}

/// Drives one generation run from a validated manifest.
pub struct Orchestrator {
    manifest: WorkflowManifest,
    defaults: DefaultsConfig,
    layout: ProjectLayout,
    provisioner: Provisioner,
}

impl Orchestrator {
    /// Validates the manifest and resolves the run configuration.
    pub fn new(
        manifest: WorkflowManifest,
        output_dir: impl Into<PathBuf>,
        provisioner: Provisioner,
    ) -> Result<Self, OrchestratorError> {
        manifest.validate()?;
        let defaults = manifest.resolve_defaults();
        Ok(Self {
            defaults,
            layout: ProjectLayout::new(output_dir),
            manifest,
            provisioner,
        })
    }

    /// The resolved defaults for this run.
    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    /// The generated project layout.
    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Generates the complete MLOps project.
    pub fn generate(&self) -> Result<(), OrchestratorError> {
        info!(
            project_id = %self.defaults.gcp.project_id,
            root = %self.layout.root().display(),
            "generating MLOps project"
        );
        utils::make_dirs(&self.layout.directories())?;
        self.defaults.write(&self.layout.defaults_file())?;

        // Stage every declared component, then the pipeline that wires them.
        for decl in &self.manifest.components {
            let spec = component::create_component_scaffold(decl, &self.layout)?;
            debug!(component = %spec.name, "staged component");
        }
        let known = validate::staged_component_names(self.layout.staging_dir())?;
        pipeline::create_pipeline_scaffold(&self.manifest.pipeline, &known, &self.layout)?;

        // Formalize: components first, the pipeline loads their final
        // descriptors.
        let use_vendor_spec = self.manifest.options.use_vendor_spec;
        for staged in validate::list_staged_components(self.layout.staging_dir())? {
            let spec =
                component::formalize(&staged, &self.layout, &self.defaults, use_vendor_spec)?;
            debug!(component = %spec.name, "formalized component");
        }
        pipeline::formalize(&self.layout, &self.defaults, &self.manifest.parameter_values)?;

        self.write_scripts()?;
        if self.defaults.gcp.use_ci_cd {
            self.write_services()?;
        }
        match self.provisioner {
            Provisioner::Gcloud => {}
            Provisioner::Terraform => self.write_terraform()?,
            Provisioner::Pulumi => self.write_pulumi()?,
        }
        info!(root = %self.layout.root().display(), "generation complete");
        Ok(())
    }

    /// Provisions resources, then builds and submits the pipeline (local
    /// mode) or pushes to the source repository to fire the CI/CD trigger.
    pub fn run(&self) -> Result<(), OrchestratorError> {
        let root = self.layout.root();
        match self.provisioner {
            Provisioner::Gcloud => {
                process::execute("./scripts/create_resources.sh", Some(root), false)?;
            }
            Provisioner::Terraform => {
                process::execute(
                    "./provision_resources.sh",
                    Some(&self.layout.terraform_dir()),
                    false,
                )?;
            }
            Provisioner::Pulumi => {
                process::execute(
                    "pulumi up --stack dev --yes",
                    Some(&self.layout.pulumi_dir()),
                    false,
                )?;
            }
        }
        if self.defaults.gcp.use_ci_cd {
            self.push_to_source_repository()?;
        } else {
            process::execute("./scripts/run_all.sh", Some(root), false)?;
        }
        self.log_resources_manifest();
        Ok(())
    }

    /// Writes the build/run scripts, the Cloud Build config, the component
    /// base Dockerfile and the merged requirements file.
    fn write_scripts(&self) -> Result<(), OrchestratorError> {
        let builder = ScriptsBuilder::new(&self.defaults);
        utils::write_and_chmod(
            &self.layout.build_pipeline_spec_script(),
            &builder.build_pipeline_spec(),
        )?;
        utils::write_and_chmod(
            &self.layout.build_components_script(),
            &builder.build_components(),
        )?;
        utils::write_and_chmod(&self.layout.run_pipeline_script(), &builder.run_pipeline())?;
        utils::write_and_chmod(&self.layout.run_all_script(), &builder.run_all())?;
        utils::write_and_chmod(
            &self.layout.create_resources_script(),
            &builder.create_resources()?,
        )?;
        utils::write_file(
            &self.layout.cloudbuild_file(),
            &cloudbuild::cloudbuild_config(&self.defaults)?,
        )?;
        utils::write_file(
            &self.layout.component_base_dockerfile(),
            &builder.component_base_dockerfile(),
        )?;

        let mut user_packages: Vec<String> = self
            .manifest
            .components
            .iter()
            .flat_map(|component| component.packages.iter().cloned())
            .collect();
        user_packages.sort();
        user_packages.dedup();
        utils::write_file(
            &self.layout.component_base_requirements(),
            &builder.component_base_requirements(&user_packages),
        )?;
        Ok(())
    }

    /// Writes the Cloud Run runner service and the queueing service.
    fn write_services(&self) -> Result<(), OrchestratorError> {
        let run_dir = self.layout.run_pipeline_svc_dir();
        utils::write_file(
            &run_dir.join("Dockerfile"),
            &services::run_pipeline_dockerfile()?,
        )?;
        utils::write_file(
            &run_dir.join("requirements.txt"),
            &services::run_pipeline_requirements(),
        )?;
        utils::write_file(&run_dir.join("main.py"), &services::run_pipeline_main()?)?;

        let queue_dir = self.layout.queueing_svc_dir();
        utils::write_file(
            &queue_dir.join("requirements.txt"),
            &services::queueing_svc_requirements(),
        )?;
        utils::write_file(
            &queue_dir.join("main.py"),
            &services::queueing_svc_main(&self.defaults)?,
        )?;
        // The queueing service reads the runtime parameters from its own
        // directory when invoked from the build.
        let serialized = serde_json::to_string_pretty(&self.manifest.parameter_values)?;
        utils::write_file(
            &queue_dir.join("pipeline_parameter_values.json"),
            &serialized,
        )?;
        Ok(())
    }

    fn write_terraform(&self) -> Result<(), OrchestratorError> {
        let dir = self.layout.terraform_dir();
        utils::write_file(&dir.join("main.tf"), &terraform::main_tf(&self.defaults)?)?;
        utils::write_file(&dir.join("versions.tf"), &terraform::versions_tf()?)?;
        utils::write_file(&dir.join("iam.tf"), &terraform::iam_tf()?)?;
        utils::write_file(&dir.join("variables.tf"), &terraform::variables_tf()?)?;
        utils::write_file(
            &dir.join("variables.auto.tfvars"),
            &terraform::tfvars(&self.defaults)?,
        )?;
        utils::write_and_chmod(
            &dir.join("provision_resources.sh"),
            &terraform::provision_runner(&self.defaults)?,
        )?;
        Ok(())
    }

    fn write_pulumi(&self) -> Result<(), OrchestratorError> {
        let dir = self.layout.pulumi_dir();
        utils::write_file(&dir.join("Pulumi.yaml"), &pulumi::pulumi_yaml(&self.defaults)?)?;
        utils::write_file(
            &dir.join("Pulumi.dev.yaml"),
            &pulumi::pulumi_stack_yaml(&self.defaults)?,
        )?;
        utils::write_file(&dir.join("__main__.py"), &pulumi::pulumi_main(&self.defaults)?)?;
        Ok(())
    }

    /// Initializes a git repo around the generated project if needed, then
    /// pushes to the configured branch to fire the Cloud Build trigger.
    fn push_to_source_repository(&self) -> Result<(), OrchestratorError> {
        let gcp = &self.defaults.gcp;
        let workdir: &Path = self
            .layout
            .root()
            .parent()
            .unwrap_or_else(|| self.layout.root());
        let branch = &gcp.cloud_source_repository_branch;

        if !workdir.join(".git").exists() {
            process::execute("git init", Some(workdir), false)?;
            process::execute(
                "git config credential.'https://source.developers.google.com'.helper gcloud.sh",
                Some(workdir),
                false,
            )?;
            process::execute(
                &format!(
                    "git remote add origin https://source.developers.google.com/p/{}/r/{}",
                    gcp.project_id, gcp.cloud_source_repository
                ),
                Some(workdir),
                false,
            )?;
            process::execute(&format!("git checkout -B {branch}"), Some(workdir), false)?;
        }
        // Keep the (otherwise empty) spec output directory in the repo.
        utils::write_file(&self.layout.pipeline_spec_dir().join(".gitkeep"), "")?;
        process::execute("git add .", Some(workdir), false)?;
        process::execute("git commit -m 'Run MLOpsForge'", Some(workdir), false)?;
        process::execute(
            &format!("git push origin {branch} --force"),
            Some(workdir),
            false,
        )?;
        info!(branch = %branch, "pushed to source repository, triggering cloudbuild");
        Ok(())
    }

    /// Logs the console URLs of the provisioned resources.
    fn log_resources_manifest(&self) {
        let gcp = &self.defaults.gcp;
        info!("Generated resources can be found at the following URLs:");
        info!(
            "Google Cloud Storage Bucket: https://console.cloud.google.com/storage/{}",
            gcp.gs_bucket_name
        );
        info!(
            "Artifact Registry: https://console.cloud.google.com/artifacts/docker/{}/{}/{}",
            gcp.project_id, gcp.af_registry_location, gcp.af_registry_name
        );
        info!(
            "Service Accounts: https://console.cloud.google.com/iam-admin/serviceaccounts?project={}",
            gcp.project_id
        );
        info!(
            "Cloud Source Repository: https://source.cloud.google.com/{}/{}/+/{}:",
            gcp.project_id, gcp.cloud_source_repository, gcp.cloud_source_repository_branch
        );
        info!(
            "Cloud Build Jobs: https://console.cloud.google.com/cloud-build/builds;region={}",
            gcp.cb_trigger_location
        );
        info!("Vertex AI Pipeline Runs: https://console.cloud.google.com/vertex-ai/pipelines/runs");
        if gcp.use_ci_cd {
            info!(
                "Cloud Build Trigger: https://console.cloud.google.com/cloud-build/triggers;region={}",
                gcp.cb_trigger_location
            );
            info!(
                "Cloud Run Service: https://console.cloud.google.com/run/detail/{}/{}",
                gcp.cloud_run_location, gcp.cloud_run_name
            );
            info!(
                "Cloud Tasks Queue: https://console.cloud.google.com/cloudtasks/queue/{}/{}/tasks",
                gcp.cloud_tasks_queue_location, gcp.cloud_tasks_queue_name
            );
        }
        if self.defaults.has_schedule() {
            info!("Cloud Scheduler Job: https://console.cloud.google.com/cloudscheduler");
        }
    }
}
