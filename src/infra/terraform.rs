//! Terraform provisioning artifacts.
//!
//! An alternative to the gcloud shell provisioning: declarative resources
//! for the bucket, artifact registry, source repo, tasks queue, service
//! account and IAM bindings, plus the CI/CD build trigger when active.

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, GENERATED_DIR_NAME, GENERATED_LICENSE};
use crate::error::InfraError;

const MAIN_TF_TEMPLATE: &str = r#"{{ license }}# Enable Google Cloud APIs
module "google_project_service" {
  source                  = "terraform-google-modules/project-factory/google//modules/project_services"
  version                 = "14.1.0"
  project_id              = var.project_id
  activate_apis           = [
    "aiplatform.googleapis.com",
    "artifactregistry.googleapis.com",
    "cloudbuild.googleapis.com",
    "cloudresourcemanager.googleapis.com",
    "cloudscheduler.googleapis.com",
    "cloudtasks.googleapis.com",
    "compute.googleapis.com",
    "iam.googleapis.com",
    "iamcredentials.googleapis.com",
    "ml.googleapis.com",
    "run.googleapis.com",
    "storage.googleapis.com",
    "sourcerepo.googleapis.com"
    ]
}

# Create GCS bucket
resource "google_storage_bucket" "gcs_bucket" {
  project                 = var.project_id
  name                    = var.gs_bucket_name
  location                = var.gs_bucket_location
  depends_on              = [module.google_project_service]
}

# Create artifact registry repository
resource "google_artifact_registry_repository" "af_repo" {
  project                 = var.project_id
  location                = var.af_registry_location
  repository_id           = var.af_registry_name
  description             = "Artifact Registry ${var.af_registry_name} in ${var.af_registry_location}."
  format                  = "DOCKER"
  depends_on              = [module.google_project_service]
}

# Create cloud source repo
resource "google_sourcerepo_repository" "forge_repo" {
  project                 = var.project_id
  name                    = var.csr_name
  depends_on              = [module.google_project_service]
}

# Create cloud tasks queue
resource "google_cloud_tasks_queue" "forge_queue" {
  project                 = var.project_id
  name                    = var.cloud_tasks_queue_name
  location                = var.cloud_tasks_queue_location
  depends_on              = [module.google_project_service]
}
{% if use_ci_cd %}
# Create cloud build trigger
resource "google_cloudbuild_trigger" "forge_trigger" {
  project                 = var.project_id
  name                    = var.cb_trigger_name
  location                = var.cb_trigger_location
  depends_on              = [module.google_project_service, module.cloudbuild_sa_member_roles]

  trigger_template {
    branch_name           = var.csr_branch_name
    project_id            = var.project_id
    repo_name             = var.csr_name
  }

  filename                = "{{ generated_dir }}/cloudbuild.yaml"
}
{% endif %}"#;

const VERSIONS_TF_TEMPLATE: &str = r#"{{ license }}terraform {
  required_version = ">= 0.13"
  required_providers {

    google = {
      source  = "hashicorp/google"
      version = "~> 4.49.0"
    }
  }
}
"#;

const IAM_TF_TEMPLATE: &str = r#"{{ license }}# Create pipeline runner service account
resource "google_service_account" "service_account" {
  project                 = var.project_id
  account_id              = var.pipeline_runner_sa
  display_name            = "Pipeline Runner Service Account"
  description             = "For submitting PipelineJobs"
}

# Add IAM roles to pipeline runner service account
module "pipeline_sa_member_roles" {
  source                  = "terraform-google-modules/iam/google//modules/member_iam"
  version                 = "7.5.0"
  project_id              = var.project_id
  prefix                  = "serviceAccount"
  service_account_address = "${var.pipeline_runner_sa}@${var.project_id}.iam.gserviceaccount.com"
  depends_on              = [google_service_account.service_account]
  project_roles           = [
    "roles/aiplatform.user",
    "roles/artifactregistry.reader",
    "roles/bigquery.user",
    "roles/bigquery.dataEditor",
    "roles/iam.serviceAccountUser",
    "roles/storage.admin",
    "roles/run.admin"
    ]
}

# Add IAM roles to cloudbuild service account
module "cloudbuild_sa_member_roles" {
  source                  = "terraform-google-modules/iam/google//modules/member_iam"
  version                 = "7.5.0"
  project_id              = var.project_id
  prefix                  = "serviceAccount"
  service_account_address = "${var.project_number}@cloudbuild.gserviceaccount.com"
  depends_on              = [module.google_project_service]
  project_roles           = [
    "roles/run.admin",
    "roles/iam.serviceAccountUser",
    "roles/cloudtasks.enqueuer",
    "roles/cloudscheduler.admin"
    ]
}
"#;

const VARIABLES_TF_TEMPLATE: &str = r#"{{ license }}variable "project_id" {
  type        = string
  description = "The GCP project ID."
}

variable "project_number" {
  type        = string
  description = "The GCP project number."
}

variable "af_registry_location" {
  type        = string
  description = "Region of the Artifact Registry."
}

variable "af_registry_name" {
  type        = string
  description = "Artifact Registry name."
}

variable "gs_bucket_name" {
  type        = string
  description = "Storage bucket for pipeline run metadata."
}

variable "gs_bucket_location" {
  type        = string
  description = "Region of the storage bucket."
}

variable "pipeline_runner_sa" {
  type        = string
  description = "Account id of the pipeline runner service account."
}

variable "csr_name" {
  type        = string
  description = "Cloud Source Repository name."
}

variable "csr_branch_name" {
  type        = string
  description = "Cloud Source Repository branch."
}

variable "cloud_tasks_queue_name" {
  type        = string
  description = "Cloud Tasks queue name."
}

variable "cloud_tasks_queue_location" {
  type        = string
  description = "Cloud Tasks queue location."
}

variable "cb_trigger_name" {
  type        = string
  description = "Cloud Build trigger name."
}

variable "cb_trigger_location" {
  type        = string
  description = "Cloud Build trigger location."
}
"#;

const TFVARS_TEMPLATE: &str = r#"{{ license }}project_id                 = "{{ project_id }}"
project_number             = "{{ project_number }}"
af_registry_location       = "{{ af_registry_location }}"
af_registry_name           = "{{ af_registry_name }}"
gs_bucket_name             = "{{ gs_bucket_name }}"
gs_bucket_location         = "{{ gs_bucket_location }}"
pipeline_runner_sa         = "{{ pipeline_runner_sa }}"
csr_name                   = "{{ csr_name }}"
csr_branch_name            = "{{ csr_branch_name }}"
cloud_tasks_queue_name     = "{{ cloud_tasks_queue_name }}"
cloud_tasks_queue_location = "{{ cloud_tasks_queue_location }}"
cb_trigger_name            = "{{ cb_trigger_name }}"
cb_trigger_location        = "{{ cb_trigger_location }}"
"#;

const PROVISION_RUNNER_TEMPLATE: &str = r#"#!/bin/bash
{{ license }}# Initializes and applies the terraform provisioning configuration.
# This script should run from the provision/terraform directory.

PROJECT_NUMBER=`gcloud projects describe {{ project_id }} --format 'value(projectNumber)'`

terraform init
terraform apply -var="project_number=$PROJECT_NUMBER" -auto-approve
"#;

fn base_context(defaults: &DefaultsConfig) -> Context {
    let gcp = &defaults.gcp;
    let sa_account_id = gcp
        .pipeline_runner_service_account
        .split('@')
        .next()
        .unwrap_or(&gcp.pipeline_runner_service_account);
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    context.insert("generated_dir", GENERATED_DIR_NAME);
    context.insert("project_id", &gcp.project_id);
    // Resolved at apply time by the provisioning runner script.
    context.insert("project_number", "REPLACED-AT-APPLY-TIME");
    context.insert("af_registry_location", &gcp.af_registry_location);
    context.insert("af_registry_name", &gcp.af_registry_name);
    context.insert("gs_bucket_name", &gcp.gs_bucket_name);
    context.insert("gs_bucket_location", &gcp.gs_bucket_location);
    context.insert("pipeline_runner_sa", sa_account_id);
    context.insert("csr_name", &gcp.cloud_source_repository);
    context.insert("csr_branch_name", &gcp.cloud_source_repository_branch);
    context.insert("cloud_tasks_queue_name", &gcp.cloud_tasks_queue_name);
    context.insert("cloud_tasks_queue_location", &gcp.cloud_tasks_queue_location);
    context.insert("cb_trigger_name", &gcp.cb_trigger_name);
    context.insert("cb_trigger_location", &gcp.cb_trigger_location);
    context.insert("use_ci_cd", &gcp.use_ci_cd);
    context
}

pub fn main_tf(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    Ok(Tera::one_off(MAIN_TF_TEMPLATE, &base_context(defaults), false)?)
}

pub fn versions_tf() -> Result<String, InfraError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    Ok(Tera::one_off(VERSIONS_TF_TEMPLATE, &context, false)?)
}

pub fn iam_tf() -> Result<String, InfraError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    Ok(Tera::one_off(IAM_TF_TEMPLATE, &context, false)?)
}

pub fn variables_tf() -> Result<String, InfraError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    Ok(Tera::one_off(VARIABLES_TF_TEMPLATE, &context, false)?)
}

pub fn tfvars(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    Ok(Tera::one_off(TFVARS_TEMPLATE, &base_context(defaults), false)?)
}

pub fn provision_runner(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    Ok(Tera::one_off(
        PROVISION_RUNNER_TEMPLATE,
        &base_context(defaults),
        false,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_defaults;

    #[test]
    fn test_main_tf_declares_core_resources() {
        let main = main_tf(&test_defaults()).expect("render");
        assert!(main.contains("resource \"google_storage_bucket\" \"gcs_bucket\""));
        assert!(main.contains("resource \"google_artifact_registry_repository\" \"af_repo\""));
        assert!(!main.contains("google_cloudbuild_trigger"));
    }

    #[test]
    fn test_main_tf_adds_trigger_for_ci_cd() {
        let mut defaults = test_defaults();
        defaults.gcp.use_ci_cd = true;
        let main = main_tf(&defaults).expect("render");
        assert!(main.contains("google_cloudbuild_trigger"));
        assert!(main.contains("MLOpsForge/cloudbuild.yaml"));
    }

    #[test]
    fn test_tfvars_embed_resolved_defaults() {
        let vars = tfvars(&test_defaults()).expect("render");
        assert!(vars.contains("project_id                 = \"my-project\""));
        assert!(vars.contains("pipeline_runner_sa         = \"vertex-pipelines\""));
        assert!(vars.contains("af_registry_name           = \"vertex-mlops-af\""));
    }

    #[test]
    fn test_supporting_files_render() {
        assert!(versions_tf().expect("render").contains("hashicorp/google"));
        assert!(iam_tf().expect("render").contains("google_service_account"));
        assert!(variables_tf().expect("render").contains("variable \"project_id\""));
        assert!(provision_runner(&test_defaults())
            .expect("render")
            .contains("terraform apply"));
    }
}
