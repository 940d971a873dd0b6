//! Pulumi provisioning artifacts.
//!
//! The Python-program flavor of resource provisioning: a Pulumi project
//! file, a stack configuration carrying the resolved defaults, and the
//! `__main__.py` program that declares the same resource set as the
//! Terraform flavor.

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, GENERATED_DIR_NAME, GENERATED_LICENSE};
use crate::error::InfraError;

const PULUMI_YAML_TEMPLATE: &str = r#"{{ license }}name: {{ project_name }}
runtime:
  name: python
  options:
    virtualenv: venv
description: Provisions the MLOps resources for {{ project_id }}
"#;

const PULUMI_STACK_TEMPLATE: &str = r#"{{ license }}config:
  gcp:project: {{ project_id }}
  {{ project_name }}:af_registry_location: {{ af_registry_location }}
  {{ project_name }}:af_registry_name: {{ af_registry_name }}
  {{ project_name }}:gs_bucket_name: {{ gs_bucket_name }}
  {{ project_name }}:gs_bucket_location: {{ gs_bucket_location }}
  {{ project_name }}:pipeline_runner_sa: {{ pipeline_runner_sa }}
  {{ project_name }}:csr_name: {{ csr_name }}
  {{ project_name }}:csr_branch_name: {{ csr_branch_name }}
  {{ project_name }}:cloud_tasks_queue_name: {{ cloud_tasks_queue_name }}
  {{ project_name }}:cloud_tasks_queue_location: {{ cloud_tasks_queue_location }}
  {{ project_name }}:cb_trigger_name: {{ cb_trigger_name }}
  {{ project_name }}:cb_trigger_location: {{ cb_trigger_location }}
  {{ project_name }}:use_ci_cd: "{{ use_ci_cd }}"
"#;

const PULUMI_MAIN_TEMPLATE: &str = r#"{{ license }}"""Pulumi program that provisions the MLOps resources."""
import pulumi
import pulumi_gcp as gcp

config = pulumi.Config()
project_id = gcp.config.project

af_registry_location = config.require('af_registry_location')
af_registry_name = config.require('af_registry_name')
gs_bucket_name = config.require('gs_bucket_name')
gs_bucket_location = config.require('gs_bucket_location')
pipeline_runner_sa = config.require('pipeline_runner_sa')
csr_name = config.require('csr_name')
csr_branch_name = config.require('csr_branch_name')
cloud_tasks_queue_name = config.require('cloud_tasks_queue_name')
cloud_tasks_queue_location = config.require('cloud_tasks_queue_location')
cb_trigger_name = config.require('cb_trigger_name')
cb_trigger_location = config.require('cb_trigger_location')
use_ci_cd = config.require('use_ci_cd') == 'True'

# Storage bucket for pipeline run metadata
gcs_bucket = gcp.storage.Bucket(
    'gcs_bucket',
    name=gs_bucket_name,
    location=gs_bucket_location,
    project=project_id)

# Artifact registry for component images
af_repo = gcp.artifactregistry.Repository(
    'af_repo',
    location=af_registry_location,
    repository_id=af_registry_name,
    description=f'Artifact Registry {af_registry_name} in {af_registry_location}.',
    format='DOCKER',
    project=project_id)

# Cloud source repository watched by the build trigger
forge_repo = gcp.sourcerepo.Repository(
    'forge_repo',
    name=csr_name,
    project=project_id)

# Cloud tasks queue for the queueing service
forge_queue = gcp.cloudtasks.Queue(
    'forge_queue',
    name=cloud_tasks_queue_name,
    location=cloud_tasks_queue_location,
    project=project_id)

# Pipeline runner service account and roles
service_account = gcp.serviceaccount.Account(
    'service_account',
    account_id=pipeline_runner_sa,
    display_name='Pipeline Runner Service Account',
    description='For submitting PipelineJobs',
    project=project_id)

for index, role in enumerate([
        'roles/aiplatform.user',
        'roles/artifactregistry.reader',
        'roles/bigquery.user',
        'roles/bigquery.dataEditor',
        'roles/iam.serviceAccountUser',
        'roles/storage.admin',
        'roles/run.admin']):
    gcp.projects.IAMMember(
        f'pipeline_sa_role_{index}',
        project=project_id,
        role=role,
        member=service_account.email.apply(
            lambda email: f'serviceAccount:{email}'))

if use_ci_cd:
    # Build trigger that fires on pushes to the forge branch
    forge_trigger = gcp.cloudbuild.Trigger(
        'forge_trigger',
        name=cb_trigger_name,
        location=cb_trigger_location,
        project=project_id,
        trigger_template=gcp.cloudbuild.TriggerTriggerTemplateArgs(
            branch_name=csr_branch_name,
            project_id=project_id,
            repo_name=csr_name),
        filename='{{ generated_dir }}/cloudbuild.yaml',
        opts=pulumi.ResourceOptions(depends_on=[forge_repo]))
"#;

/// Stable Pulumi project name for the generated stack files.
const PULUMI_PROJECT_NAME: &str = "mlops-forge-provision";

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
    context.insert("project_name", PULUMI_PROJECT_NAME);
    context.insert("project_id", &gcp.project_id);
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
    context.insert("use_ci_cd", &if gcp.use_ci_cd { "True" } else { "False" });
    context
}

/// The Pulumi project file.
pub fn pulumi_yaml(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    Ok(Tera::one_off(PULUMI_YAML_TEMPLATE, &base_context(defaults), false)?)
}

/// The stack configuration carrying the resolved defaults.
pub fn pulumi_stack_yaml(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    Ok(Tera::one_off(PULUMI_STACK_TEMPLATE, &base_context(defaults), false)?)
}

/// The Pulumi program.
pub fn pulumi_main(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    Ok(Tera::one_off(PULUMI_MAIN_TEMPLATE, &base_context(defaults), false)?)
}
