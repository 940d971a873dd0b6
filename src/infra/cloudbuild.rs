//! Cloud Build configuration generation.
//!
//! The generated `cloudbuild.yaml` always builds and pushes the shared
//! component base image. In CI/CD mode it additionally builds, pushes and
//! deploys the Cloud Run pipeline-runner service and submits the job to the
//! queueing service; with a schedule active it also creates the scheduler
//! job.

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, GENERATED_DIR_NAME, GENERATED_LICENSE};
use crate::error::InfraError;

const CLOUDBUILD_TEMPLATE: &str = r#"{{ license }}steps:
# ==============================================================================
# BUILD & PUSH CUSTOM COMPONENT IMAGES
# ==============================================================================

  # build the component_base image
  - name: "gcr.io/cloud-builders/docker"
    args: [ "build", "-t", "{{ component_base_image }}", "." ]
    dir: "{{ generated_dir }}/components/component_base"
    id: "build_component_base"
    waitFor: ["-"]

  # push the component_base image
  - name: "gcr.io/cloud-builders/docker"
    args: ["push", "{{ component_base_image }}"]
    dir: "{{ generated_dir }}/components/component_base"
    id: "push_component_base"
    waitFor: ["build_component_base"]
{% if use_ci_cd %}
# ==============================================================================
# BUILD & PUSH CLOUD RUN IMAGES
# ==============================================================================

  # build the run_pipeline image
  - name: 'gcr.io/cloud-builders/docker'
    args: [ "build", "-t", "{{ run_pipeline_image }}", "-f", "cloud_run/run_pipeline/Dockerfile", "." ]
    dir: "{{ generated_dir }}"
    id: "build_pipeline_runner_svc"
    waitFor: ['push_component_base']

  # push the run_pipeline image
  - name: "gcr.io/cloud-builders/docker"
    args: ["push", "{{ run_pipeline_image }}"]
    dir: "{{ generated_dir }}"
    id: "push_pipeline_runner_svc"
    waitFor: ["build_pipeline_runner_svc"]

  # deploy the cloud run service
  - name: "gcr.io/google.com/cloudsdktool/cloud-sdk"
    entrypoint: gcloud
    args: ["run",
           "deploy",
           "{{ cloud_run_name }}",
           "--image",
           "{{ run_pipeline_image }}",
           "--region",
           "{{ cloud_run_location }}",
           "--service-account",
           "{{ service_account }}",{% if has_vpc_connector %}
           "--ingress", "internal",
           "--vpc-connector", "{{ vpc_connector }}",
           "--vpc-egress", "all-traffic"{% endif %}]
    id: "deploy_pipeline_runner_svc"
    waitFor: ["push_pipeline_runner_svc"]

  # Copy runtime parameters
  - name: 'gcr.io/cloud-builders/gcloud'
    entrypoint: bash
    args:
      - '-e'
      - '-c'
      - |
        cp -r {{ generated_dir }}/cloud_run/queueing_svc .
    id: "setup_queueing_svc"
    waitFor: ["deploy_pipeline_runner_svc"]

  # Install dependencies
  - name: python
    entrypoint: pip
    args: ["install", "-r", "queueing_svc/requirements.txt", "--user"]
    id: "install_queueing_svc_deps"
    waitFor: ["setup_queueing_svc"]

  # Submit to queue
  - name: python
    entrypoint: python
    args: ["queueing_svc/main.py", "--setting", "queue_job"]
    id: "submit_job_to_queue"
    waitFor: ["install_queueing_svc_deps"]
{% if has_schedule %}
  # Create Scheduler Job
  - name: python
    entrypoint: python
    args: ["queueing_svc/main.py", "--setting", "schedule_job"]
    id: "schedule_job"
    waitFor: ["submit_job_to_queue"]
{% endif %}{% endif %}
images:
  # custom component images
  - "{{ component_base_image }}"
{% if use_ci_cd %}  # Cloud Run image
  - "{{ run_pipeline_image }}"
{% endif %}"#;

/// Renders the Cloud Build configuration for the generated project.
pub fn cloudbuild_config(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    context.insert("generated_dir", GENERATED_DIR_NAME);
    context.insert("component_base_image", &defaults.component_base_image());
    context.insert("run_pipeline_image", &defaults.run_pipeline_image());
    context.insert("cloud_run_name", &defaults.gcp.cloud_run_name);
    context.insert("cloud_run_location", &defaults.gcp.cloud_run_location);
    context.insert(
        "service_account",
        &defaults.gcp.pipeline_runner_service_account,
    );
    context.insert("use_ci_cd", &defaults.gcp.use_ci_cd);
    context.insert("has_schedule", &defaults.has_schedule());
    context.insert("has_vpc_connector", &defaults.has_vpc_connector());
    context.insert("vpc_connector", &defaults.gcp.vpc_connector);
    Ok(Tera::one_off(CLOUDBUILD_TEMPLATE, &context, false)?)
}
