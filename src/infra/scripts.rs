//! Build/run shell scripts, the gcloud provisioning script, the component
//! base Dockerfile and the merged requirements file.

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, GENERATED_DIR_NAME, GENERATED_LICENSE};
use crate::error::InfraError;

/// Default packages baked into the component base image; the original set
/// of GCP clients components commonly need at run time.
const DEFAULT_GCP_PACKAGES: [&str; 12] = [
    "db-dtypes",
    "fsspec",
    "gcsfs",
    "google-cloud-aiplatform",
    "google-cloud-bigquery",
    "google-cloud-bigquery-storage",
    "google-cloud-core",
    "google-cloud-pipeline-components",
    "google-cloud-resource-manager",
    "google-cloud-storage",
    "kfp",
    "pyarrow",
];

const CREATE_RESOURCES_TEMPLATE: &str = r#"#!/bin/bash
{{ license }}# Creates the artifact registry, storage bucket, service account and
# IAM bindings if they do not already exist.

GREEN='\033[0;32m'
NC='\033[0m'
AF_REGISTRY_NAME={{ af_registry_name }}
AF_REGISTRY_LOCATION={{ af_registry_location }}
PROJECT_ID={{ project_id }}
PROJECT_NUMBER=`gcloud projects describe {{ project_id }} --format 'value(projectNumber)'`
BUCKET_NAME={{ gs_bucket_name }}
BUCKET_LOCATION={{ pipeline_region }}
SERVICE_ACCOUNT_NAME={{ service_account_name }}
SERVICE_ACCOUNT_FULL={{ service_account_full }}
CLOUD_SOURCE_REPO={{ cloud_source_repository }}
CLOUD_SOURCE_REPO_BRANCH={{ cloud_source_repository_branch }}
CB_TRIGGER_LOCATION={{ cb_trigger_location }}
CB_TRIGGER_NAME={{ cb_trigger_name }}
CLOUD_TASKS_QUEUE_LOCATION={{ cloud_tasks_queue_location }}
CLOUD_TASKS_QUEUE_NAME={{ cloud_tasks_queue_name }}

echo -e "$GREEN Updating required API services in project $PROJECT_ID $NC"
gcloud services enable cloudresourcemanager.googleapis.com \
  aiplatform.googleapis.com \
  artifactregistry.googleapis.com \
  cloudbuild.googleapis.com \
  cloudscheduler.googleapis.com \
  cloudtasks.googleapis.com \
  compute.googleapis.com \
  iam.googleapis.com \
  iamcredentials.googleapis.com \
  ml.googleapis.com \
  run.googleapis.com \
  storage.googleapis.com \
  sourcerepo.googleapis.com

echo -e "$GREEN Checking for Artifact Registry: $AF_REGISTRY_NAME in project $PROJECT_ID $NC"
if ! (gcloud artifacts repositories list --project="$PROJECT_ID" --location=$AF_REGISTRY_LOCATION | grep -E "(^|[[:blank:]])$AF_REGISTRY_NAME($|[[:blank:]])"); then

  echo "Creating Artifact Registry: ${AF_REGISTRY_NAME} in project $PROJECT_ID"
  gcloud artifacts repositories create "$AF_REGISTRY_NAME" \
    --repository-format=docker \
    --location=$AF_REGISTRY_LOCATION \
    --project="$PROJECT_ID" \
    --description="Artifact Registry ${AF_REGISTRY_NAME} in ${AF_REGISTRY_LOCATION}."

else

  echo "Artifact Registry: ${AF_REGISTRY_NAME} already exists in project $PROJECT_ID"

fi


echo -e "$GREEN Checking for GS Bucket: $BUCKET_NAME in project $PROJECT_ID $NC"
if !(gsutil ls -b gs://$BUCKET_NAME | grep --fixed-strings "$BUCKET_NAME"); then

  echo "Creating GS Bucket: ${BUCKET_NAME} in project $PROJECT_ID"
  gsutil mb -l ${BUCKET_LOCATION} gs://$BUCKET_NAME

else

  echo "GS Bucket: ${BUCKET_NAME} already exists in project $PROJECT_ID"

fi

echo -e "$GREEN Checking for Service Account: $SERVICE_ACCOUNT_NAME in project $PROJECT_ID $NC"
if ! (gcloud iam service-accounts list --project="$PROJECT_ID" | grep -E "(^|[[:blank:]])$SERVICE_ACCOUNT_FULL($|[[:blank:]])"); then

  echo "Creating Service Account: ${SERVICE_ACCOUNT_NAME} in project $PROJECT_ID"
  gcloud iam service-accounts create $SERVICE_ACCOUNT_NAME \
      --description="For submitting PipelineJobs" \
      --display-name="Pipeline Runner Service Account"
else

  echo "Service Account: ${SERVICE_ACCOUNT_NAME} already exists in project $PROJECT_ID"

fi

echo -e "$GREEN Updating required IAM roles in project $PROJECT_ID $NC"
gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/aiplatform.user" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/artifactregistry.reader" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/bigquery.user" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/bigquery.dataEditor" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/iam.serviceAccountUser" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/storage.admin" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$SERVICE_ACCOUNT_FULL" \
    --role="roles/run.admin" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$PROJECT_NUMBER@cloudbuild.gserviceaccount.com" \
    --role="roles/run.admin" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$PROJECT_NUMBER@cloudbuild.gserviceaccount.com" \
    --role="roles/iam.serviceAccountUser" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$PROJECT_NUMBER@cloudbuild.gserviceaccount.com" \
    --role="roles/cloudtasks.enqueuer" \
    --no-user-output-enabled

gcloud projects add-iam-policy-binding $PROJECT_ID \
    --member="serviceAccount:$PROJECT_NUMBER@cloudbuild.gserviceaccount.com" \
    --role="roles/cloudscheduler.admin" \
    --no-user-output-enabled

echo -e "$GREEN Checking for Cloud Source Repository: $CLOUD_SOURCE_REPO in project $PROJECT_ID $NC"
if ! (gcloud source repos list --project="$PROJECT_ID" | grep -E "(^|[[:blank:]])$CLOUD_SOURCE_REPO($|[[:blank:]])"); then

  echo "Creating Cloud Source Repository: ${CLOUD_SOURCE_REPO} in project $PROJECT_ID"
  gcloud source repos create $CLOUD_SOURCE_REPO

else

  echo "Cloud Source Repository: ${CLOUD_SOURCE_REPO} already exists in project $PROJECT_ID"

fi
{% if use_ci_cd %}
# Create cloud tasks queue
echo -e "$GREEN Checking for Cloud Tasks Queue: $CLOUD_TASKS_QUEUE_NAME in project $PROJECT_ID $NC"
if ! (gcloud tasks queues list --location $CLOUD_TASKS_QUEUE_LOCATION | grep -E "(^|[[:blank:]])$CLOUD_TASKS_QUEUE_NAME($|[[:blank:]])"); then

  echo "Creating Cloud Tasks Queue: ${CLOUD_TASKS_QUEUE_NAME} in project $PROJECT_ID"
  gcloud tasks queues create $CLOUD_TASKS_QUEUE_NAME \
  --location=$CLOUD_TASKS_QUEUE_LOCATION

else

  echo "Cloud Tasks Queue: ${CLOUD_TASKS_QUEUE_NAME} already exists in project $PROJECT_ID"

fi

# Create cloud build trigger
echo -e "$GREEN Checking for Cloudbuild Trigger: $CB_TRIGGER_NAME in project $PROJECT_ID $NC"
if ! (gcloud beta builds triggers list --project="$PROJECT_ID" --region="$CB_TRIGGER_LOCATION" | grep -E "(^|[[:blank:]])name: $CB_TRIGGER_NAME($|[[:blank:]])"); then

  echo "Creating Cloudbuild Trigger on branch $CLOUD_SOURCE_REPO_BRANCH in project $PROJECT_ID for repo ${CLOUD_SOURCE_REPO}"
  gcloud beta builds triggers create cloud-source-repositories \
  --region=$CB_TRIGGER_LOCATION \
  --name=$CB_TRIGGER_NAME \
  --repo=$CLOUD_SOURCE_REPO \
  --branch-pattern="$CLOUD_SOURCE_REPO_BRANCH" \
  --build-config={{ generated_dir }}/cloudbuild.yaml

else

  echo "Cloudbuild Trigger already exists in project $PROJECT_ID for repo ${CLOUD_SOURCE_REPO}"

fi
{% endif %}"#;

/// Builds the shell/config artifacts of the generated project.
pub struct ScriptsBuilder<'a> {
    defaults: &'a DefaultsConfig,
}

impl<'a> ScriptsBuilder<'a> {
    pub fn new(defaults: &'a DefaultsConfig) -> Self {
        Self { defaults }
    }

    fn script_header(&self, purpose: &str) -> String {
        format!(
            "#!/bin/bash\n{GENERATED_LICENSE}# {purpose}\n\
             # This script should run from the {GENERATED_DIR_NAME} directory\n\
             # Change directory in case this is not the script root.\n\n"
        )
    }

    /// Shell script that compiles the pipeline job spec.
    pub fn build_pipeline_spec(&self) -> String {
        format!(
            "{}CONFIG_FILE=configs/defaults.yaml\n\npython3 -m pipelines.pipeline --config $CONFIG_FILE\n",
            self.script_header("Builds the pipeline specs")
        )
    }

    /// Shell script that submits the component image build.
    pub fn build_components(&self) -> String {
        format!(
            "{}gcloud builds submit .. --config cloudbuild.yaml --timeout=3600\n",
            self.script_header("Submits a Cloud Build job that builds and deploys the components")
        )
    }

    /// Shell script that submits the PipelineJob.
    pub fn run_pipeline(&self) -> String {
        format!(
            "{}CONFIG_FILE=configs/defaults.yaml\n\npython3 -m pipelines.pipeline_runner --config $CONFIG_FILE\n",
            self.script_header("Submits the PipelineJob to Vertex AI")
        )
    }

    /// Shell script that builds components, compiles the spec and runs the
    /// pipeline in one go.
    pub fn run_all(&self) -> String {
        format!(
            "{}GREEN='\\033[0;32m'\nNC='\\033[0m'\n\n\
             echo -e \"${{GREEN}} BUILDING COMPONENTS ${{NC}}\"\n\
             gcloud builds submit .. --config cloudbuild.yaml --timeout=3600\n\n\
             echo -e \"${{GREEN}} BUILDING PIPELINE SPEC ${{NC}}\"\n\
             ./scripts/build_pipeline_spec.sh\n\n\
             echo -e \"${{GREEN}} RUNNING PIPELINE JOB ${{NC}}\"\n\
             ./scripts/run_pipeline.sh\n",
            self.script_header("Builds components, pipeline specs, and submits the PipelineJob")
        )
    }

    /// Shell script that provisions the GCP resources with gcloud.
    pub fn create_resources(&self) -> Result<String, InfraError> {
        let gcp = &self.defaults.gcp;
        let service_account_name = gcp
            .pipeline_runner_service_account
            .split('@')
            .next()
            .unwrap_or(&gcp.pipeline_runner_service_account);

        let mut context = Context::new();
        context.insert("license", GENERATED_LICENSE);
        context.insert("af_registry_name", &gcp.af_registry_name);
        context.insert("af_registry_location", &gcp.af_registry_location);
        context.insert("project_id", &gcp.project_id);
        context.insert("gs_bucket_name", &gcp.gs_bucket_name);
        context.insert("pipeline_region", &self.defaults.pipelines.pipeline_region);
        context.insert("service_account_name", service_account_name);
        context.insert("service_account_full", &gcp.pipeline_runner_service_account);
        context.insert("cloud_source_repository", &gcp.cloud_source_repository);
        context.insert(
            "cloud_source_repository_branch",
            &gcp.cloud_source_repository_branch,
        );
        context.insert("cb_trigger_location", &gcp.cb_trigger_location);
        context.insert("cb_trigger_name", &gcp.cb_trigger_name);
        context.insert("cloud_tasks_queue_location", &gcp.cloud_tasks_queue_location);
        context.insert("cloud_tasks_queue_name", &gcp.cloud_tasks_queue_name);
        context.insert("use_ci_cd", &gcp.use_ci_cd);
        context.insert("generated_dir", GENERATED_DIR_NAME);
        Ok(Tera::one_off(CREATE_RESOURCES_TEMPLATE, &context, false)?)
    }

    /// Dockerfile for the shared component base image.
    pub fn component_base_dockerfile(&self) -> String {
        format!(
            "{GENERATED_LICENSE}FROM {}\n\
             RUN python -m pip install --upgrade pip\n\
             COPY requirements.txt .\n\
             RUN python -m pip install -r \\\n\
             \x20   requirements.txt --quiet --no-cache-dir \\\n\
             \x20   && rm -f requirements.txt\n\
             COPY ./src /pipelines/component/src\n\
             ENTRYPOINT [\"/bin/bash\"]\n",
            self.defaults.gcp.base_image
        )
    }

    /// Requirements for the component base image: the packages every
    /// declared component asked for plus the default GCP set, deduplicated
    /// and sorted.
    pub fn component_base_requirements(&self, user_packages: &[String]) -> String {
        let mut requirements: Vec<String> = DEFAULT_GCP_PACKAGES
            .iter()
            .map(|package| package.to_string())
            .chain(user_packages.iter().cloned())
            .collect();
        requirements.sort();
        requirements.dedup();
        let mut contents = requirements.join("\n");
        contents.push('\n');
        contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_defaults;

    #[test]
    fn test_build_scripts_reference_defaults_config() {
        let defaults = test_defaults();
        let builder = ScriptsBuilder::new(&defaults);
        assert!(builder
            .build_pipeline_spec()
            .contains("python3 -m pipelines.pipeline --config $CONFIG_FILE"));
        assert!(builder
            .run_pipeline()
            .contains("python3 -m pipelines.pipeline_runner --config $CONFIG_FILE"));
        assert!(builder.build_components().contains("gcloud builds submit"));
        assert!(builder.run_all().contains("BUILDING COMPONENTS"));
    }

    #[test]
    fn test_create_resources_omits_ci_cd_sections_locally() {
        let defaults = test_defaults();
        let builder = ScriptsBuilder::new(&defaults);
        let script = builder.create_resources().expect("render");
        assert!(script.contains("AF_REGISTRY_NAME=vertex-mlops-af"));
        assert!(script.contains("gcloud artifacts repositories create"));
        assert!(!script.contains("gcloud tasks queues create"));
        assert!(!script.contains("builds triggers create"));
    }

    #[test]
    fn test_create_resources_adds_queue_and_trigger_for_ci_cd() {
        let mut defaults = test_defaults();
        defaults.gcp.use_ci_cd = true;
        let builder = ScriptsBuilder::new(&defaults);
        let script = builder.create_resources().expect("render");
        assert!(script.contains("gcloud tasks queues create"));
        assert!(script.contains("--build-config=MLOpsForge/cloudbuild.yaml"));
    }

    #[test]
    fn test_dockerfile_uses_base_image() {
        let defaults = test_defaults();
        let builder = ScriptsBuilder::new(&defaults);
        let dockerfile = builder.component_base_dockerfile();
        assert!(dockerfile.contains("FROM python:3.9-slim"));
        assert!(dockerfile.contains("COPY ./src /pipelines/component/src"));
    }

    #[test]
    fn test_requirements_merge_and_dedupe() {
        let defaults = test_defaults();
        let builder = ScriptsBuilder::new(&defaults);
        let requirements = builder.component_base_requirements(&[
            "pandas".to_string(),
            "kfp".to_string(),
            "pandas".to_string(),
        ]);
        let lines: Vec<&str> = requirements.lines().collect();
        assert_eq!(lines.iter().filter(|l| **l == "pandas").count(), 1);
        assert_eq!(lines.iter().filter(|l| **l == "kfp").count(), 1);
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }
}
