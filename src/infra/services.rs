//! Cloud Run service sources generated in CI/CD mode.
//!
//! Two services: the pipeline-runner (a small Flask app that receives the
//! runtime parameters and submits the compiled PipelineJob) and the
//! queueing service (submits a task to the Cloud Tasks queue and, when a
//! schedule is active, creates the Cloud Scheduler job).

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, GENERATED_LICENSE};
use crate::error::InfraError;

const RUN_PIPELINE_DOCKERFILE: &str = r#"{{ license }}FROM python:3.9

# Allow statements and log messages to immediately appear in the Knative logs
ENV PYTHONUNBUFFERED True

# Copy local code to the container image.
ENV APP_HOME /app
WORKDIR $APP_HOME
COPY ./ ./

# Upgrade pip
RUN python -m pip install --upgrade pip
# Install requirements
RUN pip install --no-cache-dir -r /app/cloud_run/run_pipeline/requirements.txt
# Compile pipeline spec
RUN ./scripts/build_pipeline_spec.sh
# Change Directories
WORKDIR "/app/cloud_run/run_pipeline"
# Run flask api server
CMD exec gunicorn --bind :$PORT --workers 1 --threads 8 --timeout 0 main:app
"#;

const RUN_PIPELINE_MAIN_TEMPLATE: &str = r#"{{ license }}"""Cloud Run service that submits the compiled pipeline spec."""
import logging
import os
from typing import Tuple

import flask
from google.cloud import aiplatform
import yaml

app = flask.Flask(__name__)

logger = logging.getLogger()
log_level = os.environ.get('LOG_LEVEL', 'INFO')
logger.setLevel(log_level)

CONFIG_FILE = '../../configs/defaults.yaml'
PIPELINE_SPEC_PATH_LOCAL = '../../scripts/pipeline_spec/pipeline_job.json'

@app.route('/', methods=['POST'])
def process_request() -> flask.Response:
    """HTTP web service to trigger pipeline execution."""
    content_type = flask.request.headers['content-type']
    if content_type != 'application/json':
        raise ValueError(f'Unknown content type: {content_type}')
    request_json = flask.request.json

    logging.debug('JSON received:')
    logging.debug(request_json)

    with open(CONFIG_FILE, 'r', encoding='utf-8') as config_file:
        config = yaml.load(config_file, Loader=yaml.FullLoader)

    logging.debug('Calling run_pipeline()')
    dashboard_uri, resource_name = run_pipeline(
        project_id=config['gcp']['project_id'],
        pipeline_root=config['pipelines']['pipeline_storage_path'],
        pipeline_runner_sa=config['gcp']['pipeline_runner_service_account'],
        pipeline_params=request_json,
        pipeline_spec_path=PIPELINE_SPEC_PATH_LOCAL)
    return flask.make_response({
        'dashboard_uri': dashboard_uri,
        'resource_name': resource_name
    }, 200)

def run_pipeline(
    project_id: str,
    pipeline_root: str,
    pipeline_runner_sa: str,
    pipeline_params: dict,
    pipeline_spec_path: str,
    display_name: str = 'mlops-pipeline-run',
    enable_caching: bool = False) -> Tuple[str, str]:
    """Executes a pipeline run.

    Args:
        project_id: The project_id.
        pipeline_root: GCS location of the pipeline runs metadata.
        pipeline_runner_sa: Service Account to runner PipelineJobs.
        pipeline_params: Pipeline parameters values.
        pipeline_spec_path: Location of the pipeline spec JSON.
        display_name: Name to call the pipeline.
        enable_caching: Should caching be enabled (Boolean)
    """
    logging.debug('Pipeline parameters configured:')
    logging.debug(pipeline_params)

    aiplatform.init(project=project_id)
    job = aiplatform.PipelineJob(
        display_name=display_name,
        template_path=pipeline_spec_path,
        pipeline_root=pipeline_root,
        parameter_values=pipeline_params,
        enable_caching=enable_caching)
    logging.debug('AI Platform job built. Submitting...')
    job.submit(service_account=pipeline_runner_sa)
    logging.debug('Job sent!')
    dashboard_uri = job._dashboard_uri()
    resource_name = job.resource_name
    return dashboard_uri, resource_name

if __name__ == '__main__':
    app.run(debug=True, host='0.0.0.0', port=int(os.environ.get('PORT', 8080)))
"#;

const QUEUEING_MAIN_TEMPLATE: &str = r#"{{ license }}"""Submit the pipeline job via Cloud Tasks and create the Cloud Scheduler job."""
import argparse
import json

from google.cloud import run_v2
from google.cloud import scheduler_v1
from google.cloud import tasks_v2

CLOUD_RUN_LOCATION = '{{ cloud_run_location }}'
CLOUD_RUN_NAME = '{{ cloud_run_name }}'
CLOUD_TASKS_QUEUE_LOCATION = '{{ cloud_tasks_queue_location }}'
CLOUD_TASKS_QUEUE_NAME = '{{ cloud_tasks_queue_name }}'
PARAMETER_VALUES_PATH = 'queueing_svc/pipeline_parameter_values.json'
PIPELINE_RUNNER_SA = '{{ pipeline_runner_service_account }}'
PROJECT_ID = '{{ project_id }}'
SCHEDULE_LOCATION = '{{ cloud_schedule_location }}'
SCHEDULE_PATTERN = '{{ cloud_schedule_pattern }}'
SCHEDULE_NAME = '{{ cloud_schedule_name }}'

def get_runner_svc_uri(
    cloud_run_location: str,
    cloud_run_name: str,
    project_id: str):
    """Fetches the uri for the given cloud run instance.

    Args:
        cloud_run_location: The location of the cloud runner service.
        cloud_run_name: The name of the cloud runner service.
        project_id: The project ID.
    Returns:
        str: Uri of the Cloud Run instance.
    """
    client = run_v2.ServicesClient()
    parent = client.service_path(project_id, cloud_run_location, cloud_run_name)
    request = run_v2.GetServiceRequest(name=parent)
    response = client.get_service(request=request)
    return response.uri

def get_json_bytes(file_path: str):
    """Reads a json file at the specified path and returns as bytes.

    Args:
        file_path: Path of the json file.
    Returns:
        bytes: Encoded bytes of the file.
    """
    try:
        with open(file_path, 'r', encoding='utf-8') as file:
            data = json.load(file)
    except OSError as err:
        raise Exception(f'Error reading json file. {err}') from err
    return json.dumps(data).encode()

def create_cloud_task(
    cloud_tasks_queue_location: str,
    cloud_tasks_queue_name: str,
    parameter_values_path: str,
    pipeline_runner_sa: str,
    project_id: str,
    runner_svc_uri: str):
    """Creates a task in the queue with the runtime parameters.

    Args:
        cloud_tasks_queue_location: The location of the cloud tasks queue.
        cloud_tasks_queue_name: The name of the cloud tasks queue.
        parameter_values_path: Path to json pipeline params.
        pipeline_runner_sa: Service Account to runner PipelineJobs.
        project_id: The project ID.
        runner_svc_uri: Uri of the Cloud Run instance.
    """
    client = tasks_v2.CloudTasksClient()
    parent = client.queue_path(project_id, cloud_tasks_queue_location, cloud_tasks_queue_name)
    task = {
        'http_request': {
            'http_method': tasks_v2.HttpMethod.POST,
            'url': runner_svc_uri,
            'oidc_token': {
                'service_account_email': pipeline_runner_sa,
                'audience': runner_svc_uri
            },
            'headers': {
               'Content-Type': 'application/json'
            }
        }
    }
    task['http_request']['body'] = get_json_bytes(parameter_values_path)
    response = client.create_task(request={'parent': parent, 'task': task})
    print(f'Created task {response.name}')

def create_cloud_scheduler_job(
    parameter_values_path: str,
    pipeline_runner_sa: str,
    project_id: str,
    runner_svc_uri: str,
    schedule_location: str,
    schedule_name: str,
    schedule_pattern: str):
    """Creates a scheduled pipeline job.

    Args:
        parameter_values_path: Path to json pipeline params.
        pipeline_runner_sa: Service Account to runner PipelineJobs.
        project_id: The project ID.
        runner_svc_uri: Uri of the Cloud Run instance.
        schedule_location: The location of the scheduler resource.
        schedule_name: The name of the scheduler resource.
        schedule_pattern: Cron formatted value used to create a Scheduled retrain job.
    """
    client = scheduler_v1.CloudSchedulerClient()
    parent = f'projects/{project_id}/locations/{schedule_location}'
    name = f'{parent}/jobs/{schedule_name}'

    request = scheduler_v1.ListJobsRequest(parent=parent)
    page_result = client.list_jobs(request=request)
    for response in page_result:
        if response.name == name:
            print(f'Cloud Scheduler {schedule_name} resource already exists in '
                  f'project {project_id}.')
            return

    oidc_token = scheduler_v1.OidcToken(
        service_account_email=pipeline_runner_sa,
        audience=runner_svc_uri)

    target = scheduler_v1.HttpTarget(
        uri=runner_svc_uri,
        http_method=scheduler_v1.HttpMethod(1), # HTTP POST
        headers={'Content-Type': 'application/json'},
        body=get_json_bytes(parameter_values_path),
        oidc_token=oidc_token)

    job = scheduler_v1.Job(
        name=f'{parent}/jobs/{schedule_name}',
        description='MLOpsForge cloud scheduled run.',
        http_target=target,
        schedule=schedule_pattern)

    request = scheduler_v1.CreateJobRequest(
        parent=parent,
        job=job)

    response = client.create_job(request=request)
    print(response)

if __name__ == '__main__':
    parser = argparse.ArgumentParser()
    parser.add_argument('--setting', type=str,
                        help='Whether to queue_job or schedule_job.')
    args = parser.parse_args()

    uri = get_runner_svc_uri(
        cloud_run_location=CLOUD_RUN_LOCATION,
        cloud_run_name=CLOUD_RUN_NAME,
        project_id=PROJECT_ID)

    if args.setting == 'queue_job':
        create_cloud_task(
            cloud_tasks_queue_location=CLOUD_TASKS_QUEUE_LOCATION,
            cloud_tasks_queue_name=CLOUD_TASKS_QUEUE_NAME,
            parameter_values_path=PARAMETER_VALUES_PATH,
            pipeline_runner_sa=PIPELINE_RUNNER_SA,
            project_id=PROJECT_ID,
            runner_svc_uri=uri)

    if args.setting == 'schedule_job':
        create_cloud_scheduler_job(
            parameter_values_path=PARAMETER_VALUES_PATH,
            pipeline_runner_sa=PIPELINE_RUNNER_SA,
            project_id=PROJECT_ID,
            runner_svc_uri=uri,
            schedule_location=SCHEDULE_LOCATION,
            schedule_name=SCHEDULE_NAME,
            schedule_pattern=SCHEDULE_PATTERN)
"#;

/// Dockerfile for the pipeline-runner service image.
pub fn run_pipeline_dockerfile() -> Result<String, InfraError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    Ok(Tera::one_off(RUN_PIPELINE_DOCKERFILE, &context, false)?)
}

/// Requirements of the pipeline-runner service image.
pub fn run_pipeline_requirements() -> String {
    "kfp\ngoogle-cloud-aiplatform\ngoogle-cloud-pipeline-components\nFlask\ngunicorn\npyyaml\n"
        .to_string()
}

/// Flask entry point of the pipeline-runner service.
pub fn run_pipeline_main() -> Result<String, InfraError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    Ok(Tera::one_off(RUN_PIPELINE_MAIN_TEMPLATE, &context, false)?)
}

/// Requirements of the queueing service.
pub fn queueing_svc_requirements() -> String {
    "google-cloud\ngoogle-cloud-tasks\ngoogle-api-python-client\ngoogle-cloud-run\ngoogle-cloud-scheduler\n"
        .to_string()
}

/// Entry point of the queueing service: submits the job to the Cloud Tasks
/// queue, or creates the Cloud Scheduler job.
pub fn queueing_svc_main(defaults: &DefaultsConfig) -> Result<String, InfraError> {
    let gcp = &defaults.gcp;
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    context.insert("cloud_run_location", &gcp.cloud_run_location);
    context.insert("cloud_run_name", &gcp.cloud_run_name);
    context.insert("cloud_tasks_queue_location", &gcp.cloud_tasks_queue_location);
    context.insert("cloud_tasks_queue_name", &gcp.cloud_tasks_queue_name);
    context.insert(
        "pipeline_runner_service_account",
        &gcp.pipeline_runner_service_account,
    );
    context.insert("project_id", &gcp.project_id);
    context.insert("cloud_schedule_location", &gcp.cloud_schedule_location);
    context.insert("cloud_schedule_pattern", &gcp.cloud_schedule_pattern);
    context.insert("cloud_schedule_name", &gcp.cloud_schedule_name);
    Ok(Tera::one_off(QUEUEING_MAIN_TEMPLATE, &context, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_defaults;

    #[test]
    fn test_run_pipeline_service_sources() {
        let dockerfile = run_pipeline_dockerfile().expect("render");
        assert!(dockerfile.contains("gunicorn --bind :$PORT"));
        assert!(dockerfile.contains("RUN ./scripts/build_pipeline_spec.sh"));

        let main = run_pipeline_main().expect("render");
        assert!(main.contains("@app.route('/', methods=['POST'])"));
        assert!(main.contains("job.submit(service_account=pipeline_runner_sa)"));
        assert!(run_pipeline_requirements().contains("Flask"));
    }

    #[test]
    fn test_queueing_service_embeds_defaults() {
        let defaults = test_defaults();
        let main = queueing_svc_main(&defaults).expect("render");
        assert!(main.contains("PROJECT_ID = 'my-project'"));
        assert!(main.contains("CLOUD_TASKS_QUEUE_NAME = 'queueing-svc'"));
        assert!(main.contains("--setting"));
        assert!(main.contains("create_cloud_scheduler_job"));
        assert!(queueing_svc_requirements().contains("google-cloud-tasks"));
    }
}
