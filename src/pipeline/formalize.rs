//! The Pipeline Formalizer.
//!
//! Consumes the staged pipeline spec and writes the three final artifacts:
//! `pipeline.py` (assembly source + CLI entry point), `pipeline_runner.py`
//! (submits the compiled spec to Vertex AI) and
//! `pipeline_parameter_values.json` (runtime parameter values).

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, ProjectLayout, GENERATED_LICENSE};
use crate::error::PipelineError;
use crate::pipeline::synthesize::synthesize;
use crate::spec::PipelineSpec;
use crate::utils;

const PIPELINE_RUNNER_TEMPLATE: &str = r#"{{ license }}import argparse
import json
import logging
import os
import yaml

from google.cloud import aiplatform

logger = logging.getLogger()
log_level = os.environ.get('LOG_LEVEL', 'INFO')
logger.setLevel(log_level)

def run_pipeline(
    project_id: str,
    pipeline_root: str,
    pipeline_runner_sa: str,
    parameter_values_path: str,
    pipeline_spec_path: str,
    display_name: str = 'mlops-pipeline-run',
    enable_caching: bool = False):
    """Executes a pipeline run.

    Args:
        project_id: The project_id.
        pipeline_root: GCS location of the pipeline runs metadata.
        pipeline_runner_sa: Service Account to runner PipelineJobs.
        parameter_values_path: Location of parameter values JSON.
        pipeline_spec_path: Location of the pipeline spec JSON.
        display_name: Name to call the pipeline.
        enable_caching: Should caching be enabled (Boolean)
    """
    with open(parameter_values_path, 'r', encoding='utf-8') as file:
        pipeline_params = json.load(file)
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

if __name__ == '__main__':
    parser = argparse.ArgumentParser()
    parser.add_argument('--config', type=str,
                        help='The config file for setting default values.')
    args = parser.parse_args()

    with open(args.config, 'r', encoding='utf-8') as config_file:
        config = yaml.load(config_file, Loader=yaml.FullLoader)

    run_pipeline(project_id=config['gcp']['project_id'],
                 pipeline_root=config['pipelines']['pipeline_storage_path'],
                 pipeline_runner_sa=config['gcp']['pipeline_runner_service_account'],
                 parameter_values_path=config['pipelines']['parameter_values_path'],
                 pipeline_spec_path=config['pipelines']['pipeline_job_spec_path'])
"#;

/// Formalizes the staged pipeline into its three final artifacts.
pub fn formalize(
    layout: &ProjectLayout,
    defaults: &DefaultsConfig,
    parameter_values: &serde_json::Map<String, serde_json::Value>,
) -> Result<PipelineSpec, PipelineError> {
    let staged_path = layout.staged_pipeline();
    if !staged_path.is_file() {
        return Err(PipelineError::ScaffoldNotFound(
            staged_path.display().to_string(),
        ));
    }
    let text = utils::read_file(&staged_path)?;
    let spec: PipelineSpec = serde_yaml::from_str(&text)?;

    let pipeline_source = synthesize(&spec, defaults)?;
    utils::write_file(&layout.pipeline_file(), &pipeline_source)?;

    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    let runner_source = Tera::one_off(PIPELINE_RUNNER_TEMPLATE, &context, false)?;
    utils::write_file(&layout.pipeline_runner_file(), &runner_source)?;

    let serialized_params = serde_json::to_string_pretty(parameter_values)?;
    utils::write_file(&layout.parameter_values_file(), &serialized_params)?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_defaults;
    use tempfile::TempDir;

    fn stage_sample_pipeline(layout: &ProjectLayout) {
        let yaml = r#"
name: training-pipeline
params:
  - name: bq_table
    type: String
    description: Source table.
steps:
  - component_name: create_dataset
    param_mapping:
      - [bq_table, bq_table]
"#;
        utils::write_file(&layout.staged_pipeline(), yaml).expect("stage pipeline");
    }

    #[test]
    fn test_formalize_writes_three_artifacts() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        stage_sample_pipeline(&layout);
        let mut values = serde_json::Map::new();
        values.insert(
            "bq_table".to_string(),
            serde_json::Value::String("proj.ds.table".to_string()),
        );

        formalize(&layout, &test_defaults(), &values).expect("formalize succeeds");

        let pipeline = utils::read_file(&layout.pipeline_file()).expect("pipeline.py");
        assert!(pipeline.contains("def create_training_pipeline(pipeline_job_spec_path: str):"));
        assert!(pipeline.contains("if __name__ == '__main__':"));

        let runner = utils::read_file(&layout.pipeline_runner_file()).expect("runner");
        assert!(runner.contains("job.submit(service_account=pipeline_runner_sa)"));
        assert!(runner.contains("--config"));

        let params = utils::read_file(&layout.parameter_values_file()).expect("params json");
        let parsed: serde_json::Value = serde_json::from_str(&params).expect("valid json");
        assert_eq!(parsed["bq_table"], "proj.ds.table");
    }

    #[test]
    fn test_formalize_without_scaffold_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let err = formalize(&layout, &test_defaults(), &serde_json::Map::new())
            .expect_err("no scaffold staged");
        assert!(matches!(err, PipelineError::ScaffoldNotFound(_)));
    }
}
