//! The Pipeline Synthesizer.
//!
//! Renders the pipeline assembly source from the validated `PipelineSpec`:
//! a loader binding per referenced component, the custom-training-job
//! wrapping for resourced steps, one invocation per step with its argument
//! bindings and explicit `.after()` dependencies, and the closing call into
//! the orchestration SDK's compiler. The whole file is produced by one
//! named-placeholder template pass.

use serde::Serialize;
use tera::{Context, Tera};

use crate::config::{DefaultsConfig, GENERATED_LICENSE};
use crate::error::PipelineError;
use crate::spec::{PipelineSpec, StepGraph};

const PIPELINE_TEMPLATE: &str = r#"{{ license }}import argparse
import os
{% if custom_jobs %}from functools import partial
from google_cloud_pipeline_components.v1.custom_job import create_custom_training_job_op_from_component
{% endif %}import kfp
from kfp.v2 import compiler, dsl
from kfp.v2.dsl import *
from typing import *
import yaml

def load_custom_component(component_name: str):
    component_path = os.path.join('components',
                                  component_name,
                                  'component.yaml')
    return kfp.components.load_component_from_file(component_path)

def create_training_pipeline(pipeline_job_spec_path: str):
{% for component in components %}    {{ component }} = load_custom_component(component_name='{{ component }}')
{% endfor %}{% for job in custom_jobs %}
    {{ job.name }}_custom_training_job_specs = {
        'component_spec': {{ job.name }},
        'display_name': '{{ job.name }}',
        'machine_type': '{{ job.machine_type }}',
{% if job.accelerator_type %}        'accelerator_type': '{{ job.accelerator_type }}',
        'accelerator_count': {{ job.accelerator_count }},
{% endif %}        'replica_count': {{ job.replica_count }},
    }
    {{ job.name }}_job_op = create_custom_training_job_op_from_component(**{{ job.name }}_custom_training_job_specs)
    {{ job.name }} = partial({{ job.name }}_job_op, project='{{ project_id }}')
{% endfor %}
    @dsl.pipeline(
        name='{{ pipeline_name }}',
{% if pipeline_description %}        description='{{ pipeline_description }}',
{% endif %}    )
    def pipeline(
{% for param in params %}        {{ param.name }}: {{ param.annotation }},
{% endfor %}    ):
{% for step in steps %}        {{ step.name }}_task = {{ step.name }}(
{% for kwarg in step.kwargs %}            {{ kwarg.target }}={{ kwarg.source }},
{% endfor %}        ){% if step.after %}.after({{ step.after }}){% endif %}

{% endfor %}
    compiler.Compiler().compile(
        pipeline_func=pipeline,
        package_path=pipeline_job_spec_path)

if __name__ == '__main__':
    parser = argparse.ArgumentParser()
    parser.add_argument('--config', type=str,
                        help='The config file for setting default values.')

    args = parser.parse_args()

    with open(args.config, 'r', encoding='utf-8') as config_file:
        config = yaml.load(config_file, Loader=yaml.FullLoader)

    create_training_pipeline(
        pipeline_job_spec_path=config['pipelines']['pipeline_job_spec_path'])
"#;

#[derive(Serialize)]
struct ParamContext {
    name: String,
    annotation: &'static str,
}

#[derive(Serialize)]
struct KwargContext {
    target: String,
    source: String,
}

#[derive(Serialize)]
struct StepContext {
    name: String,
    kwargs: Vec<KwargContext>,
    /// Rendered `.after()` argument list, empty for root steps.
    after: String,
}

#[derive(Serialize)]
struct CustomJobContext {
    name: String,
    machine_type: String,
    accelerator_type: Option<String>,
    accelerator_count: u32,
    replica_count: u32,
}

/// Renders the pipeline assembly source for a validated spec.
pub fn synthesize(
    spec: &PipelineSpec,
    defaults: &DefaultsConfig,
) -> Result<String, PipelineError> {
    let graph = StepGraph::build(&spec.steps)?;

    let params: Vec<ParamContext> = spec
        .params
        .iter()
        .map(|param| ParamContext {
            name: param.name.clone(),
            annotation: param
                .kind()
                .map(|k| k.python_annotation())
                .unwrap_or("str"),
        })
        .collect();

    let custom_jobs: Vec<CustomJobContext> = spec
        .steps
        .iter()
        .filter_map(|step| {
            step.resources.as_ref().map(|resources| CustomJobContext {
                name: step.component_name.clone(),
                machine_type: resources.machine_type.clone(),
                accelerator_type: resources.accelerator_type.clone(),
                accelerator_count: resources.accelerator_count.unwrap_or(1),
                replica_count: resources.replica_count,
            })
        })
        .collect();

    // Emit invocations in topological order so every task binding exists
    // before a later step's .after() references it.
    let steps: Vec<StepContext> = graph
        .topological_order()
        .iter()
        .map(|name| {
            let step = spec
                .steps
                .iter()
                .find(|s| &s.component_name == name)
                .expect("graph nodes come from steps");
            let after = graph
                .predecessors(name)
                .iter()
                .map(|pred| format!("{pred}_task"))
                .collect::<Vec<_>>()
                .join(", ");
            StepContext {
                name: name.clone(),
                kwargs: step
                    .param_mapping
                    .iter()
                    .map(|(component_param, pipeline_param)| KwargContext {
                        target: component_param.clone(),
                        source: pipeline_param.clone(),
                    })
                    .collect(),
                after,
            }
        })
        .collect();

    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    context.insert("components", graph.declaration_order());
    context.insert("custom_jobs", &custom_jobs);
    context.insert("project_id", &defaults.gcp.project_id);
    context.insert("pipeline_name", &spec.name);
    context.insert("pipeline_description", &spec.description);
    context.insert("params", &params);
    context.insert("steps", &steps);
    Ok(Tera::one_off(PIPELINE_TEMPLATE, &context, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_defaults;
    use crate::spec::params::ParameterSpec;
    use crate::spec::pipeline::{PipelineStep, StepResources};

    fn param(name: &str, tag: &str) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            param_type: tag.to_string(),
            description: "No description provided.".to_string(),
        }
    }

    fn step(name: &str, mapping: &[(&str, &str)]) -> PipelineStep {
        PipelineStep {
            component_name: name.to_string(),
            param_mapping: mapping
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            depends_on: vec![],
            resources: None,
        }
    }

    fn sample_spec() -> PipelineSpec {
        PipelineSpec {
            name: "training-pipeline".to_string(),
            description: Some("Trains and deploys.".to_string()),
            params: vec![param("bq_table", "String"), param("epochs", "Integer")],
            steps: vec![
                step("create_dataset", &[("bq_table", "bq_table")]),
                step("train_model", &[("epochs", "epochs")]),
            ],
        }
    }

    #[test]
    fn test_synthesize_emits_loader_per_component() {
        let source = synthesize(&sample_spec(), &test_defaults()).expect("synthesize");
        assert!(source
            .contains("create_dataset = load_custom_component(component_name='create_dataset')"));
        assert!(source.contains("train_model = load_custom_component(component_name='train_model')"));
    }

    #[test]
    fn test_synthesize_chains_steps_in_order() {
        let source = synthesize(&sample_spec(), &test_defaults()).expect("synthesize");
        assert!(source.contains("create_dataset_task = create_dataset("));
        assert!(source.contains(").after(create_dataset_task)"));
        let dataset_pos = source.find("create_dataset_task = ").expect("dataset task");
        let train_pos = source.find("train_model_task = ").expect("train task");
        assert!(dataset_pos < train_pos);
    }

    #[test]
    fn test_synthesize_maps_pipeline_parameters() {
        let source = synthesize(&sample_spec(), &test_defaults()).expect("synthesize");
        assert!(source.contains("bq_table: str,"));
        assert!(source.contains("epochs: int,"));
        assert!(source.contains("bq_table=bq_table,"));
        assert!(source.contains("epochs=epochs,"));
    }

    #[test]
    fn test_synthesize_ends_with_compile_call() {
        let source = synthesize(&sample_spec(), &test_defaults()).expect("synthesize");
        assert!(source.contains("compiler.Compiler().compile("));
        assert!(source.contains("package_path=pipeline_job_spec_path)"));
    }

    #[test]
    fn test_synthesize_omits_custom_job_imports_without_resources() {
        let source = synthesize(&sample_spec(), &test_defaults()).expect("synthesize");
        assert!(!source.contains("create_custom_training_job_op_from_component"));
        assert!(!source.contains("from functools import partial"));
    }

    #[test]
    fn test_synthesize_wraps_resourced_steps() {
        let mut spec = sample_spec();
        spec.steps[1].resources = Some(StepResources {
            machine_type: "a2-highgpu-1g".to_string(),
            accelerator_type: Some("NVIDIA_TESLA_A100".to_string()),
            accelerator_count: Some(2),
            replica_count: 1,
        });
        let source = synthesize(&spec, &test_defaults()).expect("synthesize");
        assert!(source.contains("train_model_custom_training_job_specs = {"));
        assert!(source.contains("'machine_type': 'a2-highgpu-1g',"));
        assert!(source.contains("'accelerator_type': 'NVIDIA_TESLA_A100',"));
        assert!(source.contains("'accelerator_count': 2,"));
        assert!(source.contains(
            "train_model_job_op = create_custom_training_job_op_from_component(**train_model_custom_training_job_specs)"
        ));
        assert!(source.contains("train_model = partial(train_model_job_op, project='my-project')"));
    }

    #[test]
    fn test_synthesize_fan_in_lists_both_predecessors() {
        let mut spec = sample_spec();
        spec.steps.push(PipelineStep {
            component_name: "evaluate".to_string(),
            param_mapping: vec![],
            depends_on: vec!["create_dataset".to_string(), "train_model".to_string()],
            resources: None,
        });
        let source = synthesize(&spec, &test_defaults()).expect("synthesize");
        assert!(source.contains(".after(create_dataset_task, train_model_task)"));
    }
}
