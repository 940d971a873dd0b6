//! The Component Formalizer.
//!
//! Resolves a staged descriptor into its final, permanent form: fixes the
//! container image reference (shared base image, or the per-component
//! override), replaces the bootstrap command with the canonical launch
//! command, and emits the two final artifacts - the component descriptor
//! and the executable task script.

use std::path::Path;

use tera::{Context, Tera};

use crate::config::{DefaultsConfig, ProjectLayout, GENERATED_LICENSE};
use crate::error::ComponentError;
use crate::spec::component::{executor_args, ComponentSpec};
use crate::utils;

/// The executable task script. The generated script dispatches through a
/// closed registry built at generation time, so a single image can run any
/// one of several functions selected by `--function_to_execute`.
const TASK_SCRIPT_TEMPLATE: &str = r#"{{ license }}import argparse
import json

from kfp.v2.components import executor

{{ custom_code }}
_FUNCTION_REGISTRY = {
    '{{ name }}': {{ name }},
}

def main():
    """Main executor."""
    parser = argparse.ArgumentParser()
    parser.add_argument('--executor_input', type=str)
    parser.add_argument('--function_to_execute', type=str)

    args, _ = parser.parse_known_args()
    executor_input = json.loads(args.executor_input)
    function_to_execute = _FUNCTION_REGISTRY[args.function_to_execute]

    executor.Executor(
        executor_input=executor_input,
        function_to_execute=function_to_execute).execute()

if __name__ == '__main__':
    main()
"#;

/// Formalizes one staged component descriptor.
///
/// Writes the final descriptor under `components/<name>/component.yaml`
/// and the task script under `components/component_base/src/<name>.py`,
/// then returns the final spec.
pub fn formalize(
    staged_path: &Path,
    layout: &ProjectLayout,
    defaults: &DefaultsConfig,
    use_vendor_spec: bool,
) -> Result<ComponentSpec, ComponentError> {
    if !staged_path.is_file() {
        return Err(ComponentError::ScaffoldNotFound(
            staged_path.display().to_string(),
        ));
    }
    let text = utils::read_file(staged_path)?;
    let mut spec: ComponentSpec = serde_yaml::from_str(&text)?;

    if use_vendor_spec {
        spec.name = spec.name.replace(' ', "_").to_lowercase();
    }
    let custom_code = spec
        .custom_code()
        .ok_or_else(|| ComponentError::MissingSource(spec.name.clone()))?
        .to_string();

    write_task_script(&spec.name, &custom_code, layout)?;

    // The staged bootstrap command collapses into the canonical launch
    // command now that the final image is known.
    let container = &mut spec.implementation.container;
    container.image = spec
        .base_image_override
        .take()
        .unwrap_or_else(|| defaults.component_base_image());
    container.command = vec![
        "python3".to_string(),
        format!("/pipelines/component/src/{}.py", spec.name),
    ];
    container.args = executor_args(&spec.name);

    let descriptor_path = layout.component_descriptor(&spec.name);
    let mut contents = String::from(GENERATED_LICENSE);
    contents.push_str(&serde_yaml::to_string(&spec)?);
    utils::write_file(&descriptor_path, &contents)?;
    Ok(spec)
}

/// Renders and writes the executable task script for a component.
fn write_task_script(
    name: &str,
    custom_code: &str,
    layout: &ProjectLayout,
) -> Result<(), ComponentError> {
    let mut context = Context::new();
    context.insert("license", GENERATED_LICENSE);
    context.insert("name", name);
    context.insert("custom_code", custom_code);
    let script = Tera::one_off(TASK_SCRIPT_TEMPLATE, &context, false)?;
    utils::write_file(&layout.task_script(name), &script)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::scaffold::create_component_scaffold;
    use crate::config::tests::test_defaults;
    use crate::manifest::ComponentDecl;
    use tempfile::TempDir;

    fn stage_component(dir: &Path, layout: &ProjectLayout) -> ComponentSpec {
        let source = dir.join("create_dataset.py");
        utils::write_file(
            &source,
            r#"def create_dataset(bq_table: str, data_path: str, project_id: str):
    """Loads data."""
    pass
"#,
        )
        .expect("write source");
        let decl = ComponentDecl {
            source,
            packages: vec!["pandas".to_string()],
            image: None,
        };
        create_component_scaffold(&decl, layout).expect("scaffold")
    }

    #[test]
    fn test_formalize_rewrites_image_and_command() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let defaults = test_defaults();
        stage_component(dir.path(), &layout);

        let spec = formalize(
            &layout.staged_component("create_dataset"),
            &layout,
            &defaults,
            false,
        )
        .expect("formalize succeeds");
        assert_eq!(
            spec.implementation.container.image,
            "us-central1-docker.pkg.dev/my-project/vertex-mlops-af/components/component_base:latest"
        );
        assert_eq!(
            spec.implementation.container.command,
            vec![
                "python3".to_string(),
                "/pipelines/component/src/create_dataset.py".to_string()
            ]
        );
    }

    #[test]
    fn test_formalized_descriptor_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let defaults = test_defaults();
        stage_component(dir.path(), &layout);
        formalize(
            &layout.staged_component("create_dataset"),
            &layout,
            &defaults,
            false,
        )
        .expect("formalize succeeds");

        let text = utils::read_file(&layout.component_descriptor("create_dataset"))
            .expect("descriptor exists");
        let loaded: ComponentSpec =
            serde_yaml::from_str(&text).expect("descriptor parses despite license header");
        assert_eq!(
            loaded.implementation.container.command,
            vec![
                "python3".to_string(),
                "/pipelines/component/src/create_dataset.py".to_string()
            ]
        );
        assert_eq!(loaded.base_image_override, None);
        assert_eq!(loaded.inputs.len(), 3);
    }

    #[test]
    fn test_task_script_contains_registry_dispatch() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let defaults = test_defaults();
        stage_component(dir.path(), &layout);
        formalize(
            &layout.staged_component("create_dataset"),
            &layout,
            &defaults,
            false,
        )
        .expect("formalize succeeds");

        let script =
            utils::read_file(&layout.task_script("create_dataset")).expect("script exists");
        assert!(script.contains("def create_dataset("));
        assert!(script.contains("'create_dataset': create_dataset,"));
        assert!(script.contains("_FUNCTION_REGISTRY[args.function_to_execute]"));
        assert!(!script.contains("globals()"));
        assert!(script.contains("--executor_input"));
        assert!(script.contains("--function_to_execute"));
    }

    #[test]
    fn test_image_override_survives_into_final_descriptor() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let defaults = test_defaults();
        let source = dir.path().join("train_model.py");
        utils::write_file(
            &source,
            "def train_model(data_path: str):\n    \"\"\"Trains.\"\"\"\n    pass\n",
        )
        .expect("write source");
        let decl = ComponentDecl {
            source,
            packages: vec![],
            image: Some("us-docker.pkg.dev/my/own/trainer:2".to_string()),
        };
        create_component_scaffold(&decl, &layout).expect("scaffold");

        let spec = formalize(
            &layout.staged_component("train_model"),
            &layout,
            &defaults,
            false,
        )
        .expect("formalize succeeds");
        assert_eq!(
            spec.implementation.container.image,
            "us-docker.pkg.dev/my/own/trainer:2"
        );
        assert_eq!(spec.base_image_override, None);
    }

    #[test]
    fn test_vendor_spec_normalizes_name() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let defaults = test_defaults();
        let source = dir.path().join("spaced.py");
        // The function name itself has no spaces; simulate a staged
        // descriptor whose display name does.
        utils::write_file(&source, "def spaced(a: int):\n    pass\n").expect("write source");
        let decl = ComponentDecl {
            source,
            packages: vec![],
            image: None,
        };
        let mut spec = create_component_scaffold(&decl, &layout).expect("scaffold");
        spec.name = "Spaced Name".to_string();
        utils::write_file(
            &layout.staged_component("spaced"),
            &serde_yaml::to_string(&spec).expect("serialize"),
        )
        .expect("rewrite staged");

        let formalized = formalize(
            &layout.staged_component("spaced"),
            &layout,
            &defaults,
            true,
        )
        .expect("formalize succeeds");
        assert_eq!(formalized.name, "spaced_name");
    }

    #[test]
    fn test_missing_scaffold_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let defaults = test_defaults();
        let err = formalize(
            &layout.staged_component("never_declared"),
            &layout,
            &defaults,
            false,
        )
        .expect_err("must fail");
        assert!(matches!(err, ComponentError::ScaffoldNotFound(_)));
    }
}
