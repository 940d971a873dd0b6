//! The Component Synthesizer.
//!
//! Extracts a declared component function into a staged descriptor: name,
//! description and normalized inputs from the parsed function, plus the
//! two-part bootstrap command that installs declared packages at container
//! start and then hands over to the captured function source. The real
//! image reference is not assigned here; staging records the placeholder.

use tera::{Context, Tera};

use crate::config::ProjectLayout;
use crate::error::ComponentError;
use crate::manifest::ComponentDecl;
use crate::source::FunctionDefinition;
use crate::spec::{normalize, ComponentSpec};
use crate::utils;

/// Bootstrap shell snippet run as the container entrypoint while the
/// component is staged. Installing at run time keeps the image build
/// trivial at the cost of a slower cold start; the formalizer later
/// replaces this with the canonical launch command.
const INSTALL_BOOTSTRAP_TEMPLATE: &str = r#"if ! [ -x "$(command -v pip)" ]; then
    python3 -m ensurepip || python3 -m ensurepip --user || apt-get install python3-pip
fi
PIP_DISABLE_PIP_VERSION_CHECK=1 python3 -m pip install --quiet \
    --no-warn-script-location {{ package_list }} && "$0" "$@"

"#;

/// Renders the dependency-bootstrap snippet for the declared packages.
pub fn bootstrap_snippet(packages: &[String]) -> Result<String, ComponentError> {
    let package_list = packages
        .iter()
        .map(|package| format!("'{package}'"))
        .collect::<Vec<_>>()
        .join(" ");
    let mut context = Context::new();
    context.insert("package_list", &package_list);
    Ok(Tera::one_off(INSTALL_BOOTSTRAP_TEMPLATE, &context, false)?)
}

/// Synthesizes a component from its declaration and writes the staged
/// descriptor, keyed by component name.
///
/// Fails before writing anything if a parameter is missing its type
/// annotation or the parameter list does not normalize.
pub fn create_component_scaffold(
    decl: &ComponentDecl,
    layout: &ProjectLayout,
) -> Result<ComponentSpec, ComponentError> {
    let function = FunctionDefinition::from_file(&decl.source)?;
    let inputs = normalize(&function.parameters)?;
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        bootstrap_snippet(&decl.packages)?,
        function.custom_code(),
    ];
    let spec = ComponentSpec::staged(
        function.name.clone(),
        function.description.clone(),
        inputs,
        command,
        decl.image.clone(),
    );

    let staged_path = layout.staged_component(&spec.name);
    utils::write_file(&staged_path, &serde_yaml::to_string(&spec)?)?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::IMAGE_PLACEHOLDER;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_component_source(dir: &Path) -> ComponentDecl {
        let source = dir.join("create_dataset.py");
        utils::write_file(
            &source,
            r#"import pandas as pd

def create_dataset(bq_table: str, data_path: str, project_id: str):
    """Loads data."""
    pass
"#,
        )
        .expect("write source");
        ComponentDecl {
            source,
            packages: vec!["pandas".to_string(), "google-cloud-bigquery".to_string()],
            image: None,
        }
    }

    #[test]
    fn test_scaffold_stages_descriptor_with_placeholder_image() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let decl = write_component_source(dir.path());

        let spec = create_component_scaffold(&decl, &layout).expect("scaffold succeeds");
        assert_eq!(spec.name, "create_dataset");
        assert_eq!(spec.implementation.container.image, IMAGE_PLACEHOLDER);
        assert_eq!(spec.inputs.len(), 3);
        assert!(spec.inputs.iter().all(|p| p.param_type == "String"));
        assert!(layout.staged_component("create_dataset").is_file());
    }

    #[test]
    fn test_scaffold_command_carries_bootstrap_and_source() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let decl = write_component_source(dir.path());

        let spec = create_component_scaffold(&decl, &layout).expect("scaffold succeeds");
        let command = &spec.implementation.container.command;
        assert_eq!(command[0], "sh");
        assert_eq!(command[1], "-c");
        assert!(command[2].contains("'pandas' 'google-cloud-bigquery'"));
        assert!(command[2].contains("ensurepip"));
        assert!(command[3].contains("def create_dataset("));
        assert!(command[3].starts_with("import pandas as pd"));
    }

    #[test]
    fn test_scaffold_fails_on_missing_annotation_before_writing() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let source = dir.path().join("bad.py");
        utils::write_file(&source, "def bad(data_path):\n    pass\n").expect("write source");
        let decl = ComponentDecl {
            source,
            packages: vec![],
            image: None,
        };

        let err = create_component_scaffold(&decl, &layout).expect_err("must fail");
        assert!(err.to_string().contains("data_path"));
        assert!(!layout.staged_component("bad").exists());
    }

    #[test]
    fn test_scaffold_keeps_image_override() {
        let dir = TempDir::new().expect("tempdir");
        let layout = ProjectLayout::new(dir.path());
        let mut decl = write_component_source(dir.path());
        decl.image = Some("us-docker.pkg.dev/my/own/image:1".to_string());

        let spec = create_component_scaffold(&decl, &layout).expect("scaffold succeeds");
        assert_eq!(
            spec.base_image_override.as_deref(),
            Some("us-docker.pkg.dev/my/own/image:1")
        );
    }
}
