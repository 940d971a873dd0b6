//! Parameter normalization for component and pipeline declarations.
//!
//! User-declared parameters arrive as loosely typed records (from a parsed
//! Python signature or from the workflow manifest). Normalization validates
//! them and converts each type to its canonical descriptor tag. Only a
//! closed set of primitive kinds is supported; anything else fails, it is
//! never silently coerced.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ParameterError;

/// Description filled in when a parameter declares none.
pub const DEFAULT_DESCRIPTION: &str = "No description provided.";

/// The closed set of supported parameter kinds.
///
/// Canonical tags are a fixed bijection from the Python primitive set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    String,
    Float,
    Bool,
    List,
    Dict,
}

impl ParamType {
    /// Parses a Python primitive name or an already-canonical tag.
    ///
    /// Accepting canonical tags makes normalization idempotent.
    pub fn parse(annotation: &str) -> Option<Self> {
        match annotation.trim() {
            "int" | "Integer" => Some(Self::Integer),
            "str" | "String" => Some(Self::String),
            "float" | "Float" => Some(Self::Float),
            "bool" | "Bool" => Some(Self::Bool),
            "list" | "List" => Some(Self::List),
            "dict" | "Dict" => Some(Self::Dict),
            _ => None,
        }
    }

    /// The canonical tag used in component descriptors.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::String => "String",
            Self::Float => "Float",
            Self::Bool => "Bool",
            Self::List => "List",
            Self::Dict => "Dict",
        }
    }

    /// The Python annotation emitted into generated pipeline source.
    pub fn python_annotation(&self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::String => "str",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
        }
    }
}

/// One formal parameter in its final, normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Unique name within the owning spec.
    pub name: String,
    /// Canonical type tag (`Integer`, `String`, `Float`, `Bool`, `List`, `Dict`).
    #[serde(rename = "type")]
    pub param_type: String,
    /// Human-readable description.
    pub description: String,
}

impl ParameterSpec {
    /// The parsed kind of this parameter.
    ///
    /// Normalization guarantees the tag is canonical, so this cannot fail
    /// for specs produced by [`normalize`].
    pub fn kind(&self) -> Option<ParamType> {
        ParamType::parse(&self.param_type)
    }
}

/// One formal parameter as declared by the user, before normalization.
///
/// The name is kept as a raw YAML value so that a non-string name can be
/// rejected with a descriptive error instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawParameter {
    pub name: serde_yaml::Value,
    #[serde(default, rename = "type")]
    pub param_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RawParameter {
    /// Creates a raw parameter with a string name and annotation.
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: serde_yaml::Value::String(name.into()),
            param_type: Some(param_type.into()),
            description: None,
        }
    }

    /// Attaches a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Creates a raw parameter that carries no type annotation.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: serde_yaml::Value::String(name.into()),
            param_type: None,
            description: None,
        }
    }
}

impl From<ParameterSpec> for RawParameter {
    fn from(spec: ParameterSpec) -> Self {
        Self {
            name: serde_yaml::Value::String(spec.name),
            param_type: Some(spec.param_type),
            description: Some(spec.description),
        }
    }
}

/// Validates and canonicalizes a parameter list.
///
/// Output order equals input order. Fails on a non-string name, a missing
/// annotation, an unsupported type or a duplicate name; fills in
/// [`DEFAULT_DESCRIPTION`] when a description is absent.
pub fn normalize(params: &[RawParameter]) -> Result<Vec<ParameterSpec>, ParameterError> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(params.len());
    for param in params {
        let name = match &param.name {
            serde_yaml::Value::String(name) => name.clone(),
            other => {
                let rendered = serde_yaml::to_string(other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_else(|_| format!("{other:?}"));
                return Err(ParameterError::NameNotString(rendered));
            }
        };
        let annotation = param
            .param_type
            .as_deref()
            .ok_or_else(|| ParameterError::MissingAnnotation(name.clone()))?;
        let kind =
            ParamType::parse(annotation).ok_or_else(|| ParameterError::UnsupportedType {
                name: name.clone(),
                type_name: annotation.to_string(),
            })?;
        if !seen.insert(name.clone()) {
            return Err(ParameterError::Duplicate(name));
        }
        normalized.push(ParameterSpec {
            name,
            param_type: kind.tag().to_string(),
            description: param
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_converts_primitive_types() {
        let params = vec![
            RawParameter::new("epochs", "int"),
            RawParameter::new("bq_table", "str").with_description("Source table."),
            RawParameter::new("learning_rate", "float"),
            RawParameter::new("use_gpu", "bool"),
            RawParameter::new("features", "list"),
            RawParameter::new("hyperparams", "dict"),
        ];
        let normalized = normalize(&params).expect("normalization succeeds");
        let tags: Vec<&str> = normalized.iter().map(|p| p.param_type.as_str()).collect();
        assert_eq!(tags, ["Integer", "String", "Float", "Bool", "List", "Dict"]);
        assert_eq!(normalized[0].description, DEFAULT_DESCRIPTION);
        assert_eq!(normalized[1].description, "Source table.");
    }

    #[test]
    fn test_normalize_preserves_order() {
        let params = vec![
            RawParameter::new("b", "str"),
            RawParameter::new("a", "int"),
        ];
        let normalized = normalize(&params).expect("normalization succeeds");
        assert_eq!(normalized[0].name, "b");
        assert_eq!(normalized[1].name, "a");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let params = vec![
            RawParameter::new("epochs", "int"),
            RawParameter::new("bq_table", "str").with_description("Source table."),
        ];
        let once = normalize(&params).expect("first pass");
        let raw_again: Vec<RawParameter> = once.iter().cloned().map(RawParameter::from).collect();
        let twice = normalize(&raw_again).expect("second pass");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_rejects_duplicate_names() {
        let params = vec![
            RawParameter::new("input1", "str"),
            RawParameter::new("input1", "int"),
        ];
        let err = normalize(&params).expect_err("duplicate must fail");
        assert!(err.to_string().contains("input1"), "error names the dup: {err}");
    }

    #[test]
    fn test_normalize_rejects_unsupported_types() {
        let params = vec![RawParameter::new("model", "tf.keras.Model")];
        let err = normalize(&params).expect_err("non-primitive must fail");
        match err {
            ParameterError::UnsupportedType { name, type_name } => {
                assert_eq!(name, "model");
                assert_eq!(type_name, "tf.keras.Model");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_normalize_rejects_missing_annotation() {
        let params = vec![RawParameter::untyped("data_path")];
        let err = normalize(&params).expect_err("missing annotation must fail");
        assert!(err.to_string().contains("data_path"));
    }

    #[test]
    fn test_normalize_rejects_non_string_names() {
        let params = vec![RawParameter {
            name: serde_yaml::Value::Number(42.into()),
            param_type: Some("str".to_string()),
            description: None,
        }];
        let err = normalize(&params).expect_err("numeric name must fail");
        assert!(matches!(err, ParameterError::NameNotString(_)));
    }

    #[test]
    fn test_param_type_bijection() {
        for (primitive, tag) in [
            ("int", "Integer"),
            ("str", "String"),
            ("float", "Float"),
            ("bool", "Bool"),
            ("list", "List"),
            ("dict", "Dict"),
        ] {
            let kind = ParamType::parse(primitive).expect("primitive parses");
            assert_eq!(kind.tag(), tag);
            assert_eq!(ParamType::parse(tag), Some(kind));
            assert_eq!(kind.python_annotation(), primitive);
        }
        assert_eq!(ParamType::parse("set"), None);
    }
}
