//! Extraction of annotated Python component functions.
//!
//! A component source file contains module-level imports and one top-level
//! function. This module parses that file into a structured form: the
//! function name, its parameters with annotation text (with `Optional[T]`
//! unwrapped to `T`), the docstring short description, per-parameter
//! docstring descriptions, and the raw function source.
//!
//! Docstring parsing degrades gracefully: a missing or unparseable
//! docstring yields no descriptions, never an error. A parameter that is
//! documented but absent from the signature is ignored; an undocumented
//! signature parameter falls back to the default description downstream.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SourceError;
use crate::spec::params::RawParameter;
use crate::utils;

fn def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^def\s+([A-Za-z_]\w*)\s*\(").expect("static regex"))
}

fn optional_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:typing\.)?Optional\[(?s)(.*)\]$").expect("static regex")
    })
}

fn arg_doc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+([A-Za-z_]\w*)\s*(?:\([^)]*\))?:\s*(.*)$").expect("static regex")
    })
}

/// A parsed Python component function.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    /// The function identifier; becomes the component name.
    pub name: String,
    /// Parameters in signature order, docstring descriptions merged in.
    pub parameters: Vec<RawParameter>,
    /// First line of the docstring, if any.
    pub description: Option<String>,
    /// Module-level import lines preceding the function.
    pub imports: Vec<String>,
    /// The function source text, from its `def` line to end of file.
    pub source: String,
}

impl FunctionDefinition {
    /// Reads and parses a component source file.
    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let text = utils::read_file(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parses component source text. `origin` names the source in errors.
    pub fn parse(text: &str, origin: &str) -> Result<Self, SourceError> {
        let lines: Vec<&str> = text.lines().collect();
        let def_index = lines
            .iter()
            .position(|line| def_regex().is_match(line))
            .ok_or_else(|| SourceError::NoFunctionDefinition(origin.to_string()))?;

        let name = def_regex()
            .captures(lines[def_index])
            .expect("def line matched above")[1]
            .to_string();

        let (signature, body_start) = collect_signature(&lines, def_index, &name)?;
        let parameter_text = parameter_text(&signature, &name)?;
        let docstring = extract_docstring(&lines, body_start);
        let (description, param_docs) = match &docstring {
            Some(doc) => parse_docstring(doc),
            None => (None, HashMap::new()),
        };

        let mut parameters = Vec::new();
        for entry in split_top_level(&parameter_text, ',') {
            let entry = entry.trim();
            if entry.is_empty() || entry == "*" || entry == "/" {
                continue;
            }
            let entry = entry.trim_start_matches('*');
            let (param_name, annotation) = match split_once_top_level(entry, ':') {
                Some((raw_name, rest)) => {
                    let annotation = match split_once_top_level(rest, '=') {
                        Some((ann, _default)) => ann,
                        None => rest,
                    };
                    (
                        raw_name.trim().to_string(),
                        Some(strip_optional(annotation.trim()).to_string()),
                    )
                }
                None => {
                    // No annotation; drop any default value expression.
                    let raw_name = match split_once_top_level(entry, '=') {
                        Some((raw_name, _default)) => raw_name,
                        None => entry,
                    };
                    (raw_name.trim().to_string(), None)
                }
            };
            parameters.push(RawParameter {
                name: serde_yaml::Value::String(param_name.clone()),
                param_type: annotation,
                description: param_docs.get(&param_name).cloned(),
            });
        }

        let imports = lines[..def_index]
            .iter()
            .filter(|line| line.starts_with("import ") || line.starts_with("from "))
            .map(|line| line.to_string())
            .collect();

        let source = lines[def_index..].join("\n").trim_end().to_string() + "\n";

        Ok(Self {
            name,
            parameters,
            description,
            imports,
            source,
        })
    }

    /// The component's custom code: its imports followed by its function
    /// source, as captured into the staged descriptor.
    pub fn custom_code(&self) -> String {
        if self.imports.is_empty() {
            self.source.clone()
        } else {
            format!("{}\n\n{}", self.imports.join("\n"), self.source)
        }
    }
}

/// Collects the signature text from the `def` line up to the terminating
/// `):`, returning it together with the index of the first body line.
fn collect_signature(
    lines: &[&str],
    def_index: usize,
    name: &str,
) -> Result<(String, usize), SourceError> {
    let mut signature = String::new();
    let mut depth: i32 = 0;
    let mut opened = false;
    for (offset, line) in lines[def_index..].iter().enumerate() {
        if !signature.is_empty() {
            signature.push('\n');
        }
        signature.push_str(line);
        for ch in line.chars() {
            match ch {
                '(' | '[' | '{' => {
                    depth += 1;
                    opened = true;
                }
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth == 0 && signature.trim_end().ends_with(':') {
            return Ok((signature, def_index + offset + 1));
        }
    }
    Err(SourceError::UnterminatedSignature(name.to_string()))
}

/// The text between the signature's outer parentheses.
fn parameter_text(signature: &str, name: &str) -> Result<String, SourceError> {
    let open = signature
        .find('(')
        .ok_or_else(|| SourceError::UnterminatedSignature(name.to_string()))?;
    let mut depth = 0;
    for (index, ch) in signature[open..].char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(signature[open + 1..open + index].to_string());
                }
            }
            _ => {}
        }
    }
    Err(SourceError::UnterminatedSignature(name.to_string()))
}

/// Splits on a separator, ignoring separators nested inside brackets.
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    for ch in text.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if ch == separator && depth == 0 {
            parts.push(current.clone());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Splits at the first top-level occurrence of a separator.
fn split_once_top_level(text: &str, separator: char) -> Option<(&str, &str)> {
    let mut depth = 0;
    for (index, ch) in text.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if ch == separator && depth == 0 {
            return Some((&text[..index], &text[index + ch.len_utf8()..]));
        }
    }
    None
}

/// Strips `Optional[...]` (or `typing.Optional[...]`) from an annotation.
fn strip_optional(annotation: &str) -> &str {
    match optional_regex().captures(annotation) {
        Some(captures) => captures.get(1).expect("group 1 exists").as_str().trim(),
        None => annotation,
    }
}

/// Extracts the docstring content starting at the first body line, if the
/// body opens with a triple-quoted string.
fn extract_docstring(lines: &[&str], body_start: usize) -> Option<String> {
    let first = lines[body_start..]
        .iter()
        .position(|line| !line.trim().is_empty())
        .map(|offset| body_start + offset)?;
    let trimmed = lines[first].trim_start();
    let delimiter = if trimmed.starts_with("\"\"\"") {
        "\"\"\""
    } else if trimmed.starts_with("'''") {
        "'''"
    } else {
        return None;
    };

    let after_open = &trimmed[delimiter.len()..];
    if let Some(close) = after_open.find(delimiter) {
        // Single-line docstring.
        return Some(after_open[..close].to_string());
    }

    let mut content = vec![after_open.to_string()];
    for line in &lines[first + 1..] {
        if let Some(close) = line.find(delimiter) {
            content.push(line[..close].to_string());
            return Some(content.join("\n"));
        }
        content.push(line.to_string());
    }
    // Unterminated docstring; degrade to no description.
    None
}

/// Splits a docstring into its short description and an `Args:` map.
fn parse_docstring(docstring: &str) -> (Option<String>, HashMap<String, String>) {
    let lines: Vec<&str> = docstring.lines().collect();
    let description = lines
        .iter()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string());

    let mut docs = HashMap::new();
    let Some(args_index) = lines
        .iter()
        .position(|line| line.trim() == "Args:")
    else {
        return (description, docs);
    };

    let mut current: Option<String> = None;
    for line in &lines[args_index + 1..] {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "Returns:" | "Raises:" | "Yields:" | "Examples:") {
            break;
        }
        if let Some(captures) = arg_doc_regex().captures(line) {
            let name = captures[1].to_string();
            let text = captures[2].trim().to_string();
            docs.insert(name.clone(), text);
            current = Some(name);
        } else if let Some(name) = &current {
            // Hanging-indent continuation of the previous entry.
            let entry = docs.get_mut(name).expect("current entry exists");
            if !entry.is_empty() {
                entry.push(' ');
            }
            entry.push_str(trimmed);
        }
    }
    (description, docs)
}
