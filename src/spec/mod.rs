//! The structured intermediate representation at the heart of the forge.
//!
//! This module defines the component/pipeline specs, the parameter
//! normalizer that canonicalizes user-declared parameters, the validator
//! that decides what counts as a component descriptor and whether a
//! pipeline's wiring is structurally sound, and the step dependency graph.

pub mod component;
pub mod graph;
pub mod params;
pub mod pipeline;
pub mod validate;

pub use component::{ComponentSpec, Container, Implementation, IMAGE_PLACEHOLDER};
pub use graph::StepGraph;
pub use params::{normalize, ParamType, ParameterSpec, RawParameter, DEFAULT_DESCRIPTION};
pub use pipeline::{PipelineSpec, PipelineStep, StepDecl, StepResources};
pub use validate::{is_component_descriptor, validate_pipeline_structure};
