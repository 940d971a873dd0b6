//! The step dependency graph.
//!
//! Steps form a true dependency graph: explicit `depends_on` edges where
//! declared, with declaration order inferring a single previous-step edge
//! for steps that declare nothing. Unknown dependencies and cycles are
//! rejected before any source is synthesized.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::spec::pipeline::PipelineStep;

/// A validated dependency graph over pipeline steps.
#[derive(Debug, Clone)]
pub struct StepGraph {
    /// Step names in declaration order.
    order: Vec<String>,
    /// Predecessors per step, keyed by step name.
    predecessors: HashMap<String, Vec<String>>,
    /// Emission order: topological, stable with respect to declaration.
    topological: Vec<String>,
}

impl StepGraph {
    /// Builds and validates the graph.
    ///
    /// Fails on duplicate step names, dependencies on undeclared steps and
    /// dependency cycles.
    pub fn build(steps: &[PipelineStep]) -> Result<Self, PipelineError> {
        let order: Vec<String> = steps.iter().map(|s| s.component_name.clone()).collect();

        let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
        for (index, step) in steps.iter().enumerate() {
            let name = &step.component_name;
            if predecessors.contains_key(name) {
                return Err(PipelineError::DuplicateStep(name.clone()));
            }
            let preds = if step.depends_on.is_empty() {
                // Declaration order infers a linear chain by default.
                if index == 0 {
                    Vec::new()
                } else {
                    vec![order[index - 1].clone()]
                }
            } else {
                let mut deps: Vec<String> = Vec::with_capacity(step.depends_on.len());
                for dep in &step.depends_on {
                    if !order.contains(dep) {
                        return Err(PipelineError::UnknownDependency {
                            step: name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    if dep == name {
                        return Err(PipelineError::DependencyCycle(name.clone()));
                    }
                    if !deps.contains(dep) {
                        deps.push(dep.clone());
                    }
                }
                deps
            };
            predecessors.insert(name.clone(), preds);
        }

        let topological = topological_sort(&order, &predecessors)?;
        Ok(Self {
            order,
            predecessors,
            topological,
        })
    }

    /// Step names in declaration order.
    pub fn declaration_order(&self) -> &[String] {
        &self.order
    }

    /// Step names in a topological order that respects declaration order
    /// among ready steps. Generated source emits invocations in this order
    /// so every task binding exists before it is referenced.
    pub fn topological_order(&self) -> &[String] {
        &self.topological
    }

    /// Upstream steps of the given step.
    pub fn predecessors(&self, name: &str) -> &[String] {
        self.predecessors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Kahn's algorithm, preferring earlier-declared steps among ready nodes.
fn topological_sort(
    order: &[String],
    predecessors: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, PipelineError> {
    let mut remaining: HashMap<&str, usize> = order
        .iter()
        .map(|name| (name.as_str(), predecessors[name].len()))
        .collect();
    let mut sorted = Vec::with_capacity(order.len());

    while sorted.len() < order.len() {
        let ready = order.iter().find(|name| {
            remaining
                .get(name.as_str())
                .is_some_and(|&count| count == 0)
        });
        let Some(name) = ready else {
            // Every unplaced step still has pending predecessors.
            let stuck = order
                .iter()
                .find(|name| remaining.contains_key(name.as_str()))
                .expect("unplaced step exists when sort is stuck");
            return Err(PipelineError::DependencyCycle(stuck.clone()));
        };
        let name = name.clone();
        remaining.remove(name.as_str());
        for other in order {
            if remaining.contains_key(other.as_str())
                && predecessors[other].contains(&name)
            {
                *remaining.get_mut(other.as_str()).expect("entry exists") -= 1;
            }
        }
        sorted.push(name);
    }
    Ok(sorted)
}
