use std::collections::{BTreeMap, HashMap, HashSet};

use stratos_domain::{Capability, ModuleName};

use crate::error::GraphError;
use crate::module::ModuleDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphOptions {
    /// Treat a capability provided by more than one module as a fatal error
    /// instead of a first-provider-wins warning.
    pub deny_capability_collisions: bool,
}

/// Derived, read-only dependency view over one orchestration pass's module
/// descriptors. Edges only ever point at modules present in the descriptor
/// set; unresolved requirements surface as warnings, not edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<ModuleName, Vec<ModuleName>>,
    providers: BTreeMap<Capability, ModuleName>,
    warnings: Vec<String>,
}

impl DependencyGraph {
    #[must_use]
    pub fn dependencies_of(&self, module: &ModuleName) -> &[ModuleName] {
        self.edges.get(module).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn provider_of(&self, capability: Capability) -> Option<&ModuleName> {
        self.providers.get(&capability)
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Build the capability dependency graph for a module set.
///
/// Pass 1 registers provided capabilities (first provider wins on
/// collision); pass 2 resolves requirements into edges. Collisions and
/// unresolved requirements are non-fatal warnings unless
/// [`GraphOptions::deny_capability_collisions`] is set.
///
/// # Errors
///
/// Returns an error only when collisions are denied and two modules provide
/// the same capability.
pub fn build_dependency_graph(
    modules: &[ModuleDescriptor],
    options: GraphOptions,
) -> Result<DependencyGraph, GraphError> {
    let mut providers: BTreeMap<Capability, ModuleName> = BTreeMap::new();
    let mut edges: BTreeMap<ModuleName, Vec<ModuleName>> = BTreeMap::new();
    let mut warnings = Vec::new();

    for module in modules {
        let Some(meta) = module.meta() else {
            continue;
        };
        edges.entry(meta.name.clone()).or_default();

        for capability in &meta.provides {
            if let Some(first) = providers.get(capability) {
                if options.deny_capability_collisions {
                    return Err(GraphError::CapabilityCollision {
                        capability: *capability,
                        first: first.clone(),
                        second: meta.name.clone(),
                    });
                }
                warnings.push(format!(
                    "capability \"{capability}\" already provided by \"{first}\"; ignoring provider \"{}\"",
                    meta.name
                ));
            } else {
                providers.insert(*capability, meta.name.clone());
            }
        }
    }

    for module in modules {
        let Some(meta) = module.meta() else {
            continue;
        };

        for capability in &meta.requires {
            match providers.get(capability) {
                Some(provider) if *provider == meta.name => {}
                Some(provider) => {
                    let dependencies = edges.entry(meta.name.clone()).or_default();
                    if !dependencies.contains(provider) {
                        dependencies.push(provider.clone());
                    }
                }
                None => warnings.push(format!(
                    "module \"{}\" requires capability \"{capability}\" but no module provides it",
                    meta.name
                )),
            }
        }
    }

    Ok(DependencyGraph {
        edges,
        providers,
        warnings,
    })
}

/// Find a dependency cycle, if any.
///
/// Standard grey/black depth-first coloring. The returned path runs from the
/// first occurrence of the repeated module through the repeat itself, e.g.
/// `[a, b, c, a]`. Must run before [`topological_sort`]; a cycle aborts the
/// orchestration pass.
#[must_use]
pub fn detect_cycle(graph: &DependencyGraph) -> Option<Vec<ModuleName>> {
    let mut visiting: HashSet<ModuleName> = HashSet::new();
    let mut visited: HashSet<ModuleName> = HashSet::new();
    let mut path: Vec<ModuleName> = Vec::new();

    for module in graph.edges.keys() {
        if let Some(cycle) = visit_for_cycle(module, graph, &mut visiting, &mut visited, &mut path)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit_for_cycle(
    module: &ModuleName,
    graph: &DependencyGraph,
    visiting: &mut HashSet<ModuleName>,
    visited: &mut HashSet<ModuleName>,
    path: &mut Vec<ModuleName>,
) -> Option<Vec<ModuleName>> {
    if visited.contains(module) {
        return None;
    }
    if visiting.contains(module) {
        let start = path.iter().position(|entry| entry == module)?;
        let mut cycle: Vec<ModuleName> = path[start..].to_vec();
        cycle.push(module.clone());
        return Some(cycle);
    }

    visiting.insert(module.clone());
    path.push(module.clone());
    for dependency in graph.dependencies_of(module) {
        if let Some(cycle) = visit_for_cycle(dependency, graph, visiting, visited, path) {
            return Some(cycle);
        }
    }
    path.pop();
    visiting.remove(module);
    visited.insert(module.clone());
    None
}

/// Order modules so every dependency executes before its dependents.
///
/// Named modules are visited depth-first in input order, dependencies before
/// dependents. Legacy (untagged) descriptors never enter the graph and are
/// appended at the very end in their original relative order.
#[must_use]
pub fn topological_sort(
    modules: Vec<ModuleDescriptor>,
    graph: &DependencyGraph,
) -> Vec<ModuleDescriptor> {
    let mut name_order: Vec<ModuleName> = Vec::new();
    let mut visited: HashSet<ModuleName> = HashSet::new();

    for module in &modules {
        if let Some(meta) = module.meta() {
            visit_for_order(&meta.name, graph, &mut visited, &mut name_order);
        }
    }

    let mut slots: Vec<Option<ModuleDescriptor>> = modules.into_iter().map(Some).collect();
    let by_name: HashMap<ModuleName, usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| {
            slot.as_ref()
                .and_then(ModuleDescriptor::meta)
                .map(|meta| (meta.name.clone(), index))
        })
        .collect();

    let mut sorted = Vec::with_capacity(slots.len());
    for name in name_order {
        if let Some(index) = by_name.get(&name)
            && let Some(module) = slots[*index].take()
        {
            sorted.push(module);
        }
    }
    for slot in &mut slots {
        if let Some(module) = slot.take() {
            sorted.push(module);
        }
    }
    sorted
}

fn visit_for_order(
    module: &ModuleName,
    graph: &DependencyGraph,
    visited: &mut HashSet<ModuleName>,
    order: &mut Vec<ModuleName>,
) {
    if !visited.insert(module.clone()) {
        return;
    }
    for dependency in graph.dependencies_of(module) {
        visit_for_order(dependency, graph, visited, order);
    }
    order.push(module.clone());
}
