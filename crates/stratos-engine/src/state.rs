use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use stratos_domain::{ResourceNode, Urn};

/// Type of the synthetic root pseudo-resource the engine adds to every
/// exported stack. Never offered for target selection.
pub const ROOT_RESOURCE_TYPE: &str = "vega:internal:stack";

/// A stack's exported resource state, as decoded from `stack export`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackState {
    #[serde(default)]
    pub resources: Vec<ResourceNode>,
}

impl StackState {
    /// Resources an operator may pick as targets: the synthetic root is
    /// dropped and composite (group) resources are listed before leaves,
    /// preserving export order within each group.
    #[must_use]
    pub fn selectable_resources(&self) -> Vec<&ResourceNode> {
        let (composites, leaves): (Vec<&ResourceNode>, Vec<&ResourceNode>) = self
            .resources
            .iter()
            .filter(|resource| resource.ty != ROOT_RESOURCE_TYPE)
            .partition(|resource| resource.composite);
        composites.into_iter().chain(leaves).collect()
    }

    /// Expand chosen targets over the parent -> children relation so a
    /// selected composite includes every descendant, without duplicates.
    /// Output preserves breadth-first discovery order starting from the
    /// chosen urns.
    #[must_use]
    pub fn expand_targets(&self, chosen: &[Urn]) -> Vec<Urn> {
        let mut children: BTreeMap<&Urn, Vec<&Urn>> = BTreeMap::new();
        for resource in &self.resources {
            if let Some(parent) = &resource.parent {
                children.entry(parent).or_default().push(&resource.urn);
            }
        }

        let mut expanded = Vec::new();
        let mut seen: BTreeSet<&Urn> = BTreeSet::new();
        let mut queue: VecDeque<&Urn> = chosen.iter().collect();

        while let Some(urn) = queue.pop_front() {
            if !seen.insert(urn) {
                continue;
            }
            expanded.push(urn.clone());
            if let Some(descendants) = children.get(urn) {
                queue.extend(descendants.iter().copied());
            }
        }
        expanded
    }
}
