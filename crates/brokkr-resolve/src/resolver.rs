//! Extension graph resolution
//!
//! State machine over one scan pass: collect every description, then
//! resolve, then emit warnings alongside the merged graph. Root addins'
//! extension points are registered before anything else so other addins'
//! declarations have something to match against. Extensions may target a
//! sub-path of a point (folded upward to the longest matching ancestor)
//! or an ancestry-encoded type list (matched against node types by object
//! type name, once all points are known). Every contribution passes the
//! dependency version gate before it is folded in.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use brokkr_core::types::{
    AddinDescription, ContributedNode, ExtensionNodeSet, ExtensionNodeType,
    ExtensionPoint,
};

use crate::builder::decode_type_path;

/// The merged extension graph plus everything worth telling the user
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    /// Final extension points, each carrying its contributor-annotated
    /// node declarations, sorted by path
    pub points: Vec<ExtensionPoint>,

    /// Dangling extensions and dropped contributions
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct PendingExtension {
    addin_id: String,
    path: String,
    nodes: Vec<ContributedNode>,
}

/// Merges extension declarations scattered across addins into one graph
#[derive(Debug, Default)]
pub struct ExtensionGraphResolver {
    descriptions: HashMap<String, AddinDescription>,
}

impl ExtensionGraphResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect one description. When several versions of the same addin
    /// are offered, the highest wins.
    pub fn add_description(&mut self, description: AddinDescription) {
        let id = description.addin_id();
        match self.descriptions.get(&id) {
            Some(existing) if existing.version >= description.version => {
                debug!(
                    "Ignoring {} {} in favor of installed {}",
                    id, description.version, existing.version
                );
            }
            _ => {
                self.descriptions.insert(id, description);
            }
        }
    }

    /// Run the resolve phase and produce the merged graph
    pub fn resolve(self) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();
        let mut points: BTreeMap<String, ExtensionPoint> = BTreeMap::new();
        let mut arena: BTreeMap<String, ExtensionNodeSet> = BTreeMap::new();

        // Deterministic order, roots first: a root addin's points must be
        // visible before any other addin's extensions are matched
        let mut ordered: Vec<&AddinDescription> = self.descriptions.values().collect();
        ordered.sort_by_key(|d| (!d.is_root, d.addin_id()));

        for description in &ordered {
            for node_set in &description.node_sets {
                arena
                    .entry(node_set.id.clone())
                    .and_modify(|existing| existing.merge(node_set))
                    .or_insert_with(|| node_set.clone());
            }
            for point in &description.extension_points {
                match points.get_mut(&point.path) {
                    None => {
                        points.insert(point.path.clone(), point.clone());
                    }
                    Some(existing) if existing.root_addin == point.root_addin => {
                        existing.node_set.merge(&point.node_set);
                    }
                    Some(existing) => {
                        outcome.warnings.push(format!(
                            "extension point {} declared by both {} and {}; keeping {}",
                            point.path,
                            existing.root_addin,
                            point.root_addin,
                            existing.root_addin
                        ));
                    }
                }
            }
        }

        // Gather pending contributions
        let mut literal: Vec<PendingExtension> = Vec::new();
        let mut typed: Vec<(PendingExtension, Vec<String>)> = Vec::new();
        for description in &ordered {
            let addin_id = description.addin_id();
            for module in description.all_modules() {
                for extension in &module.extensions {
                    let pending = PendingExtension {
                        addin_id: addin_id.clone(),
                        path: extension.path.clone(),
                        nodes: extension
                            .nodes
                            .iter()
                            .map(|node| ContributedNode {
                                addin_id: addin_id.clone(),
                                node: node.clone(),
                            })
                            .collect(),
                    };
                    match decode_type_path(&extension.path) {
                        Some(ancestry) => typed.push((pending, ancestry)),
                        None => literal.push(pending),
                    }
                }
            }
        }

        // Literal paths first: exact match or longest matching ancestor
        for pending in literal {
            let Some(target) = find_target(&points, &pending.path) else {
                outcome.warnings.push(format!(
                    "no extension point found for {} (extended by {})",
                    pending.path, pending.addin_id
                ));
                continue;
            };
            self.fold(&mut points, &target, pending, &mut outcome.warnings);
        }

        // Type-based extensions last, once every point's node types are known
        for (pending, ancestry) in typed {
            let Some(target) = find_type_target(&points, &arena, &ancestry) else {
                outcome.warnings.push(format!(
                    "no extension point matches type ancestry [{}] (extended by {})",
                    ancestry.join(", "),
                    pending.addin_id
                ));
                continue;
            };
            self.fold(&mut points, &target, pending, &mut outcome.warnings);
        }

        outcome.points = points.into_values().collect();
        outcome
    }

    /// Fold a contribution into a point, subject to the version gate
    fn fold(
        &self,
        points: &mut BTreeMap<String, ExtensionPoint>,
        target: &str,
        pending: PendingExtension,
        warnings: &mut Vec<String>,
    ) {
        let point = points.get_mut(target).expect("target resolved above");
        if !self.gate(&pending.addin_id, &point.root_addin, target, warnings) {
            return;
        }
        point.add_contributor(&pending.addin_id);
        point.nodes.extend(pending.nodes);
    }

    /// Dependency version gate: a contribution from `contributor` into a
    /// point owned by `owner` requires that the contributor depends on the
    /// owner with a required version inside [owner.compat, owner.version].
    fn gate(
        &self,
        contributor: &str,
        owner: &str,
        path: &str,
        warnings: &mut Vec<String>,
    ) -> bool {
        if contributor == owner {
            return true;
        }
        let Some(owner_desc) = self.descriptions.get(owner) else {
            warnings.push(format!(
                "dropping contribution of {contributor} to {path}: owner {owner} is not installed"
            ));
            return false;
        };
        let Some(contributor_desc) = self.descriptions.get(contributor) else {
            return false;
        };
        let Some((_, required)) = contributor_desc
            .addin_dependencies()
            .find(|(id, _)| *id == owner)
        else {
            warnings.push(format!(
                "dropping contribution of {contributor} to {path}: no dependency on {owner}"
            ));
            return false;
        };
        if !owner_desc.satisfies(required) {
            warnings.push(format!(
                "dropping contribution of {contributor} to {path}: requires {owner} {required}, \
                 installed version is {}",
                owner_desc.version
            ));
            return false;
        }
        true
    }
}

/// Exact path match, else the longest matching ancestor path
fn find_target(points: &BTreeMap<String, ExtensionPoint>, path: &str) -> Option<String> {
    if points.contains_key(path) {
        return Some(path.to_string());
    }
    let mut current = path;
    while let Some(idx) = current.rfind('/') {
        current = &current[..idx];
        if current.is_empty() {
            break;
        }
        if points.contains_key(current) {
            return Some(current.to_string());
        }
    }
    None
}

/// First point (in ancestry order) whose reachable node types expose an
/// object type name from the candidate list
fn find_type_target(
    points: &BTreeMap<String, ExtensionPoint>,
    arena: &BTreeMap<String, ExtensionNodeSet>,
    ancestry: &[String],
) -> Option<String> {
    for ancestor in ancestry {
        for (path, point) in points {
            let types = reachable_node_types(&point.node_set, arena);
            if types.iter().any(|t| &t.type_name == ancestor) {
                return Some(path.clone());
            }
        }
    }
    None
}

/// Every node type reachable from a node set through the arena,
/// tolerating reference cycles
fn reachable_node_types(
    set: &ExtensionNodeSet,
    arena: &BTreeMap<String, ExtensionNodeSet>,
) -> Vec<ExtensionNodeType> {
    let mut types = set.node_types.clone();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(set.id.clone());
    let mut stack: Vec<String> = set.node_sets.clone();
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(referenced) = arena.get(&id) {
            for node_type in &referenced.node_types {
                if !types.iter().any(|t| t.id == node_type.id) {
                    types.push(node_type.clone());
                }
            }
            stack.extend(referenced.node_sets.iter().cloned());
        }
    }
    types
}
