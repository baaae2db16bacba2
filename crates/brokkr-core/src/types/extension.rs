//! Extension points, node sets, and node declarations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An attribute a node type accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeAttribute {
    /// Attribute name as written in manifests
    pub name: String,

    /// Whether a declaration without it is invalid
    #[serde(default)]
    pub required: bool,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// Schema for one kind of child node accepted under an extension point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionNodeType {
    /// Node name as written in extension declarations (e.g. "Tool")
    pub id: String,

    /// Object type name this node binds to; used to resolve type-based
    /// extensions against a point whose node type matches an ancestor
    #[serde(default)]
    pub type_name: String,

    /// Attributes accepted by this node
    #[serde(default)]
    pub attributes: Vec<NodeTypeAttribute>,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// A reusable schema fragment: the set of node types allowed at some place
/// in the extension tree, plus references to other node sets by id.
///
/// References form a graph that may contain cycles, so node sets are kept
/// in an id-keyed arena and merging is a union, never a tree walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionNodeSet {
    /// Node set id; extension point node sets use the point's path
    pub id: String,

    /// Node types directly allowed by this set
    #[serde(default)]
    pub node_types: Vec<ExtensionNodeType>,

    /// Ids of other node sets whose types are also allowed
    #[serde(default)]
    pub node_sets: Vec<String>,
}

impl ExtensionNodeSet {
    /// Create an empty node set with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_types: Vec::new(),
            node_sets: Vec::new(),
        }
    }

    /// Fold another node set into this one.
    ///
    /// Idempotent and order-independent: node types are keyed by id and
    /// referenced set ids are a set union, so merging the same fragment
    /// twice (or around a reference cycle) changes nothing.
    pub fn merge(&mut self, other: &ExtensionNodeSet) {
        for node_type in &other.node_types {
            if !self.node_types.iter().any(|t| t.id == node_type.id) {
                self.node_types.push(node_type.clone());
            }
        }
        for reference in &other.node_sets {
            if !self.node_sets.contains(reference) {
                self.node_sets.push(reference.clone());
            }
        }
    }

    /// Look up a directly declared node type by id
    pub fn node_type(&self, id: &str) -> Option<&ExtensionNodeType> {
        self.node_types.iter().find(|t| t.id == id)
    }
}

/// A concrete node declaration contributed by an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionNodeDescription {
    /// Node type name ("Tool", "Condition", ...)
    pub node: String,

    /// Attribute values carried by the declaration
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Nested child declarations
    #[serde(default)]
    pub children: Vec<ExtensionNodeDescription>,
}

impl ExtensionNodeDescription {
    /// Create a node with no attributes or children
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A node declaration annotated with the addin that contributed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributedNode {
    /// Full id of the contributing addin
    pub addin_id: String,

    /// The declaration itself
    pub node: ExtensionNodeDescription,
}

/// A named, hierarchical extension point owned by exactly one addin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionPoint {
    /// Hierarchical '/'-separated path, e.g. "/App/Tools"
    pub path: String,

    /// Full id of the addin that declared the point
    pub root_addin: String,

    /// Allowed child node schema
    pub node_set: ExtensionNodeSet,

    /// Addins that have contributed extensions to this point
    #[serde(default)]
    pub addins: Vec<String>,

    /// Contributed node declarations, in merge order
    #[serde(default)]
    pub nodes: Vec<ContributedNode>,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl ExtensionPoint {
    /// Create an empty extension point at a path
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            node_set: ExtensionNodeSet::new(path.clone()),
            path,
            ..Default::default()
        }
    }

    /// Record an addin as a contributor, once
    pub fn add_contributor(&mut self, addin_id: &str) {
        if !self.addins.iter().any(|a| a == addin_id) {
            self.addins.push(addin_id.to_string());
        }
    }
}
