//! Entities of the outline: nodes, parent/child edges and content cards.

use mindtree_common::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outline node (a titled branch of the tree)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: Identifier,
    pub text: String,
    /// Position among siblings (dense, 1-based once renumbered)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// Directed parent → child link. A node has at most one incoming edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Identifier,
    pub source: Identifier,
    pub target: Identifier,
}

/// Quiz sub-record riding along with a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub question: String,
    pub answer: String,
}

/// Content leaf attached to exactly one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(rename = "docId")]
    pub id: Identifier,
    pub node_id: Identifier,
    pub title: String,
    pub content: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<Problem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Card,
}

/// Typed reference to a node or card
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Identifier,
}

impl EntityRef {
    pub fn node(id: Identifier) -> Self {
        Self {
            kind: EntityKind::Node,
            id,
        }
    }

    pub fn card(id: Identifier) -> Self {
        Self {
            kind: EntityKind::Card,
            id,
        }
    }

    pub fn is_node(&self) -> bool {
        self.kind == EntityKind::Node
    }

    pub fn is_card(&self) -> bool {
        self.kind == EntityKind::Card
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Node => write!(f, "node {}", self.id),
            EntityKind::Card => write!(f, "card {}", self.id),
        }
    }
}

/// Where an entity sits: parent node, sibling order and, for nodes, the
/// incoming edge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    pub parent: Option<Identifier>,
    pub order: Option<u32>,
    pub edge: Option<Identifier>,
}

/// Full tree state as read from the remote store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub cards_by_node: BTreeMap<Identifier, Vec<Card>>,
}
