//! # Entity Store
//!
//! Authoritative tree as last synced from the remote store, plus the local
//! structural edits (reparenting, reordering) that have been applied ahead of
//! a commit.
//!
//! ## Copy-on-write
//!
//! The node list, edge list and card map sit behind `Arc`s. Mutators go
//! through `Arc::make_mut`, so a clone taken by a reader before a write keeps
//! observing the old tree. Every write bumps `generation`, which memoized
//! readers compare to decide whether to recompute.
//!
//! ## Edge invariant
//!
//! A node has zero or one incoming edge at all times. `set_parent` replaces
//! the incoming edge, it never adds a second one.

use crate::model::{Card, Edge, EntityKind, EntityRef, Node, Placement, TreeSnapshot};
use mindtree_common::Identifier;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    nodes: Arc<Vec<Node>>,
    edges: Arc<Vec<Edge>>,
    cards: Arc<HashMap<Identifier, Arc<Vec<Card>>>>,
    generation: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a remote tree, dropping edges that would give a node
    /// a second parent or reference unknown nodes.
    pub fn from_tree(tree: TreeSnapshot) -> Self {
        let known: HashSet<&Identifier> = tree.nodes.iter().map(|n| &n.id).collect();
        let mut seen_targets = HashSet::new();
        let mut edges = Vec::with_capacity(tree.edges.len());

        for edge in &tree.edges {
            if !known.contains(&edge.source) || !known.contains(&edge.target) {
                warn!(edge = %edge.id, "Dropping edge that references an unknown node");
                continue;
            }
            if !seen_targets.insert(edge.target.clone()) {
                warn!(edge = %edge.id, target = %edge.target, "Dropping second incoming edge");
                continue;
            }
            edges.push(edge.clone());
        }

        let mut cards = HashMap::new();
        for (node_id, list) in tree.cards_by_node {
            if !known.contains(&node_id) {
                warn!(node = %node_id, cards = list.len(), "Dropping cards of unknown node");
                continue;
            }
            cards.insert(node_id, Arc::new(list));
        }

        Self {
            nodes: Arc::new(tree.nodes),
            edges: Arc::new(edges),
            cards: Arc::new(cards),
            generation: 0,
        }
    }

    pub fn to_tree(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self.nodes.as_ref().clone(),
            edges: self.edges.as_ref().clone(),
            cards_by_node: self
                .cards
                .iter()
                .filter(|(_, list)| !list.is_empty())
                .map(|(id, list)| (id.clone(), list.as_ref().clone()))
                .collect(),
        }
    }

    /// Bumped on every write
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &Identifier) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn contains_node(&self, id: &Identifier) -> bool {
        self.node(id).is_some()
    }

    pub fn incoming_edge(&self, id: &Identifier) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.target == id)
    }

    pub fn parent_of(&self, id: &Identifier) -> Option<&Identifier> {
        self.incoming_edge(id).map(|e| &e.source)
    }

    pub fn edges_touching(&self, id: &Identifier) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| &e.source == id || &e.target == id)
            .collect()
    }

    /// Child nodes in storage order
    pub fn child_nodes(&self, id: &Identifier) -> Vec<&Node> {
        self.edges
            .iter()
            .filter(|e| &e.source == id)
            .filter_map(|e| self.node(&e.target))
            .collect()
    }

    /// Nodes without an incoming edge
    pub fn root_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| self.incoming_edge(&n.id).is_none())
            .collect()
    }

    /// Cards attached to `node_id`. The returned list is a snapshot.
    pub fn cards_for(&self, node_id: &Identifier) -> Arc<Vec<Card>> {
        self.cards.get(node_id).cloned().unwrap_or_default()
    }

    /// Replace the card list of `node_id`
    pub fn set_cards_for(&mut self, node_id: Identifier, cards: Vec<Card>) {
        let map = Arc::make_mut(&mut self.cards);
        if cards.is_empty() {
            map.remove(&node_id);
        } else {
            map.insert(node_id, Arc::new(cards));
        }
        self.touch();
    }

    pub fn card(&self, id: &Identifier) -> Option<&Card> {
        self.cards
            .values()
            .flat_map(|list| list.iter())
            .find(|c| &c.id == id)
    }

    pub fn contains_card(&self, id: &Identifier) -> bool {
        self.card(id).is_some()
    }

    pub fn card_count(&self) -> usize {
        self.cards.values().map(|l| l.len()).sum()
    }

    /// Parent chain of `id`, nearest first
    pub fn ancestors_of(&self, id: &Identifier) -> Vec<Identifier> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id.clone());

        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                warn!(node = %id, "Ancestor chain loops back on itself");
                break;
            }
            chain.push(parent.clone());
            current = self.parent_of(parent);
        }
        chain
    }

    pub fn depth_of(&self, id: &Identifier) -> usize {
        self.ancestors_of(id).len()
    }

    /// Where `entity` currently sits
    pub fn placement_of(&self, entity: &EntityRef) -> Option<Placement> {
        match entity.kind {
            EntityKind::Node => self.node(&entity.id).map(|node| Placement {
                parent: self.parent_of(&entity.id).cloned(),
                order: node.order,
                edge: self.incoming_edge(&entity.id).map(|e| e.id.clone()),
            }),
            EntityKind::Card => self.card(&entity.id).map(|card| Placement {
                parent: Some(card.node_id.clone()),
                order: Some(card.order),
                edge: None,
            }),
        }
    }

    /// Put `entity` at `at`. A node that changes parent needs `at.edge` for
    /// its new incoming edge.
    pub fn apply_placement(&mut self, entity: &EntityRef, at: &Placement) -> bool {
        match entity.kind {
            EntityKind::Node => {
                if !self.contains_node(&entity.id) {
                    return false;
                }
                if self.parent_of(&entity.id) != at.parent.as_ref() {
                    let incoming = match (&at.parent, &at.edge) {
                        (Some(source), Some(edge)) => Some(Edge {
                            id: edge.clone(),
                            source: source.clone(),
                            target: entity.id.clone(),
                        }),
                        (Some(_), None) => return false,
                        (None, _) => None,
                    };
                    self.set_parent(&entity.id, incoming);
                }
                self.set_node_order(&entity.id, at.order)
            }
            EntityKind::Card => {
                let home = at.parent.clone();
                let order = at.order;
                self.update_card(&entity.id, |card| {
                    if let Some(home) = home {
                        card.node_id = home;
                    }
                    if let Some(order) = order {
                        card.order = order;
                    }
                })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Node writes
    // ------------------------------------------------------------------------

    /// Insert a node with an optional incoming edge
    pub fn insert_node(&mut self, node: Node, incoming: Option<Edge>) {
        let id = node.id.clone();
        let nodes = Arc::make_mut(&mut self.nodes);
        nodes.retain(|n| n.id != id);
        nodes.push(node);
        self.replace_incoming(&id, incoming);
        self.touch();
    }

    /// Replace the incoming edge of `id`. Returns the edge that was removed.
    pub fn set_parent(&mut self, id: &Identifier, incoming: Option<Edge>) -> Option<Edge> {
        let old = self.replace_incoming(id, incoming);
        self.touch();
        old
    }

    fn replace_incoming(&mut self, id: &Identifier, incoming: Option<Edge>) -> Option<Edge> {
        let edges = Arc::make_mut(&mut self.edges);
        let old = edges
            .iter()
            .position(|e| &e.target == id)
            .map(|pos| edges.remove(pos));

        if let Some(edge) = incoming {
            debug_assert_eq!(&edge.target, id);
            edges.push(edge);
        }
        old
    }

    pub fn set_node_text(&mut self, id: &Identifier, text: &str) -> bool {
        let nodes = Arc::make_mut(&mut self.nodes);
        let Some(node) = nodes.iter_mut().find(|n| &n.id == id) else {
            return false;
        };
        node.text = text.to_string();
        self.touch();
        true
    }

    pub fn set_node_order(&mut self, id: &Identifier, order: Option<u32>) -> bool {
        let nodes = Arc::make_mut(&mut self.nodes);
        let Some(node) = nodes.iter_mut().find(|n| &n.id == id) else {
            return false;
        };
        node.order = order;
        self.touch();
        true
    }

    /// Remove a node, every edge touching it and its cards
    pub fn remove_node(&mut self, id: &Identifier) -> Option<Node> {
        let nodes = Arc::make_mut(&mut self.nodes);
        let pos = nodes.iter().position(|n| &n.id == id)?;
        let node = nodes.remove(pos);

        Arc::make_mut(&mut self.edges).retain(|e| &e.source != id && &e.target != id);
        Arc::make_mut(&mut self.cards).remove(id);
        self.touch();
        Some(node)
    }

    pub fn set_edge_id(&mut self, old: &Identifier, new: Identifier) -> bool {
        let edges = Arc::make_mut(&mut self.edges);
        let Some(edge) = edges.iter_mut().find(|e| &e.id == old) else {
            return false;
        };
        edge.id = new;
        self.touch();
        true
    }

    /// Rewrite every reference to a temporary node id with its real id
    pub fn promote_node(&mut self, temp: &Identifier, real: &Identifier) {
        for node in Arc::make_mut(&mut self.nodes).iter_mut() {
            if &node.id == temp {
                node.id = real.clone();
            }
        }
        for edge in Arc::make_mut(&mut self.edges).iter_mut() {
            if &edge.source == temp {
                edge.source = real.clone();
            }
            if &edge.target == temp {
                edge.target = real.clone();
            }
        }

        let cards = Arc::make_mut(&mut self.cards);
        if let Some(list) = cards.remove(temp) {
            let mut list = list.as_ref().clone();
            for card in list.iter_mut() {
                card.node_id = real.clone();
            }
            cards.insert(real.clone(), Arc::new(list));
        }
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Card writes
    // ------------------------------------------------------------------------

    pub fn insert_card(&mut self, card: Card) {
        let mut list = self.cards_for(&card.node_id).as_ref().clone();
        list.retain(|c| c.id != card.id);
        let node_id = card.node_id.clone();
        list.push(card);
        self.set_cards_for(node_id, list);
    }

    /// Apply `edit` to the card with `id`. Returns false when no such card exists.
    pub fn update_card(&mut self, id: &Identifier, edit: impl FnOnce(&mut Card)) -> bool {
        let Some(node_id) = self.card(id).map(|c| c.node_id.clone()) else {
            return false;
        };
        let mut list = self.cards_for(&node_id).as_ref().clone();
        if let Some(card) = list.iter_mut().find(|c| &c.id == id) {
            edit(card);
        }

        // An edit may have re-homed the card
        let (stay, moved): (Vec<Card>, Vec<Card>) =
            list.into_iter().partition(|c| c.node_id == node_id);
        self.set_cards_for(node_id, stay);
        for card in moved {
            self.insert_card(card);
        }
        true
    }

    pub fn remove_card(&mut self, id: &Identifier) -> Option<Card> {
        let node_id = self.card(id)?.node_id.clone();
        let mut list = self.cards_for(&node_id).as_ref().clone();
        let pos = list.iter().position(|c| &c.id == id)?;
        let card = list.remove(pos);
        self.set_cards_for(node_id, list);
        Some(card)
    }
}
