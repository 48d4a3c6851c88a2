//! Read-through merge of the entity store and the staging ledger.
//!
//! Every read the planner and the projector make goes through [`Outline`]:
//! committed entities with their pending renames and edits applied, minus
//! pending deletes, plus speculative entities from create records.

use crate::ledger::{CreatePayload, MoveKind, StagingLedger};
use crate::model::{EntityKind, EntityRef, Problem};
use crate::store::EntityStore;
use mindtree_common::Identifier;
use std::collections::HashSet;

/// One member of a merged node/card sibling list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub entity: EntityRef,
    pub order: Option<u32>,
}

#[derive(Clone, Copy)]
pub struct Outline<'a> {
    store: &'a EntityStore,
    ledger: &'a StagingLedger,
}

impl<'a> Outline<'a> {
    pub fn new(store: &'a EntityStore, ledger: &'a StagingLedger) -> Self {
        Self { store, ledger }
    }

    pub fn store(&self) -> &'a EntityStore {
        self.store
    }

    pub fn ledger(&self) -> &'a StagingLedger {
        self.ledger
    }

    /// Visible entity: committed and not pending delete, or speculative
    pub fn exists(&self, entity: &EntityRef) -> bool {
        if let Some(create) = self.ledger.create(&entity.id) {
            return create.kind() == entity.kind;
        }
        if self.ledger.is_deleted(entity) {
            return false;
        }
        match entity.kind {
            EntityKind::Node => self.store.contains_node(&entity.id),
            EntityKind::Card => self.store.contains_card(&entity.id),
        }
    }

    /// Parent node of a node or card
    pub fn parent_of(&self, entity: &EntityRef) -> Option<Identifier> {
        if let Some(create) = self.ledger.create(&entity.id) {
            return create.parent.clone();
        }
        match entity.kind {
            EntityKind::Node => self.store.parent_of(&entity.id).cloned(),
            EntityKind::Card => self.store.card(&entity.id).map(|c| c.node_id.clone()),
        }
    }

    pub fn order_of(&self, entity: &EntityRef) -> Option<u32> {
        if let Some(create) = self.ledger.create(&entity.id) {
            return Some(create.order);
        }
        match entity.kind {
            EntityKind::Node => self.store.node(&entity.id).and_then(|n| n.order),
            EntityKind::Card => self.store.card(&entity.id).map(|c| c.order),
        }
    }

    /// Node text or card title, renames applied
    pub fn label_of(&self, entity: &EntityRef) -> Option<String> {
        if let Some(create) = self.ledger.create(&entity.id) {
            return Some(create.label().to_string());
        }
        if let Some(rename) = self.ledger.rename(entity) {
            return Some(rename.new_name.clone());
        }
        match entity.kind {
            EntityKind::Node => self.store.node(&entity.id).map(|n| n.text.clone()),
            EntityKind::Card => self.store.card(&entity.id).map(|c| c.title.clone()),
        }
    }

    /// Card content, pending edit applied
    pub fn content_of(&self, card: &Identifier) -> Option<String> {
        if let Some(create) = self.ledger.create(card) {
            return match &create.payload {
                CreatePayload::Card { content, .. } => Some(content.clone()),
                CreatePayload::Node { .. } => None,
            };
        }
        if let Some(edit) = self.ledger.change(card).and_then(|c| c.content.as_ref()) {
            return Some(edit.content.clone());
        }
        self.store.card(card).map(|c| c.content.clone())
    }

    pub fn problems_of(&self, card: &Identifier) -> Option<Vec<Problem>> {
        if let Some(create) = self.ledger.create(card) {
            return match &create.payload {
                CreatePayload::Card { problems, .. } => Some(problems.clone()),
                CreatePayload::Node { .. } => None,
            };
        }
        if let Some(edit) = self.ledger.change(card).and_then(|c| c.problems.as_ref()) {
            return Some(edit.problems.clone());
        }
        self.store.card(card).map(|c| c.problems.clone())
    }

    /// Merged children of `parent` (root level when `None`), sorted by order.
    /// Ties keep insertion order: committed nodes, committed cards, then
    /// speculative entities in creation order.
    pub fn siblings(&self, parent: Option<&Identifier>) -> Vec<Sibling> {
        let mut list = Vec::new();

        let committed_nodes = match parent {
            Some(id) => self.store.child_nodes(id),
            None => self.store.root_nodes(),
        };
        for node in committed_nodes {
            let entity = EntityRef::node(node.id.clone());
            if !self.ledger.is_deleted(&entity) {
                list.push(Sibling {
                    entity,
                    order: node.order,
                });
            }
        }

        if let Some(id) = parent {
            for card in self.store.cards_for(id).iter() {
                let entity = EntityRef::card(card.id.clone());
                if !self.ledger.is_deleted(&entity) {
                    list.push(Sibling {
                        entity,
                        order: Some(card.order),
                    });
                }
            }
        }

        for create in self.ledger.creates_under(parent) {
            list.push(Sibling {
                entity: create.entity(),
                order: Some(create.order),
            });
        }

        list.sort_by_key(|s| s.order.unwrap_or(u32::MAX));
        list
    }

    pub fn child_nodes(&self, parent: &Identifier) -> Vec<Identifier> {
        self.siblings(Some(parent))
            .into_iter()
            .filter(|s| s.entity.is_node())
            .map(|s| s.entity.id)
            .collect()
    }

    /// Merged ancestor chain of a node or card, nearest first
    pub fn ancestors_of(&self, entity: &EntityRef) -> Vec<Identifier> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.parent_of(entity);

        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                break;
            }
            current = self.parent_of(&EntityRef::node(parent.clone()));
            chain.push(parent);
        }
        chain
    }

    /// Whether `candidate` lies in the subtree rooted at `ancestor`
    pub fn is_descendant(&self, ancestor: &Identifier, candidate: &Identifier) -> bool {
        self.descendants_of(ancestor).contains(candidate)
    }

    /// Merged descendant nodes of `id`, depth-first, excluding `id`
    pub fn descendants_of(&self, id: &Identifier) -> Vec<Identifier> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.clone());
        let mut stack = vec![id.clone()];

        while let Some(current) = stack.pop() {
            for child in self.child_nodes(&current).into_iter().rev() {
                if visited.insert(child.clone()) {
                    out.push(child.clone());
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Every entity in the subtree rooted at `root`, pre-order, root first
    pub fn subtree(&self, root: &EntityRef) -> Vec<EntityRef> {
        let mut out = vec![root.clone()];
        if root.is_card() {
            return out;
        }
        let mut visited = HashSet::new();
        visited.insert(root.id.clone());
        self.collect_subtree(&root.id, &mut visited, &mut out);
        out
    }

    fn collect_subtree(
        &self,
        id: &Identifier,
        visited: &mut HashSet<Identifier>,
        out: &mut Vec<EntityRef>,
    ) {
        for sibling in self.siblings(Some(id)) {
            if sibling.entity.is_node() {
                if visited.insert(sibling.entity.id.clone()) {
                    let child = sibling.entity.id.clone();
                    out.push(sibling.entity);
                    self.collect_subtree(&child, visited, out);
                }
            } else {
                out.push(sibling.entity);
            }
        }
    }

    /// Whether a node above `entity` was reparented
    pub fn is_ancestor_moved(&self, entity: &EntityRef, reparented: &HashSet<Identifier>) -> bool {
        !reparented.is_empty()
            && self
                .ancestors_of(entity)
                .iter()
                .any(|a| reparented.contains(a))
    }

    /// Derived pending status: a record in any ledger map, or a reparented ancestor
    pub fn has_pending_changes(&self, entity: &EntityRef) -> bool {
        self.ledger.has_record(entity)
            || self.is_ancestor_moved(entity, &self.ledger.reparented_nodes())
    }

    /// Whether the entity itself was reparented
    pub fn is_reparented(&self, entity: &EntityRef) -> bool {
        self.ledger
            .pending_move(entity)
            .is_some_and(|m| m.kind == MoveKind::Reparent)
    }
}
