//! # Staging Ledger
//!
//! Every unsaved mutation lives here until the commit coordinator replays it.
//!
//! ## Maps
//!
//! - `changes`: content/problem edits of committed cards
//! - `renames`: node text and card title edits of committed entities
//! - `creates`: speculative entities, keyed by their temporary id
//! - `deletes`: committed entities hidden from the outline and queued for removal
//! - `moves`: reparent/reorder operations already applied to the entity store
//!
//! ## Rules
//!
//! - Re-recording an edit overwrites the previous record, keeping its original value.
//! - An edit that restores the original value removes the record (collapse).
//! - Edits of a temporary entity are folded into its create record, so they
//!   travel with the create call instead of producing a second request.
//! - Deleting a temporary entity never queues a delete; it purges every record
//!   of the entity and of the temporary entities parented under it.

use crate::model::{EntityKind, EntityRef, Placement, Problem};
use mindtree_common::Identifier;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEdit {
    pub content: String,
    pub original: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemsEdit {
    pub problems: Vec<Problem>,
    pub original: Vec<Problem>,
}

/// Pending edit of a committed card. Each half collapses on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub card: Identifier,
    pub content: Option<ContentEdit>,
    pub problems: Option<ProblemsEdit>,
}

impl PendingChange {
    fn collapse(&mut self) {
        if self.content.as_ref().is_some_and(|e| e.content == e.original) {
            self.content = None;
        }
        if self.problems.as_ref().is_some_and(|e| e.problems == e.original) {
            self.problems = None;
        }
    }

    fn is_noop(&self) -> bool {
        self.content.is_none() && self.problems.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRename {
    pub target: EntityRef,
    pub new_name: String,
    pub original_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePayload {
    Node {
        text: String,
    },
    Card {
        title: String,
        content: String,
        problems: Vec<Problem>,
    },
}

/// Speculative entity. Its presence in the ledger is what makes it exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub temp_id: Identifier,
    /// Parent node; always `Some` for cards, `None` for a root node
    pub parent: Option<Identifier>,
    pub order: u32,
    pub payload: CreatePayload,
    /// Creation sequence, used to break order ties
    pub seq: u64,
}

impl PendingCreate {
    pub fn kind(&self) -> EntityKind {
        match self.payload {
            CreatePayload::Node { .. } => EntityKind::Node,
            CreatePayload::Card { .. } => EntityKind::Card,
        }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef {
            kind: self.kind(),
            id: self.temp_id.clone(),
        }
    }

    /// Node text or card title
    pub fn label(&self) -> &str {
        match &self.payload {
            CreatePayload::Node { text } => text,
            CreatePayload::Card { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub target: EntityRef,
    /// Parent as the remote store knows it
    pub parent: Option<Identifier>,
    /// Incoming edge the remote store holds, when the node was moved locally
    pub original_edge: Option<Identifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Parent changed (order may have changed too)
    Reparent,
    /// Same parent, new position
    Reorder,
}

/// Structural edit already applied to the entity store. Keeps the position
/// the entity had when it was last committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub target: EntityRef,
    pub kind: MoveKind,
    pub original_parent: Option<Identifier>,
    pub original_order: Option<u32>,
    pub original_edge: Option<Identifier>,
}

/// Which records `StagingLedger::clear` drops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Changes,
    Renames,
    Creates,
    Deletes,
    Moves,
    Entity(EntityRef),
}

#[derive(Debug, Clone, Default)]
pub struct StagingLedger {
    changes: HashMap<Identifier, PendingChange>,
    renames: HashMap<EntityRef, PendingRename>,
    creates: HashMap<Identifier, PendingCreate>,
    deletes: HashMap<EntityRef, PendingDelete>,
    moves: HashMap<EntityRef, PendingMove>,
    next_seq: u64,
    revision: u64,
}

impl StagingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every write
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Record new content for a card. `committed` is the content the remote
    /// store holds, used as the original when no record exists yet.
    pub fn record_change(&mut self, card: &Identifier, content: &str, committed: &str) {
        if card.is_pending() {
            if let Some(CreatePayload::Card { content: staged, .. }) =
                self.creates.get_mut(card).map(|c| &mut c.payload)
            {
                *staged = content.to_string();
                self.touch();
            }
            return;
        }

        let entry = self.changes.entry(card.clone()).or_insert_with(|| PendingChange {
            card: card.clone(),
            content: None,
            problems: None,
        });
        let original = entry
            .content
            .take()
            .map(|e| e.original)
            .unwrap_or_else(|| committed.to_string());
        entry.content = Some(ContentEdit {
            content: content.to_string(),
            original,
        });
        self.settle_change_entry(card);
        self.touch();
    }

    /// Record a new problem list for a card
    pub fn record_problems(
        &mut self,
        card: &Identifier,
        problems: Vec<Problem>,
        committed: &[Problem],
    ) {
        if card.is_pending() {
            if let Some(CreatePayload::Card { problems: staged, .. }) =
                self.creates.get_mut(card).map(|c| &mut c.payload)
            {
                *staged = problems;
                self.touch();
            }
            return;
        }

        let entry = self.changes.entry(card.clone()).or_insert_with(|| PendingChange {
            card: card.clone(),
            content: None,
            problems: None,
        });
        let original = entry
            .problems
            .take()
            .map(|e| e.original)
            .unwrap_or_else(|| committed.to_vec());
        entry.problems = Some(ProblemsEdit { problems, original });
        self.settle_change_entry(card);
        self.touch();
    }

    fn settle_change_entry(&mut self, card: &Identifier) {
        if let Some(entry) = self.changes.get_mut(card) {
            entry.collapse();
            if entry.is_noop() {
                self.changes.remove(card);
                debug!(card = %card, "Edit restores original content; dropped");
            }
        }
    }

    /// Record a node text or card title change
    pub fn record_rename(&mut self, target: &EntityRef, new_name: &str, committed: &str) {
        if target.id.is_pending() {
            if let Some(create) = self.creates.get_mut(&target.id) {
                match &mut create.payload {
                    CreatePayload::Node { text } => *text = new_name.to_string(),
                    CreatePayload::Card { title, .. } => *title = new_name.to_string(),
                }
                self.touch();
            }
            return;
        }

        let original_name = self
            .renames
            .remove(target)
            .map(|r| r.original_name)
            .unwrap_or_else(|| committed.to_string());

        if original_name == new_name {
            debug!(entity = %target, "Rename restores original name; dropped");
        } else {
            self.renames.insert(
                target.clone(),
                PendingRename {
                    target: target.clone(),
                    new_name: new_name.to_string(),
                    original_name,
                },
            );
        }
        self.touch();
    }

    /// Queue a speculative entity. The sequence number is assigned here.
    pub fn record_create(&mut self, mut create: PendingCreate) -> Identifier {
        self.next_seq += 1;
        create.seq = self.next_seq;
        let id = create.temp_id.clone();
        self.creates.insert(id.clone(), create);
        self.touch();
        id
    }

    /// Update parent and order of a speculative entity
    pub fn place_create(&mut self, temp: &Identifier, parent: Option<Identifier>, order: u32) {
        if let Some(create) = self.creates.get_mut(temp) {
            create.parent = parent;
            create.order = order;
            self.touch();
        }
    }

    /// Mark an entity for deletion. Temporary entities are purged instead.
    pub fn record_delete(&mut self, target: &EntityRef, parent: Option<Identifier>) {
        if target.id.is_pending() {
            self.cleanup_pending_for_temp_item(&target.id);
            return;
        }

        if target.is_card() {
            self.changes.remove(&target.id);
        }
        self.renames.remove(target);
        let (parent, original_edge) = match self.moves.remove(target) {
            Some(moved) => (moved.original_parent, moved.original_edge),
            None => (parent, None),
        };
        self.deletes.insert(
            target.clone(),
            PendingDelete {
                target: target.clone(),
                parent,
                original_edge,
            },
        );
        self.touch();
    }

    /// Drop every record of a temporary entity and, recursively, of the
    /// temporary entities parented under it.
    pub fn cleanup_pending_for_temp_item(&mut self, temp: &Identifier) {
        let mut queue = vec![temp.clone()];
        let mut purged = HashSet::new();

        while let Some(id) = queue.pop() {
            if !purged.insert(id.clone()) {
                continue;
            }
            self.creates.remove(&id);
            self.changes.remove(&id);
            self.renames.retain(|k, _| k.id != id);
            self.moves.retain(|k, _| k.id != id);

            queue.extend(
                self.creates
                    .values()
                    .filter(|c| c.parent.as_ref() == Some(&id))
                    .map(|c| c.temp_id.clone()),
            );
        }

        debug!(temp = %temp, purged = purged.len(), "Purged temporary entity");
        self.touch();
    }

    /// Record a structural edit. `original` is where the entity sat before
    /// this edit; it is ignored when a record already exists. The record is
    /// dropped when the entity is back at its original position.
    pub fn record_move(
        &mut self,
        target: &EntityRef,
        original: Placement,
        current_parent: Option<&Identifier>,
        current_order: Option<u32>,
    ) {
        if target.id.is_pending() {
            return;
        }

        let original = match self.moves.remove(target) {
            Some(existing) => Placement {
                parent: existing.original_parent,
                order: existing.original_order,
                edge: existing.original_edge,
            },
            None => original,
        };

        let same_parent = original.parent.as_ref() == current_parent;
        if same_parent && original.order == current_order {
            debug!(entity = %target, "Move restores original position; dropped");
        } else {
            self.moves.insert(
                target.clone(),
                PendingMove {
                    target: target.clone(),
                    kind: if same_parent {
                        MoveKind::Reorder
                    } else {
                        MoveKind::Reparent
                    },
                    original_parent: original.parent,
                    original_order: original.order,
                    original_edge: original.edge,
                },
            );
        }
        self.touch();
    }

    pub fn clear(&mut self, scope: ClearScope) {
        match scope {
            ClearScope::All => {
                self.changes.clear();
                self.renames.clear();
                self.creates.clear();
                self.deletes.clear();
                self.moves.clear();
            }
            ClearScope::Changes => self.changes.clear(),
            ClearScope::Renames => self.renames.clear(),
            ClearScope::Creates => self.creates.clear(),
            ClearScope::Deletes => self.deletes.clear(),
            ClearScope::Moves => self.moves.clear(),
            ClearScope::Entity(target) => {
                if target.is_card() {
                    self.changes.remove(&target.id);
                }
                self.renames.remove(&target);
                self.creates.remove(&target.id);
                self.deletes.remove(&target);
                self.moves.remove(&target);
            }
        }
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Settling after a remote call
    // ------------------------------------------------------------------------

    /// Drop the committed part of a content record. Edits made while the
    /// call was in flight survive, measured against what was committed.
    pub fn settle_change(&mut self, committed: &PendingChange) {
        let Some(live) = self.changes.get_mut(&committed.card) else {
            return;
        };
        if let (Some(live_edit), Some(sent)) = (live.content.as_mut(), &committed.content) {
            live_edit.original = sent.content.clone();
        }
        if let (Some(live_edit), Some(sent)) = (live.problems.as_mut(), &committed.problems) {
            live_edit.original = sent.problems.clone();
        }
        self.settle_change_entry(&committed.card);
        self.touch();
    }

    pub fn settle_rename(&mut self, committed: &PendingRename) {
        let Some(live) = self.renames.get_mut(&committed.target) else {
            return;
        };
        if live.new_name == committed.new_name {
            self.renames.remove(&committed.target);
        } else {
            live.original_name = committed.new_name.clone();
        }
        self.touch();
    }

    /// The entity now sits at `pushed` remotely. A record survives only if
    /// the entity was moved again while the call was in flight.
    pub fn settle_move(
        &mut self,
        target: &EntityRef,
        pushed: Placement,
        current_parent: Option<&Identifier>,
        current_order: Option<u32>,
    ) {
        if self.moves.remove(target).is_none() {
            return;
        }
        self.record_move(target, pushed, current_parent, current_order);
    }

    pub fn settle_delete(&mut self, target: &EntityRef) {
        if self.deletes.remove(target).is_some() {
            self.touch();
        }
    }

    /// Remove a create record after the remote store accepted it and rewrite
    /// every reference to its temporary id.
    pub fn promote(&mut self, temp: &Identifier, real: &Identifier) -> Option<PendingCreate> {
        let create = self.creates.remove(temp)?;
        let kind = create.kind();

        for other in self.creates.values_mut() {
            if other.parent.as_ref() == Some(temp) {
                other.parent = Some(real.clone());
            }
        }
        for pending in self.moves.values_mut() {
            if pending.original_parent.as_ref() == Some(temp) {
                pending.original_parent = Some(real.clone());
            }
        }
        for pending in self.deletes.values_mut() {
            if pending.parent.as_ref() == Some(temp) {
                pending.parent = Some(real.clone());
            }
        }

        if let Some(mut change) = self.changes.remove(temp) {
            change.card = real.clone();
            self.changes.insert(real.clone(), change);
        }
        let temp_ref = EntityRef {
            kind,
            id: temp.clone(),
        };
        let real_ref = EntityRef {
            kind,
            id: real.clone(),
        };
        if let Some(mut rename) = self.renames.remove(&temp_ref) {
            rename.target = real_ref.clone();
            self.renames.insert(real_ref.clone(), rename);
        }
        if let Some(mut pending) = self.moves.remove(&temp_ref) {
            pending.target = real_ref.clone();
            self.moves.insert(real_ref, pending);
        }

        self.touch();
        Some(create)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn change(&self, card: &Identifier) -> Option<&PendingChange> {
        self.changes.get(card)
    }

    pub fn rename(&self, target: &EntityRef) -> Option<&PendingRename> {
        self.renames.get(target)
    }

    pub fn create(&self, temp: &Identifier) -> Option<&PendingCreate> {
        self.creates.get(temp)
    }

    pub fn delete(&self, target: &EntityRef) -> Option<&PendingDelete> {
        self.deletes.get(target)
    }

    pub fn pending_move(&self, target: &EntityRef) -> Option<&PendingMove> {
        self.moves.get(target)
    }

    pub fn changes(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.values()
    }

    pub fn renames(&self) -> impl Iterator<Item = &PendingRename> {
        self.renames.values()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &PendingDelete> {
        self.deletes.values()
    }

    pub fn moves(&self) -> impl Iterator<Item = &PendingMove> {
        self.moves.values()
    }

    /// Create records in creation order
    pub fn creates(&self) -> Vec<&PendingCreate> {
        let mut list: Vec<_> = self.creates.values().collect();
        list.sort_by_key(|c| c.seq);
        list
    }

    /// Speculative children of `parent` in creation order
    pub fn creates_under(&self, parent: Option<&Identifier>) -> Vec<&PendingCreate> {
        let mut list: Vec<_> = self
            .creates
            .values()
            .filter(|c| c.parent.as_ref() == parent)
            .collect();
        list.sort_by_key(|c| c.seq);
        list
    }

    pub fn is_deleted(&self, target: &EntityRef) -> bool {
        self.deletes.contains_key(target)
    }

    /// Whether any map holds a record for `target`
    pub fn has_record(&self, target: &EntityRef) -> bool {
        (target.is_card() && self.changes.contains_key(&target.id))
            || self.renames.contains_key(target)
            || self.creates.contains_key(&target.id)
            || self.deletes.contains_key(target)
            || self.moves.contains_key(target)
    }

    /// Nodes whose parent changed
    pub fn reparented_nodes(&self) -> HashSet<Identifier> {
        self.moves
            .values()
            .filter(|m| m.target.is_node() && m.kind == MoveKind::Reparent)
            .map(|m| m.target.id.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.changes.len()
            + self.renames.len()
            + self.creates.len()
            + self.deletes.len()
            + self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }
}
