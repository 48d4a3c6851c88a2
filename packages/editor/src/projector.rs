//! # View Projector
//!
//! Flattens the merged outline into display rows: depth-first from the roots,
//! descending only into expanded nodes. Projection never writes to its inputs,
//! so [`ProjectionCache`] can hand out the same `Arc` until one of them moves.

use crate::ledger::StagingLedger;
use crate::model::EntityRef;
use crate::outline::Outline;
use crate::planner::{Clipboard, ClipboardMode};
use crate::store::EntityStore;
use mindtree_common::Identifier;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// One line of the outline as presentation sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRow {
    pub entity: EntityRef,
    pub parent: Option<Identifier>,
    pub depth: usize,
    pub label: String,
    pub order: Option<u32>,
    pub has_pending_changes: bool,
    /// Set on the clipboard entity and every row under it
    pub clipboard: Option<ClipboardMode>,
    pub is_expanded: bool,
    pub has_children: bool,
    pub is_temporary: bool,
}

/// Which nodes show their children
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    expanded: HashSet<Identifier>,
    revision: u64,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_expanded(&self, id: &Identifier) -> bool {
        self.expanded.contains(id)
    }

    pub fn expand(&mut self, id: &Identifier) {
        if self.expanded.insert(id.clone()) {
            self.revision += 1;
        }
    }

    pub fn collapse(&mut self, id: &Identifier) {
        if self.expanded.remove(id) {
            self.revision += 1;
        }
    }

    /// Returns the new state
    pub fn toggle(&mut self, id: &Identifier) -> bool {
        if self.is_expanded(id) {
            self.collapse(id);
            false
        } else {
            self.expand(id);
            true
        }
    }

    pub fn expand_all(&mut self, ids: impl IntoIterator<Item = Identifier>) {
        self.expanded.extend(ids);
        self.revision += 1;
    }

    /// Carry expansion over to a promoted id
    pub fn rename(&mut self, from: &Identifier, to: &Identifier) {
        if self.expanded.remove(from) {
            self.expanded.insert(to.clone());
            self.revision += 1;
        }
    }
}

/// Project the outline into rows
pub fn project(
    store: &EntityStore,
    ledger: &StagingLedger,
    expansion: &ExpansionState,
    clipboard: Option<&Clipboard>,
) -> Vec<OutlineRow> {
    let outline = Outline::new(store, ledger);
    let mut rows = Vec::new();
    let mut visited = HashSet::new();

    Projection {
        outline,
        expansion,
        clipboard,
        reparented: ledger.reparented_nodes(),
    }
    .walk(None, 0, None, false, &mut visited, &mut rows);

    rows
}

struct Projection<'a> {
    outline: Outline<'a>,
    expansion: &'a ExpansionState,
    clipboard: Option<&'a Clipboard>,
    reparented: HashSet<Identifier>,
}

impl Projection<'_> {
    fn walk(
        &self,
        parent: Option<&Identifier>,
        depth: usize,
        inherited_clipboard: Option<ClipboardMode>,
        ancestor_moved: bool,
        visited: &mut HashSet<Identifier>,
        rows: &mut Vec<OutlineRow>,
    ) {
        for sibling in self.outline.siblings(parent) {
            let entity = sibling.entity;
            if entity.is_node() && !visited.insert(entity.id.clone()) {
                continue;
            }
            // A promoted create would show twice: once from the store, once from the ledger
            if entity.id.is_pending() && self.outline.store().contains_node(&entity.id) {
                continue;
            }

            let clipboard = self
                .clipboard
                .filter(|c| c.entity == entity)
                .map(|c| c.mode)
                .or(inherited_clipboard);
            let is_expanded = entity.is_node() && self.expansion.is_expanded(&entity.id);
            let has_children =
                entity.is_node() && !self.outline.siblings(Some(&entity.id)).is_empty();
            let moved_here = ancestor_moved || self.reparented.contains(&entity.id);

            rows.push(OutlineRow {
                parent: parent.cloned(),
                depth,
                label: self.outline.label_of(&entity).unwrap_or_default(),
                order: sibling.order,
                has_pending_changes: ancestor_moved || self.outline.ledger().has_record(&entity),
                clipboard,
                is_expanded,
                has_children,
                is_temporary: entity.id.is_pending(),
                entity: entity.clone(),
            });

            if is_expanded {
                self.walk(
                    Some(&entity.id),
                    depth + 1,
                    clipboard,
                    moved_here,
                    visited,
                    rows,
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProjectionKey {
    store: u64,
    ledger: u64,
    expansion: u64,
    clipboard: Option<Clipboard>,
}

/// Memoized projection
#[derive(Debug, Default)]
pub struct ProjectionCache {
    key: Option<ProjectionKey>,
    rows: Arc<Vec<OutlineRow>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(
        &mut self,
        store: &EntityStore,
        ledger: &StagingLedger,
        expansion: &ExpansionState,
        clipboard: Option<&Clipboard>,
    ) -> Arc<Vec<OutlineRow>> {
        let key = ProjectionKey {
            store: store.generation(),
            ledger: ledger.revision(),
            expansion: expansion.revision(),
            clipboard: clipboard.cloned(),
        };
        if self.key.as_ref() != Some(&key) {
            self.rows = Arc::new(project(store, ledger, expansion, clipboard));
            self.key = Some(key);
        }
        Arc::clone(&self.rows)
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}
