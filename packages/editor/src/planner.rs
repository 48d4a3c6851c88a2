//! # Clipboard / Move Planner
//!
//! Structural edits staged against the entity store and the staging ledger.
//!
//! ## Semantics
//!
//! ### Create
//! - Speculative entities get a temporary id and exist only as ledger records
//! - The sibling list is compacted to 1..N first, then the new entity lands at N+1
//!
//! ### Move
//! - The cycle check runs before any edge is touched
//! - Real entities are moved in the store immediately and a move record keeps
//!   their committed position
//! - Both the source and the destination sibling lists are renumbered 1..N
//!
//! ### Delete
//! - Removes the whole subtree: real entities are queued for deletion,
//!   speculative ones are purged
//! - The remaining siblings are renumbered 1..N
//!
//! ### Paste
//! - Duplicates the clipboard subtree with fresh temporary ids
//! - A cut paste also deletes the originals

use crate::config::EditorConfig;
use crate::errors::{EditorError, EditorResult};
use crate::ledger::{CreatePayload, MoveKind, PendingCreate, StagingLedger};
use crate::model::{Edge, EntityKind, EntityRef, Placement, Problem};
use crate::outline::Outline;
use crate::store::EntityStore;
use mindtree_common::{IdMinter, Identifier};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardMode {
    Copy,
    Cut,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Clipboard {
    pub entity: EntityRef,
    pub mode: ClipboardMode,
}

/// Snapshot of a subtree taken before a paste writes anything
struct CopyItem {
    kind: EntityKind,
    label: String,
    content: String,
    problems: Vec<Problem>,
    children: Vec<CopyItem>,
}

pub struct Planner<'a> {
    store: &'a mut EntityStore,
    ledger: &'a mut StagingLedger,
    minter: &'a mut IdMinter,
    config: &'a EditorConfig,
}

impl<'a> Planner<'a> {
    pub fn new(
        store: &'a mut EntityStore,
        ledger: &'a mut StagingLedger,
        minter: &'a mut IdMinter,
        config: &'a EditorConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            minter,
            config,
        }
    }

    fn outline(&self) -> Outline<'_> {
        Outline::new(&*self.store, &*self.ledger)
    }

    fn require(&self, entity: &EntityRef) -> EditorResult<()> {
        if self.outline().exists(entity) {
            Ok(())
        } else {
            Err(EditorError::NotFound(entity.clone()))
        }
    }

    fn require_node(&self, id: &Identifier) -> EditorResult<()> {
        self.require(&EntityRef::node(id.clone()))
    }

    /// Renumber the current siblings under `parent` and return the order
    /// for an entity appended to the list
    fn append_order(&mut self, parent: Option<&Identifier>) -> u32 {
        let siblings: Vec<EntityRef> = self
            .outline()
            .siblings(parent)
            .into_iter()
            .map(|s| s.entity)
            .collect();
        self.renumber(parent, &siblings);
        siblings.len() as u32 + 1
    }

    // ------------------------------------------------------------------------
    // Creates and edits
    // ------------------------------------------------------------------------

    pub fn create_node(&mut self, parent: Option<&Identifier>, text: &str) -> EditorResult<Identifier> {
        let text = clean_name(text)?;
        if let Some(parent) = parent {
            self.require_node(parent)?;
        }

        let order = self.append_order(parent);
        let temp_id = self.minter.node();
        let id = self.ledger.record_create(PendingCreate {
            temp_id,
            parent: parent.cloned(),
            order,
            payload: CreatePayload::Node { text },
            seq: 0,
        });

        debug!(node = %id, order, "Staged node create");
        Ok(id)
    }

    pub fn create_card(&mut self, node: &Identifier, title: &str, content: &str) -> EditorResult<Identifier> {
        self.require_node(node)?;
        let title = match title.trim() {
            "" => self.config.default_card_title.clone(),
            trimmed => trimmed.to_string(),
        };

        let order = self.append_order(Some(node));
        let temp_id = self.minter.card();
        let id = self.ledger.record_create(PendingCreate {
            temp_id,
            parent: Some(node.clone()),
            order,
            payload: CreatePayload::Card {
                title,
                content: content.to_string(),
                problems: Vec::new(),
            },
            seq: 0,
        });

        debug!(card = %id, node = %node, order, "Staged card create");
        Ok(id)
    }

    pub fn rename(&mut self, entity: &EntityRef, name: &str) -> EditorResult<()> {
        let name = clean_name(name)?;
        self.require(entity)?;

        let committed = match entity.kind {
            EntityKind::Node => self.store.node(&entity.id).map(|n| n.text.clone()),
            EntityKind::Card => self.store.card(&entity.id).map(|c| c.title.clone()),
        }
        .unwrap_or_default();

        self.ledger.record_rename(entity, &name, &committed);
        debug!(entity = %entity, "Staged rename");
        Ok(())
    }

    pub fn edit_content(&mut self, card: &Identifier, content: &str) -> EditorResult<()> {
        self.require(&EntityRef::card(card.clone()))?;
        let committed = self
            .store
            .card(card)
            .map(|c| c.content.clone())
            .unwrap_or_default();

        self.ledger.record_change(card, content, &committed);
        Ok(())
    }

    pub fn edit_problems(&mut self, card: &Identifier, problems: Vec<Problem>) -> EditorResult<()> {
        self.require(&EntityRef::card(card.clone()))?;
        let committed = self
            .store
            .card(card)
            .map(|c| c.problems.clone())
            .unwrap_or_default();

        self.ledger.record_problems(card, problems, &committed);
        Ok(())
    }

    /// Delete `entity` and everything under it. Returns how many entities
    /// disappeared from the outline.
    pub fn delete(&mut self, entity: &EntityRef) -> EditorResult<usize> {
        self.require(entity)?;

        let outline = self.outline();
        let home = outline.parent_of(entity);
        let doomed: Vec<(EntityRef, Option<Identifier>)> = outline
            .subtree(entity)
            .into_iter()
            .map(|e| {
                let parent = outline.parent_of(&e);
                (e, parent)
            })
            .collect();

        for (target, parent) in &doomed {
            if target.id.is_pending() {
                // Already purged along with a speculative ancestor
                if self.ledger.create(&target.id).is_some() {
                    self.ledger.record_delete(target, parent.clone());
                }
            } else {
                self.ledger.record_delete(target, parent.clone());
            }
        }

        let remaining = self.sibling_refs(home.as_ref(), entity);
        self.renumber(home.as_ref(), &remaining);

        debug!(entity = %entity, removed = doomed.len(), "Staged delete");
        Ok(doomed.len())
    }

    // ------------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------------

    /// Move `entity` under `new_parent` (root when `None`) at `position` among
    /// the merged siblings, or last when no position is given.
    pub fn move_entity(
        &mut self,
        entity: &EntityRef,
        new_parent: Option<&Identifier>,
        position: Option<usize>,
    ) -> EditorResult<()> {
        self.require(entity)?;
        match new_parent {
            Some(parent) => {
                self.require_node(parent)?;
                if entity.is_node()
                    && (&entity.id == parent || self.outline().is_descendant(&entity.id, parent))
                {
                    return Err(EditorError::CycleDetected {
                        dragged: entity.clone(),
                        target: EntityRef::node(parent.clone()),
                    });
                }
            }
            None if entity.is_card() => {
                return Err(EditorError::InvalidTarget(format!(
                    "{entity} must stay attached to a node"
                )));
            }
            None => {}
        }

        let old_parent = self.outline().parent_of(entity);
        let mut siblings = self.sibling_refs(new_parent, entity);
        let index = position.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, entity.clone());

        if old_parent.as_ref() != new_parent {
            let remaining = self.sibling_refs(old_parent.as_ref(), entity);
            self.renumber(old_parent.as_ref(), &remaining);
        }
        self.renumber(new_parent, &siblings);

        debug!(entity = %entity, index, "Staged move");
        Ok(())
    }

    /// Move `entity` to `position` within its current sibling list
    pub fn reorder(&mut self, entity: &EntityRef, position: usize) -> EditorResult<()> {
        self.require(entity)?;
        let parent = self.outline().parent_of(entity);
        self.move_entity(entity, parent.as_ref(), Some(position))
    }

    fn sibling_refs(&self, parent: Option<&Identifier>, excluding: &EntityRef) -> Vec<EntityRef> {
        self.outline()
            .siblings(parent)
            .into_iter()
            .map(|s| s.entity)
            .filter(|e| e != excluding)
            .collect()
    }

    fn renumber(&mut self, parent: Option<&Identifier>, list: &[EntityRef]) {
        for (i, entity) in list.iter().enumerate() {
            self.place(entity, parent, i as u32 + 1);
        }
    }

    fn place(&mut self, entity: &EntityRef, parent: Option<&Identifier>, order: u32) {
        if entity.id.is_pending() {
            let unchanged = self
                .ledger
                .create(&entity.id)
                .map(|c| c.parent.as_ref() == parent && c.order == order);
            if unchanged == Some(false) {
                self.ledger.place_create(&entity.id, parent.cloned(), order);
            }
            return;
        }

        let outline = self.outline();
        let mut before = Placement {
            parent: outline.parent_of(entity),
            order: outline.order_of(entity),
            edge: None,
        };
        if before.parent.as_ref() == parent && before.order == Some(order) {
            return;
        }
        let reparented = before.parent.as_ref() != parent;

        match entity.kind {
            EntityKind::Node => {
                before.edge = self.store.incoming_edge(&entity.id).map(|e| e.id.clone());
                if reparented {
                    let incoming = parent.map(|p| Edge {
                        id: self.minter.edge(),
                        source: p.clone(),
                        target: entity.id.clone(),
                    });
                    self.store.set_parent(&entity.id, incoming);
                }
                self.store.set_node_order(&entity.id, Some(order));
            }
            EntityKind::Card => {
                let home = parent.cloned();
                self.store.update_card(&entity.id, |card| {
                    if let Some(home) = home {
                        card.node_id = home;
                    }
                    card.order = order;
                });
            }
        }

        let remote_edge = match self.ledger.pending_move(entity) {
            Some(existing) => existing.original_edge.clone(),
            None => before.edge.clone(),
        };
        self.ledger.record_move(entity, before, parent, Some(order));

        // Back under the committed parent: reuse the edge the remote store knows
        let at_origin = self
            .ledger
            .pending_move(entity)
            .map_or(true, |m| m.kind == MoveKind::Reorder);
        if entity.is_node() && reparented && at_origin {
            let current = self.store.incoming_edge(&entity.id).map(|e| e.id.clone());
            if let (Some(current), Some(remote_edge)) = (current, remote_edge) {
                self.store.set_edge_id(&current, remote_edge);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Clipboard
    // ------------------------------------------------------------------------

    /// Paste the clipboard under `target`. Returns the root of the pasted copy.
    pub fn paste(&mut self, clipboard: &Clipboard, target: &Identifier) -> EditorResult<EntityRef> {
        self.require_node(target)?;
        self.require(&clipboard.entity)?;

        let source = &clipboard.entity;
        if clipboard.mode == ClipboardMode::Cut
            && source.is_node()
            && (&source.id == target || self.outline().is_descendant(&source.id, target))
        {
            return Err(EditorError::CycleDetected {
                dragged: source.clone(),
                target: EntityRef::node(target.clone()),
            });
        }

        let mut visited = HashSet::new();
        let snapshot = self.snapshot(source, &mut visited);
        let order = self.append_order(Some(target));
        let root = self.stage_copy(&snapshot, target, order);

        if clipboard.mode == ClipboardMode::Cut {
            self.delete(source)?;
        }

        debug!(source = %source, copy = %root, target = %target, mode = ?clipboard.mode, "Pasted subtree");
        Ok(root)
    }

    fn snapshot(&self, entity: &EntityRef, visited: &mut HashSet<Identifier>) -> CopyItem {
        let outline = self.outline();
        let mut item = CopyItem {
            kind: entity.kind,
            label: outline.label_of(entity).unwrap_or_default(),
            content: String::new(),
            problems: Vec::new(),
            children: Vec::new(),
        };

        match entity.kind {
            EntityKind::Card => {
                item.content = outline.content_of(&entity.id).unwrap_or_default();
                item.problems = outline.problems_of(&entity.id).unwrap_or_default();
            }
            EntityKind::Node => {
                if visited.insert(entity.id.clone()) {
                    for sibling in outline.siblings(Some(&entity.id)) {
                        item.children.push(self.snapshot(&sibling.entity, visited));
                    }
                }
            }
        }
        item
    }

    fn stage_copy(&mut self, item: &CopyItem, parent: &Identifier, order: u32) -> EntityRef {
        let (temp_id, payload) = match item.kind {
            EntityKind::Node => (
                self.minter.node(),
                CreatePayload::Node {
                    text: item.label.clone(),
                },
            ),
            EntityKind::Card => (
                self.minter.card(),
                CreatePayload::Card {
                    title: item.label.clone(),
                    content: item.content.clone(),
                    problems: item.problems.clone(),
                },
            ),
        };

        let id = self.ledger.record_create(PendingCreate {
            temp_id,
            parent: Some(parent.clone()),
            order,
            payload,
            seq: 0,
        });

        for (i, child) in item.children.iter().enumerate() {
            self.stage_copy(child, &id, i as u32 + 1);
        }

        EntityRef { kind: item.kind, id }
    }
}

fn clean_name(name: &str) -> EditorResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(EditorError::EmptyName)
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, Node, TreeSnapshot};

    fn id(s: &str) -> Identifier {
        Identifier::real(s)
    }

    fn node(s: &str, order: u32) -> Node {
        Node {
            id: id(s),
            text: s.to_uppercase(),
            order: Some(order),
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            id: id(&format!("e-{target}")),
            source: id(source),
            target: id(target),
        }
    }

    /// root ─┬─ a ── b
    ///       ├─ x
    ///       ├─ y
    ///       └─ z        (card k under a)
    fn fixture() -> (EntityStore, StagingLedger, IdMinter, EditorConfig) {
        let mut tree = TreeSnapshot {
            nodes: vec![
                node("root", 1),
                node("a", 1),
                node("b", 1),
                node("x", 2),
                node("y", 3),
                node("z", 4),
            ],
            edges: vec![
                edge("root", "a"),
                edge("a", "b"),
                edge("root", "x"),
                edge("root", "y"),
                edge("root", "z"),
            ],
            ..Default::default()
        };
        tree.cards_by_node.insert(
            id("a"),
            vec![Card {
                id: id("k"),
                node_id: id("a"),
                title: "K".to_string(),
                content: "body".to_string(),
                order: 2,
                problems: vec![],
            }],
        );
        (
            EntityStore::from_tree(tree),
            StagingLedger::new(),
            IdMinter::new(),
            EditorConfig::default(),
        )
    }

    fn order_of(store: &EntityStore, ledger: &StagingLedger, s: &str) -> Option<u32> {
        Outline::new(store, ledger).order_of(&EntityRef::node(id(s)))
    }

    #[test]
    fn test_move_into_own_subtree_is_rejected_before_mutation() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let edges_before = store.edges().to_vec();

        let result = Planner::new(&mut store, &mut ledger, &mut minter, &config).move_entity(
            &EntityRef::node(id("a")),
            Some(&id("b")),
            None,
        );

        assert!(matches!(result, Err(EditorError::CycleDetected { .. })));
        assert_eq!(store.edges(), edges_before.as_slice());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reorder_renumbers_densely() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);

        // [a, x, y, z] -> [z, a, x, y]
        planner.reorder(&EntityRef::node(id("z")), 0).unwrap();

        assert_eq!(order_of(&store, &ledger, "z"), Some(1));
        assert_eq!(order_of(&store, &ledger, "a"), Some(2));
        assert_eq!(order_of(&store, &ledger, "x"), Some(3));
        assert_eq!(order_of(&store, &ledger, "y"), Some(4));
        assert!(ledger.moves().all(|m| m.kind == MoveKind::Reorder));
    }

    #[test]
    fn test_move_back_restores_remote_edge_and_collapses() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let target = EntityRef::node(id("x"));
        {
            let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);
            planner.move_entity(&target, Some(&id("a")), None).unwrap();
        }
        assert_eq!(store.parent_of(&id("x")), Some(&id("a")));
        assert!(store.incoming_edge(&id("x")).unwrap().id.is_pending());
        assert!(Outline::new(&store, &ledger).is_reparented(&target));

        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);
        planner.move_entity(&target, Some(&id("root")), Some(1)).unwrap();

        assert_eq!(store.incoming_edge(&id("x")).unwrap().id, id("e-x"));
        assert!(ledger.pending_move(&target).is_none());
    }

    #[test]
    fn test_card_cannot_move_to_root() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);

        let result = planner.move_entity(&EntityRef::card(id("k")), None, None);
        assert!(matches!(result, Err(EditorError::InvalidTarget(_))));
    }

    #[test]
    fn test_create_validates_name_and_parent() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);

        assert_eq!(
            planner.create_node(Some(&id("root")), "   "),
            Err(EditorError::EmptyName)
        );
        assert!(matches!(
            planner.create_node(Some(&id("missing")), "N"),
            Err(EditorError::NotFound(_))
        ));

        let card = planner.create_card(&id("b"), "", "").unwrap();
        assert_eq!(ledger.create(&card).unwrap().label(), "Untitled");
    }

    #[test]
    fn test_delete_real_node_stages_whole_subtree() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);
        let temp = planner.create_card(&id("b"), "Draft", "").unwrap();

        let removed = planner.delete(&EntityRef::node(id("a"))).unwrap();

        assert_eq!(removed, 4);
        assert!(ledger.is_deleted(&EntityRef::node(id("a"))));
        assert!(ledger.is_deleted(&EntityRef::node(id("b"))));
        assert!(ledger.is_deleted(&EntityRef::card(id("k"))));
        assert!(ledger.create(&temp).is_none());
        // Three deletes plus the reorders that close the gap at root level
        assert_eq!(ledger.pending_count(), 6);
        assert_eq!(order_of(&store, &ledger, "x"), Some(1));
        assert_eq!(order_of(&store, &ledger, "z"), Some(3));
    }

    #[test]
    fn test_create_compacts_siblings_before_appending() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        store.set_node_order(&id("z"), Some(9));
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);

        let created = planner.create_node(Some(&id("root")), "N").unwrap();

        assert_eq!(ledger.create(&created).unwrap().order, 5);
        assert_eq!(order_of(&store, &ledger, "z"), Some(4));
        let moved: Vec<_> = ledger.moves().map(|m| m.target.clone()).collect();
        assert_eq!(moved, vec![EntityRef::node(id("z"))]);
    }

    #[test]
    fn test_copy_paste_duplicates_with_fresh_ids() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);
        let clipboard = Clipboard {
            entity: EntityRef::node(id("a")),
            mode: ClipboardMode::Copy,
        };

        let root = planner.paste(&clipboard, &id("x")).unwrap();

        assert!(root.id.is_pending());
        let creates = ledger.creates();
        assert_eq!(creates.len(), 3);
        assert_eq!(creates[0].label(), "A");
        assert_eq!(creates[0].parent, Some(id("x")));

        let children: Vec<_> = creates[1..].iter().map(|c| c.parent.clone()).collect();
        assert!(children.iter().all(|p| p.as_ref() == Some(&root.id)));

        let card = creates.iter().find(|c| c.kind() == EntityKind::Card).unwrap();
        match &card.payload {
            CreatePayload::Card { content, .. } => assert_eq!(content, "body"),
            other => panic!("Expected card payload, got {:?}", other),
        }
        assert!(ledger.deletes().next().is_none());
    }

    #[test]
    fn test_cut_paste_rejects_own_subtree_and_deletes_originals() {
        let (mut store, mut ledger, mut minter, config) = fixture();
        let mut planner = Planner::new(&mut store, &mut ledger, &mut minter, &config);
        let clipboard = Clipboard {
            entity: EntityRef::node(id("a")),
            mode: ClipboardMode::Cut,
        };

        assert!(matches!(
            planner.paste(&clipboard, &id("b")),
            Err(EditorError::CycleDetected { .. })
        ));

        planner.paste(&clipboard, &id("z")).unwrap();
        assert!(ledger.is_deleted(&EntityRef::node(id("a"))));
        assert_eq!(ledger.creates().len(), 3);
    }
}
