//! # Outline Session
//!
//! Presentation-facing facade over one outline: read accessors for the
//! projected rows and command methods that stage edits, plus `commit()`.
//!
//! All state sits behind one lock. Staging calls are synchronous and may run
//! while a commit is in flight; the commit only takes the lock between remote
//! calls.

use crate::commit::{CommitCoordinator, CommitReport, CommitState};
use crate::config::EditorConfig;
use crate::errors::{EditorError, EditorResult};
use crate::ledger::{CreatePayload, StagingLedger};
use crate::model::{EntityRef, Placement, Problem, TreeSnapshot};
use crate::outline::{Outline, Sibling};
use crate::planner::{Clipboard, ClipboardMode, Planner};
use crate::projector::{ExpansionState, OutlineRow, ProjectionCache};
use crate::remote::RemoteStore;
use crate::store::EntityStore;
use mindtree_common::{IdMinter, Identifier};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Everything a session mutates
pub(crate) struct SessionState {
    pub(crate) store: EntityStore,
    pub(crate) ledger: StagingLedger,
    pub(crate) minter: IdMinter,
    pub(crate) clipboard: Option<Clipboard>,
    pub(crate) expansion: ExpansionState,
    pub(crate) projection: ProjectionCache,
    pub(crate) commit_state: CommitState,
    loading: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            store: EntityStore::new(),
            ledger: StagingLedger::new(),
            minter: IdMinter::new(),
            clipboard: None,
            expansion: ExpansionState::new(),
            projection: ProjectionCache::new(),
            commit_state: CommitState::Idle,
            loading: false,
        }
    }

    fn outline(&self) -> Outline<'_> {
        Outline::new(&self.store, &self.ledger)
    }

    /// Replace a temporary id everywhere it is referenced. The caller has
    /// already inserted the real entity into the store.
    pub(crate) fn promote(&mut self, temp: &EntityRef, real: &Identifier) {
        if temp.is_node() {
            self.store.promote_node(&temp.id, real);
        }
        self.ledger.promote(&temp.id, real);
        self.expansion.rename(&temp.id, real);
        if let Some(clipboard) = &mut self.clipboard {
            if &clipboard.entity == temp {
                clipboard.entity.id = real.clone();
            }
        }
    }

    /// Drop the clipboard once its entity is gone
    fn prune_clipboard(&mut self) {
        let gone = self
            .clipboard
            .as_ref()
            .is_some_and(|c| !self.outline().exists(&c.entity));
        if gone {
            self.clipboard = None;
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Restores the commit state even when a commit future is dropped mid-flight
struct CommitGuard<'a> {
    state: &'a Mutex<SessionState>,
    outcome: CommitState,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).commit_state = self.outcome;
    }
}

/// Clears the loading flag when a load finishes or its future is dropped
struct LoadGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).loading = false;
    }
}

pub struct OutlineSession<R: RemoteStore> {
    state: Mutex<SessionState>,
    remote: R,
    config: EditorConfig,
}

impl<R: RemoteStore> OutlineSession<R> {
    pub fn new(remote: R) -> Self {
        Self::with_config(remote, EditorConfig::default())
    }

    pub fn with_config(remote: R, config: EditorConfig) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            remote,
            config,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    fn plan<T>(&self, op: impl FnOnce(&mut Planner<'_>) -> EditorResult<T>) -> EditorResult<T> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut planner = Planner::new(
            &mut state.store,
            &mut state.ledger,
            &mut state.minter,
            &self.config,
        );
        op(&mut planner)
    }

    /// Fetch the remote tree into the entity store. Staged records are kept;
    /// entities moved locally are put back where they were staged.
    ///
    /// Commits are rejected until the load finishes, so a promotion can never
    /// be overwritten by the older snapshot.
    pub async fn load(&self) -> EditorResult<()> {
        {
            let mut state = self.lock();
            if state.commit_state == CommitState::Committing {
                return Err(EditorError::CommitInProgress);
            }
            if state.loading {
                return Err(EditorError::LoadInProgress);
            }
            state.loading = true;
        }
        let _loading = LoadGuard { state: &self.state };

        let tree = self.remote.fetch_tree().await?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let staged: Vec<(EntityRef, Placement)> = state
            .ledger
            .moves()
            .filter_map(|m| {
                state
                    .store
                    .placement_of(&m.target)
                    .map(|at| (m.target.clone(), at))
            })
            .collect();

        let mut store = EntityStore::from_tree(tree);
        for (entity, at) in &staged {
            if !store.apply_placement(entity, at) {
                debug!(entity = %entity, "Staged move no longer applies to the reloaded tree");
            }
        }
        // A fresh store restarts its generation count
        state.store = store;
        state.projection.invalidate();
        state.prune_clipboard();

        info!(
            nodes = state.store.nodes().len(),
            cards = state.store.card_count(),
            pending = state.ledger.pending_count(),
            "Loaded tree"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Projected outline rows, recomputed only when an input changed
    pub fn rows(&self) -> Arc<Vec<OutlineRow>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.projection.rows(
            &state.store,
            &state.ledger,
            &state.expansion,
            state.clipboard.as_ref(),
        )
    }

    pub fn pending_count(&self) -> usize {
        self.lock().ledger.pending_count()
    }

    pub fn has_pending_changes(&self, entity: &EntityRef) -> bool {
        self.lock().outline().has_pending_changes(entity)
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.lock().outline().exists(entity)
    }

    pub fn label_of(&self, entity: &EntityRef) -> Option<String> {
        self.lock().outline().label_of(entity)
    }

    pub fn content_of(&self, card: &Identifier) -> Option<String> {
        self.lock().outline().content_of(card)
    }

    pub fn problems_of(&self, card: &Identifier) -> Option<Vec<Problem>> {
        self.lock().outline().problems_of(card)
    }

    pub fn parent_of(&self, entity: &EntityRef) -> Option<Identifier> {
        self.lock().outline().parent_of(entity)
    }

    /// Merged children of `parent` (roots when `None`) in display order
    pub fn children(&self, parent: Option<&Identifier>) -> Vec<Sibling> {
        self.lock().outline().siblings(parent)
    }

    /// Committed tree with local structural edits applied
    pub fn tree(&self) -> TreeSnapshot {
        self.lock().store.to_tree()
    }

    pub fn clipboard(&self) -> Option<Clipboard> {
        self.lock().clipboard.clone()
    }

    pub fn commit_state(&self) -> CommitState {
        self.lock().commit_state
    }

    // ------------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------------

    pub fn stage_edit(&self, card: &Identifier, content: &str) -> EditorResult<()> {
        self.plan(|p| p.edit_content(card, content))
    }

    pub fn stage_problems(&self, card: &Identifier, problems: Vec<Problem>) -> EditorResult<()> {
        self.plan(|p| p.edit_problems(card, problems))
    }

    pub fn stage_rename(&self, entity: &EntityRef, name: &str) -> EditorResult<()> {
        self.plan(|p| p.rename(entity, name))
    }

    /// Stage a node under `parent`, or a root node when `None`
    pub fn stage_create_node(&self, parent: Option<&Identifier>, text: &str) -> EditorResult<Identifier> {
        let id = self.plan(|p| p.create_node(parent, text))?;
        if let (Some(parent), true) = (parent, self.config.expand_on_create) {
            self.lock().expansion.expand(parent);
        }
        Ok(id)
    }

    pub fn stage_create_card(&self, node: &Identifier, title: &str, content: &str) -> EditorResult<Identifier> {
        let id = self.plan(|p| p.create_card(node, title, content))?;
        if self.config.expand_on_create {
            self.lock().expansion.expand(node);
        }
        Ok(id)
    }

    /// Delete an entity and its subtree. Returns how many entities disappeared.
    pub fn stage_delete(&self, entity: &EntityRef) -> EditorResult<usize> {
        let removed = self.plan(|p| p.delete(entity))?;
        self.lock().prune_clipboard();
        Ok(removed)
    }

    /// Reparent `entity` under `new_parent` (root when `None`), placed last
    pub fn stage_move(&self, entity: &EntityRef, new_parent: Option<&Identifier>) -> EditorResult<()> {
        self.plan(|p| p.move_entity(entity, new_parent, None))
    }

    /// Reparent `entity` and place it at `position` among the new siblings
    pub fn stage_move_to(
        &self,
        entity: &EntityRef,
        new_parent: Option<&Identifier>,
        position: usize,
    ) -> EditorResult<()> {
        self.plan(|p| p.move_entity(entity, new_parent, Some(position)))
    }

    /// Move `entity` to `position` within its sibling list
    pub fn stage_reorder(&self, entity: &EntityRef, position: usize) -> EditorResult<()> {
        self.plan(|p| p.reorder(entity, position))
    }

    // ------------------------------------------------------------------------
    // Clipboard
    // ------------------------------------------------------------------------

    pub fn copy(&self, entity: &EntityRef) -> EditorResult<()> {
        self.set_clipboard(entity, ClipboardMode::Copy)
    }

    pub fn cut(&self, entity: &EntityRef) -> EditorResult<()> {
        self.set_clipboard(entity, ClipboardMode::Cut)
    }

    fn set_clipboard(&self, entity: &EntityRef, mode: ClipboardMode) -> EditorResult<()> {
        let mut state = self.lock();
        if !state.outline().exists(entity) {
            return Err(EditorError::NotFound(entity.clone()));
        }
        state.clipboard = Some(Clipboard {
            entity: entity.clone(),
            mode,
        });
        Ok(())
    }

    /// Paste under `target`. A copy stays on the clipboard, a cut is consumed.
    pub fn paste(&self, target: &Identifier) -> EditorResult<EntityRef> {
        let clipboard = self.clipboard().ok_or(EditorError::ClipboardEmpty)?;
        let pasted = self.plan(|p| p.paste(&clipboard, target))?;

        let mut state = self.lock();
        if clipboard.mode == ClipboardMode::Cut {
            state.clipboard = None;
        }
        if self.config.expand_on_create {
            state.expansion.expand(target);
        }
        Ok(pasted)
    }

    pub fn clear_clipboard(&self) {
        self.lock().clipboard = None;
    }

    // ------------------------------------------------------------------------
    // Expansion
    // ------------------------------------------------------------------------

    pub fn expand(&self, node: &Identifier) {
        self.lock().expansion.expand(node);
    }

    pub fn collapse(&self, node: &Identifier) {
        self.lock().expansion.collapse(node);
    }

    /// Returns whether the node is now expanded
    pub fn toggle_expanded(&self, node: &Identifier) -> bool {
        self.lock().expansion.toggle(node)
    }

    pub fn expand_all(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let committed = state.store.nodes().iter().map(|n| n.id.clone());
        let speculative = state
            .ledger
            .creates()
            .into_iter()
            .filter(|c| matches!(c.payload, CreatePayload::Node { .. }))
            .map(|c| c.temp_id.clone());
        let all: Vec<Identifier> = committed.chain(speculative).collect();
        state.expansion.expand_all(all);
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    /// Replay every staged record against the remote store. Fails only when
    /// another commit is already running; per-record failures are in the report.
    pub async fn commit(&self) -> EditorResult<CommitReport> {
        {
            let mut state = self.lock();
            if state.commit_state == CommitState::Committing {
                return Err(EditorError::CommitInProgress);
            }
            if state.loading {
                return Err(EditorError::LoadInProgress);
            }
            state.commit_state = CommitState::Committing;
        }

        let mut guard = CommitGuard {
            state: &self.state,
            outcome: CommitState::Idle,
        };
        let report = CommitCoordinator::new(&self.state, &self.remote, &self.config)
            .run()
            .await;
        if !report.is_success() {
            guard.outcome = CommitState::PartialFailure;
        }
        drop(guard);

        Ok(report)
    }
}

impl<R: RemoteStore> std::fmt::Debug for OutlineSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("OutlineSession")
            .field("nodes", &state.store.nodes().len())
            .field("cards", &state.store.card_count())
            .field("pending", &state.ledger.pending_count())
            .field("commit_state", &state.commit_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;
    use crate::remote::MemoryRemote;

    #[tokio::test]
    async fn test_staging_round_trip_through_rows() {
        let session = OutlineSession::new(MemoryRemote::new());
        let root = session.stage_create_node(None, "Root").unwrap();
        let card = session.stage_create_card(&root, "Intro", "hello").unwrap();

        let rows = session.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].entity, EntityRef::card(card.clone()));
        assert!(rows.iter().all(|r| r.is_temporary && r.has_pending_changes));

        assert!(Arc::ptr_eq(&rows, &session.rows()));

        session.stage_delete(&EntityRef::node(root)).unwrap();
        assert_eq!(session.pending_count(), 0);
        assert!(session.rows().is_empty());
    }

    #[tokio::test]
    async fn test_clipboard_lifecycle() {
        let session = OutlineSession::new(MemoryRemote::new());
        let a = session.stage_create_node(None, "A").unwrap();
        let b = session.stage_create_node(None, "B").unwrap();

        assert_eq!(session.paste(&b), Err(EditorError::ClipboardEmpty));

        session.copy(&EntityRef::node(a.clone())).unwrap();
        session.paste(&b).unwrap();
        session.paste(&b).unwrap();
        assert!(session.clipboard().is_some());
        assert_eq!(session.children(Some(&b)).len(), 2);

        session.cut(&EntityRef::node(a.clone())).unwrap();
        let moved = session.paste(&b).unwrap();
        assert_eq!(moved.kind, EntityKind::Node);
        assert!(session.clipboard().is_none());
        assert!(!session.contains(&EntityRef::node(a)));
    }
}
