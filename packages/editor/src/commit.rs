//! # Commit Coordinator
//!
//! Replays the staging ledger against the remote store.
//!
//! ## Phases
//!
//! 1. Node creates, parents before children (topological order over the
//!    temporary-parent graph)
//! 2. Card creates, once their node has a real id
//! 3. Content and quiz edits
//! 4. Moves: reparented nodes are reconciled against the remote edges,
//!    everything else pushes its final order
//! 5. Renames
//! 6. Deletes: cards, then nodes deepest first, edges before their node
//!
//! ## Failure handling
//!
//! A failed remote call is recorded in the [`CommitReport`] and the record
//! stays staged; the coordinator moves on to the next record. Records whose
//! parent or target vanished are cleared instead, so they are not retried
//! forever.
//!
//! The session lock is never held across a remote call. Every record is
//! re-read right before its call and settled right after it, so edits made
//! while the commit is in flight stay staged for the next commit.

use crate::config::EditorConfig;
use crate::ledger::{ClearScope, CreatePayload, MoveKind, PendingCreate, PendingMove, StagingLedger};
use crate::model::{Card, Edge, EntityKind, EntityRef, Node, Placement, TreeSnapshot};
use crate::remote::{
    CardPatch, NewCard, NewNode, NodePatch, RemoteError, RemoteErrorKind, RemoteResult,
    RemoteStore,
};
use crate::session::SessionState;
use mindtree_common::Identifier;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Idle,
    Committing,
    /// Last commit left failed or deferred records staged
    PartialFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    CreateNodes,
    CreateCards,
    Content,
    Moves,
    Renames,
    Deletes,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitPhase::CreateNodes => "create nodes",
            CommitPhase::CreateCards => "create cards",
            CommitPhase::Content => "content",
            CommitPhase::Moves => "moves",
            CommitPhase::Renames => "renames",
            CommitPhase::Deletes => "deletes",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitFailure {
    pub entity: EntityRef,
    pub phase: CommitPhase,
    pub error: RemoteError,
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.phase, self.entity, self.error)
    }
}

/// Temporary id replaced by the id the remote store assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub kind: EntityKind,
    pub temp: Identifier,
    pub real: Identifier,
}

/// Outcome of one commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    pub created: Vec<Promotion>,
    pub updated: Vec<EntityRef>,
    pub moved: Vec<EntityRef>,
    pub renamed: Vec<EntityRef>,
    pub deleted: Vec<EntityRef>,
    /// Left staged because something they depend on did not commit
    pub deferred: Vec<EntityRef>,
    /// Cleared because their target or parent vanished
    pub skipped: Vec<EntityRef>,
    pub failures: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn applied_count(&self) -> usize {
        self.created.len()
            + self.updated.len()
            + self.moved.len()
            + self.renamed.len()
            + self.deleted.len()
    }

    /// Nothing was staged
    pub fn is_empty(&self) -> bool {
        self.applied_count() == 0
            && self.deferred.is_empty()
            && self.skipped.is_empty()
            && self.failures.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.deferred.is_empty()
    }

    /// Real id a temporary id was promoted to in this commit
    pub fn real_id_for(&self, temp: &Identifier) -> Option<&Identifier> {
        self.created
            .iter()
            .find(|p| &p.temp == temp)
            .map(|p| &p.real)
    }

    /// One line per record that did not simply succeed
    pub fn details(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.failures.iter().map(|f| f.to_string()).collect();
        lines.extend(self.deferred.iter().map(|e| format!("deferred: {e}")));
        lines.extend(self.skipped.iter().map(|e| format!("skipped: {e}")));
        lines
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Nothing to commit");
        }

        write!(
            f,
            "Committed {} change(s) ({} created, {} updated, {} moved, {} renamed, {} deleted)",
            self.applied_count(),
            self.created.len(),
            self.updated.len(),
            self.moved.len(),
            self.renamed.len(),
            self.deleted.len()
        )?;
        if !self.failures.is_empty() {
            write!(f, "; {} failed", self.failures.len())?;
        }
        if !self.deferred.is_empty() {
            write!(f, "; {} deferred", self.deferred.len())?;
        }
        if !self.skipped.is_empty() {
            write!(f, "; {} skipped", self.skipped.len())?;
        }
        Ok(())
    }
}

enum CreateOutcome {
    Created,
    Deferred,
    Skipped,
    Failed,
}

enum ParentStatus {
    Ready,
    /// Parent is a temporary node that has not been promoted yet
    Waiting,
    Vanished,
}

pub(crate) struct CommitCoordinator<'a, R: RemoteStore + ?Sized> {
    state: &'a Mutex<SessionState>,
    remote: &'a R,
    config: &'a EditorConfig,
    report: CommitReport,
    /// Remote tree fetched for edge reconciliation, kept in step with our own edge calls
    remote_tree: Option<TreeSnapshot>,
    deleted_edges: HashSet<Identifier>,
}

impl<'a, R: RemoteStore + ?Sized> CommitCoordinator<'a, R> {
    pub(crate) fn new(state: &'a Mutex<SessionState>, remote: &'a R, config: &'a EditorConfig) -> Self {
        Self {
            state,
            remote,
            config,
            report: CommitReport::default(),
            remote_tree: None,
            deleted_edges: HashSet::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'a, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) async fn run(mut self) -> CommitReport {
        let snapshot = self.lock().ledger.clone();
        if snapshot.is_empty() {
            debug!("Nothing staged; commit is a no-op");
            return self.report;
        }
        info!(pending = snapshot.pending_count(), "Commit started");

        self.create_nodes(&snapshot)
            .instrument(info_span!("commit_phase", phase = "create_nodes"))
            .await;
        self.create_cards(&snapshot)
            .instrument(info_span!("commit_phase", phase = "create_cards"))
            .await;
        self.push_content(&snapshot)
            .instrument(info_span!("commit_phase", phase = "content"))
            .await;
        self.push_moves(&snapshot)
            .instrument(info_span!("commit_phase", phase = "moves"))
            .await;
        self.push_renames(&snapshot)
            .instrument(info_span!("commit_phase", phase = "renames"))
            .await;
        self.push_deletes(&snapshot)
            .instrument(info_span!("commit_phase", phase = "deletes"))
            .await;

        info!(
            applied = self.report.applied_count(),
            failed = self.report.failures.len(),
            deferred = self.report.deferred.len(),
            "{}",
            self.report
        );
        self.report
    }

    fn fail(&mut self, entity: &EntityRef, phase: CommitPhase, error: RemoteError) {
        warn!(entity = %entity, phase = %phase, error = %error, "Remote call failed; continuing");
        self.report.failures.push(CommitFailure {
            entity: entity.clone(),
            phase,
            error,
        });
    }

    fn defer(&mut self, entity: EntityRef) {
        debug!(entity = %entity, "Deferred to the next commit");
        self.report.deferred.push(entity);
    }

    fn skip(&mut self, entity: EntityRef, reason: &str) {
        warn!(entity = %entity, reason, "Skipping record");
        self.report.skipped.push(entity);
    }

    // ------------------------------------------------------------------------
    // Phase 1: node creates
    // ------------------------------------------------------------------------

    async fn create_nodes(&mut self, snapshot: &StagingLedger) {
        let creates: Vec<&PendingCreate> = snapshot
            .creates()
            .into_iter()
            .filter(|c| c.kind() == EntityKind::Node)
            .collect();
        let in_pass: HashSet<&Identifier> = creates.iter().map(|c| &c.temp_id).collect();

        // Kahn over the temporary-parent graph
        let mut waiting: HashMap<Identifier, Vec<Identifier>> = HashMap::new();
        let mut ready = VecDeque::new();
        for create in &creates {
            match &create.parent {
                Some(parent) if parent.is_pending() && in_pass.contains(parent) => {
                    waiting
                        .entry(parent.clone())
                        .or_default()
                        .push(create.temp_id.clone());
                }
                _ => ready.push_back(create.temp_id.clone()),
            }
        }

        while let Some(temp) = ready.pop_front() {
            let outcome = self.create_node(&temp).await;
            let dependents = waiting.remove(&temp).unwrap_or_default();
            match outcome {
                // Skipped children resolve as skipped themselves
                CreateOutcome::Created | CreateOutcome::Skipped => ready.extend(dependents),
                CreateOutcome::Deferred | CreateOutcome::Failed => {
                    let mut stack = dependents;
                    while let Some(dependent) = stack.pop() {
                        stack.extend(waiting.remove(&dependent).unwrap_or_default());
                        self.defer(EntityRef::node(dependent));
                    }
                }
            }
        }

        for (parent, stuck) in waiting {
            warn!(parent = %parent, count = stuck.len(), "Temporary nodes form a parent cycle; leaving them staged");
            for temp in stuck {
                self.defer(EntityRef::node(temp));
            }
        }
    }

    fn parent_status(state: &SessionState, create: &PendingCreate) -> ParentStatus {
        match &create.parent {
            None => ParentStatus::Ready,
            Some(parent) if parent.is_real() => {
                let deleted = state.ledger.is_deleted(&EntityRef::node(parent.clone()));
                if state.store.contains_node(parent) && !deleted {
                    ParentStatus::Ready
                } else {
                    ParentStatus::Vanished
                }
            }
            Some(parent) => {
                if state.ledger.create(parent).is_some() {
                    ParentStatus::Waiting
                } else {
                    ParentStatus::Vanished
                }
            }
        }
    }

    /// Re-read a create record and check its parent right before the call
    fn claim_create(&mut self, temp: &Identifier) -> Result<PendingCreate, CreateOutcome> {
        let mut state = self.lock();
        let Some(live) = state.ledger.create(temp).cloned() else {
            return Err(CreateOutcome::Skipped);
        };

        match Self::parent_status(&state, &live) {
            ParentStatus::Ready => Ok(live),
            ParentStatus::Waiting => {
                drop(state);
                self.defer(live.entity());
                Err(CreateOutcome::Deferred)
            }
            ParentStatus::Vanished => {
                state.ledger.cleanup_pending_for_temp_item(temp);
                drop(state);
                self.skip(live.entity(), "parent vanished before create");
                Err(CreateOutcome::Skipped)
            }
        }
    }

    async fn create_node(&mut self, temp: &Identifier) -> CreateOutcome {
        let sent = match self.claim_create(temp) {
            Ok(sent) => sent,
            Err(outcome) => return outcome,
        };
        let CreatePayload::Node { text } = &sent.payload else {
            return CreateOutcome::Skipped;
        };

        let request = NewNode {
            parent: sent.parent.as_ref().and_then(|p| p.real_id()).map(str::to_string),
            text: text.clone(),
            order: Some(sent.order),
        };

        match self.remote.create_node(request).await {
            Ok(created) => {
                let real = Identifier::real(created.node_id);
                let mut state = self.lock();
                let edge = sent.parent.clone().map(|source| Edge {
                    id: created
                        .edge_id
                        .map(Identifier::real)
                        .unwrap_or_else(|| state.minter.edge()),
                    source,
                    target: real.clone(),
                });
                state.store.insert_node(
                    Node {
                        id: real.clone(),
                        text: text.clone(),
                        order: Some(sent.order),
                    },
                    edge,
                );
                land(&mut state, &sent, &real);
                drop(state);

                debug!(temp = %temp, real = %real, "Promoted node");
                self.report.created.push(Promotion {
                    kind: EntityKind::Node,
                    temp: temp.clone(),
                    real,
                });
                CreateOutcome::Created
            }
            Err(error) => {
                self.fail(&sent.entity(), CommitPhase::CreateNodes, error);
                CreateOutcome::Failed
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 2: card creates
    // ------------------------------------------------------------------------

    async fn create_cards(&mut self, snapshot: &StagingLedger) {
        let cards: Vec<Identifier> = snapshot
            .creates()
            .into_iter()
            .filter(|c| c.kind() == EntityKind::Card)
            .map(|c| c.temp_id.clone())
            .collect();

        for temp in cards {
            self.create_card(&temp).await;
        }
    }

    async fn create_card(&mut self, temp: &Identifier) {
        let Ok(sent) = self.claim_create(temp) else {
            return;
        };
        let CreatePayload::Card {
            title,
            content,
            problems,
        } = &sent.payload
        else {
            return;
        };
        let Some(node_id) = sent.parent.clone() else {
            return;
        };

        let request = NewCard {
            node_id: node_id.to_string(),
            title: title.clone(),
            content: content.clone(),
            order: sent.order,
            problems: problems.clone(),
        };

        match self.remote.create_card(request).await {
            Ok(card_id) => {
                let real = Identifier::real(card_id);
                let mut state = self.lock();
                state.store.insert_card(Card {
                    id: real.clone(),
                    node_id,
                    title: title.clone(),
                    content: content.clone(),
                    order: sent.order,
                    problems: problems.clone(),
                });
                land(&mut state, &sent, &real);
                drop(state);

                debug!(temp = %temp, real = %real, "Promoted card");
                self.report.created.push(Promotion {
                    kind: EntityKind::Card,
                    temp: temp.clone(),
                    real,
                });
            }
            Err(error) => self.fail(&sent.entity(), CommitPhase::CreateCards, error),
        }
    }

    // ------------------------------------------------------------------------
    // Phase 3: content and quiz edits
    // ------------------------------------------------------------------------

    async fn push_content(&mut self, snapshot: &StagingLedger) {
        let mut cards: Vec<Identifier> = snapshot.changes().map(|c| c.card.clone()).collect();
        cards.sort();

        for card in cards {
            let entity = EntityRef::card(card.clone());
            let sent = {
                let mut state = self.lock();
                let Some(live) = state.ledger.change(&card).cloned() else {
                    continue;
                };
                if !state.store.contains_card(&card) {
                    state.ledger.clear(ClearScope::Entity(entity.clone()));
                    drop(state);
                    self.skip(entity, "card vanished before content update");
                    continue;
                }
                live
            };

            if sent.content.is_none() {
                debug!(card = %card, "Committing quiz edit on its own");
            }
            let patch = CardPatch {
                content: sent.content.as_ref().map(|e| e.content.clone()),
                problems: sent.problems.as_ref().map(|e| e.problems.clone()),
                ..Default::default()
            };

            match self.remote.update_card(card.as_str(), patch).await {
                Ok(()) => {
                    let mut state = self.lock();
                    state.store.update_card(&card, |c| {
                        if let Some(edit) = &sent.content {
                            c.content = edit.content.clone();
                        }
                        if let Some(edit) = &sent.problems {
                            c.problems = edit.problems.clone();
                        }
                    });
                    state.ledger.settle_change(&sent);
                    drop(state);
                    self.report.updated.push(entity);
                }
                Err(error) => self.fail(&entity, CommitPhase::Content, error),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 4: moves
    // ------------------------------------------------------------------------

    async fn push_moves(&mut self, snapshot: &StagingLedger) {
        let mut moves: Vec<EntityRef> = snapshot.moves().map(|m| m.target.clone()).collect();
        moves.sort_by_key(|target| {
            let reorder = snapshot
                .pending_move(target)
                .is_some_and(|m| m.kind == MoveKind::Reorder);
            (reorder, target.clone())
        });

        for target in moves {
            let claimed = {
                let mut state = self.lock();
                let Some(live) = state.ledger.pending_move(&target).cloned() else {
                    continue;
                };
                match state.store.placement_of(&target) {
                    None => {
                        state.ledger.clear(ClearScope::Entity(target.clone()));
                        None
                    }
                    Some(at) => Some((live, at)),
                }
            };
            let Some((live, at)) = claimed else {
                self.skip(target, "moved entity vanished");
                continue;
            };
            if at.parent.as_ref().is_some_and(|p| p.is_pending()) {
                self.defer(target);
                continue;
            }

            match (target.kind, live.kind) {
                (EntityKind::Node, MoveKind::Reparent) => {
                    self.push_node_reparent(&target, &live, at).await
                }
                (EntityKind::Node, MoveKind::Reorder) => self.push_node_order(&target, &live, at).await,
                (EntityKind::Card, _) => self.push_card_move(&target, &live, at).await,
            }
        }
    }

    async fn remote_edges(&mut self) -> RemoteResult<&[Edge]> {
        if self.remote_tree.is_none() {
            self.remote_tree = Some(self.remote.fetch_tree().await?);
        }
        Ok(self
            .remote_tree
            .as_ref()
            .map(|t| t.edges.as_slice())
            .unwrap_or_default())
    }

    fn forget_remote_edge(&mut self, id: &Identifier) {
        self.deleted_edges.insert(id.clone());
        if let Some(tree) = &mut self.remote_tree {
            tree.edges.retain(|e| &e.id != id);
        }
    }

    fn remember_remote_edge(&mut self, edge: Edge) {
        if let Some(tree) = &mut self.remote_tree {
            tree.edges.push(edge);
        }
    }

    fn settle_move(&mut self, target: &EntityRef, pushed: Placement) {
        let mut state = self.lock();
        let now = state.store.placement_of(target).unwrap_or_default();
        state
            .ledger
            .settle_move(target, pushed, now.parent.as_ref(), now.order);
    }

    async fn push_node_reparent(&mut self, target: &EntityRef, live: &PendingMove, at: Placement) {
        // Incoming edges the remote store holds for this node
        let incoming: Vec<Edge> = if self.config.verify_moves_remotely {
            match self.remote_edges().await {
                Ok(edges) => edges.iter().filter(|e| e.target == target.id).cloned().collect(),
                Err(error) => {
                    self.fail(target, CommitPhase::Moves, error);
                    return;
                }
            }
        } else {
            match (&live.original_edge, &live.original_parent) {
                (Some(edge), Some(source)) if edge.is_real() => vec![Edge {
                    id: edge.clone(),
                    source: source.clone(),
                    target: target.id.clone(),
                }],
                _ => Vec::new(),
            }
        };

        let (stale, kept): (Vec<Edge>, Vec<Edge>) = incoming
            .into_iter()
            .partition(|e| Some(&e.source) != at.parent.as_ref());

        for edge in stale {
            match self.remote.delete_edge(edge.id.as_str()).await {
                Ok(())
                | Err(RemoteError {
                    kind: RemoteErrorKind::NotFound,
                    ..
                }) => self.forget_remote_edge(&edge.id),
                Err(error) => {
                    self.fail(target, CommitPhase::Moves, error);
                    return;
                }
            }
        }

        let mut remote_edge = kept.into_iter().next().map(|e| e.id);
        if let (Some(parent), None) = (&at.parent, &remote_edge) {
            match self.remote.create_edge(parent.as_str(), target.id.as_str()).await {
                Ok(edge_id) => {
                    let id = Identifier::real(edge_id);
                    self.remember_remote_edge(Edge {
                        id: id.clone(),
                        source: parent.clone(),
                        target: target.id.clone(),
                    });
                    remote_edge = Some(id);
                }
                Err(error) => {
                    // The node has no remote parent now; it reads as a root there
                    // until a later commit adds the edge.
                    self.settle_move(
                        target,
                        Placement {
                            parent: None,
                            order: live.original_order,
                            edge: None,
                        },
                    );
                    self.fail(target, CommitPhase::Moves, error);
                    return;
                }
            }
        }

        {
            let mut state = self.lock();
            let local = state
                .store
                .incoming_edge(&target.id)
                .filter(|e| Some(&e.source) == at.parent.as_ref())
                .map(|e| e.id.clone());
            if let (Some(local), Some(remote)) = (local, &remote_edge) {
                if &local != remote {
                    state.store.set_edge_id(&local, remote.clone());
                }
            }
        }

        let mut pushed_order = at.order;
        if let Some(order) = at.order {
            let patch = NodePatch {
                order: Some(order),
                ..Default::default()
            };
            if let Err(error) = self.remote.update_node(target.id.as_str(), patch).await {
                self.fail(target, CommitPhase::Moves, error);
                pushed_order = live.original_order;
            }
        }

        let moved = pushed_order == at.order;
        self.settle_move(
            target,
            Placement {
                parent: at.parent,
                order: pushed_order,
                edge: remote_edge,
            },
        );
        if moved {
            self.report.moved.push(target.clone());
        }
    }

    async fn push_node_order(&mut self, target: &EntityRef, live: &PendingMove, at: Placement) {
        let patch = NodePatch {
            order: at.order,
            ..Default::default()
        };
        match self.remote.update_node(target.id.as_str(), patch).await {
            Ok(()) => {
                self.settle_move(
                    target,
                    Placement {
                        parent: at.parent,
                        order: at.order,
                        edge: live.original_edge.clone(),
                    },
                );
                self.report.moved.push(target.clone());
            }
            Err(error) => self.fail(target, CommitPhase::Moves, error),
        }
    }

    async fn push_card_move(&mut self, target: &EntityRef, live: &PendingMove, at: Placement) {
        let patch = CardPatch {
            node_id: match live.kind {
                MoveKind::Reparent => at.parent.as_ref().map(|p| p.to_string()),
                MoveKind::Reorder => None,
            },
            order: at.order,
            ..Default::default()
        };
        match self.remote.update_card(target.id.as_str(), patch).await {
            Ok(()) => {
                self.settle_move(target, at);
                self.report.moved.push(target.clone());
            }
            Err(error) => self.fail(target, CommitPhase::Moves, error),
        }
    }

    // ------------------------------------------------------------------------
    // Phase 5: renames
    // ------------------------------------------------------------------------

    async fn push_renames(&mut self, snapshot: &StagingLedger) {
        let mut targets: Vec<EntityRef> = snapshot.renames().map(|r| r.target.clone()).collect();
        targets.sort();

        for target in targets {
            let sent = {
                let mut state = self.lock();
                let Some(live) = state.ledger.rename(&target).cloned() else {
                    continue;
                };
                let exists = match target.kind {
                    EntityKind::Node => state.store.contains_node(&target.id),
                    EntityKind::Card => state.store.contains_card(&target.id),
                };
                if !exists {
                    state.ledger.clear(ClearScope::Entity(target.clone()));
                    drop(state);
                    self.skip(target, "renamed entity vanished");
                    continue;
                }
                live
            };

            let result = match target.kind {
                EntityKind::Node => {
                    let patch = NodePatch {
                        text: Some(sent.new_name.clone()),
                        ..Default::default()
                    };
                    self.remote.update_node(target.id.as_str(), patch).await
                }
                EntityKind::Card => {
                    let patch = CardPatch {
                        title: Some(sent.new_name.clone()),
                        ..Default::default()
                    };
                    self.remote.update_card(target.id.as_str(), patch).await
                }
            };

            match result {
                Ok(()) => {
                    let mut state = self.lock();
                    match target.kind {
                        EntityKind::Node => {
                            state.store.set_node_text(&target.id, &sent.new_name);
                        }
                        EntityKind::Card => {
                            state
                                .store
                                .update_card(&target.id, |c| c.title = sent.new_name.clone());
                        }
                    }
                    state.ledger.settle_rename(&sent);
                    drop(state);
                    self.report.renamed.push(target);
                }
                Err(error) => self.fail(&target, CommitPhase::Renames, error),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 6: deletes
    // ------------------------------------------------------------------------

    async fn push_deletes(&mut self, snapshot: &StagingLedger) {
        let (mut cards, mut nodes): (Vec<EntityRef>, Vec<EntityRef>) = snapshot
            .deletes()
            .map(|d| d.target.clone())
            .partition(|t| t.is_card());
        cards.sort();
        {
            let state = self.lock();
            nodes.sort_by_key(|t| (Reverse(state.store.depth_of(&t.id)), t.clone()));
        }

        for card in cards {
            self.delete_card(&card).await;
        }

        // Moves may have changed remote edges
        self.remote_tree = None;
        for node in nodes {
            self.delete_node(&node).await;
        }
    }

    async fn delete_card(&mut self, target: &EntityRef) {
        {
            let mut state = self.lock();
            if state.ledger.delete(target).is_none() {
                return;
            }
            if !state.store.contains_card(&target.id) {
                state.ledger.settle_delete(target);
                debug!(card = %target.id, "Card already gone");
                return;
            }
        }

        match self.remote.delete_card(target.id.as_str()).await {
            Ok(())
            | Err(RemoteError {
                kind: RemoteErrorKind::NotFound,
                ..
            }) => {
                let mut state = self.lock();
                state.store.remove_card(&target.id);
                state.ledger.settle_delete(target);
                drop(state);
                self.report.deleted.push(target.clone());
            }
            Err(error) => self.fail(target, CommitPhase::Deletes, error),
        }
    }

    async fn delete_node(&mut self, target: &EntityRef) {
        let (local_edges, original_edge) = {
            let mut state = self.lock();
            let Some(pending) = state.ledger.delete(target).cloned() else {
                return;
            };
            if !state.store.contains_node(&target.id) {
                state.ledger.settle_delete(target);
                debug!(node = %target.id, "Node already gone");
                return;
            }
            let local: Vec<Identifier> = state
                .store
                .edges_touching(&target.id)
                .into_iter()
                .filter(|e| e.id.is_real())
                .map(|e| e.id.clone())
                .collect();
            (local, pending.original_edge)
        };

        let edges: Vec<Identifier> = if self.config.verify_moves_remotely {
            match self.remote_edges().await {
                Ok(edges) => edges
                    .iter()
                    .filter(|e| e.source == target.id || e.target == target.id)
                    .map(|e| e.id.clone())
                    .collect(),
                Err(error) => {
                    self.fail(target, CommitPhase::Deletes, error);
                    return;
                }
            }
        } else {
            local_edges.into_iter().chain(original_edge).collect()
        };

        for edge in edges {
            if self.deleted_edges.contains(&edge) {
                continue;
            }
            match self.remote.delete_edge(edge.as_str()).await {
                Ok(())
                | Err(RemoteError {
                    kind: RemoteErrorKind::NotFound,
                    ..
                }) => self.forget_remote_edge(&edge),
                Err(error) => {
                    self.fail(target, CommitPhase::Deletes, error);
                    return;
                }
            }
        }

        match self.remote.delete_node(target.id.as_str()).await {
            Ok(())
            | Err(RemoteError {
                kind: RemoteErrorKind::NotFound,
                ..
            }) => {
                let mut state = self.lock();
                state.store.remove_node(&target.id);
                state.ledger.settle_delete(target);
                drop(state);
                self.report.deleted.push(target.clone());
            }
            Err(error) => self.fail(target, CommitPhase::Deletes, error),
        }
    }
}

/// Promote a created entity. Edits made to its create record while the call
/// was in flight are re-staged against the real id.
fn land(state: &mut SessionState, sent: &PendingCreate, real: &Identifier) {
    let temp = sent.entity();
    let live = state.ledger.create(&sent.temp_id).cloned();
    state.promote(&temp, real);

    let landed = EntityRef {
        kind: temp.kind,
        id: real.clone(),
    };
    let Some(live) = live else {
        state.ledger.record_delete(&landed, sent.parent.clone());
        debug!(entity = %landed, "Deleted while its create was in flight");
        return;
    };

    if live.label() != sent.label() {
        state.ledger.record_rename(&landed, live.label(), sent.label());
    }
    if let (
        CreatePayload::Card {
            content, problems, ..
        },
        CreatePayload::Card {
            content: sent_content,
            problems: sent_problems,
            ..
        },
    ) = (&live.payload, &sent.payload)
    {
        if content != sent_content {
            state.ledger.record_change(real, content, sent_content);
        }
        if problems != sent_problems {
            state
                .ledger
                .record_problems(real, problems.clone(), sent_problems);
        }
    }

    if live.parent == sent.parent && live.order == sent.order {
        return;
    }
    let origin = Placement {
        parent: sent.parent.clone(),
        order: Some(sent.order),
        edge: state.store.incoming_edge(real).map(|e| e.id.clone()),
    };
    match landed.kind {
        EntityKind::Node => {
            if live.parent != sent.parent {
                let incoming = live.parent.clone().map(|source| Edge {
                    id: state.minter.edge(),
                    source,
                    target: real.clone(),
                });
                state.store.set_parent(real, incoming);
            }
            state.store.set_node_order(real, Some(live.order));
        }
        EntityKind::Card => {
            let home = live.parent.clone();
            state.store.update_card(real, |card| {
                if let Some(home) = home {
                    card.node_id = home;
                }
                card.order = live.order;
            });
        }
    }
    state
        .ledger
        .record_move(&landed, origin, live.parent.as_ref(), Some(live.order));
}
