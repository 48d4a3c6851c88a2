//! Commit coordinator scenarios against the in-memory remote store

use async_trait::async_trait;
use mindtree_editor::{
    Card, CardPatch, CommitPhase, CommitState, CreatedNode, Edge, EditorConfig, EditorError,
    EntityRef, Identifier, MemoryRemote, NewCard, NewNode, Node, NodePatch, OutlineSession,
    RemoteCall, RemoteResult, RemoteStore, TreeSnapshot,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

fn id(s: &str) -> Identifier {
    Identifier::real(s)
}

fn node(s: &str) -> EntityRef {
    EntityRef::node(id(s))
}

/// root ─┬─ a ─┬─ b
///       │     └─ [k]
///       ├─ x
///       ├─ y
///       └─ z
fn fixture() -> TreeSnapshot {
    let nodes = [("root", 1), ("a", 1), ("b", 1), ("x", 2), ("y", 3), ("z", 4)]
        .into_iter()
        .map(|(s, order)| Node {
            id: id(s),
            text: s.to_uppercase(),
            order: Some(order),
        })
        .collect();
    let edges = [("root", "a"), ("a", "b"), ("root", "x"), ("root", "y"), ("root", "z")]
        .into_iter()
        .map(|(source, target)| Edge {
            id: id(&format!("e-{target}")),
            source: id(source),
            target: id(target),
        })
        .collect();

    let mut tree = TreeSnapshot {
        nodes,
        edges,
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
    tree
}

async fn loaded_with(config: EditorConfig) -> OutlineSession<MemoryRemote> {
    let session = OutlineSession::with_config(MemoryRemote::with_tree(fixture()), config);
    session.load().await.unwrap();
    session.remote().clear_calls();
    session
}

async fn loaded() -> OutlineSession<MemoryRemote> {
    loaded_with(EditorConfig::default()).await
}

fn remote_node(tree: &TreeSnapshot, s: &str) -> Node {
    tree.nodes.iter().find(|n| n.id == id(s)).cloned().unwrap()
}

fn incoming(tree: &TreeSnapshot, s: &str) -> Vec<Edge> {
    tree.edges.iter().filter(|e| e.target == id(s)).cloned().collect()
}

/// Remote store that can pause its next write or its next fetch until the
/// test resumes it
struct GatedRemote {
    inner: MemoryRemote,
    armed: AtomicBool,
    fetch_armed: AtomicBool,
    reached: Notify,
    resume: Notify,
}

impl GatedRemote {
    fn new(inner: MemoryRemote) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            fetch_armed: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn arm_fetch(&self) {
        self.fetch_armed.store(true, Ordering::SeqCst);
    }

    async fn gate(&self) {
        self.pause_if(&self.armed).await;
    }

    async fn pause_if(&self, flag: &AtomicBool) {
        if flag.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.resume.notified().await;
        }
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn create_node(&self, node: NewNode) -> RemoteResult<CreatedNode> {
        self.gate().await;
        self.inner.create_node(node).await
    }

    async fn update_node(&self, node_id: &str, patch: NodePatch) -> RemoteResult<()> {
        self.gate().await;
        self.inner.update_node(node_id, patch).await
    }

    async fn delete_node(&self, node_id: &str) -> RemoteResult<()> {
        self.gate().await;
        self.inner.delete_node(node_id).await
    }

    async fn create_edge(&self, source: &str, target: &str) -> RemoteResult<String> {
        self.gate().await;
        self.inner.create_edge(source, target).await
    }

    async fn delete_edge(&self, edge_id: &str) -> RemoteResult<()> {
        self.gate().await;
        self.inner.delete_edge(edge_id).await
    }

    async fn create_card(&self, card: NewCard) -> RemoteResult<String> {
        self.gate().await;
        self.inner.create_card(card).await
    }

    async fn update_card(&self, card_id: &str, patch: CardPatch) -> RemoteResult<()> {
        self.gate().await;
        self.inner.update_card(card_id, patch).await
    }

    async fn delete_card(&self, card_id: &str) -> RemoteResult<()> {
        self.gate().await;
        self.inner.delete_card(card_id).await
    }

    async fn fetch_tree(&self) -> RemoteResult<TreeSnapshot> {
        self.pause_if(&self.fetch_armed).await;
        self.inner.fetch_tree().await
    }
}

// ----------------------------------------------------------------------------
// Creates
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_commit_issues_no_calls() {
    let session = loaded().await;

    let report = session.commit().await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.to_string(), "Nothing to commit");
    assert!(session.remote().calls().is_empty());
    assert_eq!(session.commit_state(), CommitState::Idle);
}

#[tokio::test]
async fn test_rename_folds_into_create_payload() {
    let session = OutlineSession::new(MemoryRemote::new());
    let n1 = session.stage_create_node(None, "N1").unwrap();
    let c1 = session.stage_create_card(&n1, "Draft", "").unwrap();
    session.stage_rename(&EntityRef::card(c1), "Intro").unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_success());
    assert_eq!(
        session.remote().write_calls(),
        vec![
            RemoteCall::CreateNode {
                parent: None,
                text: "N1".to_string(),
            },
            RemoteCall::CreateCard {
                node_id: "srv-node-1".to_string(),
                title: "Intro".to_string(),
            },
        ]
    );
    assert!(report.renamed.is_empty());
}

#[tokio::test]
async fn test_creates_follow_parent_promotion() {
    let session = loaded().await;
    let p = session.stage_create_node(Some(&id("root")), "P").unwrap();
    let q = session.stage_create_node(Some(&p), "Q").unwrap();
    let c = session.stage_create_card(&q, "Card", "text").unwrap();

    let report = session.commit().await.unwrap();

    let p_real = report.real_id_for(&p).unwrap();
    let q_real = report.real_id_for(&q).unwrap();
    assert!(report.real_id_for(&c).is_some());
    assert_eq!(
        session.remote().write_calls(),
        vec![
            RemoteCall::CreateNode {
                parent: Some("root".to_string()),
                text: "P".to_string(),
            },
            RemoteCall::CreateNode {
                parent: Some(p_real.to_string()),
                text: "Q".to_string(),
            },
            RemoteCall::CreateCard {
                node_id: q_real.to_string(),
                title: "Card".to_string(),
            },
        ]
    );
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.parent_of(&EntityRef::node(q_real.clone())), Some(p_real.clone()));
}

#[tokio::test]
async fn test_created_card_round_trips_to_real_id() {
    let session = loaded().await;
    let temp = session.stage_create_card(&id("x"), "Intro", "hello").unwrap();

    let report = session.commit().await.unwrap();

    let real = report.real_id_for(&temp).cloned().unwrap();
    assert!(real.is_real());
    assert!(session.contains(&EntityRef::card(real.clone())));
    assert!(!session.contains(&EntityRef::card(temp)));
    assert!(!session.has_pending_changes(&EntityRef::card(real.clone())));
    assert_eq!(session.pending_count(), 0);

    let local = session.tree();
    assert_eq!(local.cards_by_node[&id("x")][0].id, real);
    let remote = session.remote().tree();
    assert_eq!(remote.cards_by_node[&id("x")][0].content, "hello");
}

#[tokio::test]
async fn test_failed_create_defers_dependents() {
    let session = loaded().await;
    let p = session.stage_create_node(Some(&id("root")), "P").unwrap();
    let q = session.stage_create_node(Some(&p), "Q").unwrap();
    session.stage_create_card(&q, "Card", "").unwrap();
    session
        .remote()
        .fail_when(|call| matches!(call, RemoteCall::CreateNode { text, .. } if text == "P"));

    let report = session.commit().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].phase, CommitPhase::CreateNodes);
    assert_eq!(report.deferred.len(), 2);
    assert!(report.created.is_empty());
    assert_eq!(session.pending_count(), 3);
    assert_eq!(session.commit_state(), CommitState::PartialFailure);

    session.remote().clear_failures();
    let retry = session.commit().await.unwrap();
    assert_eq!(retry.created.len(), 3);
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.commit_state(), CommitState::Idle);
}

#[tokio::test]
async fn test_pasted_subtree_commits_in_dependency_order() {
    let session = loaded().await;
    session.copy(&node("a")).unwrap();
    session.paste(&id("z")).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.created.len(), 3);
    let remote = session.remote().tree();
    assert_eq!(remote.nodes.len(), 8);
    let cards: usize = remote.cards_by_node.values().map(Vec::len).sum();
    assert_eq!(cards, 2);
}

#[tokio::test]
async fn test_vanished_parent_clears_create() {
    let session = loaded().await;
    let temp = session.stage_create_card(&id("y"), "Orphan", "").unwrap();
    session.remote().edit_tree(|tree| {
        tree.nodes.retain(|n| n.id != id("y"));
        tree.edges.retain(|e| e.target != id("y"));
    });
    session.load().await.unwrap();
    session.remote().clear_calls();

    let report = session.commit().await.unwrap();

    assert_eq!(report.skipped, vec![EntityRef::card(temp)]);
    assert!(session.remote().write_calls().is_empty());
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.commit_state(), CommitState::Idle);
}

// ----------------------------------------------------------------------------
// Edits and failures
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_failure_is_isolated_to_its_record() {
    let session = loaded().await;
    session.stage_rename(&node("x"), "X2").unwrap();
    session.stage_rename(&node("y"), "Y2").unwrap();
    session.stage_edit(&id("k"), "new body").unwrap();
    session
        .remote()
        .fail_when(|call| matches!(call, RemoteCall::UpdateNode { node_id, .. } if node_id == "x"));

    let report = session.commit().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity, node("x"));
    assert_eq!(report.failures[0].phase, CommitPhase::Renames);
    assert_eq!(report.renamed, vec![node("y")]);
    assert_eq!(report.updated, vec![EntityRef::card(id("k"))]);
    assert_eq!(session.commit_state(), CommitState::PartialFailure);
    assert_eq!(session.pending_count(), 1);
    assert_eq!(session.label_of(&node("x")), Some("X2".to_string()));

    let remote = session.remote().tree();
    assert_eq!(remote_node(&remote, "x").text, "X");
    assert_eq!(remote_node(&remote, "y").text, "Y2");

    session.remote().clear_failures();
    let retry = session.commit().await.unwrap();
    assert_eq!(retry.renamed, vec![node("x")]);
    assert_eq!(session.commit_state(), CommitState::Idle);
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_quiz_only_edit_is_sent_on_its_own() {
    let session = loaded().await;
    let quiz = vec![mindtree_editor::Problem {
        question: "Capital of France?".to_string(),
        answer: "Paris".to_string(),
    }];
    session.stage_problems(&id("k"), quiz.clone()).unwrap();

    session.commit().await.unwrap();

    let calls = session.remote().write_calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        RemoteCall::UpdateCard { card_id, patch } => {
            assert_eq!(card_id, "k");
            assert_eq!(patch.content, None);
            assert_eq!(patch.problems.as_ref(), Some(&quiz));
        }
        other => panic!("Expected card update, got {:?}", other),
    }
    assert_eq!(session.problems_of(&id("k")), Some(quiz));
}

// ----------------------------------------------------------------------------
// Moves
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_reorder_pushes_final_orders() {
    let session = loaded().await;

    // [a, x, y, z] -> [a, z, x, y]
    session.stage_reorder(&node("z"), 1).unwrap();
    let report = session.commit().await.unwrap();

    assert_eq!(report.moved.len(), 3);
    let remote = session.remote().tree();
    assert_eq!(remote_node(&remote, "a").order, Some(1));
    assert_eq!(remote_node(&remote, "z").order, Some(2));
    assert_eq!(remote_node(&remote, "x").order, Some(3));
    assert_eq!(remote_node(&remote, "y").order, Some(4));
    assert!(session
        .remote()
        .write_calls()
        .iter()
        .all(|c| matches!(c, RemoteCall::UpdateNode { .. })));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_reparent_replaces_remote_edge() {
    let session = loaded().await;
    session.stage_move(&node("x"), Some(&id("a"))).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_success());
    let calls = session.remote().calls();
    assert!(calls.contains(&RemoteCall::FetchTree));
    assert!(calls.contains(&RemoteCall::DeleteEdge {
        edge_id: "e-x".to_string(),
    }));
    assert!(calls.contains(&RemoteCall::CreateEdge {
        source: "a".to_string(),
        target: "x".to_string(),
    }));

    let remote = session.remote().tree();
    let edges = incoming(&remote, "x");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, id("a"));
    assert_eq!(remote_node(&remote, "x").order, Some(3));
    assert_eq!(remote_node(&remote, "y").order, Some(2));
    assert_eq!(remote_node(&remote, "z").order, Some(3));

    let local = session.tree();
    assert_eq!(incoming(&local, "x"), edges);
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_reparent_reuses_edge_already_present_remotely() {
    let session = loaded().await;
    // Another client already moved x under a
    session.remote().edit_tree(|tree| {
        if let Some(edge) = tree.edges.iter_mut().find(|e| e.target == id("x")) {
            edge.source = id("a");
        }
    });
    session.stage_move(&node("x"), Some(&id("a"))).unwrap();

    session.commit().await.unwrap();

    let calls = session.remote().calls();
    assert!(!calls
        .iter()
        .any(|c| matches!(c, RemoteCall::CreateEdge { .. } | RemoteCall::DeleteEdge { .. })));
    let local = session.tree();
    assert_eq!(incoming(&local, "x")[0].id, id("e-x"));
}

#[tokio::test]
async fn test_reparent_without_remote_verification() {
    let config = EditorConfig {
        verify_moves_remotely: false,
        ..Default::default()
    };
    let session = loaded_with(config).await;
    session.stage_move(&node("x"), Some(&id("a"))).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_success());
    let calls = session.remote().calls();
    assert!(!calls.contains(&RemoteCall::FetchTree));
    assert!(calls.contains(&RemoteCall::DeleteEdge {
        edge_id: "e-x".to_string(),
    }));
    let edges = incoming(&session.remote().tree(), "x");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, id("a"));
}

#[tokio::test]
async fn test_failed_edge_create_leaves_node_as_remote_root() {
    let session = loaded().await;
    session.stage_move(&node("x"), Some(&id("a"))).unwrap();
    session
        .remote()
        .fail_when(|call| matches!(call, RemoteCall::CreateEdge { .. }));

    let report = session.commit().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity, node("x"));
    assert!(incoming(&session.remote().tree(), "x").is_empty());
    // Locally x is still under a, and the move stays staged
    assert_eq!(session.parent_of(&node("x")), Some(id("a")));
    assert!(session.has_pending_changes(&node("x")));

    session.remote().clear_failures();
    let retry = session.commit().await.unwrap();
    assert!(retry.is_success());
    let edges = incoming(&session.remote().tree(), "x");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, id("a"));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_card_move_updates_card_home() {
    let session = loaded().await;
    session
        .stage_move(&EntityRef::card(id("k")), Some(&id("x")))
        .unwrap();

    session.commit().await.unwrap();

    assert_eq!(
        session.remote().write_calls(),
        vec![RemoteCall::UpdateCard {
            card_id: "k".to_string(),
            patch: CardPatch {
                node_id: Some("x".to_string()),
                order: Some(1),
                ..Default::default()
            },
        }]
    );
    let remote = session.remote().tree();
    assert_eq!(remote.cards_by_node[&id("x")][0].id, id("k"));
}

// ----------------------------------------------------------------------------
// Deletes
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_delete_removes_cards_then_nodes_deepest_first() {
    let session = loaded().await;
    session.stage_delete(&node("a")).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_success(), "{:?}", report.details());
    assert_eq!(report.deleted.len(), 3);

    let calls = session.remote().write_calls();
    let position = |wanted: &RemoteCall| calls.iter().position(|c| c == wanted).unwrap();
    let card = position(&RemoteCall::DeleteCard {
        card_id: "k".to_string(),
    });
    let child = position(&RemoteCall::DeleteNode {
        node_id: "b".to_string(),
    });
    let parent = position(&RemoteCall::DeleteNode {
        node_id: "a".to_string(),
    });
    assert!(card < child && child < parent);

    let remote = session.remote().tree();
    assert_eq!(remote.nodes.len(), 4);
    assert!(remote.edges.iter().all(|e| e.source != id("a") && e.target != id("a")));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_delete_of_temporary_subtree_issues_no_calls() {
    let session = loaded().await;
    let temp = session.stage_create_node(Some(&id("root")), "Scratch").unwrap();
    session.stage_create_card(&temp, "One", "").unwrap();
    session.stage_create_card(&temp, "Two", "").unwrap();
    session.stage_delete(&EntityRef::node(temp)).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_empty());
    assert!(session.remote().calls().is_empty());
}

#[tokio::test]
async fn test_delete_of_real_node_drops_its_pending_cards() {
    let session = loaded().await;
    session.stage_create_card(&id("y"), "One", "").unwrap();
    session.stage_create_card(&id("y"), "Two", "").unwrap();
    session.stage_delete(&node("y")).unwrap();

    let report = session.commit().await.unwrap();

    assert_eq!(report.deleted, vec![node("y")]);
    assert!(!session.remote().calls().iter().any(|c| matches!(
        c,
        RemoteCall::CreateCard { .. } | RemoteCall::DeleteCard { .. }
    )));
}

#[tokio::test]
async fn test_delete_pushes_renumbered_sibling_orders() {
    let session = loaded().await;
    session.stage_delete(&node("y")).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.is_success(), "{:?}", report.details());
    assert_eq!(report.moved, vec![node("z")]);
    assert!(session.remote().write_calls().contains(&RemoteCall::UpdateNode {
        node_id: "z".to_string(),
        patch: NodePatch {
            order: Some(3),
            ..Default::default()
        },
    }));
    let remote = session.remote().tree();
    assert_eq!(remote_node(&remote, "a").order, Some(1));
    assert_eq!(remote_node(&remote, "x").order, Some(2));
    assert_eq!(remote_node(&remote, "z").order, Some(3));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_delete_after_move_removes_remote_edge() {
    let config = EditorConfig {
        verify_moves_remotely: false,
        ..Default::default()
    };
    let session = loaded_with(config).await;
    session.stage_move(&node("x"), Some(&id("a"))).unwrap();
    session.stage_delete(&node("x")).unwrap();

    let report = session.commit().await.unwrap();

    assert!(report.deleted.contains(&node("x")));
    assert!(report.failures.is_empty(), "{:?}", report.details());
    let remote = session.remote().tree();
    assert!(remote.nodes.iter().all(|n| n.id != id("x")));
    assert!(incoming(&remote, "x").is_empty());
}

// ----------------------------------------------------------------------------
// Concurrency
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_edits_during_commit_stay_staged() {
    let session = OutlineSession::new(GatedRemote::new(MemoryRemote::with_tree(fixture())));
    session.load().await.unwrap();
    let draft = session.stage_create_node(Some(&id("root")), "Draft").unwrap();
    session.remote().arm();

    let during = async {
        session.remote().reached.notified().await;
        assert_eq!(session.commit_state(), CommitState::Committing);
        assert!(matches!(
            session.commit().await,
            Err(EditorError::CommitInProgress)
        ));
        assert!(matches!(
            session.load().await,
            Err(EditorError::CommitInProgress)
        ));
        session
            .stage_rename(&EntityRef::node(draft.clone()), "Final")
            .unwrap();
        session.stage_rename(&node("x"), "Ex").unwrap();
        session.remote().resume.notify_one();
    };
    let (report, ()) = tokio::join!(session.commit(), during);
    let report = report.unwrap();

    let real = report.real_id_for(&draft).cloned().unwrap();
    assert_eq!(session.label_of(&EntityRef::node(real.clone())), Some("Final".to_string()));
    assert_eq!(session.pending_count(), 2);
    assert_eq!(session.commit_state(), CommitState::Idle);

    session.commit().await.unwrap();
    let remote = session.remote().inner.tree();
    assert_eq!(remote_node(&remote, real.as_str()).text, "Final");
    assert_eq!(remote_node(&remote, "x").text, "Ex");
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_dropped_commit_resets_state() {
    let session = OutlineSession::new(GatedRemote::new(MemoryRemote::with_tree(fixture())));
    session.load().await.unwrap();
    session.stage_create_node(Some(&id("root")), "Draft").unwrap();
    session.remote().arm();

    let timed_out = tokio::time::timeout(Duration::from_millis(20), session.commit()).await;

    assert!(timed_out.is_err());
    assert_eq!(session.commit_state(), CommitState::Idle);
    assert_eq!(session.pending_count(), 1);

    let report = session.commit().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(session.remote().inner.tree().nodes.len(), 7);
}

#[tokio::test]
async fn test_commit_during_load_is_rejected() {
    let session = OutlineSession::new(GatedRemote::new(MemoryRemote::with_tree(fixture())));
    session.load().await.unwrap();
    let draft = session.stage_create_node(Some(&id("root")), "Draft").unwrap();
    session.remote().arm_fetch();

    let during = async {
        session.remote().reached.notified().await;
        assert!(matches!(
            session.commit().await,
            Err(EditorError::LoadInProgress)
        ));
        assert!(matches!(
            session.load().await,
            Err(EditorError::LoadInProgress)
        ));
        session.remote().resume.notify_one();
    };
    let (loaded, ()) = tokio::join!(session.load(), during);
    loaded.unwrap();

    assert!(session.remote().inner.write_calls().is_empty());
    assert!(session.contains(&EntityRef::node(draft.clone())));
    assert_eq!(session.pending_count(), 1);

    let report = session.commit().await.unwrap();
    let real = report.real_id_for(&draft).cloned().unwrap();
    assert!(session.contains(&EntityRef::node(real.clone())));
    assert_eq!(session.parent_of(&EntityRef::node(real)), Some(id("root")));
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_dropped_load_allows_commit() {
    let session = OutlineSession::new(GatedRemote::new(MemoryRemote::with_tree(fixture())));
    session.load().await.unwrap();
    session.stage_create_node(Some(&id("root")), "Draft").unwrap();
    session.remote().arm_fetch();

    let timed_out = tokio::time::timeout(Duration::from_millis(20), session.load()).await;
    assert!(timed_out.is_err());

    let report = session.commit().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(session.remote().inner.tree().nodes.len(), 7);
}
