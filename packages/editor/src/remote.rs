//! # Remote Store
//!
//! Collaborator contract the commit coordinator replays staged mutations
//! against, plus [`MemoryRemote`], an in-process implementation that behaves
//! like a strict server: it refuses to delete a node that still has edges or
//! cards, refuses a second incoming edge, and records every call it receives.

use crate::model::{Card, Edge, Node, Problem, TreeSnapshot};
use async_trait::async_trait;
use mindtree_common::Identifier;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    NotFound,
    Conflict,
    Network,
    Rejected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self {
            kind: RemoteErrorKind::NotFound,
            message: format!("{what} not found"),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Conflict,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Rejected,
            message: message.into(),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    pub parent: Option<String>,
    pub text: String,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedNode {
    pub node_id: String,
    /// Edge from the parent, when one was given
    pub edge_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    pub text: Option<String>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub node_id: String,
    pub title: String,
    pub content: String,
    pub order: u32,
    pub problems: Vec<Problem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    pub node_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: Option<u32>,
    pub problems: Option<Vec<Problem>>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_node(&self, node: NewNode) -> RemoteResult<CreatedNode>;

    async fn update_node(&self, node_id: &str, patch: NodePatch) -> RemoteResult<()>;

    async fn delete_node(&self, node_id: &str) -> RemoteResult<()>;

    async fn create_edge(&self, source: &str, target: &str) -> RemoteResult<String>;

    async fn delete_edge(&self, edge_id: &str) -> RemoteResult<()>;

    async fn create_card(&self, card: NewCard) -> RemoteResult<String>;

    async fn update_card(&self, card_id: &str, patch: CardPatch) -> RemoteResult<()>;

    async fn delete_card(&self, card_id: &str) -> RemoteResult<()>;

    /// Full tree state, used for the initial load and for move reconciliation
    async fn fetch_tree(&self) -> RemoteResult<TreeSnapshot>;
}

/// One call received by a [`MemoryRemote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateNode { parent: Option<String>, text: String },
    UpdateNode { node_id: String, patch: NodePatch },
    DeleteNode { node_id: String },
    CreateEdge { source: String, target: String },
    DeleteEdge { edge_id: String },
    CreateCard { node_id: String, title: String },
    UpdateCard { card_id: String, patch: CardPatch },
    DeleteCard { card_id: String },
    FetchTree,
}

impl RemoteCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, RemoteCall::FetchTree)
    }
}

type FailRule = Box<dyn Fn(&RemoteCall) -> bool + Send + Sync>;

struct MemoryState {
    tree: TreeSnapshot,
    next_id: u64,
    calls: Vec<RemoteCall>,
    fail_rules: Vec<FailRule>,
}

/// In-memory remote store
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_tree(TreeSnapshot::default())
    }

    pub fn with_tree(tree: TreeSnapshot) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                tree,
                next_id: 0,
                calls: Vec::new(),
                fail_rules: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every call matching `rule` with a network error
    pub fn fail_when(&self, rule: impl Fn(&RemoteCall) -> bool + Send + Sync + 'static) {
        self.lock().fail_rules.push(Box::new(rule));
    }

    pub fn clear_failures(&self) {
        self.lock().fail_rules.clear();
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Calls that would change remote state
    pub fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(|c| c.is_write()).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn tree(&self) -> TreeSnapshot {
        self.lock().tree.clone()
    }

    /// Mutate the remote tree directly, as another client would
    pub fn edit_tree(&self, edit: impl FnOnce(&mut TreeSnapshot)) {
        edit(&mut self.lock().tree);
    }

    fn begin(&self, call: RemoteCall) -> RemoteResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        let failing = state.fail_rules.iter().any(|rule| rule(&call));
        let description = format!("{call:?}");
        state.calls.push(call);
        if failing {
            return Err(RemoteError::network(format!("injected failure for {description}")));
        }
        Ok(state)
    }
}

impl MemoryState {
    fn mint(&mut self, prefix: &str) -> Identifier {
        self.next_id += 1;
        Identifier::real(format!("srv-{prefix}-{}", self.next_id))
    }

    fn has_node(&self, id: &Identifier) -> bool {
        self.tree.nodes.iter().any(|n| &n.id == id)
    }

    fn find_card(&self, id: &Identifier) -> Option<(Identifier, usize)> {
        self.tree.cards_by_node.iter().find_map(|(node, list)| {
            list.iter()
                .position(|c| &c.id == id)
                .map(|pos| (node.clone(), pos))
        })
    }

    fn add_edge(&mut self, source: Identifier, target: Identifier) -> RemoteResult<Identifier> {
        if !self.has_node(&source) {
            return Err(RemoteError::not_found(format!("node {source}")));
        }
        if !self.has_node(&target) {
            return Err(RemoteError::not_found(format!("node {target}")));
        }
        if self.tree.edges.iter().any(|e| e.target == target) {
            return Err(RemoteError::conflict(format!("{target} already has a parent")));
        }
        let id = self.mint("edge");
        self.tree.edges.push(Edge {
            id: id.clone(),
            source,
            target,
        });
        Ok(id)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn create_node(&self, node: NewNode) -> RemoteResult<CreatedNode> {
        let mut state = self.begin(RemoteCall::CreateNode {
            parent: node.parent.clone(),
            text: node.text.clone(),
        })?;

        let parent = node.parent.map(Identifier::real);
        if let Some(parent) = &parent {
            if !state.has_node(parent) {
                return Err(RemoteError::not_found(format!("node {parent}")));
            }
        }

        // Validation is done; the node and its edge land together
        let id = state.mint("node");
        let edge_id = parent.map(|source| {
            let edge_id = state.mint("edge");
            state.tree.edges.push(Edge {
                id: edge_id.clone(),
                source,
                target: id.clone(),
            });
            edge_id
        });
        state.tree.nodes.push(Node {
            id: id.clone(),
            text: node.text,
            order: node.order,
        });

        Ok(CreatedNode {
            node_id: id.into(),
            edge_id: edge_id.map(String::from),
        })
    }

    async fn update_node(&self, node_id: &str, patch: NodePatch) -> RemoteResult<()> {
        let mut state = self.begin(RemoteCall::UpdateNode {
            node_id: node_id.to_string(),
            patch: patch.clone(),
        })?;
        let id = Identifier::real(node_id);
        let node = state
            .tree
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| RemoteError::not_found(format!("node {node_id}")))?;

        if let Some(text) = patch.text {
            node.text = text;
        }
        if let Some(order) = patch.order {
            node.order = Some(order);
        }
        Ok(())
    }

    async fn delete_node(&self, node_id: &str) -> RemoteResult<()> {
        let mut state = self.begin(RemoteCall::DeleteNode {
            node_id: node_id.to_string(),
        })?;
        let id = Identifier::real(node_id);
        if !state.has_node(&id) {
            return Err(RemoteError::not_found(format!("node {node_id}")));
        }
        if state
            .tree
            .edges
            .iter()
            .any(|e| e.source == id || e.target == id)
        {
            return Err(RemoteError::conflict(format!("node {node_id} still has edges")));
        }
        if state
            .tree
            .cards_by_node
            .get(&id)
            .is_some_and(|l| !l.is_empty())
        {
            return Err(RemoteError::conflict(format!("node {node_id} still has cards")));
        }
        state.tree.nodes.retain(|n| n.id != id);
        state.tree.cards_by_node.remove(&id);
        Ok(())
    }

    async fn create_edge(&self, source: &str, target: &str) -> RemoteResult<String> {
        let mut state = self.begin(RemoteCall::CreateEdge {
            source: source.to_string(),
            target: target.to_string(),
        })?;
        let id = state.add_edge(Identifier::real(source), Identifier::real(target))?;
        Ok(id.into())
    }

    async fn delete_edge(&self, edge_id: &str) -> RemoteResult<()> {
        let mut state = self.begin(RemoteCall::DeleteEdge {
            edge_id: edge_id.to_string(),
        })?;
        let id = Identifier::real(edge_id);
        let before = state.tree.edges.len();
        state.tree.edges.retain(|e| e.id != id);
        if state.tree.edges.len() == before {
            return Err(RemoteError::not_found(format!("edge {edge_id}")));
        }
        Ok(())
    }

    async fn create_card(&self, card: NewCard) -> RemoteResult<String> {
        let mut state = self.begin(RemoteCall::CreateCard {
            node_id: card.node_id.clone(),
            title: card.title.clone(),
        })?;
        let node_id = Identifier::real(card.node_id);
        if !state.has_node(&node_id) {
            return Err(RemoteError::not_found(format!("node {node_id}")));
        }
        let id = state.mint("card");
        state
            .tree
            .cards_by_node
            .entry(node_id.clone())
            .or_default()
            .push(Card {
                id: id.clone(),
                node_id,
                title: card.title,
                content: card.content,
                order: card.order,
                problems: card.problems,
            });
        Ok(id.into())
    }

    async fn update_card(&self, card_id: &str, patch: CardPatch) -> RemoteResult<()> {
        let mut state = self.begin(RemoteCall::UpdateCard {
            card_id: card_id.to_string(),
            patch: patch.clone(),
        })?;
        let id = Identifier::real(card_id);
        let (node_id, pos) = state
            .find_card(&id)
            .ok_or_else(|| RemoteError::not_found(format!("card {card_id}")))?;

        let new_node = patch.node_id.map(Identifier::real);
        if let Some(new_node) = &new_node {
            if !state.has_node(new_node) {
                return Err(RemoteError::not_found(format!("node {new_node}")));
            }
        }

        let list = state.tree.cards_by_node.entry(node_id.clone()).or_default();
        let mut card = list.remove(pos);
        if let Some(title) = patch.title {
            card.title = title;
        }
        if let Some(content) = patch.content {
            card.content = content;
        }
        if let Some(order) = patch.order {
            card.order = order;
        }
        if let Some(problems) = patch.problems {
            card.problems = problems;
        }
        if let Some(new_node) = new_node {
            card.node_id = new_node;
        }
        let home = card.node_id.clone();
        state.tree.cards_by_node.entry(home).or_default().push(card);
        Ok(())
    }

    async fn delete_card(&self, card_id: &str) -> RemoteResult<()> {
        let mut state = self.begin(RemoteCall::DeleteCard {
            card_id: card_id.to_string(),
        })?;
        let id = Identifier::real(card_id);
        let (node_id, pos) = state
            .find_card(&id)
            .ok_or_else(|| RemoteError::not_found(format!("card {card_id}")))?;
        if let Some(list) = state.tree.cards_by_node.get_mut(&node_id) {
            list.remove(pos);
        }
        Ok(())
    }

    async fn fetch_tree(&self) -> RemoteResult<TreeSnapshot> {
        let state = self.begin(RemoteCall::FetchTree)?;
        Ok(state.tree.clone())
    }
}
