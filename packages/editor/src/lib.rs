//! # Mindtree Editor
//!
//! Staged editing engine for a mind-map outline of nodes and cards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ session: command + read facade              │
//! │  - Stage edits, moves, clipboard operations │
//! │  - Expansion state and projected rows       │
//! └─────────────────────────────────────────────┘
//!           ↓                        ↓
//! ┌──────────────────────┐  ┌──────────────────────┐
//! │ planner: structural  │  │ projector: rows from │
//! │ edits, cycle checks  │  │ store + ledger       │
//! └──────────────────────┘  └──────────────────────┘
//!           ↓                        ↑
//! ┌─────────────────────────────────────────────┐
//! │ store: committed entities + local moves     │
//! │ ledger: staged changes, creates, deletes    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ commit: ordered replay against RemoteStore  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Remote store is the source of truth**: local state is a projection of
//!    committed entities plus staged edits
//! 2. **Speculative entities live in the ledger**: a temporary id exists only
//!    as a create record until the commit promotes it
//! 3. **Failures are per record**: a failed call leaves its record staged and
//!    the rest of the commit continues
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mindtree_editor::{MemoryRemote, OutlineSession};
//!
//! let session = OutlineSession::new(MemoryRemote::new());
//! session.load().await?;
//!
//! let node = session.stage_create_node(None, "Chapter 1")?;
//! session.stage_create_card(&node, "Intro", "Welcome")?;
//!
//! let report = session.commit().await?;
//! println!("{report}");
//! ```

mod commit;
mod config;
mod errors;
mod ledger;
mod model;
mod outline;
mod planner;
mod projector;
mod remote;
mod session;
mod store;

pub use commit::{CommitFailure, CommitPhase, CommitReport, CommitState, Promotion};
pub use config::EditorConfig;
pub use errors::{EditorError, EditorResult};
pub use ledger::{
    ClearScope, ContentEdit, CreatePayload, MoveKind, PendingChange, PendingCreate,
    PendingDelete, PendingMove, PendingRename, ProblemsEdit, StagingLedger,
};
pub use model::{Card, Edge, EntityKind, EntityRef, Node, Placement, Problem, TreeSnapshot};
pub use outline::{Outline, Sibling};
pub use planner::{Clipboard, ClipboardMode, Planner};
pub use projector::{project, ExpansionState, OutlineRow, ProjectionCache};
pub use remote::{
    CardPatch, CreatedNode, MemoryRemote, NewCard, NewNode, NodePatch, RemoteCall,
    RemoteError, RemoteErrorKind, RemoteResult, RemoteStore,
};
pub use session::OutlineSession;
pub use store::EntityStore;

// Re-export common types for convenience
pub use mindtree_common::{IdMinter, Identifier};
