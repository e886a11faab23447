//! Node persistence.
//!
//! Defines the [`NodeStore`] trait so the service and the bootstrap loader do
//! not depend on a particular backend. [`SqliteNodeStore`] is the one shipped.

mod sqlite;

pub use sqlite::SqliteNodeStore;

use thiserror::Error;
use uuid::Uuid;

use crate::schema::{Depth, NodeRecord, NodeTree};

/// Depth to which `get_roots` loads each root.
pub const ROOT_OVERVIEW_DEPTH: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node {0} already exists")]
    DuplicateId(Uuid),

    #[error("a sibling named '{name}' already exists")]
    DuplicateSibling { name: String },

    #[error("parent node {0} does not exist")]
    MissingParent(Uuid),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Relational persistence of the node tree.
///
/// Reads return `Ok(None)` for a missing node; only real failures are errors.
pub trait NodeStore: Send + Sync {
    /// Insert a single node.
    fn create(&self, node: &NodeRecord) -> StoreResult<()>;

    /// Insert many nodes atomically, in the given order. Parents must precede
    /// their children. A node whose parent already has a child of the same
    /// name is not inserted; the stored node takes its place as the parent of
    /// the nodes that follow. Returns the number of rows written.
    fn insert_tree(&self, nodes: &[NodeRecord]) -> StoreResult<usize>;

    fn get_by_id(&self, id: Uuid, depth: Depth) -> StoreResult<Option<NodeTree>>;

    /// Exact, case-sensitive name lookup. With several matches the
    /// earliest-inserted node wins.
    fn get_by_name(&self, name: &str, depth: Depth) -> StoreResult<Option<NodeTree>>;

    /// All parentless nodes, loaded to [`ROOT_OVERVIEW_DEPTH`].
    fn get_roots(&self) -> StoreResult<Vec<NodeTree>>;

    fn count(&self) -> StoreResult<usize>;
}
