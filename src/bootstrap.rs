//! Startup import of the organizational hierarchy.
//!
//! Reads hierarchy rows, builds the tree and merges it into the store when
//! the store holds fewer nodes than the tree. Nothing here is fatal: a missing or broken source leaves
//! the service running on whatever the store already contains.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::NodeStore;
use crate::tree_builder::OrgTree;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// Anything that yields normalized hierarchy rows (forward-filled, deduplicated).
pub trait RowSource: Send + Sync {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    fn read_rows(&self) -> Result<Vec<Vec<String>>, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// No source configured, or it could not be read.
    SourceUnavailable,
    /// The source was read but the store could not be queried.
    StoreUnavailable,
    /// The source produced no nodes.
    Empty,
    /// The store already holds at least as many nodes as the source.
    AlreadyPopulated { existing: usize, parsed: usize },
    /// New nodes were merged into the store; `failed_roots` were rolled back.
    Persisted { nodes: usize, failed_roots: usize },
}

/// Run the import once. `source` is `None` when no spreadsheet is configured.
pub fn run(source: Option<&dyn RowSource>, store: &dyn NodeStore) -> BootstrapOutcome {
    let Some(source) = source else {
        info!("No hierarchy source configured, skipping bootstrap");
        return BootstrapOutcome::SourceUnavailable;
    };

    let rows = match source.read_rows() {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Hierarchy source unavailable, serving existing data: {}", e);
            return BootstrapOutcome::SourceUnavailable;
        }
    };

    let tree = OrgTree::build(&rows);
    if tree.is_empty() {
        warn!("No nodes parsed from {}", source.describe());
        return BootstrapOutcome::Empty;
    }

    debug!("Parsed organizational structure:\n{}", tree.render());
    info!(
        "Parsed {} nodes under {} root(s) from {} ({} rows)",
        tree.len(),
        tree.roots().len(),
        source.describe(),
        rows.len()
    );

    let existing = match store.count() {
        Ok(n) => n,
        Err(e) => {
            warn!("Could not count stored nodes, skipping bootstrap: {}", e);
            return BootstrapOutcome::StoreUnavailable;
        }
    };
    if existing >= tree.len() {
        info!(
            "Store already holds {} nodes (parsed {}), skipping insert",
            existing,
            tree.len()
        );
        return BootstrapOutcome::AlreadyPopulated {
            existing,
            parsed: tree.len(),
        };
    }

    let mut nodes = 0;
    let mut failed_roots = 0;
    for &root in tree.roots() {
        let name = &tree.node(root).name;
        match store.insert_tree(&tree.records(root)) {
            Ok(written) => {
                debug!("Persisted '{}' ({} nodes)", name, written);
                nodes += written;
            }
            Err(e) => {
                warn!("Failed to persist '{}', rolled back: {}", name, e);
                failed_roots += 1;
            }
        }
    }

    info!("Persisted {} nodes ({} root(s) failed)", nodes, failed_roots);
    BootstrapOutcome::Persisted {
        nodes,
        failed_roots,
    }
}
