//! Node operations exposed to the HTTP layer.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::schema::{Depth, NodeRecord, NodeTree};
use crate::store::{NodeStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingParent(id) => {
                ServiceError::NotFound(format!("parent node {} not found", id))
            }
            StoreError::DuplicateId(_) | StoreError::DuplicateSibling { .. } => {
                ServiceError::Conflict(err.to_string())
            }
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Create/read operations over a [`NodeStore`]. Cheap to share behind an `Arc`.
pub struct NodeService {
    store: Arc<dyn NodeStore>,
}

impl NodeService {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Create a node under `parent_id` (or a new root). The returned node has
    /// no children.
    pub fn create_node(&self, name: &str, parent_id: Option<Uuid>) -> ServiceResult<NodeTree> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name must not be empty".to_string()));
        }

        let record = NodeRecord {
            id: Uuid::new_v4(),
            parent_id,
            name: name.to_string(),
        };
        self.store.create(&record)?;
        info!("Created node '{}' ({}) under {:?}", record.name, record.id, record.parent_id);

        Ok(NodeTree::leaf(record))
    }

    pub fn get_by_id(&self, id: Uuid, depth: Depth) -> ServiceResult<Option<NodeTree>> {
        debug!("get_by_id {} depth {}", id, depth.get());
        Ok(self.store.get_by_id(id, depth)?)
    }

    pub fn find_by_name(&self, name: &str, depth: Depth) -> ServiceResult<Option<NodeTree>> {
        if name.trim().is_empty() {
            return Err(ServiceError::Validation("name must not be empty".to_string()));
        }
        debug!("find_by_name '{}' depth {}", name, depth.get());
        Ok(self.store.get_by_name(name, depth)?)
    }

    pub fn get_roots(&self) -> ServiceResult<Vec<NodeTree>> {
        Ok(self.store.get_roots()?)
    }

    pub fn count(&self) -> ServiceResult<usize> {
        Ok(self.store.count()?)
    }
}
