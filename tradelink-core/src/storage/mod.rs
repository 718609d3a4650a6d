pub mod local;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::types::{Category, CategoryDraft, CategoryId, Link, LinkDraft, LinkId};

/// Build the single backend selected by configuration.
pub fn open_storage(config: &BackendConfig) -> Result<Arc<dyn LinkStorage>, StorageError> {
    let storage: Arc<dyn LinkStorage> = match config {
        BackendConfig::Local { path } => Arc::new(local::LocalStorage::open(path)?),
        BackendConfig::Rest(rest) => Arc::new(rest::RestStorage::new(rest)?),
    };
    Ok(storage)
}

/// Abstract storage trait for category/link backends.
/// Implementations: LocalStorage (JSON document on disk), RestStorage (hosted REST database).
///
/// The port does not enforce referential integrity; `LinkStore` validates
/// category references and drives the delete cascade explicitly.
#[async_trait]
pub trait LinkStorage: Send + Sync {
    /// Short backend label used in logs and status responses.
    fn backend_name(&self) -> &'static str;

    /// All categories sorted by position ascending, ties broken by creation order.
    async fn list_categories(&self) -> Result<Vec<Category>, StorageError>;

    async fn get_category(&self, id: &CategoryId) -> Result<Option<Category>, StorageError>;

    /// Create a category at `max(position) + 1`, or 0 when none exist.
    async fn create_category(&self, draft: &CategoryDraft) -> Result<Category, StorageError>;

    async fn update_category(
        &self,
        id: &CategoryId,
        draft: &CategoryDraft,
    ) -> Result<Category, StorageError>;

    /// Remove a single category row. Does not touch links.
    async fn delete_category(&self, id: &CategoryId) -> Result<(), StorageError>;

    /// Rewrite positions to `0..N-1` following `ordered_ids`. All-or-nothing.
    async fn reorder_categories(&self, ordered_ids: &[CategoryId]) -> Result<(), StorageError>;

    /// Links for one category, or every link when `category_id` is `None`.
    /// Newest first.
    async fn list_links(&self, category_id: Option<&CategoryId>) -> Result<Vec<Link>, StorageError>;

    async fn get_link(&self, id: &LinkId) -> Result<Option<Link>, StorageError>;

    async fn create_link(&self, draft: &LinkDraft) -> Result<Link, StorageError>;

    async fn update_link(&self, id: &LinkId, draft: &LinkDraft) -> Result<Link, StorageError>;

    async fn delete_link(&self, id: &LinkId) -> Result<(), StorageError>;

    /// Bulk delete of every link in a category. Returns the number removed.
    async fn delete_links_by_category(&self, category_id: &CategoryId) -> Result<usize, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::CategoryNotFound(_) | StorageError::LinkNotFound(_)
        )
    }
}
