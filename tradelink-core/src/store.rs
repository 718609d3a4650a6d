/// Domain store: validation, referential integrity and the delete cascade on
/// top of a `LinkStorage` backend. The only component that mutates data.
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::storage::{LinkStorage, StorageError};
use crate::types::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Caller-supplied data violates an invariant. Never retried.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Transport, parse or backend failure. The mutation was not applied.
    #[error("Storage failure: {0}")]
    Storage(#[source] StorageError),
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        if e.is_not_found() {
            StoreError::NotFound(e.to_string())
        } else {
            StoreError::Storage(e)
        }
    }
}

pub struct LinkStore {
    storage: Arc<dyn LinkStorage>,
    events: Option<broadcast::Sender<ChangeEvent>>,
}

impl LinkStore {
    pub fn new(storage: Arc<dyn LinkStorage>) -> Self {
        Self {
            storage,
            events: None,
        }
    }

    /// Publish a `ChangeEvent` on `tx` after every committed mutation.
    pub fn with_events(mut self, tx: broadcast::Sender<ChangeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    fn publish(&self, event: ChangeEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.storage.list_categories().await?)
    }

    pub async fn get_category(&self, id: &CategoryId) -> Result<Category, StoreError> {
        self.storage
            .get_category(id)
            .await?
            .ok_or_else(|| StorageError::CategoryNotFound(id.clone()).into())
    }

    pub async fn list_links(&self, category_id: Option<&CategoryId>) -> Result<Vec<Link>, StoreError> {
        Ok(self.storage.list_links(category_id).await?)
    }

    pub async fn get_link(&self, id: &LinkId) -> Result<Link, StoreError> {
        self.storage
            .get_link(id)
            .await?
            .ok_or_else(|| StorageError::LinkNotFound(id.clone()).into())
    }

    // ── Categories ──────────────────────────────────────────────────────

    /// Position is `max + 1` over a fresh listing. Ordering is best-effort
    /// across processes sharing a REST backend.
    pub async fn add_category(&self, draft: CategoryDraft) -> Result<Category, StoreError> {
        let draft = clean_category(draft)?;
        let category = self.storage.create_category(&draft).await.map_err(|e| {
            log::error!(target: "tradelink.store", "Failed to create category {:?}: {}", draft.name, e);
            StoreError::from(e)
        })?;
        log::info!(
            target: "tradelink.store",
            "Created category {} ({:?}) at position {}",
            category.id,
            category.name,
            category.position
        );
        self.publish(ChangeEvent::CategoryCreated {
            category_id: category.id.clone(),
        });
        Ok(category)
    }

    pub async fn update_category(
        &self,
        id: &CategoryId,
        draft: CategoryDraft,
    ) -> Result<Category, StoreError> {
        let draft = clean_category(draft)?;
        let category = self.storage.update_category(id, &draft).await?;
        log::info!(target: "tradelink.store", "Updated category {}", id);
        self.publish(ChangeEvent::CategoryUpdated {
            category_id: id.clone(),
        });
        Ok(category)
    }

    /// Delete a category and every link in it. Links go first; if that step
    /// fails the category is kept. Returns the number of links removed.
    pub async fn delete_category(&self, id: &CategoryId) -> Result<usize, StoreError> {
        self.get_category(id).await?;

        let removed_links = self.storage.delete_links_by_category(id).await.map_err(|e| {
            log::error!(
                target: "tradelink.store",
                "Cascade for category {} failed, category kept: {}",
                id,
                e
            );
            StoreError::from(e)
        })?;
        self.storage.delete_category(id).await?;

        log::info!(
            target: "tradelink.store",
            "Deleted category {} with {} links",
            id,
            removed_links
        );
        self.publish(ChangeEvent::CategoryDeleted {
            category_id: id.clone(),
            removed_links,
        });
        Ok(removed_links)
    }

    /// `order` must be a permutation of every existing category id.
    pub async fn reorder_categories(&self, order: Vec<CategoryId>) -> Result<(), StoreError> {
        let existing = self.storage.list_categories().await?;
        validate_permutation(&existing, &order).map_err(|e| {
            log::warn!(target: "tradelink.store", "Rejected reorder: {}", e);
            e
        })?;

        self.storage.reorder_categories(&order).await.map_err(|e| {
            log::error!(target: "tradelink.store", "Reorder failed: {}", e);
            StoreError::from(e)
        })?;
        log::info!(target: "tradelink.store", "Reordered {} categories", order.len());
        self.publish(ChangeEvent::CategoriesReordered { order });
        Ok(())
    }

    // ── Links ───────────────────────────────────────────────────────────

    pub async fn add_link(&self, draft: LinkDraft) -> Result<Link, StoreError> {
        let draft = self.clean_link(draft).await?;
        let link = self.storage.create_link(&draft).await.map_err(|e| {
            log::error!(target: "tradelink.store", "Failed to create link {:?}: {}", draft.title, e);
            StoreError::from(e)
        })?;
        log::info!(target: "tradelink.store", "Created link {} ({:?})", link.id, link.title);
        self.publish(ChangeEvent::LinkCreated {
            link_id: link.id.clone(),
        });
        Ok(link)
    }

    /// Full replace of title, description, url and category.
    pub async fn update_link(&self, id: &LinkId, draft: LinkDraft) -> Result<Link, StoreError> {
        let draft = self.clean_link(draft).await?;
        let link = self.storage.update_link(id, &draft).await?;
        log::info!(target: "tradelink.store", "Updated link {}", id);
        self.publish(ChangeEvent::LinkUpdated {
            link_id: id.clone(),
        });
        Ok(link)
    }

    /// Not idempotent: a missing id is reported as `NotFound`.
    pub async fn delete_link(&self, id: &LinkId) -> Result<(), StoreError> {
        self.storage.delete_link(id).await?;
        log::info!(target: "tradelink.store", "Deleted link {}", id);
        self.publish(ChangeEvent::LinkDeleted {
            link_id: id.clone(),
        });
        Ok(())
    }

    async fn clean_link(&self, draft: LinkDraft) -> Result<LinkDraft, StoreError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Validation("Link title must not be empty".to_string()));
        }
        let url = draft.url.trim().to_string();
        if url.is_empty() {
            return Err(StoreError::Validation("Link URL must not be empty".to_string()));
        }

        let category_id = draft.category_id.filter(|id| !id.as_str().trim().is_empty());
        if let Some(id) = &category_id {
            if self.storage.get_category(id).await?.is_none() {
                log::warn!(target: "tradelink.store", "Rejected link {:?}: unknown category {}", title, id);
                return Err(StoreError::Validation(format!("Unknown category: {}", id)));
            }
        }

        Ok(LinkDraft {
            category_id,
            title,
            description: normalize_optional(draft.description),
            url,
        })
    }
}

fn clean_category(draft: CategoryDraft) -> Result<CategoryDraft, StoreError> {
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(StoreError::Validation(
            "Category name must not be empty".to_string(),
        ));
    }
    Ok(CategoryDraft {
        name,
        description: normalize_optional(draft.description),
    })
}

fn validate_permutation(existing: &[Category], order: &[CategoryId]) -> Result<(), StoreError> {
    let known: HashSet<&CategoryId> = existing.iter().map(|c| &c.id).collect();
    let mut seen = HashSet::with_capacity(order.len());
    for id in order {
        if !known.contains(id) {
            return Err(StoreError::Validation(format!("Unknown category in order: {}", id)));
        }
        if !seen.insert(id) {
            return Err(StoreError::Validation(format!("Duplicate category in order: {}", id)));
        }
    }
    if seen.len() != known.len() {
        return Err(StoreError::Validation(format!(
            "Order lists {} of {} categories",
            seen.len(),
            known.len()
        )));
    }
    Ok(())
}
