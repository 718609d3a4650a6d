/// Local durable storage backend.
///
/// Keeps the whole dataset as one JSON document on disk with:
/// - Monotonic id counter persisted in the document (ids never reused)
/// - Copy-on-write mutations committed by a single atomic write (write to .tmp, rename)
/// - SHA-256 fingerprint of the last read/written content to pick up external edits
/// - Mutex-guarded read-modify-write so position assignment is atomic in-process

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{LinkStorage, StorageError};
use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default = "first_id")]
    next_id: u64,
    /// Kept in creation order; display order comes from `position`.
    #[serde(default)]
    categories: Vec<Category>,
    /// Kept in creation order.
    #[serde(default)]
    links: Vec<Link>,
}

fn first_id() -> u64 {
    1
}

impl Default for Document {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            categories: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl Document {
    /// Hand out the next unused id. Skips values already present so a
    /// hand-edited document cannot cause reuse.
    fn allocate_id(&mut self) -> String {
        loop {
            let candidate = self.next_id.to_string();
            self.next_id += 1;
            let taken = self.categories.iter().any(|c| c.id.0 == candidate)
                || self.links.iter().any(|l| l.id.0 == candidate);
            if !taken {
                return candidate;
            }
        }
    }

    fn next_position(&self) -> i64 {
        self.categories
            .iter()
            .map(|c| c.position)
            .max()
            .map_or(0, |max| max + 1)
    }

    fn sorted_categories(&self) -> Vec<Category> {
        let mut categories = self.categories.clone();
        // Stable sort: equal positions keep creation order.
        categories.sort_by_key(|c| c.position);
        categories
    }

    fn category_mut(&mut self, id: &CategoryId) -> Result<&mut Category, StorageError> {
        self.categories
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| StorageError::CategoryNotFound(id.clone()))
    }

    fn link_mut(&mut self, id: &LinkId) -> Result<&mut Link, StorageError> {
        self.links
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| StorageError::LinkNotFound(id.clone()))
    }
}

struct DocumentState {
    document: Document,
    /// SHA-256 of the last read/written content
    content_hash: String,
}

/// JSON-document storage, on disk or purely in memory.
pub struct LocalStorage {
    path: Option<PathBuf>,
    state: RwLock<DocumentState>,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl LocalStorage {
    /// Open (or prepare) a document at `path`. A missing or empty file is an
    /// empty dataset; the file is created on the first mutation.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (document, content_hash) = match fs::read_to_string(path) {
            Ok(content) => (Self::parse(&content)?, Self::content_hash(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Document::default(), String::new())
            }
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "[tradelink.storage.local] Opened {} ({} categories, {} links)",
            path.display(),
            document.categories.len(),
            document.links.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(DocumentState {
                document,
                content_hash,
            }),
            write_lock: Mutex::new(()),
        })
    }

    /// Non-durable storage, for tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(DocumentState {
                document: Document::default(),
                content_hash: String::new(),
            }),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn parse(content: &str) -> Result<Document, StorageError> {
        if content.trim().is_empty() {
            return Ok(Document::default());
        }
        Ok(serde_json::from_str(content)?)
    }

    /// Compute SHA-256 hash of content (for change detection).
    fn content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.replace("\r\n", "\n").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Reload the document if the file on disk no longer matches what we
    /// last read or wrote. A vanished file keeps the in-memory copy.
    fn refresh_from_disk(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let disk_hash = Self::content_hash(&content);
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.content_hash == disk_hash {
                return Ok(());
            }
        }

        let document = Self::parse(&content)?;
        log::info!(
            "[tradelink.storage.local] {} changed on disk, reloaded",
            path.display()
        );
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.document = document;
        state.content_hash = disk_hash;
        Ok(())
    }

    /// A fresh copy of the current document.
    fn snapshot(&self) -> Result<Document, StorageError> {
        self.refresh_from_disk()?;
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.document.clone())
    }

    /// Apply `change` to a copy of the document, persist the copy, then swap
    /// it in. Any error leaves both disk and memory untouched.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Document) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut document = self.snapshot()?;
        let result = change(&mut document)?;

        let content = serde_json::to_string_pretty(&document)?;
        if let Some(path) = &self.path {
            Self::atomic_write(path, &content)?;
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.document = document;
        state.content_hash = Self::content_hash(&content);
        Ok(result)
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        let tmp_path = path.with_extension("tradelink.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        // fsync directory for rename durability
        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl LinkStorage for LocalStorage {
    fn backend_name(&self) -> &'static str {
        if self.path.is_some() {
            "local"
        } else {
            "memory"
        }
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        Ok(self.snapshot()?.sorted_categories())
    }

    async fn get_category(&self, id: &CategoryId) -> Result<Option<Category>, StorageError> {
        let document = self.snapshot()?;
        Ok(document.categories.into_iter().find(|c| &c.id == id))
    }

    async fn create_category(&self, draft: &CategoryDraft) -> Result<Category, StorageError> {
        self.mutate(|doc| {
            let category = Category {
                id: CategoryId(doc.allocate_id()),
                name: draft.name.clone(),
                description: draft.description.clone(),
                position: doc.next_position(),
                created_at: Some(now_rfc3339()),
            };
            doc.categories.push(category.clone());
            Ok(category)
        })
    }

    async fn update_category(
        &self,
        id: &CategoryId,
        draft: &CategoryDraft,
    ) -> Result<Category, StorageError> {
        self.mutate(|doc| {
            let category = doc.category_mut(id)?;
            category.name = draft.name.clone();
            category.description = draft.description.clone();
            Ok(category.clone())
        })
    }

    async fn delete_category(&self, id: &CategoryId) -> Result<(), StorageError> {
        self.mutate(|doc| {
            let before = doc.categories.len();
            doc.categories.retain(|c| &c.id != id);
            if doc.categories.len() == before {
                return Err(StorageError::CategoryNotFound(id.clone()));
            }
            Ok(())
        })
    }

    async fn reorder_categories(&self, ordered_ids: &[CategoryId]) -> Result<(), StorageError> {
        self.mutate(|doc| {
            for (index, id) in ordered_ids.iter().enumerate() {
                doc.category_mut(id)?.position = index as i64;
            }
            Ok(())
        })
    }

    async fn list_links(&self, category_id: Option<&CategoryId>) -> Result<Vec<Link>, StorageError> {
        let document = self.snapshot()?;
        Ok(document
            .links
            .into_iter()
            .rev()
            .filter(|link| match category_id {
                Some(id) => link.category_id.as_ref() == Some(id),
                None => true,
            })
            .collect())
    }

    async fn get_link(&self, id: &LinkId) -> Result<Option<Link>, StorageError> {
        let document = self.snapshot()?;
        Ok(document.links.into_iter().find(|l| &l.id == id))
    }

    async fn create_link(&self, draft: &LinkDraft) -> Result<Link, StorageError> {
        self.mutate(|doc| {
            let link = Link {
                id: LinkId(doc.allocate_id()),
                category_id: draft.category_id.clone(),
                title: draft.title.clone(),
                description: draft.description.clone(),
                url: draft.url.clone(),
                created_at: Some(now_rfc3339()),
            };
            doc.links.push(link.clone());
            Ok(link)
        })
    }

    async fn update_link(&self, id: &LinkId, draft: &LinkDraft) -> Result<Link, StorageError> {
        self.mutate(|doc| {
            let link = doc.link_mut(id)?;
            link.category_id = draft.category_id.clone();
            link.title = draft.title.clone();
            link.description = draft.description.clone();
            link.url = draft.url.clone();
            Ok(link.clone())
        })
    }

    async fn delete_link(&self, id: &LinkId) -> Result<(), StorageError> {
        self.mutate(|doc| {
            let before = doc.links.len();
            doc.links.retain(|l| &l.id != id);
            if doc.links.len() == before {
                return Err(StorageError::LinkNotFound(id.clone()));
            }
            Ok(())
        })
    }

    async fn delete_links_by_category(&self, category_id: &CategoryId) -> Result<usize, StorageError> {
        self.mutate(|doc| {
            let before = doc.links.len();
            doc.links
                .retain(|l| l.category_id.as_ref() != Some(category_id));
            Ok(before - doc.links.len())
        })
    }
}
