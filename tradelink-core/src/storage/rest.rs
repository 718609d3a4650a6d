/// REST storage backend for a hosted structured-data service (PostgREST dialect).
///
/// Tables `categories` and `links` live under `{url}/rest/v1/`. Rows are
/// snake_case; ids may be JSON numbers or strings and are normalized to strings.
/// Writes ask for `return=representation` so an empty response means the
/// target row did not exist.
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{LinkStorage, StorageError};
use crate::config::RestBackendConfig;
use crate::types::*;

const CATEGORIES: &str = "categories";
const LINKS: &str = "links";

pub struct RestStorage {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CategoryRow {
    #[serde(deserialize_with = "id_string")]
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkRow {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default, deserialize_with = "optional_id_string")]
    category_id: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    url: String,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: CategoryId(row.id),
            name: row.name,
            description: row.description,
            position: row.position.unwrap_or(0),
            created_at: row.created_at,
        }
    }
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            id: LinkId(row.id),
            category_id: row.category_id.map(CategoryId),
            title: row.title,
            description: row.description,
            url: row.url,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
struct CategoryPayload<'a> {
    name: &'a str,
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<i64>,
}

#[derive(Serialize)]
struct PositionPayload {
    position: i64,
}

#[derive(Serialize)]
struct LinkPayload<'a> {
    title: &'a str,
    description: Option<&'a str>,
    url: &'a str,
    category_id: Option<&'a str>,
}

impl<'a> From<&'a LinkDraft> for LinkPayload<'a> {
    fn from(draft: &'a LinkDraft) -> Self {
        LinkPayload {
            title: &draft.title,
            description: draft.description.as_deref(),
            url: &draft.url,
            category_id: draft.category_id.as_ref().map(CategoryId::as_str),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn optional_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// `column=eq.value` with the value percent-encoded.
fn eq_filter(column: &str, value: &str) -> String {
    format!("{}=eq.{}", column, utf8_percent_encode(value, NON_ALPHANUMERIC))
}

fn next_position(categories: &[Category]) -> i64 {
    categories
        .iter()
        .map(|c| c.position)
        .max()
        .map_or(0, |max| max + 1)
}

impl RestStorage {
    pub fn new(config: &RestBackendConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        let mut url = format!("{}/rest/v1/{}?select=*", self.base_url, table);
        if !query.is_empty() {
            url.push('&');
            url.push_str(query);
        }
        url
    }

    fn request(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method.clone(), self.table_url(table, query))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key);
        if method == Method::GET {
            builder
        } else {
            builder.header("Prefer", "return=representation")
        }
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Vec<T>, StorageError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            log::warn!(
                "[tradelink.storage.rest] Request failed with {}: {}",
                status,
                text
            );
            return Err(StorageError::Backend {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn patch_position(&self, id: &CategoryId, position: i64) -> Result<(), StorageError> {
        let rows: Vec<CategoryRow> = self
            .fetch_rows(
                self.request(Method::PATCH, CATEGORIES, &eq_filter("id", id.as_str()))
                    .json(&PositionPayload { position }),
            )
            .await?;
        if rows.is_empty() {
            return Err(StorageError::CategoryNotFound(id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl LinkStorage for RestStorage {
    fn backend_name(&self) -> &'static str {
        "rest"
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let rows: Vec<CategoryRow> = self
            .fetch_rows(self.request(
                Method::GET,
                CATEGORIES,
                "order=position.asc,created_at.asc",
            ))
            .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: &CategoryId) -> Result<Option<Category>, StorageError> {
        let rows: Vec<CategoryRow> = self
            .fetch_rows(self.request(Method::GET, CATEGORIES, &eq_filter("id", id.as_str())))
            .await?;
        Ok(rows.into_iter().next().map(Category::from))
    }

    async fn create_category(&self, draft: &CategoryDraft) -> Result<Category, StorageError> {
        // Read-then-write: concurrent creators may compute the same position.
        let existing = self.list_categories().await?;
        let payload = CategoryPayload {
            name: &draft.name,
            description: draft.description.as_deref(),
            position: Some(next_position(&existing)),
        };
        let rows: Vec<CategoryRow> = self
            .fetch_rows(self.request(Method::POST, CATEGORIES, "").json(&payload))
            .await?;
        rows.into_iter()
            .next()
            .map(Category::from)
            .ok_or_else(|| StorageError::Corrupt("empty response to category insert".to_string()))
    }

    async fn update_category(
        &self,
        id: &CategoryId,
        draft: &CategoryDraft,
    ) -> Result<Category, StorageError> {
        let payload = CategoryPayload {
            name: &draft.name,
            description: draft.description.as_deref(),
            position: None,
        };
        let rows: Vec<CategoryRow> = self
            .fetch_rows(
                self.request(Method::PATCH, CATEGORIES, &eq_filter("id", id.as_str()))
                    .json(&payload),
            )
            .await?;
        rows.into_iter()
            .next()
            .map(Category::from)
            .ok_or_else(|| StorageError::CategoryNotFound(id.clone()))
    }

    async fn delete_category(&self, id: &CategoryId) -> Result<(), StorageError> {
        let rows: Vec<CategoryRow> = self
            .fetch_rows(self.request(Method::DELETE, CATEGORIES, &eq_filter("id", id.as_str())))
            .await?;
        if rows.is_empty() {
            return Err(StorageError::CategoryNotFound(id.clone()));
        }
        Ok(())
    }

    async fn reorder_categories(&self, ordered_ids: &[CategoryId]) -> Result<(), StorageError> {
        let snapshot = self.list_categories().await?;
        let mut previous = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            let category = snapshot
                .iter()
                .find(|c| &c.id == id)
                .ok_or_else(|| StorageError::CategoryNotFound(id.clone()))?;
            previous.push(category.position);
        }

        for (index, id) in ordered_ids.iter().enumerate() {
            if let Err(e) = self.patch_position(id, index as i64).await {
                // Only an explicit rejection proves the failed row was untouched.
                let applied_count = match e {
                    StorageError::Backend { .. } => index,
                    _ => index + 1,
                };
                log::error!(
                    "[tradelink.storage.rest] Reorder failed at {} ({}), rolling back {} rows",
                    id,
                    e,
                    applied_count
                );
                for (applied, old_position) in
                    ordered_ids[..applied_count].iter().zip(&previous).rev()
                {
                    if let Err(rollback) = self.patch_position(applied, *old_position).await {
                        log::error!(
                            "[tradelink.storage.rest] Rollback of category {} failed: {}",
                            applied,
                            rollback
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn list_links(&self, category_id: Option<&CategoryId>) -> Result<Vec<Link>, StorageError> {
        let query = match category_id {
            Some(id) => format!("{}&order=created_at.desc", eq_filter("category_id", id.as_str())),
            None => "order=created_at.desc".to_string(),
        };
        let rows: Vec<LinkRow> = self
            .fetch_rows(self.request(Method::GET, LINKS, &query))
            .await?;
        Ok(rows.into_iter().map(Link::from).collect())
    }

    async fn get_link(&self, id: &LinkId) -> Result<Option<Link>, StorageError> {
        let rows: Vec<LinkRow> = self
            .fetch_rows(self.request(Method::GET, LINKS, &eq_filter("id", id.as_str())))
            .await?;
        Ok(rows.into_iter().next().map(Link::from))
    }

    async fn create_link(&self, draft: &LinkDraft) -> Result<Link, StorageError> {
        let rows: Vec<LinkRow> = self
            .fetch_rows(self.request(Method::POST, LINKS, "").json(&LinkPayload::from(draft)))
            .await?;
        rows.into_iter()
            .next()
            .map(Link::from)
            .ok_or_else(|| StorageError::Corrupt("empty response to link insert".to_string()))
    }

    async fn update_link(&self, id: &LinkId, draft: &LinkDraft) -> Result<Link, StorageError> {
        let rows: Vec<LinkRow> = self
            .fetch_rows(
                self.request(Method::PATCH, LINKS, &eq_filter("id", id.as_str()))
                    .json(&LinkPayload::from(draft)),
            )
            .await?;
        rows.into_iter()
            .next()
            .map(Link::from)
            .ok_or_else(|| StorageError::LinkNotFound(id.clone()))
    }

    async fn delete_link(&self, id: &LinkId) -> Result<(), StorageError> {
        let rows: Vec<LinkRow> = self
            .fetch_rows(self.request(Method::DELETE, LINKS, &eq_filter("id", id.as_str())))
            .await?;
        if rows.is_empty() {
            return Err(StorageError::LinkNotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete_links_by_category(&self, category_id: &CategoryId) -> Result<usize, StorageError> {
        let rows: Vec<LinkRow> = self
            .fetch_rows(self.request(
                Method::DELETE,
                LINKS,
                &eq_filter("category_id", category_id.as_str()),
            ))
            .await?;
        Ok(rows.len())
    }
}
