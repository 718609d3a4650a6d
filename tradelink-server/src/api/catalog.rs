use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use tradelink_core::types::{CategoryId, LinkId};
use tradelink_core::view::filter_links;

use super::{store_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LinksQuery {
    category: Option<String>,
    q: Option<String>,
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let categories = state
        .store
        .list_categories()
        .await
        .map_err(|e| store_error("tradelink.api.categories", "Failed to list categories", e))?;
    Ok(Json(serde_json::json!({ "categories": categories })))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = CategoryId::from(category_id);
    let category = state.store.get_category(&id).await.map_err(|e| {
        store_error(
            "tradelink.api.categories",
            format!("Failed to load category {}", id),
            e,
        )
    })?;
    Ok(Json(serde_json::json!(category)))
}

/// Links newest first. `category` narrows to one category (blank means all);
/// `q` applies the same title/description search the session view uses.
pub async fn list_links(
    State(state): State<AppState>,
    Query(query): Query<LinksQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let category = query
        .category
        .filter(|c| !c.trim().is_empty())
        .map(CategoryId::from);
    let links = state
        .store
        .list_links(category.as_ref())
        .await
        .map_err(|e| store_error("tradelink.api.links", "Failed to list links", e))?;

    let links = match query.q.as_deref() {
        Some(q) => filter_links(&links, q),
        None => links,
    };
    Ok(Json(serde_json::json!({ "links": links })))
}

pub async fn get_link(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = LinkId::from(link_id);
    let link = state.store.get_link(&id).await.map_err(|e| {
        store_error("tradelink.api.links", format!("Failed to load link {}", id), e)
    })?;
    Ok(Json(serde_json::json!(link)))
}
