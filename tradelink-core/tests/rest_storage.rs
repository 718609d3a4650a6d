//! RestStorage against an in-process stand-in for the hosted REST database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use tradelink_core::config::RestBackendConfig;
use tradelink_core::storage::rest::RestStorage;
use tradelink_core::storage::{LinkStorage, StorageError};
use tradelink_core::store::{LinkStore, StoreError};
use tradelink_core::types::*;

const API_KEY: &str = "test-key";

#[derive(Default)]
struct FakeDb {
    next_id: i64,
    categories: Vec<Value>,
    links: Vec<Value>,
    /// Position updates for this category id answer 500.
    fail_position_patch_for: Option<String>,
    /// The next position update for this id is applied, then the response
    /// stalls past the client timeout.
    stall_position_patch_for: Option<String>,
}

type Db = Arc<Mutex<FakeDb>>;

impl FakeDb {
    fn rows(&mut self, table: &str) -> &mut Vec<Value> {
        match table {
            "categories" => &mut self.categories,
            _ => &mut self.links,
        }
    }
}

fn column_text(row: &Value, column: &str) -> String {
    match &row[column] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_filters(row: &Value, query: &HashMap<String, String>) -> bool {
    ["id", "category_id"].iter().all(|column| {
        match query.get(*column).and_then(|f| f.strip_prefix("eq.")) {
            Some(value) => column_text(row, column) == value,
            None => true,
        }
    })
}

async fn select(
    State(db): State<Db>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let authorized = headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
        && headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some(&format!("Bearer {}", API_KEY)[..]);
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let mut db = db.lock().unwrap();
    let mut rows: Vec<Value> = db
        .rows(&table)
        .iter()
        .filter(|row| matches_filters(row, &query))
        .cloned()
        .collect();
    if table == "categories" {
        rows.sort_by_key(|r| (r["position"].as_i64().unwrap_or(0), r["id"].as_i64().unwrap_or(0)));
    } else {
        rows.reverse();
    }
    Ok(Json(Value::Array(rows)))
}

async fn insert(
    State(db): State<Db>,
    Path(table): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut db = db.lock().unwrap();
    db.next_id += 1;
    body["id"] = json!(db.next_id);
    body["created_at"] = json!(format!("2024-01-01T00:00:{:02}Z", db.next_id));
    db.rows(&table).push(body.clone());
    (StatusCode::CREATED, Json(json!([body])))
}

async fn update(
    State(db): State<Db>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let is_position = table == "categories" && body.get("position").is_some();
    let targets = |id: &Option<String>| {
        id.as_ref()
            .is_some_and(|id| query.get("id") == Some(&format!("eq.{}", id)))
    };

    let (updated, stall) = {
        let mut db = db.lock().unwrap();
        if is_position && targets(&db.fail_position_patch_for) {
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let stall = is_position && targets(&db.stall_position_patch_for);
        if stall {
            db.stall_position_patch_for = None;
        }

        let mut updated = Vec::new();
        for row in db.rows(&table).iter_mut() {
            if matches_filters(row, &query) {
                if let Some(fields) = body.as_object() {
                    for (key, value) in fields {
                        row[key] = value.clone();
                    }
                }
                updated.push(row.clone());
            }
        }
        (updated, stall)
    };

    if stall {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    Ok(Json(Value::Array(updated)))
}

async fn remove(
    State(db): State<Db>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut db = db.lock().unwrap();
    let rows = db.rows(&table);
    let (removed, kept): (Vec<Value>, Vec<Value>) =
        rows.drain(..).partition(|row| matches_filters(row, &query));
    *rows = kept;
    Json(Value::Array(removed))
}

async fn spawn_fake(db: Db) -> String {
    let app = Router::new()
        .route(
            "/rest/v1/{table}",
            get(select).post(insert).patch(update).delete(remove),
        )
        .with_state(db);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn rest_storage_with_timeout(db: Db, timeout_secs: u64) -> RestStorage {
    let url = spawn_fake(db).await;
    RestStorage::new(&RestBackendConfig {
        url,
        api_key: API_KEY.to_string(),
        timeout_secs,
    })
    .unwrap()
}

async fn rest_storage(db: Db) -> RestStorage {
    rest_storage_with_timeout(db, 5).await
}

fn names(categories: &[Category]) -> Vec<&str> {
    categories.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn test_create_categories_assigns_next_position() {
    let storage = rest_storage(Db::default()).await;
    let news = storage.create_category(&CategoryDraft::new("News")).await.unwrap();
    let reports = storage
        .create_category(&CategoryDraft::new("Reports"))
        .await
        .unwrap();

    assert_eq!(news.position, 0);
    assert_eq!(reports.position, 1);
    assert_eq!(news.id, CategoryId::from("1"));
    assert!(news.created_at.is_some());
}

#[tokio::test]
async fn test_missing_rows_are_not_found() {
    let storage = rest_storage(Db::default()).await;
    let missing = CategoryId::from("41");

    assert_eq!(storage.get_category(&missing).await.unwrap(), None);
    assert!(matches!(
        storage.update_category(&missing, &CategoryDraft::new("x")).await,
        Err(StorageError::CategoryNotFound(_))
    ));
    assert!(matches!(
        storage.delete_link(&LinkId::from("41")).await,
        Err(StorageError::LinkNotFound(_))
    ));
}

#[tokio::test]
async fn test_reorder_rolls_back_on_partial_failure() {
    let db = Db::default();
    let storage = rest_storage(db.clone()).await;
    let a = storage.create_category(&CategoryDraft::new("A")).await.unwrap();
    let b = storage.create_category(&CategoryDraft::new("B")).await.unwrap();
    let c = storage.create_category(&CategoryDraft::new("C")).await.unwrap();

    db.lock().unwrap().fail_position_patch_for = Some(a.id.to_string());
    let result = storage
        .reorder_categories(&[c.id.clone(), a.id.clone(), b.id.clone()])
        .await;
    assert!(matches!(result, Err(StorageError::Backend { status: 500, .. })));

    let categories = storage.list_categories().await.unwrap();
    assert_eq!(names(&categories), vec!["A", "B", "C"]);
    let positions: Vec<i64> = categories.iter().map(|c| c.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);

    db.lock().unwrap().fail_position_patch_for = None;
    storage
        .reorder_categories(&[c.id.clone(), a.id.clone(), b.id.clone()])
        .await
        .unwrap();
    let categories = storage.list_categories().await.unwrap();
    assert_eq!(names(&categories), vec!["C", "A", "B"]);
}

#[tokio::test]
async fn test_reorder_rolls_back_row_applied_before_timeout() {
    let db = Db::default();
    let storage = rest_storage_with_timeout(db.clone(), 1).await;
    let a = storage.create_category(&CategoryDraft::new("A")).await.unwrap();
    let b = storage.create_category(&CategoryDraft::new("B")).await.unwrap();
    let c = storage.create_category(&CategoryDraft::new("C")).await.unwrap();

    db.lock().unwrap().stall_position_patch_for = Some(a.id.to_string());
    let result = storage
        .reorder_categories(&[c.id.clone(), a.id.clone(), b.id.clone()])
        .await;
    assert!(matches!(result, Err(StorageError::Http(_))));

    let categories = storage.list_categories().await.unwrap();
    assert_eq!(names(&categories), vec!["A", "B", "C"]);
    let positions: Vec<i64> = categories.iter().map(|c| c.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_store_cascade_over_rest() {
    let storage = rest_storage(Db::default()).await;
    let store = LinkStore::new(Arc::new(storage));

    let one = store.add_category(CategoryDraft::new("One")).await.unwrap();
    let two = store.add_category(CategoryDraft::new("Two")).await.unwrap();
    for title in ["l1", "l2"] {
        store
            .add_link(LinkDraft::new(Some(one.id.clone()), title, "https://one.test"))
            .await
            .unwrap();
    }
    let l3 = store
        .add_link(
            LinkDraft::new(Some(two.id.clone()), "l3", "https://two.test")
                .with_description("trade news"),
        )
        .await
        .unwrap();

    assert_eq!(store.delete_category(&one.id).await.unwrap(), 2);
    assert_eq!(store.list_links(None).await.unwrap(), vec![l3]);
    assert!(matches!(
        store.get_category(&one.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_bad_credentials_surface_as_backend_error() {
    let url = spawn_fake(Db::default()).await;
    let storage = RestStorage::new(&RestBackendConfig {
        url,
        api_key: "wrong".to_string(),
        timeout_secs: 5,
    })
    .unwrap();

    let store = LinkStore::new(Arc::new(storage));
    assert!(matches!(
        store.list_categories().await,
        Err(StoreError::Storage(StorageError::Backend { status: 401, .. }))
    ));
}
