//! Elasticsearch backend against a minimal in-process REST fake

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use ddi_search::{ElasticsearchBackend, SearchBackend, SearchError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type Indices = Arc<Mutex<HashMap<String, HashMap<String, Value>>>>;

async fn index_exists(State(indices): State<Indices>, Path(index): Path<String>) -> StatusCode {
    if indices.lock().unwrap().contains_key(&index) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create_index(State(indices): State<Indices>, Path(index): Path<String>) -> Json<Value> {
    indices.lock().unwrap().entry(index).or_default();
    Json(json!({"acknowledged": true}))
}

async fn delete_index(State(indices): State<Indices>, Path(index): Path<String>) -> StatusCode {
    match indices.lock().unwrap().remove(&index) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn bulk(State(indices): State<Indices>, headers: HeaderMap, body: Bytes) -> (StatusCode, Json<Value>) {
    assert_eq!(headers["content-type"], "application/x-ndjson");
    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

    let mut indices = indices.lock().unwrap();
    let mut items = Vec::new();
    let mut errors = false;
    for pair in lines.chunks(2) {
        let action = &pair[0]["index"];
        let index = action["_index"].as_str().unwrap().to_string();
        let id = action["_id"].as_str().unwrap().to_string();
        match indices.get_mut(&index) {
            Some(docs) if pair[1].get("reject").is_none() => {
                docs.insert(id.clone(), pair[1].clone());
                items.push(json!({"index": {"_id": id, "status": 201}}));
            }
            _ => {
                errors = true;
                items.push(json!({"index": {"_id": id, "status": 400, "error": {"type": "rejected"}}}));
            }
        }
    }
    (StatusCode::OK, Json(json!({"took": 1, "errors": errors, "items": items})))
}

async fn count(State(indices): State<Indices>, Path(index): Path<String>) -> (StatusCode, Json<Value>) {
    match indices.lock().unwrap().get(&index) {
        Some(docs) => (StatusCode::OK, Json(json!({"count": docs.len()}))),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "index_not_found"}))),
    }
}

async fn get_doc(
    State(indices): State<Indices>,
    Path((index, id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match indices.lock().unwrap().get(&index).and_then(|d| d.get(&id)) {
        Some(doc) => (StatusCode::OK, Json(json!({"_id": id, "found": true, "_source": doc}))),
        None => (StatusCode::NOT_FOUND, Json(json!({"found": false}))),
    }
}

async fn put_doc(
    State(indices): State<Indices>,
    Path((index, id)): Path<(String, String)>,
    Json(doc): Json<Value>,
) -> StatusCode {
    match indices.lock().unwrap().get_mut(&index) {
        Some(docs) => {
            docs.insert(id, doc);
            StatusCode::CREATED
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_doc(State(indices): State<Indices>, Path((index, id)): Path<(String, String)>) -> StatusCode {
    match indices.lock().unwrap().get_mut(&index).and_then(|d| d.remove(&id)) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn start_fake() -> String {
    let indices: Indices = Arc::default();
    let app = Router::new()
        .route("/_bulk", post(bulk))
        .route("/:index", get(index_exists).put(create_index).delete(delete_index))
        .route("/:index/_count", get(count))
        .route("/:index/_doc/:id", get(get_doc).put(put_doc).delete(delete_doc))
        .with_state(indices);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

#[tokio::test]
async fn test_index_lifecycle_and_documents() {
    let url = start_fake().await;
    let backend = ElasticsearchBackend::new(&url).unwrap();
    let index = "ddionrails.variables";

    assert!(!backend.index_exists(index).await.unwrap());
    backend.create_index(index, &json!({"mappings": {}})).await.unwrap();
    assert!(backend.index_exists(index).await.unwrap());

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let indexed = backend
        .bulk_index(index, vec![(a, json!({"name": "a"})), (b, json!({"name": "b"}))])
        .await
        .unwrap();
    assert_eq!(indexed, 2);
    assert_eq!(backend.count(index).await.unwrap(), 2);
    assert_eq!(backend.get_document(index, a).await.unwrap(), Some(json!({"name": "a"})));

    backend.put_document(index, a, &json!({"name": "a2"})).await.unwrap();
    assert_eq!(backend.get_document(index, a).await.unwrap().unwrap()["name"], "a2");

    assert!(backend.delete_document(index, b).await.unwrap());
    assert!(!backend.delete_document(index, b).await.unwrap());
    assert_eq!(backend.get_document(index, b).await.unwrap(), None);

    assert!(backend.delete_index(index).await.unwrap());
    assert!(!backend.delete_index(index).await.unwrap());
    assert!(matches!(
        backend.count(index).await,
        Err(SearchError::IndexNotFound(_))
    ));
}

#[tokio::test]
async fn test_bulk_rejections_are_reported() {
    let url = start_fake().await;
    let backend = ElasticsearchBackend::new(&url).unwrap();
    backend.create_index("ddionrails.topics", &json!({})).await.unwrap();

    let result = backend
        .bulk_index(
            "ddionrails.topics",
            vec![
                (Uuid::new_v4(), json!({"name": "ok"})),
                (Uuid::new_v4(), json!({"reject": true})),
            ],
        )
        .await;

    assert!(matches!(
        result,
        Err(SearchError::BulkRejected { failed: 1, .. })
    ));
    assert_eq!(backend.bulk_index("ddionrails.topics", Vec::new()).await.unwrap(), 0);
}
