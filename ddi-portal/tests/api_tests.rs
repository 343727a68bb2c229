//! Integration tests for ddi-portal API endpoints
//!
//! The catalog is the fixture study of ddi-import, imported into the
//! in-memory store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use ddi_common::config::DdiConfig;
use ddi_common::db::MemoryStore;
use ddi_common::events::EventBus;
use ddi_common::models::{Dataset, RunState, Study, Variable};
use ddi_common::IdDeriver;
use ddi_import::study_admin::StudyAdmin;
use ddi_import::{ImportContext, JobQueue, StudyImportManager};
use ddi_portal::api::webhooks::{sign, SIGNATURE_HEADER};
use ddi_portal::{build_router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method
use uuid::Uuid;

const SECRET: &str = "s3cret";

struct TestApp {
    ctx: ImportContext,
    router: axum::Router,
    _root: tempfile::TempDir,
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(test_request("GET", uri)).await
    }

    async fn json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request(method, uri, &body)).await
    }
}

/// Test helper: App over the imported fixture study, webhook secret set
async fn setup_app() -> TestApp {
    let ctx = ImportContext::new(
        Arc::new(MemoryStore::new()),
        Arc::new(IdDeriver::new(Uuid::new_v4())),
        EventBus::new(10_000),
    );

    let study = Study::new(&ctx.ids, "soep-test");
    ctx.repo::<Study>().upsert(&study).await.unwrap();
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../ddi-import/tests/fixtures/soep-test/ddionrails");
    let run = StudyImportManager::new(ctx.clone(), JobQueue::new(4), study, &fixture)
        .import_all_entities(None)
        .await
        .unwrap();
    assert_eq!(run.state, RunState::Completed);

    let root = tempfile::tempdir().unwrap();
    let config = DdiConfig {
        root_folder: Some(root.path().to_path_buf()),
        webhook_secret: Some(SECRET.to_string()),
        ..Default::default()
    };
    let admin = StudyAdmin::new(ctx.clone(), Arc::new(config), JobQueue::new(2));

    TestApp {
        ctx,
        router: build_router(AppState::new(admin)),
        _root: root,
    }
}

/// Test helper: Create request without body
fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook_request(study: &str, payload: &[u8], signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{}", study))
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(payload.to_vec())).unwrap()
}

async fn create_basket(app: &TestApp) -> String {
    let (status, body) = app
        .json(
            "POST",
            "/api/baskets",
            json!({ "user": "alice", "study": "soep-test", "name": "Mine", "label": "My basket" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Health and errors
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ddi-portal");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_not_found_error_body() {
    let app = setup_app().await;
    let (status, body) = app.get(&format!("/api/baskets/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"].as_str().unwrap().contains("baskets"));

    let (status, body) = app.get("/api/topics/no-such-study/en").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["message"].as_str().unwrap().contains("no-such-study"));
}

// =============================================================================
// Topics and concepts
// =============================================================================

#[tokio::test]
async fn test_topic_tree_in_both_languages() {
    let app = setup_app().await;

    let (status, tree) = app.get("/api/topics/soep-test/en").await;
    assert_eq!(status, StatusCode::OK);
    let roots: Vec<&str> = tree.as_array().unwrap().iter().map(|n| n["name"].as_str().unwrap()).collect();
    assert_eq!(roots, vec!["health", "work"]);

    let sleep = &tree[0]["children"][0];
    assert_eq!(sleep["key"], "topic_sleep");
    assert_eq!(sleep["children"][0]["key"], "concept_sleep-duration");
    assert_eq!(sleep["children"][0]["title"], "Sleep duration");

    let (_, tree) = app.get("/api/topics/soep-test/de").await;
    assert_eq!(tree[0]["title"], "Gesundheit");
    assert_eq!(tree[0]["children"][0]["children"][0]["title"], "Schlafdauer");
}

#[tokio::test]
async fn test_topic_listings_cover_subtopics() {
    let app = setup_app().await;

    let (status, page) = app.get("/api/topics/soep-test/health/variables").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_results"], 1);
    assert_eq!(page["page_size"], 100);
    assert_eq!(page["results"][0]["name"], "plh0033");
    assert_eq!(page["results"][0]["dataset"], "pl");

    let (_, page) = app.get("/api/topics/soep-test/health/questions").await;
    assert_eq!(page["total_results"], 1);
    assert_eq!(page["results"][0]["name"], "q1");
    assert_eq!(page["results"][0]["instrument"], "questionnaire-2010");

    // out-of-range pages are clamped
    let (_, page) = app.get("/api/topics/soep-test/work/variables?page=7").await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["results"][0]["name"], "hlc0005");

    let (status, _) = app.get("/api/topics/soep-test/nope/variables").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concept_listings() {
    let app = setup_app().await;

    let (status, page) = app.get("/api/concepts/income/variables").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_results"], 1);
    assert_eq!(page["results"][0]["name"], "hlc0005");

    let (_, page) = app.get("/api/concepts/sleep-duration/questions?study=soep-test").await;
    assert_eq!(page["total_results"], 1);

    let (status, _) = app.get("/api/concepts/income/variables?study=unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get("/api/concepts/unknown/variables").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Baskets
// =============================================================================

#[tokio::test]
async fn test_basket_variables() {
    let app = setup_app().await;
    let id = create_basket(&app).await;

    let (status, body) = app
        .json("POST", &format!("/api/baskets/{}/variables", id), json!({ "topic": "health" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], 1);

    // adding again creates nothing
    let (_, body) = app
        .json("POST", &format!("/api/baskets/{}/variables", id), json!({ "topic": "health" }))
        .await;
    assert_eq!(body["created"], 0);

    let (status, body) = app
        .json("POST", &format!("/api/baskets/{}/add_by_concept", id), json!({ "concept": "income" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "DONE");

    let (_, basket) = app.get(&format!("/api/baskets/{}", id)).await;
    assert_eq!(basket["name"], "mine");
    assert_eq!(basket["study"], "soep-test");
    assert_eq!(basket["variable_count"], 2);

    let (_, page) = app.get(&format!("/api/baskets/{}/variables", id)).await;
    let names: Vec<&str> = page["results"].as_array().unwrap().iter().map(|v| v["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["hlc0005", "plh0033"]);

    let (_, body) = app
        .json("DELETE", &format!("/api/baskets/{}/variables", id), json!({ "concept": "income" }))
        .await;
    assert_eq!(body["deleted"], 1);

    let (status, _) = app
        .json("POST", &format!("/api/baskets/{}/variables", id), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = app.get("/api/baskets?user=alice").await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = app.get("/api/baskets?user=bob").await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_basket_rejects_variable_of_other_study() {
    let app = setup_app().await;
    let id = create_basket(&app).await;

    let ctx = &app.ctx;
    let other = Study::new(&ctx.ids, "other-study");
    ctx.repo::<Study>().upsert(&other).await.unwrap();
    let dataset = Dataset::new(&ctx.ids, other.id, "d1");
    ctx.repo::<Dataset>().upsert(&dataset).await.unwrap();
    let variable = Variable::new(&ctx.ids, dataset.id, "v1");
    ctx.repo::<Variable>().upsert(&variable).await.unwrap();

    let (status, body) = app
        .json(
            "POST",
            &format!("/api/baskets/{}/variables", id),
            json!({ "variables": [variable.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, basket) = app.get(&format!("/api/baskets/{}", id)).await;
    assert_eq!(basket["variable_count"], 0);
}

#[tokio::test]
async fn test_basket_cannot_move_to_other_study() {
    let app = setup_app().await;
    let id = create_basket(&app).await;
    let (status, _) = app
        .json("POST", &format!("/api/baskets/{}/variables", id), json!({ "topic": "health" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let other = Study::new(&app.ctx.ids, "other-study");
    app.ctx.repo::<Study>().upsert(&other).await.unwrap();

    let (status, body) = app
        .json(
            "POST",
            "/api/baskets",
            json!({ "user": "alice", "study": "other-study", "name": "Mine" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, basket) = app.get(&format!("/api/baskets/{}", id)).await;
    assert_eq!(basket["study"], "soep-test");
    assert_eq!(basket["label"], "My basket");
    assert!(basket["variable_count"].as_u64().unwrap() > 0);

    // same study: updated in place
    let (status, body) = app
        .json(
            "POST",
            "/api/baskets",
            json!({ "user": "alice", "study": "soep-test", "name": "Mine", "label": "Renamed" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["label"], "Renamed");
}

#[tokio::test]
async fn test_scripts_and_basket_deletion() {
    let app = setup_app().await;
    let id = create_basket(&app).await;

    let (status, script) = app
        .json(
            "POST",
            &format!("/api/baskets/{}/scripts", id),
            json!({ "name": "Stata", "generator_name": "soep-stata", "settings": { "path": "/data" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(script["name"], "stata");
    let script_id = script["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .json("PUT", &format!("/api/scripts/{}/settings", script_id), json!([1, 2]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, script) = app
        .json("PUT", &format!("/api/scripts/{}/settings", script_id), json!({ "path": "/other" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(script["settings"]["path"], "/other");

    let (_, scripts) = app.get(&format!("/api/baskets/{}/scripts", id)).await;
    assert_eq!(scripts.as_array().unwrap().len(), 1);

    // deleting the basket takes its scripts along
    let (status, _) = app.send(test_request("DELETE", &format!("/api/baskets/{}", id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/api/baskets/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/api/scripts/{}", script_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn test_webhook_signature() {
    let app = setup_app().await;
    let payload = br#"{"ref":"refs/heads/master"}"#;

    let (status, body) = app
        .send(webhook_request("soep-test", payload, Some(sign(SECRET, payload))))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["study"], "soep-test");

    let (status, body) = app
        .send(webhook_request("soep-test", br#"{"ref":"refs/heads/evil"}"#, Some(sign(SECRET, payload))))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.send(webhook_request("soep-test", payload, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(webhook_request("unknown", payload, Some(sign(SECRET, payload))))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
