//! Integration tests for the sift-rv review API
//!
//! Exercises the full HTTP surface against an in-memory database:
//! project lifecycle, document upload, prior labeling, the train → review
//! cycle, progress statistics and dataset export.

use axum::http::StatusCode;
use serde_json::{json, Value};
use sift_common::events::EventBus;
use sift_rv::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;

/// Test helper to create a test app over an in-memory database
async fn setup_test_app() -> axum::Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory pool");
    sift_rv::db::init_tables(&pool)
        .await
        .expect("Failed to init tables");
    sift_rv::db::settings::init_settings_defaults(&pool)
        .await
        .expect("Failed to init settings");

    let state = AppState::new(pool, EventBus::new(100));
    sift_rv::build_router(state)
}

/// Helper function to make HTTP requests to the test app
async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let (status, bytes) = make_raw_request(app, method, path, body).await;
    let json_body = serde_json::from_slice(&bytes).ok();
    (status, json_body)
}

/// Like `make_request` but returns the raw body (for export downloads)
async fn make_raw_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    use axum::body::Body;
    use http::{Method, Request};
    use tower::ServiceExt;

    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        _ => panic!("Unsupported method"),
    };

    let mut request = Request::builder().method(method).uri(path);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = match body {
        Some(json_body) => request.body(Body::from(json_body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, bytes.to_vec())
}

/// Create a project and return its id
async fn create_project(app: &axum::Router, name: &str) -> String {
    let (status, body) = make_request(
        app,
        "POST",
        "/api/projects",
        Some(json!({ "name": name, "authors": "tester" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body.unwrap()["id"].as_str().unwrap().to_string()
}

/// Upload a small document pool with two clearly separable topics
async fn upload_pool(app: &axum::Router, project_id: &str) {
    let documents = json!({
        "documents": [
            { "doc_id": 58, "title": "Screening evidence with recall methods",
              "abstract": "systematic screening recall evidence synthesis" },
            { "doc_id": 100, "title": "Evidence screening recall study",
              "abstract": "screening methods recall evidence quality" },
            { "doc_id": 102, "title": "Recall oriented screening methods",
              "abstract": "evidence recall screening protocol" },
            { "doc_id": 5509, "title": "Crossfade playback for audio queues",
              "abstract": "audio playback crossfade decoder pipeline" },
            { "doc_id": 5510, "title": "Audio decoder buffering",
              "abstract": "playback buffer decoder audio stream" },
            { "doc_id": 5511, "title": "Mixer pipeline for playback",
              "abstract": "audio mixer crossfade stream output" },
        ]
    });

    let (status, _) = make_request(
        app,
        "POST",
        &format!("/api/projects/{}/documents", project_id),
        Some(documents),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

/// Record the two seed labels and kick off training
async fn seed_and_start(app: &axum::Router, project_id: &str) {
    let (status, _) = make_request(
        app,
        "POST",
        &format!("/api/projects/{}/record/58", project_id),
        Some(json!({ "label": 1, "is_prior": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = make_request(
        app,
        "POST",
        &format!("/api/projects/{}/record/5509", project_id),
        Some(json!({ "label": 0, "is_prior": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = make_request(
        app,
        "POST",
        &format!("/api/projects/{}/start", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

/// Poll the status endpoint until the project reaches the wanted state
async fn wait_for_status(app: &axum::Router, project_id: &str, want: &str) {
    for _ in 0..500 {
        let (status, body) = make_request(
            app,
            "GET",
            &format!("/api/projects/{}/status", project_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        if body["status"] == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for status {}", want);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_test_app().await;

    let (status, body) = make_request(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "sift-rv");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_project_lifecycle() {
    let app = setup_test_app().await;

    // Empty to begin with
    let (status, body) = make_request(&app, "GET", "/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["result"].as_array().unwrap().len(), 0);

    let project_id = create_project(&app, "my review").await;

    // Appears in the listing, in setup
    let (_, body) = make_request(&app, "GET", "/api/projects", None).await;
    let body = body.unwrap();
    let listed = body["result"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "my review");
    assert_eq!(listed[0]["status"], "setup");

    // Dashboard stats count it under setup
    let (status, body) = make_request(&app, "GET", "/api/projects/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["n_setup"], 1);
    assert_eq!(body["n_in_review"], 0);
    assert_eq!(body["n_finished"], 0);

    // Metadata update round-trips
    let (status, body) = make_request(
        &app,
        "PUT",
        &format!("/api/projects/{}/info", project_id),
        Some(json!({ "name": "renamed", "authors": "a", "description": "d" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["name"], "renamed");

    // Delete removes it entirely
    let (status, _) = make_request(
        &app,
        "DELETE",
        &format!("/api/projects/{}", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/info", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.unwrap()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_empty_project_name_rejected() {
    let app = setup_test_app().await;

    let (status, body) = make_request(
        &app,
        "POST",
        "/api/projects",
        Some(json!({ "name": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_duplicate_document_upload_rejected() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "dup upload").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/documents", project_id),
        Some(json!({ "documents": [{ "doc_id": 1, "title": "late" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_search_and_prior_random() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "prior screening").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/search?q=crossfade", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    let hits = body["result"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|doc| {
        doc["title"].as_str().unwrap().contains("rossfade")
            || doc["abstract"].as_str().unwrap().contains("crossfade")
    }));

    // Random sample honors the requested size and skips labeled documents
    let (status, _) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/58", project_id),
        Some(json!({ "label": 1, "is_prior": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/prior_random?n=3", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    let sample = body["result"].as_array().unwrap();
    assert_eq!(sample.len(), 3);
    assert!(sample.iter().all(|doc| doc["doc_id"] != 58));
}

#[tokio::test]
async fn test_full_review_cycle() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "full cycle").await;
    upload_pool(&app, &project_id).await;

    seed_and_start(&app, &project_id).await;

    // Prior labels are visible before training completes
    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/labeled_stats", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["n"], 2);
    assert_eq!(body["n_prior"], 2);
    assert_eq!(body["n_relevant"], 1);
    assert_eq!(body["n_irrelevant"], 1);

    wait_for_status(&app, &project_id, "review").await;

    // Serve and label a document
    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/get_document", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["pool_empty"], false);
    let served = body["result"]["doc_id"].as_i64().unwrap();
    // Priors are never served again
    assert_ne!(served, 58);
    assert_ne!(served, 5509);

    let (status, _) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/{}", project_id, served),
        Some(json!({ "label": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Overwriting flips the decision without adding an entry
    let (status, _) = make_request(
        &app,
        "PUT",
        &format!("/api/projects/{}/record/{}", project_id, served),
        Some(json!({ "label": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/labeled", project_id),
        None,
    )
    .await;
    let body = body.unwrap();
    let labeled = body["result"].as_array().unwrap();
    assert_eq!(labeled.len(), 3);
    let entry = labeled
        .iter()
        .find(|record| record["doc_id"] == served)
        .unwrap();
    assert_eq!(entry["decision"], "irrelevant");
    assert_eq!(entry["origin"], "model");

    // The next served document differs from the one just labeled
    let (_, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/get_document", project_id),
        None,
    )
    .await;
    let next = body.unwrap()["result"]["doc_id"].as_i64().unwrap();
    assert_ne!(next, served);
}

#[tokio::test]
async fn test_status_toggle() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "toggle").await;
    upload_pool(&app, &project_id).await;
    seed_and_start(&app, &project_id).await;
    wait_for_status(&app, &project_id, "review").await;

    let (status, body) = make_request(
        &app,
        "PUT",
        &format!("/api/projects/{}/status", project_id),
        Some(json!({ "status": "finished" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["status"], "finished");

    // Finished is reversible and labeling still works
    let (status, _) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/100", project_id),
        Some(json!({ "label": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = make_request(
        &app,
        "PUT",
        &format!("/api/projects/{}/status", project_id),
        Some(json!({ "status": "review" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_for_status(&app, &project_id, "review").await;

    // Setup is not a valid toggle target
    let (status, body) = make_request(
        &app,
        "PUT",
        &format!("/api/projects/{}/status", project_id),
        Some(json!({ "status": "setup" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_progress_endpoints() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "progress").await;
    upload_pool(&app, &project_id).await;
    seed_and_start(&app, &project_id).await;
    wait_for_status(&app, &project_id, "review").await;

    // Review two documents so the curves have points
    for _ in 0..2 {
        let (_, body) = make_request(
            &app,
            "GET",
            &format!("/api/projects/{}/get_document", project_id),
            None,
        )
        .await;
        let doc_id = body.unwrap()["result"]["doc_id"].as_i64().unwrap();
        let (status, _) = make_request(
            &app,
            "POST",
            &format!("/api/projects/{}/record/{}", project_id, doc_id),
            Some(json!({ "label": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/progress", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["n_documents"], 6);
    assert_eq!(body["n_pool"], 2);
    assert_eq!(body["n_prior"], 2);
    assert_eq!(body["n_reviewed"], 2);

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/progress_recall", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    // One point per reviewed (non-prior) label, both relevant
    assert_eq!(body["model"], json!([1, 2]));
    assert_eq!(body["random"].as_array().unwrap().len(), 2);

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/progress_density", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["relevant"], json!([1.0, 1.0]));
    assert_eq!(body["irrelevant"], json!([0.0, 0.0]));
}

#[tokio::test]
async fn test_export_dataset() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "export").await;
    upload_pool(&app, &project_id).await;

    let (status, _) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/58", project_id),
        Some(json!({ "label": 1, "is_prior": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, bytes) = make_raw_request(
        &app,
        "GET",
        &format!("/api/projects/{}/export_dataset?file_format=csv", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "doc_id,title,abstract,label");
    // Header plus one row per pool document
    assert_eq!(lines.len(), 7);
    assert!(lines.iter().any(|line| line.starts_with("58,") && line.ends_with(",1")));
    // Unlabeled rows carry an empty label column
    assert!(lines.iter().any(|line| line.starts_with("5510,") && line.ends_with(",")));

    let (status, bytes) = make_raw_request(
        &app,
        "GET",
        &format!("/api/projects/{}/export_dataset?file_format=tsv", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("doc_id\ttitle\tabstract\tlabel\n"));

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/export_dataset?file_format=xlsx", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_algorithms_endpoints() {
    let app = setup_test_app().await;

    let (status, body) = make_request(&app, "GET", "/api/algorithms", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["classifiers"], json!(["nb", "centroid"]));
    assert_eq!(body["query_strategies"], json!(["max", "random", "max_random"]));

    let project_id = create_project(&app, "algos").await;

    // Defaults are reported until changed
    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/algorithms", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["classifier"], "nb");
    assert_eq!(body["query_strategy"], "max");

    let (status, body) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/algorithms", project_id),
        Some(json!({
            "classifier": "centroid",
            "query_strategy": "max_random",
            "feature_extraction": "tfidf",
            "seed": 7,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["classifier"], "centroid");

    let (_, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/algorithms", project_id),
        None,
    )
    .await;
    let body = body.unwrap();
    assert_eq!(body["classifier"], "centroid");
    assert_eq!(body["seed"], 7);
}

#[tokio::test]
async fn test_start_without_priors_fails() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "no priors").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/start", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "PRECONDITION_FAILED");
}

#[tokio::test]
async fn test_get_document_invalid_in_setup() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "setup serve").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/get_document", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_record_unknown_document() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "bad doc").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/424242", project_id),
        Some(json!({ "label": 1, "is_prior": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "INVALID_DOCUMENT");
}

#[tokio::test]
async fn test_model_label_rejected_in_setup() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "setup label").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/58", project_id),
        Some(json!({ "label": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_invalid_label_flag_rejected() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "bad flag").await;
    upload_pool(&app, &project_id).await;

    let (status, body) = make_request(
        &app,
        "POST",
        &format!("/api/projects/{}/record/58", project_id),
        Some(json!({ "label": 2, "is_prior": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_delete_during_training() {
    let app = setup_test_app().await;
    let project_id = create_project(&app, "delete race").await;
    upload_pool(&app, &project_id).await;
    seed_and_start(&app, &project_id).await;

    // Delete immediately; training may still be in flight
    let (status, _) = make_request(
        &app,
        "DELETE",
        &format!("/api/projects/{}", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Give any in-flight training task time to observe the delete
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _) = make_request(
        &app,
        "GET",
        &format!("/api/projects/{}/status", project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The project was not resurrected by a late trainer commit
    let (_, body) = make_request(&app, "GET", "/api/projects", None).await;
    assert_eq!(body.unwrap()["result"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_unknown_project_is_404() {
    let app = setup_test_app().await;

    let (status, body) = make_request(
        &app,
        "GET",
        "/api/projects/00000000-0000-0000-0000-000000000000/status",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.unwrap()["error"]["code"], "NOT_FOUND");
}
