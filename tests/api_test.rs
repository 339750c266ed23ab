mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::{insert, memory, test_embedding, test_repo};
use xmemory::api::{router, AppState};
use xmemory::config::XMemoryConfig;
use xmemory::memory::{MemoryRepository, MemoryType};

async fn app() -> (Router, MemoryRepository) {
    let repo = test_repo().await;
    let state = AppState::new(repo.clone(), Arc::new(XMemoryConfig::default()));
    (router(state), repo)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    // extractor rejections answer in plain text
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_get_update_delete() {
    let (app, _) = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/memories",
        Some(json!({
            "content": "remember to call mom",
            "user_id": "u1",
            "tags": ["family"],
            "created_at": "2024-05-01 09:30:00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "GET", &format!("/api/v1/memories/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["memory_type"], "raw");
    assert_eq!(body["created_at"], "2024-05-01T09:30:00.000+00:00");
    assert!(body.get("embedding").is_none());

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/v1/memories/{id}"),
        Some(json!({ "summary": "call on sunday" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "call on sunday");
    assert_eq!(body["content"], "remember to call mom");

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/memories/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", &format!("/api/v1/memories/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "not_found");

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/memories/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let (app, _) = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/memories",
        Some(json!({ "content": "x", "user_id": "u1", "created_at": "yesterday-ish" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/memories",
        Some(json!({ "content": "   ", "user_id": "u1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/v1/memories?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let huge_page = format!("/api/v1/memories?page={}&page_size=10", usize::MAX);
    let (status, body) = call(&app, "GET", &huge_page, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
    let (status, _) = call(&app, "GET", "/api/v1/memories?page_size=101", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "GET", "/api/v1/memories?sort_by=title", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "PUT", "/api/v1/memories/missing", Some(json!({ "title": "t" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_reports_pages() {
    let (app, repo) = app().await;
    for i in 0..7 {
        insert(
            &repo,
            memory(&format!("entry {i}"), MemoryType::Diary, "u1"),
            test_embedding(i),
            &format!("2024-05-0{}T12:00:00Z", i + 1),
        )
        .await;
    }
    insert(&repo, memory("raw one", MemoryType::Raw, "u1"), test_embedding(0), "2024-06-01").await;

    let (status, body) = call(
        &app,
        "GET",
        "/api/v1/memories?user_id=u1&memory_type=diary&page=2&page_size=3&sort_order=asc",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 7);
    assert_eq!(body["total_pages"], 3);
    assert_eq!(body["page"], 2);
    let memories = body["memories"].as_array().unwrap();
    assert_eq!(memories.len(), 3);
    assert_eq!(memories[0]["content"], "entry 3");
    assert!(memories.iter().all(|m| m.get("embedding").is_none()));
}

#[tokio::test]
async fn search_returns_similar_memories() {
    let (app, repo) = app().await;
    repo.create_memory(memory("tomato seedlings in the greenhouse", MemoryType::Insight, "u1"))
        .await
        .unwrap();
    repo.create_memory(memory("tomato seedlings in the greenhouse", MemoryType::Insight, "u2"))
        .await
        .unwrap();

    let (status, body) = call(
        &app,
        "GET",
        "/api/v1/memories/search?query=tomato%20seedlings&size=5&user_id=u1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["memories"][0]["user_id"], "u1");

    let (status, _) = call(&app, "GET", "/api/v1/memories/search?query=%20", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn projects_and_tasks() {
    let (app, repo) = app().await;
    let project = insert(&repo, memory("garden overhaul", MemoryType::Project, "u1"), test_embedding(0), "2024-05-01").await;
    insert(
        &repo,
        memory("buy soil", MemoryType::Task, "u1").with_parent(project.as_str()),
        test_embedding(1),
        "2024-05-02",
    )
    .await;

    let (status, body) = call(&app, "GET", "/api/v1/projects?user_id=u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], project.as_str());

    let (status, body) = call(&app, "GET", &format!("/api/v1/projects/{project}/tasks?user_id=u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["content"], "buy soil");

    let (status, body) = call(&app, "GET", &format!("/api/v1/projects/{project}/tasks?user_id=u2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}
