use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kardex::api::router;
use kardex::AppState;
use tower::ServiceExt;

fn test_state(api_key: Option<&str>) -> AppState {
    let db = kardex::db::CatalogDB::open(":memory:").unwrap();
    AppState {
        db: std::sync::Arc::new(db),
        scoring: None,
        api_key: api_key.map(|s| s.to_string()),
        started_at: std::time::Instant::now(),
    }
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_req(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(Body::empty()).unwrap()
}

fn empty_req(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

/// Create an item and return its body; panics on non-201.
async fn create_item(app: &axum::Router, body: serde_json::Value) -> serde_json::Value {
    let resp = app.clone().oneshot(json_req("POST", "/items", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

// --- Auth ---

#[tokio::test]
async fn auth_rejects_no_token() {
    let app = router(test_state(Some("secret123")));
    let resp = app.oneshot(get_req("/items", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_rejects_wrong_token() {
    let app = router(test_state(Some("secret123")));
    let resp = app.oneshot(get_req("/items", Some("wrongtoken"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_passes_correct_token() {
    let app = router(test_state(Some("secret123")));
    let resp = app.oneshot(get_req("/items", Some("secret123"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_and_stats_need_no_auth() {
    let app = router(test_state(Some("secret123")));
    let resp = app.clone().oneshot(get_req("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get_req("/stats", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["active_items"], 0);
}

#[tokio::test]
async fn index_lists_endpoints() {
    let app = router(test_state(None));
    let resp = app.oneshot(get_req("/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["name"], "kardex");
    assert_eq!(j["scoring_enabled"], false);
    assert!(j["endpoints"].is_object());
    assert!(j["endpoints"]["GET /search?q=term"].is_string());
}

// --- Items: create + duplicate resolution ---

#[tokio::test]
async fn create_item_returns_201() {
    let app = router(test_state(None));
    let j = create_item(
        &app,
        serde_json::json!({"title": "Rust Notes", "content": "ownership", "tags": ["rust"]}),
    )
    .await;
    assert_eq!(j["title"], "Rust Notes");
    assert_eq!(j["status"], "draft");
    assert_eq!(j["deleted"], false);
    assert_eq!(j["tags"][0], "rust");
    assert!(j["id"].is_string());
}

#[tokio::test]
async fn create_empty_title_returns_400() {
    let app = router(test_state(None));
    let resp = app
        .oneshot(json_req("POST", "/items", serde_json::json!({"title": "  "})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn case_variant_duplicate_returns_409_with_existing_id() {
    let app = router(test_state(None));
    let first = create_item(&app, serde_json::json!({"title": "Rust Notes"})).await;

    let resp = app
        .oneshot(json_req("POST", "/items", serde_json::json!({"title": "RUST NOTES"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let j = body_json(resp).await;
    assert_eq!(j["existing_id"], first["id"]);
}

#[tokio::test]
async fn archived_title_returns_restore_candidate() {
    let app = router(test_state(None));
    let first = create_item(&app, serde_json::json!({"title": "Rust Notes"})).await;
    let id = first["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(empty_req("DELETE", &format!("/items/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // same title again: a 409 carrying the archived record, nothing created
    let resp = app
        .clone()
        .oneshot(json_req("POST", "/items", serde_json::json!({"title": "rust notes"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let j = body_json(resp).await;
    assert_eq!(j["restore_candidate"]["id"], first["id"]);
    assert_eq!(j["restore_candidate"]["deleted"], true);

    // following the offer brings the original back
    let resp = app
        .clone()
        .oneshot(empty_req("POST", &format!("/items/{id}/restore")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["restored"], true);
    assert_eq!(j["item"]["deleted"], false);
}

// --- Items: read + update ---

#[tokio::test]
async fn get_missing_returns_404() {
    let app = router(test_state(None));
    let resp = app.oneshot(get_req("/items/nonexistent-id", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_accepts_short_prefix() {
    let app = router(test_state(None));
    let created = create_item(&app, serde_json::json!({"title": "Prefixed"})).await;
    let id = created["id"].as_str().unwrap();
    let prefix = &id[..8];

    let resp = app.oneshot(get_req(&format!("/items/{prefix}"), None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["id"], created["id"]);
}

#[tokio::test]
async fn patch_updates_content_and_status() {
    let app = router(test_state(None));
    let created = create_item(&app, serde_json::json!({"title": "Draft piece"})).await;
    let id = created["id"].as_str().unwrap();

    let resp = app
        .oneshot(json_req(
            "PATCH",
            &format!("/items/{id}"),
            serde_json::json!({"content": "now with text", "status": "published"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["content"], "now with text");
    assert_eq!(j["status"], "published");
}

#[tokio::test]
async fn patch_onto_taken_title_returns_409() {
    let app = router(test_state(None));
    let a = create_item(&app, serde_json::json!({"title": "Alpha"})).await;
    let b = create_item(&app, serde_json::json!({"title": "Beta"})).await;
    let b_id = b["id"].as_str().unwrap();

    let resp = app
        .oneshot(json_req(
            "PATCH",
            &format!("/items/{b_id}"),
            serde_json::json!({"title": "alpha"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let j = body_json(resp).await;
    assert_eq!(j["existing_id"], a["id"]);
}

#[tokio::test]
async fn invalid_status_filter_returns_400() {
    let app = router(test_state(None));
    let resp = app.oneshot(get_req("/items?status=frozen", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn archived_listing_is_separate() {
    let app = router(test_state(None));
    let a = create_item(&app, serde_json::json!({"title": "Keep"})).await;
    let b = create_item(&app, serde_json::json!({"title": "Shelve"})).await;
    let b_id = b["id"].as_str().unwrap();
    app.clone()
        .oneshot(empty_req("DELETE", &format!("/items/{b_id}")))
        .await
        .unwrap();

    let resp = app.clone().oneshot(get_req("/items", None)).await.unwrap();
    let j = body_json(resp).await;
    assert_eq!(j["count"], 1);
    assert_eq!(j["items"][0]["id"], a["id"]);

    let resp = app.oneshot(get_req("/items?archived=true", None)).await.unwrap();
    let j = body_json(resp).await;
    assert_eq!(j["count"], 1);
    assert_eq!(j["items"][0]["id"], b["id"]);
    assert_eq!(j["items"][0]["status"], "archived");
}

// --- Lifecycle over HTTP ---

#[tokio::test]
async fn restore_conflict_returns_409_with_conflicting_id() {
    let app = router(test_state(None));
    let old = create_item(&app, serde_json::json!({"title": "Notes"})).await;
    let old_id = old["id"].as_str().unwrap();
    app.clone()
        .oneshot(empty_req("DELETE", &format!("/items/{old_id}")))
        .await
        .unwrap();

    // a rename claims the freed title
    let winner = create_item(&app, serde_json::json!({"title": "Scratch"})).await;
    let winner_id = winner["id"].as_str().unwrap();
    let resp = app
        .clone()
        .oneshot(json_req(
            "PATCH",
            &format!("/items/{winner_id}"),
            serde_json::json!({"title": "NOTES"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(empty_req("POST", &format!("/items/{old_id}/restore")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let j = body_json(resp).await;
    assert_eq!(j["conflicting_id"], winner["id"]);

    // loser stays archived
    let resp = app.oneshot(get_req(&format!("/items/{old_id}"), None)).await.unwrap();
    let j = body_json(resp).await;
    assert_eq!(j["deleted"], true);
}

#[tokio::test]
async fn purge_requires_archive_first() {
    let app = router(test_state(None));
    let item = create_item(&app, serde_json::json!({"title": "Ephemeral"})).await;
    let id = item["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(empty_req("DELETE", &format!("/items/{id}/purge")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    app.clone()
        .oneshot(empty_req("DELETE", &format!("/items/{id}")))
        .await
        .unwrap();
    let resp = app
        .clone()
        .oneshot(empty_req("DELETE", &format!("/items/{id}/purge")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["purged"], true);

    let resp = app.oneshot(get_req(&format!("/items/{id}"), None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- Tags ---

#[tokio::test]
async fn tag_create_and_duplicate() {
    let app = router(test_state(None));
    let resp = app
        .clone()
        .oneshot(json_req("POST", "/tags", serde_json::json!({"name": "Rust"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let tag = body_json(resp).await;

    let resp = app
        .oneshot(json_req("POST", "/tags", serde_json::json!({"name": "rust"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let j = body_json(resp).await;
    assert_eq!(j["existing_id"], tag["id"]);
}

#[tokio::test]
async fn attach_and_detach_by_name() {
    let app = router(test_state(None));
    let item = create_item(&app, serde_json::json!({"title": "Notes"})).await;
    let id = item["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(json_req(
            "POST",
            &format!("/items/{id}/tags"),
            serde_json::json!({"name": "rust"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["attached"], true);
    assert_eq!(j["tag"]["name"], "rust");

    let resp = app
        .clone()
        .oneshot(empty_req("DELETE", &format!("/items/{id}/tags/RUST")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["detached"], true);
}

#[tokio::test]
async fn attach_archived_tag_reports_dormant() {
    let app = router(test_state(None));
    let resp = app
        .clone()
        .oneshot(json_req("POST", "/tags", serde_json::json!({"name": "rust"})))
        .await
        .unwrap();
    let tag = body_json(resp).await;
    let tag_id = tag["id"].as_str().unwrap();
    app.clone()
        .oneshot(empty_req("DELETE", &format!("/tags/{tag_id}")))
        .await
        .unwrap();

    let item = create_item(&app, serde_json::json!({"title": "Notes"})).await;
    let id = item["id"].as_str().unwrap();
    let resp = app
        .oneshot(json_req(
            "POST",
            &format!("/items/{id}/tags"),
            serde_json::json!({"name": "Rust"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["tag"]["id"], tag["id"]);
    assert_eq!(j["tag"]["deleted"], true);
    assert!(j["note"].is_string());
}

#[tokio::test]
async fn rename_tag_route() {
    let app = router(test_state(None));
    let resp = app
        .clone()
        .oneshot(json_req("POST", "/tags", serde_json::json!({"name": "rsut"})))
        .await
        .unwrap();
    let tag = body_json(resp).await;
    let id = tag["id"].as_str().unwrap();

    let resp = app
        .oneshot(json_req(
            "PATCH",
            &format!("/tags/{id}"),
            serde_json::json!({"name": "rust"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["name"], "rust");
}

// --- Links ---

#[tokio::test]
async fn link_create_list_remove() {
    let app = router(test_state(None));
    let a = create_item(&app, serde_json::json!({"title": "A"})).await;
    let b = create_item(&app, serde_json::json!({"title": "B"})).await;
    let a_id = a["id"].as_str().unwrap();
    let b_id = b["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(json_req(
            "POST",
            &format!("/items/{a_id}/links"),
            serde_json::json!({"to": b_id, "relation": "references"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(get_req(&format!("/items/{b_id}/links"), None))
        .await
        .unwrap();
    let j = body_json(resp).await;
    assert_eq!(j["count"], 1);
    assert_eq!(j["links"][0]["relation"], "references");

    let resp = app
        .oneshot(empty_req(
            "DELETE",
            &format!("/items/{a_id}/links/{b_id}/references"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["removed"], true);
}

// --- Search ---

#[tokio::test]
async fn search_requires_query() {
    let app = router(test_state(None));
    let resp = app.oneshot(get_req("/search", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_without_scoring_is_keyword_mode() {
    let app = router(test_state(None));
    create_item(
        &app,
        serde_json::json!({"title": "Postgres tuning", "content": "vacuum schedule"}),
    )
    .await;
    create_item(&app, serde_json::json!({"title": "Sourdough starter"})).await;

    let resp = app.oneshot(get_req("/search?q=vacuum", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["mode"], "keyword");
    assert_eq!(j["count"], 1);
    assert_eq!(j["results"][0]["title"], "Postgres tuning");
}
