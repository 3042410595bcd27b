//! Integration tests for the module workflow REST API.
//!
//! Each test spins up an Axum server on a random port with a seeded
//! in-memory database and exercises the real HTTP contract with reqwest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

use chat_modules::modules::routes::module_routes;
use chat_modules::modules::service::ModuleService;
use chat_modules::registry::seed_catalog;
use chat_modules::store::{Database, LibSqlBackend};

/// Start an Axum server on a random port over a seeded in-memory DB.
async fn start_server() -> u16 {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    seed_catalog(&db).await.unwrap();
    let service = Arc::new(ModuleService::new(db));
    let app = module_routes(service);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    port
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Find a module and one of its requirements in a listing response.
fn find_module<'a>(listing: &'a [Value], name: &str) -> &'a Value {
    listing
        .iter()
        .find(|m| m["name"] == name)
        .unwrap_or_else(|| panic!("module {name} missing from listing"))
}

#[tokio::test]
async fn test_health() {
    let port = start_server().await;
    let resp = client()
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_listing_and_configuration_flow() {
    let port = start_server().await;
    let http = client();
    let base = format!("http://127.0.0.1:{port}");

    // Listing without a chat: no isEnabled field, github unconfigured
    let listing: Vec<Value> = http
        .get(format!("{base}/api/modules?userId=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let github = find_module(&listing, "github");
    assert_eq!(github["isConfigured"], false);
    assert!(github.get("isEnabled").is_none());

    let module_id = github["id"].as_str().unwrap().to_string();
    let token_req = github["requirements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "GITHUB_TOKEN")
        .unwrap();
    let requirement_id = token_req["id"].as_str().unwrap().to_string();
    // Credential slots never echo their value
    assert!(token_req["value"].is_null());

    // Save the token
    let resp = http
        .post(format!("{base}/api/modules/{module_id}/config"))
        .json(&json!({ "userId": "u1", "values": { (requirement_id.clone()): "tok" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    // Now configured, and the credential is reported set but not echoed
    let listing: Vec<Value> = http
        .get(format!("{base}/api/modules?userId=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let github = find_module(&listing, "github");
    assert_eq!(github["isConfigured"], true);
    let token_req = github["requirements"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "GITHUB_TOKEN")
        .unwrap();
    assert_eq!(token_req["isSet"], true);
    assert!(token_req["value"].is_null());
}

#[tokio::test]
async fn test_save_config_rejects_foreign_requirement() {
    let port = start_server().await;
    let http = client();
    let base = format!("http://127.0.0.1:{port}");

    let listing: Vec<Value> = http
        .get(format!("{base}/api/modules?userId=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let module_id = find_module(&listing, "github")["id"].as_str().unwrap().to_string();

    let resp = http
        .post(format!("{base}/api/modules/{module_id}/config"))
        .json(&json!({ "userId": "u1", "values": { (Uuid::new_v4().to_string()): "x" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("does not belong"));
}

#[tokio::test]
async fn test_chat_module_toggle_post_get_pair() {
    let port = start_server().await;
    let http = client();
    let base = format!("http://127.0.0.1:{port}");
    let chat_id = Uuid::new_v4();

    let listing: Vec<Value> = http
        .get(format!("{base}/api/modules?userId=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let module_id = find_module(&listing, "stripe")["id"].as_str().unwrap().to_string();

    // Toggle on, then off
    for enabled in [true, false] {
        let resp = http
            .post(format!("{base}/api/chat-modules"))
            .json(&json!({ "chatId": chat_id, "moduleId": module_id, "enabled": enabled }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
    }

    // One row, disabled
    let rows: Vec<Value> = http
        .get(format!("{base}/api/chat-modules?chatId={chat_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["enabled"], false);

    // Unknown module is a 404
    let resp = http
        .post(format!("{base}/api/chat-modules"))
        .json(&json!({ "chatId": chat_id, "moduleId": Uuid::new_v4(), "enabled": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_request_approval_enables_module() {
    let port = start_server().await;
    let http = client();
    let base = format!("http://127.0.0.1:{port}");
    let chat_id = Uuid::new_v4();

    let listing: Vec<Value> = http
        .get(format!("{base}/api/modules?userId=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let module_id = find_module(&listing, "github")["id"].as_str().unwrap().to_string();

    // Create the request twice with one toolCallId: same request back
    let create = json!({
        "chatId": chat_id,
        "moduleId": module_id,
        "toolCallId": "call_abc",
        "reason": "need repo access"
    });
    let first: Value = http
        .post(format!("{base}/api/module-requests"))
        .json(&create)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = http
        .post(format!("{base}/api/module-requests"))
        .json(&create)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["state"], "pending");

    // Approve it
    let request_id = first["id"].as_str().unwrap();
    let approved: Value = http
        .post(format!("{base}/api/module-requests/{request_id}/approve"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(approved["state"], "approved");

    // The chat's request list reflects the resolved request
    let requests: Vec<Value> = http
        .get(format!("{base}/api/module-requests?chatId={chat_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["id"].as_str().unwrap(), request_id);
    assert_eq!(requests[0]["state"], "approved");

    // Listing for the chat now shows the module enabled
    let listing: Vec<Value> = http
        .get(format!("{base}/api/modules?userId=u1&chatId={chat_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let github = find_module(&listing, "github");
    assert_eq!(github["isEnabled"], true);

    // Terminal: denying an approved request is a 400
    let resp = http
        .post(format!("{base}/api/module-requests/{request_id}/deny"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_request_id_is_404() {
    let port = start_server().await;
    let resp = client()
        .post(format!(
            "http://127.0.0.1:{port}/api/module-requests/{}/approve",
            Uuid::new_v4()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
