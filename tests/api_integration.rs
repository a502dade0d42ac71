use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use metamodel::config::AppConfig;
use metamodel::{build_app, build_context, MemoryStore};

// Test client wrapper driving the router in-process
struct TestClient {
    app: axum::Router,
}

struct TestResponse {
    status: StatusCode,
    body: Value,
}

impl TestClient {
    fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let context = build_context(store, &config).unwrap();
        Self {
            app: build_app(context, &config),
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse { status, body }
    }

    async fn post(&self, path: &str, json: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        self.send(request).await
    }
}

#[tokio::test]
async fn test_health() {
    let client = TestClient::new();
    let response = client.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
}

#[tokio::test]
async fn test_ecosystem_create_then_already_exists() {
    let client = TestClient::new();

    let created = client
        .post("/ecosystem", json!({"name": "Retail", "company_name": "Acme"}))
        .await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.body["status"], "CREATED");
    assert_eq!(created.body["name"], "Retail");
    assert_eq!(created.body["company_name"], "Acme");
    let id = created.body["id"].as_i64().unwrap();

    let again = client.post("/ecosystem", json!({"name": "Retail"})).await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["status"], "ALREADY_EXISTS");
    assert_eq!(again.body["id"].as_i64(), Some(id));

    let fetched = client.get("/ecosystem/Retail").await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["id"].as_i64(), Some(id));
}

#[tokio::test]
async fn test_unknown_ecosystem_lookup_is_no_content() {
    let client = TestClient::new();
    let response = client.get("/ecosystem/Nowhere").await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_scoped_entities_link_to_parents() {
    let client = TestClient::new();
    let ecosystem = client.post("/ecosystem", json!({"name": "Retail"})).await;
    let ecosystem_id = ecosystem.body["id"].as_i64().unwrap();

    let capability = client
        .post(
            "/business_capability",
            json!({"name": "Sales", "ecosystem_id": ecosystem_id}),
        )
        .await;
    assert_eq!(capability.status, StatusCode::OK);
    assert_eq!(capability.body["status"], "CREATED");
    assert_eq!(capability.body["ecosystem_id"].as_i64(), Some(ecosystem_id));
    let capability_id = capability.body["id"].as_i64().unwrap();

    let service = client
        .post(
            "/business_service",
            json!({
                "name": "Checkout",
                "scope_name": "Retail",
                "business_capability_id": capability_id,
                "description": "Takes the money"
            }),
        )
        .await;
    assert_eq!(service.status, StatusCode::OK);
    assert_eq!(
        service.body["business_capability_id"].as_i64(),
        Some(capability_id)
    );
    assert_eq!(service.body["description"], "Takes the money");

    let fetched = client
        .get(&format!("/business_service/{}/Checkout", ecosystem_id))
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["id"], service.body["id"]);

    let missing = client
        .get(&format!("/business_service/{}/Returns", ecosystem_id))
        .await;
    assert_eq!(missing.status, StatusCode::NO_CONTENT);

    let listed = client
        .get(&format!("/business_capability?ecosystem_id={}", ecosystem_id))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["total"], 1);
    assert_eq!(listed.body["items"][0]["name"], "Sales");
}

#[tokio::test]
async fn test_update_renames_existing_row() {
    let client = TestClient::new();
    let created = client.post("/ecosystem", json!({"name": "Retail"})).await;
    let id = created.body["id"].as_i64().unwrap();

    let updated = client
        .post(
            "/ecosystem",
            json!({"id": id, "name": "Retail EU", "company_name": "Acme"}),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], "Retail EU");
    assert!(updated.body.get("status").is_none());

    assert_eq!(
        client.get("/ecosystem/Retail").await.status,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        client.get("/ecosystem/Retail%20EU").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_update_rejects_unknown_parent() {
    let client = TestClient::new();
    let ecosystem = client.post("/ecosystem", json!({"name": "Retail"})).await;
    let service = client
        .post(
            "/business_service",
            json!({"name": "Checkout", "ecosystem_id": ecosystem.body["id"]}),
        )
        .await;
    let service_id = service.body["id"].as_i64().unwrap();

    let response = client
        .post(
            "/business_service",
            json!({"id": service_id, "name": "S", "business_capability_id": 999}),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let unchanged = client
        .get(&format!("/business_service/{}/Checkout", ecosystem.body["id"]))
        .await;
    assert_eq!(unchanged.status, StatusCode::OK);
    assert_eq!(unchanged.body["business_capability_id"], Value::Null);
}

#[tokio::test]
async fn test_update_rejects_parent_from_other_ecosystem() {
    let client = TestClient::new();
    let retail = client.post("/ecosystem", json!({"name": "Retail"})).await;
    let logistics = client.post("/ecosystem", json!({"name": "Logistics"})).await;
    let foreign = client
        .post(
            "/business_capability",
            json!({"name": "Fleet", "ecosystem_id": logistics.body["id"]}),
        )
        .await;
    let service = client
        .post(
            "/business_service",
            json!({"name": "Checkout", "ecosystem_id": retail.body["id"]}),
        )
        .await;

    let response = client
        .post(
            "/business_service",
            json!({
                "id": service.body["id"],
                "name": "Checkout",
                "business_capability_id": foreign.body["id"]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rename_keeps_omitted_fields() {
    let client = TestClient::new();
    let ecosystem = client
        .post("/ecosystem", json!({"name": "Retail", "company_name": "Acme"}))
        .await;
    let capability = client
        .post(
            "/business_capability",
            json!({"name": "Sales", "ecosystem_id": ecosystem.body["id"]}),
        )
        .await;
    let service = client
        .post(
            "/business_service",
            json!({
                "name": "Checkout",
                "ecosystem_id": ecosystem.body["id"],
                "business_capability_id": capability.body["id"]
            }),
        )
        .await;

    let renamed = client
        .post(
            "/ecosystem",
            json!({"id": ecosystem.body["id"], "name": "Retail EU"}),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["company_name"], "Acme");

    let renamed = client
        .post(
            "/business_service",
            json!({"id": service.body["id"], "name": "Payments"}),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(
        renamed.body["business_capability_id"],
        capability.body["id"]
    );
}

#[tokio::test]
async fn test_explicit_null_clears_on_update() {
    let client = TestClient::new();
    let ecosystem = client
        .post("/ecosystem", json!({"name": "Retail", "company_name": "Acme"}))
        .await;
    let capability = client
        .post(
            "/business_capability",
            json!({"name": "Sales", "ecosystem_id": ecosystem.body["id"]}),
        )
        .await;
    let service = client
        .post(
            "/business_service",
            json!({
                "name": "Checkout",
                "ecosystem_id": ecosystem.body["id"],
                "business_capability_id": capability.body["id"]
            }),
        )
        .await;

    let cleared = client
        .post(
            "/ecosystem",
            json!({"id": ecosystem.body["id"], "name": "Retail", "company_name": null}),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["company_name"], Value::Null);

    let cleared = client
        .post(
            "/business_service",
            json!({
                "id": service.body["id"],
                "name": "Checkout",
                "business_capability_id": null
            }),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["business_capability_id"], Value::Null);
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let client = TestClient::new();
    let response = client
        .post("/ecosystem", json!({"id": 999, "name": "Ghost"}))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_update_into_taken_name_is_conflict() {
    let client = TestClient::new();
    client.post("/ecosystem", json!({"name": "Retail"})).await;
    let other = client.post("/ecosystem", json!({"name": "Logistics"})).await;
    let other_id = other.body["id"].as_i64().unwrap();

    let response = client
        .post("/ecosystem", json!({"id": other_id, "name": "Retail"}))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_scope_is_rejected() {
    let client = TestClient::new();

    let by_id = client
        .post(
            "/business_capability",
            json!({"name": "Sales", "ecosystem_id": 42}),
        )
        .await;
    assert_eq!(by_id.status, StatusCode::UNPROCESSABLE_ENTITY);

    let by_name = client
        .post(
            "/business_capability",
            json!({"name": "Sales", "scope_name": "Nowhere"}),
        )
        .await;
    assert_eq!(by_name.status, StatusCode::UNPROCESSABLE_ENTITY);

    let no_scope = client
        .post("/business_capability", json!({"name": "Sales"}))
        .await;
    assert_eq!(no_scope.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_parent_from_other_ecosystem_is_rejected() {
    let client = TestClient::new();
    let retail = client.post("/ecosystem", json!({"name": "Retail"})).await;
    let logistics = client.post("/ecosystem", json!({"name": "Logistics"})).await;

    let capability = client
        .post(
            "/business_capability",
            json!({"name": "Sales", "ecosystem_id": retail.body["id"]}),
        )
        .await;

    let response = client
        .post(
            "/business_service",
            json!({
                "name": "Checkout",
                "ecosystem_id": logistics.body["id"],
                "business_capability_id": capability.body["id"]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_infoblock_resolves_chain() {
    let client = TestClient::new();

    let response = client
        .post(
            "/infoblock",
            json!({"textIn": "We should finally document DBOS"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    for field in [
        "ecosystem_id",
        "business_capability_id",
        "business_service_id",
        "application_service_id",
        "application_component_id",
        "application_implementation_id",
    ] {
        assert!(
            response.body[field].as_i64().unwrap() > 0,
            "{} should be set",
            field
        );
    }
    assert_eq!(response.body["problem_statement_id"], 0);

    let ecosystem = client.get("/ecosystem/DBOS").await;
    assert_eq!(ecosystem.status, StatusCode::OK);
    assert_eq!(ecosystem.body["id"], response.body["ecosystem_id"]);

    // legacy clients also send an id, which is ignored
    let again = client
        .post("/infoblock", json!({"id": 7, "textIn": "dbos again"}))
        .await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(
        again.body["application_implementation_id"],
        response.body["application_implementation_id"]
    );
}

#[tokio::test]
async fn test_infoblock_without_match_skips_all_levels() {
    let client = TestClient::new();

    let response = client
        .post("/infoblock", json!({"textIn": "nothing relevant here"}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ecosystem_id"], 0);

    let listed = client.get("/ecosystem").await;
    assert_eq!(listed.body["total"], 0);
}

#[tokio::test]
async fn test_empty_infoblock_is_no_content() {
    let client = TestClient::new();
    let response = client.post("/infoblock", json!({"textIn": "  "})).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_infoblock_chains_problem_when_enabled() {
    let mut config = AppConfig::default();
    config.ingest.chain_problem_statement = true;
    let client = TestClient::with_config(config);

    let response = client
        .post("/infoblock", json!({"textIn": "dbos loses track of owners"}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["problem_statement_id"].as_i64().unwrap() > 0);

    let problems = client.get("/problem").await;
    assert_eq!(problems.body["total"], 1);
    assert_eq!(
        problems.body["items"][0]["application_implementation_id"],
        response.body["application_implementation_id"]
    );
}

#[tokio::test]
async fn test_mailbox_ingest_requires_configuration() {
    let client = TestClient::new();
    let request = Request::builder()
        .method("POST")
        .uri("/infoblock/mailbox")
        .body(Body::empty())
        .unwrap();
    let response = client.send(request).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}
