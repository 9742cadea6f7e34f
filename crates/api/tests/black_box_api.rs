use chrono::{Duration as ChronoDuration, Utc};
use cardvault_auth::{JwtClaims, Role};
use cardvault_core::UserId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = cardvault_api::app::build_app(jwt_secret.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// Seed a bank, a card and two locations; returns (card_id, vault_id, branch_id).
async fn seed_catalog(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> (String, String, String) {
    let res = client
        .post(format!("{}/banks", base_url))
        .bearer_auth(token)
        .json(&json!({ "code": "FNB", "name": "First National" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let bank: serde_json::Value = res.json().await.unwrap();
    let bank_id = bank["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/cards", base_url))
        .bearer_auth(token)
        .json(&json!({
            "bank_id": bank_id,
            "name": "Platinum Credit",
            "card_type": "credit",
            "sub_type": "platinum",
            "min_threshold": 5,
            "max_threshold": 500,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let card: serde_json::Value = res.json().await.unwrap();
    let card_id = card["id"].as_str().unwrap().to_string();

    let mut location_ids = Vec::new();
    for name in ["Main Vault", "Branch 12"] {
        let res = client
            .post(format!("{}/locations", base_url))
            .bearer_auth(token)
            .json(&json!({ "bank_id": bank_id, "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let location: serde_json::Value = res.json().await.unwrap();
        location_ids.push(location["id"].as_str().unwrap().to_string());
    }

    let branch_id = location_ids.pop().unwrap();
    let vault_id = location_ids.pop().unwrap();
    (card_id, vault_id, branch_id)
}

async fn record_movement(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let res = client
        .post(format!("{}/movements", base_url))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_another_key_is_rejected() {
    let srv = TestServer::spawn("test-secret").await;
    let token = mint_jwt("other-secret", vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("test-secret").await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn whoami_reflects_the_resolved_session() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("operator")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "operator"));
    let permissions = body["permissions"].as_array().unwrap();
    assert!(permissions.iter().any(|p| p == "movements:create"));
    assert!(!permissions.iter().any(|p| p == "movements:delete"));
}

#[tokio::test]
async fn movement_lifecycle_entry_exit_balances() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let (card_id, vault_id, branch_id) = seed_catalog(&client, &srv.base_url, &token).await;

    // Entry of 100 into the vault.
    let (status, receipt) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 100,
            "to_location_id": vault_id,
            "reason": "initial delivery",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["card_quantity"], 100);

    // Transfer 30 to the branch, then 10 leave from there.
    let (status, _) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "transfer",
            "quantity": 30,
            "from_location_id": vault_id,
            "to_location_id": branch_id,
            "reason": "branch restock",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, receipt) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "exit",
            "quantity": 10,
            "from_location_id": branch_id,
            "reason": "issued to customers",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["card_quantity"], 90);

    // Live rows agree with the arithmetic.
    let res = client
        .get(format!("{}/stock/{}/{}", srv.base_url, card_id, vault_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["available"], 70);

    let res = client
        .get(format!("{}/cards/{}/balances", srv.base_url, card_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let balances: serde_json::Value = res.json().await.unwrap();
    let total: i64 = balances
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["quantity"].as_i64().unwrap())
        .sum();
    assert_eq!(total, 90);

    // History lists all three lines, oldest first.
    let res = client
        .get(format!("{}/movements?card_id={}", srv.base_url, card_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let history: serde_json::Value = res.json().await.unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["movement_type"], "entry");

    // The replayed history agrees with the live rows.
    let res = client
        .get(format!("{}/cards/{}/consistency", srv.base_url, card_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["consistent"], true);
    assert_eq!(report["live_total"], 90);

    // Audit trail recorded every movement.
    let res = client
        .get(format!("{}/audit", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let entries: serde_json::Value = res.json().await.unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn overdraft_reports_requested_and_available() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let (card_id, vault_id, _) = seed_catalog(&client, &srv.base_url, &token).await;

    let (status, _) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 10,
            "to_location_id": vault_id,
            "reason": "initial delivery",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "exit",
            "quantity": 25,
            "from_location_id": vault_id,
            "reason": "too greedy",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["requested"], 25);
    assert_eq!(body["available"], 10);
}

#[tokio::test]
async fn operator_cannot_revert_movements() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let admin = mint_jwt(jwt_secret, vec![Role::new("admin")]);
    let operator = mint_jwt(jwt_secret, vec![Role::new("operator")]);

    let client = reqwest::Client::new();
    let (card_id, vault_id, _) = seed_catalog(&client, &srv.base_url, &admin).await;

    let (status, receipt) = record_movement(
        &client,
        &srv.base_url,
        &operator,
        json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 5,
            "to_location_id": vault_id,
            "reason": "delivery",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let movement_id = receipt["movement"]["id"].as_str().unwrap();

    let res = client
        .delete(format!("{}/movements/{}", srv.base_url, movement_id))
        .bearer_auth(&operator)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn revert_and_correct_rewrite_the_ledger() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let (card_id, vault_id, _) = seed_catalog(&client, &srv.base_url, &token).await;

    let (status, receipt) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 50,
            "to_location_id": vault_id,
            "reason": "delivery",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let first_id = receipt["movement"]["id"].as_str().unwrap().to_string();

    // Revert deletes the line and undoes its effect.
    let res = client
        .delete(format!("{}/movements/{}", srv.base_url, first_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["card_quantity"], 0);

    let res = client
        .get(format!("{}/movements?card_id={}", srv.base_url, card_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let history: serde_json::Value = res.json().await.unwrap();
    assert!(history.as_array().unwrap().is_empty());

    // Correction rewrites a line in place.
    let (status, receipt) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 40,
            "to_location_id": vault_id,
            "reason": "delivery, miscounted",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let second_id = receipt["movement"]["id"].as_str().unwrap().to_string();

    let res = client
        .put(format!("{}/movements/{}", srv.base_url, second_id))
        .bearer_auth(&token)
        .json(&json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 25,
            "to_location_id": vault_id,
            "reason": "delivery, recounted",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["card_quantity"], 25);
    assert_eq!(receipt["movement"]["id"].as_str().unwrap(), second_id);
    assert_eq!(receipt["movement"]["quantity"], 25);
}

#[tokio::test]
async fn rebuild_reports_a_clean_card() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let (card_id, vault_id, _) = seed_catalog(&client, &srv.base_url, &token).await;

    let (status, _) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "entry",
            "quantity": 60,
            "to_location_id": vault_id,
            "reason": "delivery",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let res = client
        .post(format!("{}/cards/{}/rebuild", srv.base_url, card_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["movements_replayed"], 1);
    assert_eq!(report["total_after"], 60);
    assert!(report["corrections"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_movement_type_is_a_bad_request() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let (card_id, vault_id, _) = seed_catalog(&client, &srv.base_url, &token).await;

    let (status, body) = record_movement(
        &client,
        &srv.base_url,
        &token,
        json!({
            "card_id": card_id,
            "movement_type": "teleport",
            "quantity": 1,
            "to_location_id": vault_id,
            "reason": "nope",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
