use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use churchos_infra::AppConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const ACCESS_SECRET: &str = "black-box-access";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, cheap hashing, ephemeral port.
        let env: HashMap<&str, &str> = HashMap::from([
            ("JWT_SECRET", ACCESS_SECRET),
            ("JWT_REFRESH_SECRET", "black-box-refresh"),
            ("ARGON2_MEMORY_KIB", "1024"),
            ("ARGON2_ITERATIONS", "1"),
        ]);
        let config = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).expect("config");
        let services = churchos_api::app::services::build_services(&config)
            .await
            .expect("services");
        let app = churchos_api::app::build_app(services);

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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get_authed(client: &reqwest::Client, url: String, token: &str) -> (StatusCode, Value) {
    let res = client.get(url).bearer_auth(token).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

/// Registers and returns the access token.
async fn register(client: &reqwest::Client, srv: &TestServer, email: &str) -> String {
    let (status, body) = post_json(
        client,
        srv.url("/auth/register"),
        json!({ "name": "Pastor Ada", "email": email, "password": "secret123" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/auth/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    let (status, _) = get_authed(&client, srv.url("/roles"), "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_another_key_is_rejected() {
    let srv = TestServer::spawn().await;
    let now = Utc::now();
    let claims = json!({
        "sub": "0190f3a0-0000-7000-8000-000000000001",
        "typ": "access",
        "iat": now.timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
    });
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"someone-elses-secret"),
    )
    .expect("failed to encode jwt");

    let (status, body) = get_authed(&reqwest::Client::new(), srv.url("/auth/me"), &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn register_login_refresh_me() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, "ada@church.org").await;

    let (status, body) = post_json(
        &client,
        srv.url("/auth/register"),
        json!({ "name": "Again", "email": "ADA@church.org", "password": "secret123" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = post_json(
        &client,
        srv.url("/auth/login"),
        json!({ "email": "ada@church.org", "password": "wrong-pass" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, body) = post_json(
        &client,
        srv.url("/auth/login"),
        json!({ "email": "ada@church.org", "password": "secret123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();
    let access_token = body["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, body) = post_json(&client, srv.url("/auth/refresh"), json!({ "refreshToken": refresh_token })).await;
    assert_eq!(status, StatusCode::OK);
    let refreshed = body["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, _) = post_json(&client, srv.url("/auth/refresh"), json!({ "refreshToken": access_token })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get_authed(&client, srv.url("/auth/me"), &refreshed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ada@church.org");
    assert_eq!(body["data"]["isEmailVerified"], false);
}

#[tokio::test]
async fn staff_is_authorized_by_any_matching_permission() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = register(&client, &srv, "admin@church.org").await;

    let res = client
        .post(srv.url("/users"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Sam", "email": "sam@church.org", "password": "secret123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let (_, body) = post_json(
        &client,
        srv.url("/auth/login"),
        json!({ "email": "sam@church.org", "password": "secret123" }),
    )
    .await;
    let staff = body["data"]["accessToken"].as_str().unwrap().to_string();

    // Staff holds user.read but not user.create or system.view.
    let res = client
        .post(srv.url("/users"))
        .bearer_auth(&staff)
        .json(&json!({ "name": "Eve", "email": "eve@church.org", "password": "secret123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (status, body) = get_authed(&client, srv.url("/users"), &staff).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = get_authed(&client, srv.url("/roles"), &staff).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, body) = get_authed(&client, srv.url("/roles"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    let roles = body["data"].as_array().unwrap();
    let super_admin = roles.iter().find(|r| r["name"] == "Super Admin").unwrap();
    assert_eq!(super_admin["permissions"].as_array().unwrap().len(), 8);

    let (status, body) = get_authed(&client, srv.url("/permissions"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn secret_flows_use_uniform_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, "ada@church.org").await;

    let (status, body) = post_json(&client, srv.url("/auth/forgot-password"), json!({ "email": "nobody@church.org" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, body) = post_json(&client, srv.url("/auth/send-otp"), json!({ "email": "ada@church.org" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = post_json(
        &client,
        srv.url("/auth/verify-otp"),
        json!({ "email": "ada@church.org", "otp": "not-it" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired token");

    let (status, body) = post_json(&client, srv.url("/auth/login"), json!({ "email": "ada@church.org" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn users_may_delete_only_themselves_without_user_delete() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = register(&client, &srv, "admin@church.org").await;
    let (_, me) = get_authed(&client, srv.url("/auth/me"), &admin).await;
    let admin_id = me["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url("/users"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Sam", "email": "sam@church.org", "password": "secret123" }))
        .send()
        .await
        .unwrap();
    let sam_id = res.json::<Value>().await.unwrap()["data"]["id"].as_str().unwrap().to_string();
    let (_, body) = post_json(
        &client,
        srv.url("/auth/login"),
        json!({ "email": "sam@church.org", "password": "secret123" }),
    )
    .await;
    let staff = body["data"]["accessToken"].as_str().unwrap().to_string();

    let res = client
        .delete(srv.url(&format!("/auth/delete/{admin_id}")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.url(&format!("/auth/delete/{sam_id}")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url("/auth/delete/not-a-uuid"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
