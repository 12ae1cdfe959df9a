use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use stride::config::{AuditFailurePolicy, Config};

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register the bootstrap user (first user = investigator + owner).
    pub async fn register(&self, email: &str, password: &str, name: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password, "name": name }))
            .send()
            .await
            .expect("register request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Login and return the auth response body + status.
    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Register bootstrap user, return access token.
    pub async fn bootstrap(&self) -> String {
        let (body, status) = self.register("admin@test.com", "password123", "Admin").await;
        assert_eq!(status, StatusCode::OK, "bootstrap register failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Workspace id of the bootstrap user (first listed workspace).
    pub async fn bootstrap_workspace_id(&self, token: &str) -> Uuid {
        let (body, status) = self.get_auth("/api/v1/admin/workspaces", token).await;
        assert_eq!(status, StatusCode::OK, "list workspaces failed: {body}");
        let id = body.as_array().unwrap()[0]["id"].as_str().unwrap();
        Uuid::parse_str(id).unwrap()
    }

    /// Create a workspace as an investigator, return its JSON.
    pub async fn create_workspace(&self, token: &str, name: &str, slug: &str) -> Value {
        let (body, status) = self
            .post_auth(
                "/api/v1/admin/workspaces",
                token,
                &json!({ "name": name, "slug": slug }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create workspace failed: {body}");
        body
    }

    /// Create a user in a workspace as an investigator, return its JSON.
    pub async fn create_user(&self, token: &str, workspace_id: &str, email: &str) -> Value {
        let (body, status) = self
            .post_auth(
                "/api/v1/admin/users",
                token,
                &json!({
                    "workspace_id": workspace_id,
                    "email": email,
                    "password": "password123",
                    "name": email.split('@').next().unwrap(),
                    "role": "member",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create user failed: {body}");
        body
    }

    /// Login an existing user, return access token.
    pub async fn login_token(&self, email: &str) -> String {
        let (body, status) = self.login(email, "password123").await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Create a document, return its JSON.
    pub async fn create_document(&self, token: &str, title: &str) -> Value {
        let (body, status) = self
            .post_auth(
                "/api/v1/documents",
                token,
                &json!({ "title": title, "body": "lorem" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create document failed: {body}");
        body
    }

    /// Fetch a document, return (body, status).
    pub async fn get_document(&self, token: &str, id: &str) -> (Value, StatusCode) {
        self.get_auth(&format!("/api/v1/documents/{id}"), token).await
    }

    /// Query the audit log as an investigator.
    pub async fn audit_logs(&self, token: &str, query: &str) -> (Value, StatusCode) {
        self.get_auth(&format!("/api/v1/audit-logs?{query}"), token).await
    }

    /// Run chain verification for a workspace.
    pub async fn verify_chain(&self, token: &str, workspace_id: &str) -> (Value, StatusCode) {
        self.post_auth(
            "/api/v1/audit-logs/verify",
            token,
            &json!({ "workspace_id": workspace_id }),
        )
        .await
    }

    /// Make an authenticated GET request.
    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated POST request with JSON body.
    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

/// Spawn a test app with a fresh temporary database.
pub async fn spawn_app() -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    // Create a unique test database
    let db_name = format!("stride_test_{}", Uuid::now_v7().to_string().replace('-', ""));

    // Connect to default postgres DB to create test DB
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    // Connect to test DB and run migrations
    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        trusted_proxies: vec![],
        log_level: "warn".to_string(),
        on_audit_failure: AuditFailurePolicy::FailClosed,
        audit_lock_timeout_ms: 5000,
    };

    let app = stride::build_app(pool.clone(), config);

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        pool,
        client,
        db_name,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
