#![allow(dead_code)]

use estimating_service::config::{
    DatabaseConfig, Edition, EstimatingConfig, StorageBackend,
};
use estimating_service::startup::Application;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;

pub const TEST_USER_ID: &str = "test_user_123";
pub const OTHER_USER_ID: &str = "other_user_456";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_edition(Edition::Extended).await
    }

    pub async fn spawn_with_edition(edition: Edition) -> Self {
        let config = EstimatingConfig {
            common: CoreConfig {
                host: std::net::Ipv4Addr::LOCALHOST.into(),
                port: 0,
            },
            service_name: "estimating-service-test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: None,
                max_connections: 1,
                min_connections: 0,
            },
            edition,
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    fn as_user(&self, builder: RequestBuilder, user: &str) -> RequestBuilder {
        builder.header("X-User-ID", user)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.get_as(path, TEST_USER_ID).await
    }

    pub async fn get_as(&self, path: &str, user: &str) -> Response {
        self.as_user(self.client.get(self.url(path)), user)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.post_as(path, body, TEST_USER_ID).await
    }

    pub async fn post_as(&self, path: &str, body: Value, user: &str) -> Response {
        self.as_user(self.client.post(self.url(path)), user)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, body: Value) -> Response {
        self.as_user(self.client.patch(self.url(path)), TEST_USER_ID)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.as_user(self.client.delete(self.url(path)), TEST_USER_ID)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// POST expecting 201 and returning the JSON body.
    pub async fn create(&self, path: &str, body: Value) -> Value {
        let response = self.post(path, body).await;
        let status = response.status();
        let body: Value = response.json().await.expect("Response was not JSON");
        assert_eq!(status, StatusCode::CREATED, "POST {} failed: {}", path, body);
        body
    }

    pub async fn create_project(&self, name: &str) -> String {
        let project = self.create("/projects", json!({ "name": name })).await;
        id(&project, "project_id")
    }

    /// Estimate with general costs 5%, profit 10%, risk 0%, VAT 21%.
    pub async fn create_estimate(&self, project_id: &str, name: &str) -> String {
        let estimate = self
            .create(
                &format!("/projects/{}/estimates", project_id),
                json!({
                    "name": name,
                    "general_costs_percent": "5",
                    "profit_percent": "10",
                    "risk_percent": "0",
                    "vat_percent": "21"
                }),
            )
            .await;
        id(&estimate, "estimate_id")
    }

    pub async fn create_chapter(&self, estimate_id: &str, code: &str, name: &str) -> String {
        let chapter = self
            .create(
                &format!("/estimates/{}/chapters", estimate_id),
                json!({ "code": code, "name": name }),
            )
            .await;
        id(&chapter, "chapter_id")
    }

    /// Adds a line and returns the full `{ line, estimate }` response.
    pub async fn add_line(&self, estimate_id: &str, line: Value) -> Value {
        self.create(&format!("/estimates/{}/lines", estimate_id), line)
            .await
    }

    pub async fn estimate_tree(&self, estimate_id: &str) -> Value {
        let response = self.get(&format!("/estimates/{}", estimate_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.expect("Response was not JSON")
    }
}

pub fn id(value: &Value, field: &str) -> String {
    value[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing {} in {}", field, value))
        .to_string()
}

/// Decimal fields serialize as strings; compare them numerically.
pub fn amount(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().unwrap_or_else(|_| panic!("not a number: {}", s)),
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        other => panic!("not an amount: {}", other),
    }
}

pub fn assert_amount(value: &Value, expected: f64) {
    let actual = amount(value);
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
