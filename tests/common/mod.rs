//! Shared harness: an in-process router over a temp-dir database.

#![allow(dead_code)]

use std::sync::Arc;

use ats::auth::TokenHasher;
use ats::server::{AppState, create_router};
use ats::store::{AccessTokenRepository, AssetRepository, SqliteStore};
use ats::types::{Asset, NewAsset};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestServer {
    pub temp_dir: TempDir,
    pub router: Router,
    pub store: Arc<SqliteStore>,
}

impl TestServer {
    /// A server with no access tokens, so every request is admitted.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SqliteStore::new(temp_dir.path().join("ats.db")).expect("open store");
        store.initialize().expect("initialize schema");

        let store = Arc::new(store);
        let router = create_router(Arc::new(AppState::new(Arc::clone(&store))));

        Self {
            temp_dir,
            router,
            store,
        }
    }

    /// Issues a token and returns the raw bearer string. `expires_at`
    /// overrides the default lifetime.
    pub fn issue_token(&self, expires_at: Option<DateTime<Utc>>) -> String {
        let mut issued = TokenHasher::new().issue(Utc::now()).expect("issue token");
        if expires_at.is_some() {
            issued.record.expires_at = expires_at;
        }

        self.store
            .unit_of_work(|uow| uow.access_tokens().create(&issued.record))
            .expect("store token");

        issued.raw
    }

    /// Inserts the fixture used by most tests: one live and one tombstoned asset.
    pub fn seed_basic_data(&self) -> (Asset, Asset) {
        self.store
            .unit_of_work(|uow| {
                let assets = uow.assets();
                let live = assets.create(&NewAsset::new(
                    "Test asset",
                    serde_json::json!({"host": "localhost"}),
                ))?;
                let deleted = assets.create(&NewAsset::new(
                    "Test deleted asset",
                    serde_json::json!({}),
                ))?;
                let deleted = assets.delete(&deleted)?;
                Ok((live, deleted))
            })
            .expect("seed assets")
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        (status, body_json)
    }
}
