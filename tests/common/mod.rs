#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use backoffice_ledger::{
    auth::{Actor, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    build_router,
    config::AppConfig,
    db,
    entities::{lead, product, raw_material},
    events::{self, EventSender},
    services::{CreateLeadInput, NewProduct, NewRawMaterial},
    AppState,
};

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub manager: Actor,
    pub staff: Actor,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_idle_timeout_secs = 3_600;
        Self::with_config(cfg).await
    }

    /// Construct a test application against whatever database `cfg` names.
    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            manager: Actor::manager(Uuid::new_v4()),
            staff: Actor::staff(Uuid::new_v4()),
            _event_task: event_task,
        }
    }

    /// Send a request against the router, identifying as `actor` when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&Actor>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(actor) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, actor.id.to_string())
                .header(ACTOR_ROLE_HEADER, actor.role.to_string());
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_material(&self, name: &str, quantity: Decimal) -> raw_material::Model {
        self.state
            .services
            .stock
            .register_material(NewRawMaterial {
                name: name.to_string(),
                unit: "kg".to_string(),
                opening_quantity: quantity,
            })
            .await
            .expect("seed raw material")
    }

    pub async fn seed_product(&self, name: &str, stock: Decimal) -> product::Model {
        self.state
            .services
            .stock
            .register_product(NewProduct {
                name: name.to_string(),
                category_id: None,
                opening_stock: stock,
                price: Decimal::new(1999, 2),
            })
            .await
            .expect("seed product")
    }

    /// A lead owned by `owner` (assigned to them when staff).
    pub async fn seed_lead(&self, name: &str, owner: &Actor) -> lead::Model {
        self.state
            .services
            .leads
            .create_lead(
                CreateLeadInput {
                    full_name: name.to_string(),
                    phone: Some("+91 98765 43210".to_string()),
                    email: Some("buyer@example.com".to_string()),
                    company: Some("Acme Traders".to_string()),
                    lead_status: "NEW".to_string(),
                    assigned_to: None,
                    remark: None,
                },
                owner,
            )
            .await
            .expect("seed lead")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}
