#![allow(dead_code)]

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use segment_tracker::config::ApiSettings;
use serde::Deserialize;
use serde_json::json;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const ACCESS_TOKEN: &str = "test-access-token";
pub const REFRESH_TOKEN: &str = "test-refresh-token";

/// What the fake API answers for one segment id.
#[derive(Clone)]
pub enum SegmentReply {
    Ok {
        name: &'static str,
        efforts: u64,
        athletes: u64,
    },
    Fail(StatusCode),
}

#[derive(Clone, Default)]
pub struct MockApi {
    pub segments: Arc<Mutex<HashMap<u64, SegmentReply>>>,
    pub token_status: Arc<Mutex<Option<StatusCode>>>,
    pub explore_calls: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockApi {
    pub fn set(&self, id: u64, reply: SegmentReply) {
        self.segments.lock().unwrap().insert(id, reply);
    }

    pub fn fail_token(&self, status: StatusCode) {
        *self.token_status.lock().unwrap() = Some(status);
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub api: MockApi,
}

impl MockServer {
    pub fn token_url(&self) -> String {
        format!("http://{}/oauth/token", self.addr)
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api/v3", self.addr)
    }

    pub fn settings(&self) -> ApiSettings {
        ApiSettings {
            token_url: self.token_url(),
            api_base_url: self.api_base_url(),
            token_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            request_delay: Duration::ZERO,
        }
    }
}

#[derive(Deserialize)]
struct TokenForm {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    grant_type: String,
}

async fn token(State(api): State<MockApi>, Form(form): Form<TokenForm>) -> Response {
    let refused = *api.token_status.lock().unwrap();
    if let Some(status) = refused {
        return (status, "token exchange refused").into_response();
    }
    if form.grant_type != "refresh_token"
        || form.refresh_token != REFRESH_TOKEN
        || form.client_id.is_empty()
        || form.client_secret.is_empty()
    {
        return (StatusCode::BAD_REQUEST, "bad token form").into_response();
    }
    Json(json!({ "access_token": ACCESS_TOKEN, "expires_at": 1_900_000_000_i64 })).into_response()
}

async fn segments(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {ACCESS_TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id == "explore" {
        return explore(&api, params);
    }
    let Ok(id) = id.parse::<u64>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let reply = api.segments.lock().unwrap().get(&id).cloned();
    match reply {
        Some(SegmentReply::Ok {
            name,
            efforts,
            athletes,
        }) => Json(json!({
            "id": id,
            "name": name,
            "effort_count": efforts,
            "athlete_count": athletes,
        }))
        .into_response(),
        Some(SegmentReply::Fail(status)) if status == StatusCode::TOO_MANY_REQUESTS => (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("X-RateLimit-Usage", "101,2000"),
                ("X-RateLimit-Limit", "100,1000"),
            ],
            "slow down",
        )
            .into_response(),
        Some(SegmentReply::Fail(status)) => (status, "upstream failure").into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn explore(api: &MockApi, params: HashMap<String, String>) -> Response {
    api.explore_calls.lock().unwrap().push(params);
    Json(json!({
        "segments": [
            { "id": 11, "name": "Brooklyn Climb", "climb_category": 2, "distance": 1500.5, "avg_grade": 6.1 },
            { "id": 12, "name": "Flat Out", "climb_category": 0, "distance": 800.0, "avg_grade": 0.4 }
        ]
    }))
    .into_response()
}

/// Serves a fake token and segment API on an ephemeral local port.
pub async fn spawn_mock() -> MockServer {
    let api = MockApi::default();
    let app = Router::new()
        .route("/oauth/token", post(token))
        .route("/api/v3/segments/:id", get(segments))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock api");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock api");
    });

    MockServer { addr, api }
}
