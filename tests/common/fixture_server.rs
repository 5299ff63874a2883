//! In-process HTTP server standing in for the partition source, the object
//! storage API and the warehouse API.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub const TOKEN: &str = "fixture-token";

#[derive(Default)]
pub struct FixtureState {
    /// Source files served under `/seeds/{file}`
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Status to answer GET with, and how many more times
    get_failures: Mutex<HashMap<String, (StatusCode, u32)>>,
    /// Body sent along with a failed GET
    failure_bodies: Mutex<HashMap<String, Vec<u8>>>,
    /// Every request as `METHOD path`
    hits: Mutex<Vec<String>>,
    /// Uploaded objects keyed by `bucket/name`
    objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Warehouse tables keyed by `project.dataset.table`
    tables: Mutex<HashMap<String, Value>>,
    /// Status forced on every storage or warehouse call
    forced_status: Mutex<Option<StatusCode>>,
}

pub struct FixtureServer {
    pub addr: SocketAddr,
    pub state: Arc<FixtureState>,
}

impl FixtureServer {
    pub async fn start() -> Self {
        let state = Arc::new(FixtureState::default());
        let app = Router::new()
            .route("/seeds/:file", get(serve_seed))
            .route("/upload/storage/v1/b/:bucket/o", post(upload_object))
            .route(
                "/bigquery/v2/projects/:project/datasets/:dataset/tables",
                post(insert_table),
            )
            .route(
                "/bigquery/v2/projects/:project/datasets/:dataset/tables/:table",
                get(get_table).patch(patch_table),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn serve_file(&self, name: &str, contents: impl Into<Vec<u8>>) {
        self.state
            .files
            .lock()
            .insert(name.to_string(), contents.into());
    }

    /// Answer the next `times` GETs of `name` with `status`
    pub fn fail_gets(&self, name: &str, status: StatusCode, times: u32) {
        self.state
            .get_failures
            .lock()
            .insert(name.to_string(), (status, times));
    }

    /// Like [`fail_gets`](Self::fail_gets), answering with `body` as well
    pub fn fail_gets_with_body(
        &self,
        name: &str,
        status: StatusCode,
        times: u32,
        body: impl Into<Vec<u8>>,
    ) {
        self.fail_gets(name, status, times);
        self.state
            .failure_bodies
            .lock()
            .insert(name.to_string(), body.into());
    }

    pub fn force_status(&self, status: StatusCode) {
        *self.state.forced_status.lock() = Some(status);
    }

    pub fn hits(&self) -> Vec<String> {
        self.state.hits.lock().clone()
    }

    pub fn hits_matching(&self, prefix: &str) -> usize {
        self.hits().iter().filter(|hit| hit.starts_with(prefix)).count()
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().get(&format!("{bucket}/{name}")).cloned()
    }

    pub fn table(&self, qualified: &str) -> Option<Value> {
        self.state.tables.lock().get(qualified).cloned()
    }

    pub fn seed_table(&self, qualified: &str, resource: Value) {
        self.state
            .tables
            .lock()
            .insert(qualified.to_string(), resource);
    }
}

fn record(state: &FixtureState, method: &Method, path: &str) {
    state.hits.lock().push(format!("{method} {path}"));
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

/// Forced status or missing token short-circuit every cloud API call
fn cloud_guard(state: &FixtureState, headers: &HeaderMap) -> Option<Response> {
    if let Some(status) = *state.forced_status.lock() {
        return Some(status.into_response());
    }
    if !authorized(headers) {
        return Some(StatusCode::UNAUTHORIZED.into_response());
    }
    None
}

async fn serve_seed(
    State(state): State<Arc<FixtureState>>,
    method: Method,
    Path(file): Path<String>,
) -> Response {
    record(&state, &method, &format!("/seeds/{file}"));

    if method == Method::GET {
        let mut failures = state.get_failures.lock();
        if let Some((status, remaining)) = failures.get_mut(&file) {
            if *remaining > 0 {
                *remaining -= 1;
                let body = state
                    .failure_bodies
                    .lock()
                    .get(&file)
                    .cloned()
                    .unwrap_or_default();
                return (*status, body).into_response();
            }
        }
    }

    match state.files.lock().get(&file) {
        Some(contents) => (StatusCode::OK, contents.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn upload_object(
    State(state): State<Arc<FixtureState>>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &Method::POST, &format!("/upload/{bucket}"));
    if let Some(response) = cloud_guard(&state, &headers) {
        return response;
    }

    let Some(name) = query.get("name") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    state
        .objects
        .lock()
        .insert(format!("{bucket}/{name}"), body.to_vec());
    Json(serde_json::json!({ "bucket": bucket, "name": name })).into_response()
}

fn qualified(resource: &Value) -> Option<String> {
    let reference = resource.get("tableReference")?;
    Some(format!(
        "{}.{}.{}",
        reference.get("projectId")?.as_str()?,
        reference.get("datasetId")?.as_str()?,
        reference.get("tableId")?.as_str()?
    ))
}

async fn insert_table(
    State(state): State<Arc<FixtureState>>,
    headers: HeaderMap,
    Json(mut resource): Json<Value>,
) -> Response {
    record(&state, &Method::POST, "/tables");
    if let Some(response) = cloud_guard(&state, &headers) {
        return response;
    }

    let Some(key) = qualified(&resource) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let mut tables = state.tables.lock();
    if tables.contains_key(&key) {
        return StatusCode::CONFLICT.into_response();
    }
    resource["type"] = Value::from("EXTERNAL");
    tables.insert(key, resource.clone());
    Json(resource).into_response()
}

async fn get_table(
    State(state): State<Arc<FixtureState>>,
    Path((project, dataset, table)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    record(&state, &Method::GET, "/tables");
    if let Some(response) = cloud_guard(&state, &headers) {
        return response;
    }

    match state
        .tables
        .lock()
        .get(&format!("{project}.{dataset}.{table}"))
    {
        Some(resource) => Json(resource.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn patch_table(
    State(state): State<Arc<FixtureState>>,
    Path((project, dataset, table)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Response {
    record(&state, &Method::PATCH, "/tables");
    if let Some(response) = cloud_guard(&state, &headers) {
        return response;
    }

    let mut tables = state.tables.lock();
    let Some(resource) = tables.get_mut(&format!("{project}.{dataset}.{table}")) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(external) = patch.get("externalDataConfiguration") {
        resource["externalDataConfiguration"] = external.clone();
    }
    Json(resource.clone()).into_response()
}
