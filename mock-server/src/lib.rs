//! In-memory stand-in for the KraftCloud API.
//!
//! Speaks the envelope protocol for instances, volumes and user quotas under
//! `/v1`. Every request must carry `Authorization: Bearer <token>`.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const ERR_NOT_FOUND: i64 = 6;
pub const ERR_QUOTA: i64 = 7;
pub const ERR_ALREADY_EXISTS: i64 = 8;

/// Instances a single user may hold.
pub const INSTANCE_QUOTA: usize = 16;

#[derive(Clone, Debug, Serialize)]
pub struct Instance {
    pub uuid: Uuid,
    pub name: String,
    pub image: String,
    pub memory_mb: u64,
    pub state: String,
    pub fqdn: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Volume {
    pub uuid: Uuid,
    pub name: String,
    pub size_mb: u64,
    pub state: String,
}

#[derive(Deserialize)]
pub struct CreateInstance {
    pub name: Option<String>,
    pub image: String,
    pub memory_mb: Option<u64>,
    pub autostart: Option<bool>,
}

#[derive(Deserialize)]
pub struct CreateVolume {
    pub name: Option<String>,
    pub size_mb: u64,
}

/// `{"uuid": ...}` or `{"name": ...}` request item.
#[derive(Deserialize)]
pub struct IdRef {
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
}

#[derive(Default)]
pub struct Db {
    pub instances: HashMap<Uuid, Instance>,
    pub volumes: HashMap<Uuid, Volume>,
}

#[derive(Clone)]
pub struct AppState {
    pub token: Arc<str>,
    pub db: Arc<RwLock<Db>>,
}

pub fn app(token: &str) -> Router {
    let state = AppState {
        token: Arc::from(token),
        db: Arc::new(RwLock::new(Db::default())),
    };
    Router::new()
        .route(
            "/v1/instances",
            get(get_instances).post(create_instance).delete(delete_instances),
        )
        .route("/v1/instances/list", get(list_instances))
        .route("/v1/instances/start", put(start_instances))
        .route("/v1/instances/stop", put(stop_instances))
        .route(
            "/v1/volumes",
            get(get_volumes).post(create_volume).delete(delete_volumes),
        )
        .route("/v1/volumes/list", get(list_volumes))
        .route("/v1/users/quotas", get(quotas))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run(listener: TcpListener, token: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(token)).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    debug!(method = %request.method(), uri = %request.uri(), "mock request");
    next.run(request).await
}

/// Wrap items under `data.<key>`, deriving the envelope status from the
/// per-item statuses.
fn envelope(key: &str, items: Vec<Value>) -> Json<Value> {
    let failed = items.iter().filter(|i| i["status"] == "error").count();
    let (status, message) = match failed {
        0 => ("success", None),
        n if n == items.len() => ("error", Some("Failed to perform all operations")),
        _ => ("partial_success", Some("Failed to perform some operations")),
    };
    let mut body = json!({ "status": status, "data": { key: items } });
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    Json(body)
}

fn item_error(id: &IdRef, message: &str, code: i64) -> Value {
    let mut item = json!({ "status": "error", "message": message, "error": code });
    if let Some(uuid) = id.uuid {
        item["uuid"] = json!(uuid);
    }
    if let Some(name) = &id.name {
        item["name"] = json!(name);
    }
    item
}

fn instance_item(instance: &Instance) -> Value {
    json!({
        "status": "success",
        "uuid": instance.uuid,
        "name": instance.name,
        "image": instance.image,
        "memory_mb": instance.memory_mb,
        "state": instance.state,
        "fqdn": instance.fqdn,
    })
}

fn volume_item(volume: &Volume) -> Value {
    json!({
        "status": "success",
        "uuid": volume.uuid,
        "name": volume.name,
        "size_mb": volume.size_mb,
        "state": volume.state,
    })
}

fn find<'a, T>(map: &'a HashMap<Uuid, T>, id: &IdRef, name_of: impl Fn(&T) -> &str) -> Option<&'a T> {
    match (&id.uuid, &id.name) {
        (Some(uuid), _) => map.get(uuid),
        (None, Some(name)) => map.values().find(|v| name_of(v) == name),
        (None, None) => None,
    }
}

fn find_key<T>(map: &HashMap<Uuid, T>, id: &IdRef, name_of: impl Fn(&T) -> &str) -> Option<Uuid> {
    match (&id.uuid, &id.name) {
        (Some(uuid), _) => map.contains_key(uuid).then_some(*uuid),
        (None, Some(name)) => map
            .iter()
            .find(|(_, v)| name_of(v) == name)
            .map(|(k, _)| *k),
        (None, None) => None,
    }
}

// --- instances ---

async fn create_instance(State(state): State<AppState>, Json(input): Json<CreateInstance>) -> Json<Value> {
    let mut db = state.db.write().await;
    let name = input
        .name
        .unwrap_or_else(|| format!("instance-{}", &Uuid::new_v4().simple().to_string()[..8]));
    let id = IdRef {
        uuid: None,
        name: Some(name.clone()),
    };
    if db.instances.values().any(|i| i.name == name) {
        return envelope("instances", vec![item_error(&id, "instance already exists", ERR_ALREADY_EXISTS)]);
    }
    if db.instances.len() >= INSTANCE_QUOTA {
        return envelope("instances", vec![item_error(&id, "quota exceeded", ERR_QUOTA)]);
    }
    let instance = Instance {
        uuid: Uuid::new_v4(),
        fqdn: format!("{name}.mock.kraft.host."),
        name,
        image: input.image,
        memory_mb: input.memory_mb.unwrap_or(128),
        state: if input.autostart.unwrap_or(true) {
            "running".to_string()
        } else {
            "stopped".to_string()
        },
    };
    let item = instance_item(&instance);
    db.instances.insert(instance.uuid, instance);
    envelope("instances", vec![item])
}

async fn get_instances(State(state): State<AppState>, Json(ids): Json<Vec<IdRef>>) -> Json<Value> {
    let db = state.db.read().await;
    let items = ids
        .iter()
        .map(|id| match find(&db.instances, id, |i| i.name.as_str()) {
            Some(instance) => instance_item(instance),
            None => item_error(id, "instance not found", ERR_NOT_FOUND),
        })
        .collect();
    envelope("instances", items)
}

async fn list_instances(State(state): State<AppState>) -> Json<Value> {
    let db = state.db.read().await;
    let mut instances: Vec<&Instance> = db.instances.values().collect();
    instances.sort_by(|a, b| a.name.cmp(&b.name));
    let items = instances
        .into_iter()
        .map(|i| json!({ "status": "success", "uuid": i.uuid, "name": i.name }))
        .collect();
    envelope("instances", items)
}

async fn delete_instances(State(state): State<AppState>, Json(ids): Json<Vec<IdRef>>) -> Json<Value> {
    let mut db = state.db.write().await;
    let items = ids
        .iter()
        .map(|id| match find_key(&db.instances, id, |i| i.name.as_str()) {
            Some(key) => match db.instances.remove(&key) {
                Some(instance) => json!({ "status": "success", "uuid": instance.uuid, "name": instance.name }),
                None => item_error(id, "instance not found", ERR_NOT_FOUND),
            },
            None => item_error(id, "instance not found", ERR_NOT_FOUND),
        })
        .collect();
    envelope("instances", items)
}

async fn set_instance_state(state: &AppState, ids: &[IdRef], target: &str) -> Json<Value> {
    let mut db = state.db.write().await;
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        let item = match find_key(&db.instances, id, |i| i.name.as_str()).and_then(|k| db.instances.get_mut(&k)) {
            Some(instance) => {
                instance.state = target.to_string();
                instance_item(instance)
            }
            None => item_error(id, "instance not found", ERR_NOT_FOUND),
        };
        items.push(item);
    }
    envelope("instances", items)
}

async fn start_instances(State(state): State<AppState>, Json(ids): Json<Vec<IdRef>>) -> Json<Value> {
    set_instance_state(&state, &ids, "running").await
}

async fn stop_instances(State(state): State<AppState>, Json(ids): Json<Vec<IdRef>>) -> Json<Value> {
    set_instance_state(&state, &ids, "stopped").await
}

// --- volumes ---

async fn create_volume(
    State(state): State<AppState>,
    Json(input): Json<CreateVolume>,
) -> Result<Json<Value>, (StatusCode, &'static str)> {
    if input.size_mb == 0 {
        return Err((StatusCode::BAD_REQUEST, "Bad Request"));
    }
    let mut db = state.db.write().await;
    let volume = Volume {
        uuid: Uuid::new_v4(),
        name: input
            .name
            .unwrap_or_else(|| format!("volume-{}", db.volumes.len() + 1)),
        size_mb: input.size_mb,
        state: "available".to_string(),
    };
    let item = volume_item(&volume);
    db.volumes.insert(volume.uuid, volume);
    Ok(envelope("volumes", vec![item]))
}

async fn get_volumes(State(state): State<AppState>, Json(ids): Json<Vec<IdRef>>) -> Json<Value> {
    let db = state.db.read().await;
    let items = ids
        .iter()
        .map(|id| match find(&db.volumes, id, |v| v.name.as_str()) {
            Some(volume) => volume_item(volume),
            None => item_error(id, "volume not found", ERR_NOT_FOUND),
        })
        .collect();
    envelope("volumes", items)
}

async fn list_volumes(State(state): State<AppState>) -> Json<Value> {
    let db = state.db.read().await;
    let items = db.volumes.values().map(volume_item).collect();
    envelope("volumes", items)
}

async fn delete_volumes(State(state): State<AppState>, Json(ids): Json<Vec<IdRef>>) -> Json<Value> {
    let mut db = state.db.write().await;
    let items = ids
        .iter()
        .map(|id| match find_key(&db.volumes, id, |v| v.name.as_str()).and_then(|k| db.volumes.remove(&k)) {
            Some(volume) => json!({ "status": "success", "uuid": volume.uuid, "name": volume.name }),
            None => item_error(id, "volume not found", ERR_NOT_FOUND),
        })
        .collect();
    envelope("volumes", items)
}

// --- users ---

async fn quotas(State(state): State<AppState>) -> Json<Value> {
    let db = state.db.read().await;
    let live: Vec<&Instance> = db.instances.values().filter(|i| i.state == "running").collect();
    let item = json!({
        "status": "success",
        "uuid": Uuid::nil(),
        "used": {
            "instances": db.instances.len(),
            "live_instances": live.len(),
            "live_memory_mb": live.iter().map(|i| i.memory_mb).sum::<u64>(),
            "volumes": db.volumes.len(),
            "total_volume_mb": db.volumes.values().map(|v| v.size_mb).sum::<u64>(),
        },
        "hard": { "instances": INSTANCE_QUOTA },
        "limits": { "min_memory_mb": 16, "max_memory_mb": 4096 },
    });
    envelope("quotas", vec![item])
}
