//! Registry HTTP server.
//!
//! Provides:
//! - `/v1/cover/init` - start a new collection round
//! - `/v1/cover/register` - register an instance
//! - `/v1/cover/list` - registered services
//! - `/v1/cover/profile` - merged profile of the selected instances
//! - `/v1/cover/clear` - reset counters of the selected instances
//! - `/v1/cover/remove` - deregister instances

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, Extensions, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::cover::profile::merge_profiles;
use crate::cover::store::{MemoryStore, ServiceMap, ServiceUnderTest, Store, StoreError};
use crate::cover::{
    ProfileParam, COVER_INIT_SYSTEM_API, COVER_PROFILE_API, COVER_PROFILE_CLEAR_API,
    COVER_REGISTER_SERVICE_API, COVER_SERVICES_LIST_API, COVER_SERVICES_REMOVE_API,
};

const INSTANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct ServerState {
    /// Registered instances.
    pub store: Arc<dyn Store>,
    /// Client used to reach instance coverage endpoints.
    client: reqwest::Client,
}

impl ServerState {
    pub fn new(store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(INSTANCE_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(ServerState { store, client })
    }

    /// State backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> anyhow::Result<Self> {
        ServerState::new(Arc::new(MemoryStore::new()))
    }
}

/// Create the registry router.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route(COVER_INIT_SYSTEM_API, post(init_system))
        .route(COVER_REGISTER_SERVICE_API, post(register_service))
        .route(COVER_SERVICES_LIST_API, get(list_services))
        .route(COVER_PROFILE_API, post(profile))
        .route(COVER_PROFILE_CLEAR_API, post(clear))
        .route(COVER_SERVICES_REMOVE_API, post(remove_services))
        .with_state(Arc::new(state))
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

async fn init_system(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.store.init();
    info!("registry reset");
    Json(json!({ "result": "success" }))
}

async fn list_services(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.store.get_all())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisterQuery {
    name: String,
    address: String,
    ip_revise: String,
}

/// Replace the host of `address` by `peer` when they differ.
///
/// Only IPv4 peers are substituted.
fn revise_address(address: &Url, peer: IpAddr) -> Option<String> {
    if !peer.is_ipv4() || address.host_str() == Some(peer.to_string().as_str()) {
        return None;
    }
    let mut revised = address.clone();
    revised.set_ip_host(peer).ok()?;
    Some(revised.as_str().trim_end_matches('/').to_string())
}

async fn register_service(
    State(state): State<Arc<ServerState>>,
    extensions: Extensions,
    Query(query): Query<RegisterQuery>,
) -> Response {
    if query.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid service name");
    }
    let address = match Url::parse(&query.address) {
        Ok(url) if url.host_str().is_some() && url.port_or_known_default().is_some() => url,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, format!("missing host or port in address `{}`", query.address)),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid address `{}`: {}", query.address, e)),
    };

    let mut service = ServiceUnderTest {
        name: query.name,
        address: query.address,
    };
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    if let (true, Some(peer)) = (query.ip_revise == "true", peer) {
        if let Some(revised) = revise_address(&address, peer) {
            info!(
                "the registered host of service {} differs from the real one {}, using {}",
                service.name, peer, revised
            );
            service.address = revised;
        }
    }

    match state.store.add(&service) {
        Ok(()) | Err(StoreError::AlreadyRegistered) => Json(json!({ "result": "success" })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Addresses selected by `param`, each listed once.
///
/// Unknown names and addresses are an error unless `force` is set.
fn filter_addresses(param: &ProfileParam, force: bool, all: &ServiceMap) -> Result<Vec<String>, String> {
    if param.is_ambiguous() {
        return Err("use 'service' flag and 'address' flag at the same time may cause ambiguity, please use them separately".to_string());
    }
    let known: Vec<&String> = all.values().flatten().collect();

    let mut selected = Vec::new();
    if param.service.is_empty() && param.address.is_empty() {
        selected.extend(known.iter().map(|a| a.to_string()));
    }
    for name in &param.service {
        match all.get(name) {
            Some(addrs) => selected.extend(addrs.iter().cloned()),
            None if force => warn!("service [{}] not found", name),
            None => return Err(format!("service [{}] not found", name)),
        }
    }
    for addr in &param.address {
        if known.contains(&addr) {
            selected.push(addr.clone());
        } else if force {
            warn!("address [{}] not found", addr);
        } else {
            return Err(format!("address [{}] not found", addr));
        }
    }

    let mut seen = HashSet::new();
    selected.retain(|addr| seen.insert(addr.clone()));
    Ok(selected)
}

fn selected_addresses(state: &ServerState, param: &ProfileParam) -> Result<Vec<String>, Response> {
    let selected = filter_addresses(param, param.force, &state.store.get_all())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
    if selected.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no service found"));
    }
    Ok(selected)
}

/// POST `api` on one instance and return its body.
async fn call_instance(state: &ServerState, address: &str, api: &str) -> anyhow::Result<String> {
    let url = format!("{}{}", address.trim_end_matches('/'), api);
    let response = state
        .client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .body("{}")
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;
    let status = response.status();
    let body = response.text().await.with_context(|| format!("failed to read {}", url))?;
    if !status.is_success() {
        anyhow::bail!("{} responded {}: {}", url, status, body);
    }
    Ok(body)
}

async fn profile(State(state): State<Arc<ServerState>>, Json(param): Json<ProfileParam>) -> Response {
    let selected = match selected_addresses(&state, &param) {
        Ok(selected) => selected,
        Err(response) => return response,
    };

    let mut profiles = Vec::new();
    for addr in &selected {
        match call_instance(&state, addr, COVER_PROFILE_API).await {
            Ok(body) => profiles.push(body),
            Err(e) if param.force => warn!("skipping {}: {:#}", addr, e),
            Err(e) => return error_response(StatusCode::EXPECTATION_FAILED, format!("{:#}", e)),
        }
    }

    match merge_profiles(&profiles) {
        Ok(Some(merged)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            merged.to_string(),
        )
            .into_response(),
        Ok(None) => error_response(StatusCode::EXPECTATION_FAILED, "no profiles"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn clear(State(state): State<Arc<ServerState>>, Json(param): Json<ProfileParam>) -> Response {
    let selected = match selected_addresses(&state, &param) {
        Ok(selected) => selected,
        Err(response) => return response,
    };

    let mut out = String::new();
    for addr in &selected {
        match call_instance(&state, addr, COVER_PROFILE_CLEAR_API).await {
            Ok(body) => out.push_str(&format!("Register service {} coverage counter {}\n", addr, body.trim_end())),
            Err(e) => return error_response(StatusCode::EXPECTATION_FAILED, format!("{:#}", e)),
        }
    }
    out.into_response()
}

async fn remove_services(State(state): State<Arc<ServerState>>, Json(param): Json<ProfileParam>) -> Response {
    let selected = match filter_addresses(&param, true, &state.store.get_all()) {
        Ok(selected) => selected,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let mut out = String::new();
    for addr in &selected {
        if let Err(e) = state.store.remove(addr) {
            return error_response(StatusCode::EXPECTATION_FAILED, e);
        }
        out.push_str(&format!("Register service {} removed from the center.\n", addr));
    }
    out.into_response()
}

/// Serve the registry on an already bound listener until it fails.
pub async fn serve(listener: tokio::net::TcpListener, state: ServerState) -> std::io::Result<()> {
    let router = create_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

/// Bind `addr` and serve the registry.
pub async fn start_server(addr: SocketAddr, state: ServerState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("coverage registry listening on {}", listener.local_addr()?);
    serve(listener, state).await.context("registry server failed")
}

/// Run an in-memory registry on a background thread.
///
/// Returns the bound address once the listener is ready.
pub fn spawn_background(addr: SocketAddr) -> anyhow::Result<SocketAddr> {
    let listener = std::net::TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
    listener.set_nonblocking(true)?;
    let local = listener.local_addr()?;
    let state = ServerState::in_memory()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    std::thread::Builder::new()
        .name("coverscope-registry".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let result = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => serve(listener, state).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    tracing::error!("registry server stopped: {}", e);
                }
            })
        })
        .context("failed to spawn registry thread")?;

    info!("coverage registry started: http://{}", local);
    Ok(local)
}
