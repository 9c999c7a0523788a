use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use nacos_registry::naming::{ClientConfig, NamingClient, NamingClientOptions, ServerConfig};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::task::JoinHandle;

/// Beat interval the mock server hands out to clients, in milliseconds.
pub const BEAT_INTERVAL_MS: u64 = 200;

#[derive(Clone, Debug, PartialEq)]
pub struct MockInstance {
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub healthy: bool,
    pub enabled: bool,
    pub cluster: String,
    pub metadata: HashMap<String, String>,
}

impl MockInstance {
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            weight: 1.0,
            healthy: true,
            enabled: true,
            cluster: String::from("DEFAULT"),
            metadata: HashMap::new(),
        }
    }

    fn to_json(&self, service: &str) -> Value {
        json!({
            "instanceId": format!("{}#{}#{}#{}", self.ip, self.port, self.cluster, service),
            "ip": self.ip,
            "port": self.port,
            "weight": self.weight,
            "healthy": self.healthy,
            "enabled": self.enabled,
            "ephemeral": true,
            "clusterName": self.cluster,
            "serviceName": service,
            "metadata": self.metadata,
        })
    }
}

#[derive(Default, Debug)]
struct NacosState {
    services: HashMap<String, Vec<MockInstance>>,
    beats: HashMap<String, u64>,
    registrations: u64,
    register_attempts: u64,
    beat_delay: Duration,
    reject_status: Option<u16>,
}

type SharedState = Arc<Mutex<NacosState>>;

/// In-process stand-in for the naming server's v1 HTTP API.
pub struct MockNacos {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockNacos {
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(NacosState::default()));

        let app = Router::new()
            .route(
                "/nacos/v1/ns/instance",
                post(register_instance).delete(deregister_instance),
            )
            .route("/nacos/v1/ns/instance/beat", put(beat))
            .route("/nacos/v1/ns/instance/list", get(instance_list))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock naming server error");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new("127.0.0.1", self.addr.port()).with_context_path("/nacos")
    }

    /// Client config of the live setup (cache flags, empty namespace),
    /// with a short beat interval.
    pub fn client_config() -> ClientConfig {
        ClientConfig::builder()
            .with_namespace_id("")
            .with_timeout_ms(5000)
            .with_beat_interval_ms(BEAT_INTERVAL_MS)
            .with_update_cache_when_empty(true)
            .with_not_load_cache_at_start(true)
            .build()
    }

    pub fn naming_client(&self) -> Arc<NamingClient> {
        self.naming_client_with(Self::client_config())
    }

    pub fn naming_client_with(&self, config: ClientConfig) -> Arc<NamingClient> {
        let options = NamingClientOptions::builder()
            .with_server(self.server_config())
            .with_client_config(config)
            .build()
            .expect("Invalid naming client options");
        Arc::new(NamingClient::new(options).expect("Failed to create naming client"))
    }

    pub fn instances(&self, grouped_service: &str) -> Vec<MockInstance> {
        self.state
            .lock()
            .unwrap()
            .services
            .get(grouped_service)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_instance(&self, grouped_service: &str, instance: MockInstance) {
        let mut state = self.state.lock().unwrap();
        let instances = state
            .services
            .entry(grouped_service.to_string())
            .or_default();
        instances.retain(|i| !(i.ip == instance.ip && i.port == instance.port));
        instances.push(instance);
    }

    pub fn set_healthy(&self, grouped_service: &str, port: u16, healthy: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(instances) = state.services.get_mut(grouped_service) {
            instances
                .iter_mut()
                .filter(|i| i.port == port)
                .for_each(|i| i.healthy = healthy);
        }
    }

    /// Drop every instance, as a restarted server would.
    pub fn forget_all(&self) {
        self.state.lock().unwrap().services.clear();
    }

    pub fn beats(&self, grouped_service: &str) -> u64 {
        self.state
            .lock()
            .unwrap()
            .beats
            .get(grouped_service)
            .copied()
            .unwrap_or(0)
    }

    pub fn registrations(&self) -> u64 {
        self.state.lock().unwrap().registrations
    }

    /// Registration requests received, including rejected ones.
    pub fn register_attempts(&self) -> u64 {
        self.state.lock().unwrap().register_attempts
    }

    /// Hold every beat request for `delay` before answering it.
    pub fn set_beat_delay(&self, delay: Duration) {
        self.state.lock().unwrap().beat_delay = delay;
    }

    /// Answer every registration request with `status` instead of registering.
    pub fn reject_registrations(&self, status: u16) {
        self.state.lock().unwrap().reject_status = Some(status);
    }
}

impl Drop for MockNacos {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}

async fn register_instance(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<&'static str, (StatusCode, String)> {
    let metadata: HashMap<String, String> =
        serde_json::from_str(param(&params, "metadata")).unwrap_or_default();
    let instance = MockInstance {
        ip: param(&params, "ip").to_string(),
        port: param(&params, "port").parse().unwrap_or(0),
        weight: param(&params, "weight").parse().unwrap_or(1.0),
        healthy: param(&params, "healthy") != "false",
        enabled: param(&params, "enable") != "false",
        cluster: param(&params, "clusterName").to_string(),
        metadata,
    };

    let mut state = state.lock().unwrap();
    state.register_attempts += 1;
    if let Some(status) = state.reject_status {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
        return Err((status, String::from("caused: rejected;")));
    }

    state.registrations += 1;
    let instances = state
        .services
        .entry(param(&params, "serviceName").to_string())
        .or_default();
    instances.retain(|i| !(i.ip == instance.ip && i.port == instance.port));
    instances.push(instance);
    Ok("ok")
}

async fn deregister_instance(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> &'static str {
    let ip = param(&params, "ip").to_string();
    let port: u16 = param(&params, "port").parse().unwrap_or(0);

    let mut state = state.lock().unwrap();
    if let Some(instances) = state.services.get_mut(param(&params, "serviceName")) {
        instances.retain(|i| !(i.ip == ip && i.port == port));
    }
    "ok"
}

async fn beat(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let service = param(&params, "serviceName").to_string();
    let ip = param(&params, "ip").to_string();
    let port: u16 = param(&params, "port").parse().unwrap_or(0);

    let delay = state.lock().unwrap().beat_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    let known = state
        .services
        .get(&service)
        .map(|instances| instances.iter().any(|i| i.ip == ip && i.port == port))
        .unwrap_or(false);

    if !known {
        return Json(json!({
            "clientBeatInterval": BEAT_INTERVAL_MS,
            "code": 20404,
            "lightBeatEnabled": false,
        }));
    }

    *state.beats.entry(service).or_insert(0) += 1;
    Json(json!({
        "clientBeatInterval": BEAT_INTERVAL_MS,
        "code": 10200,
        "lightBeatEnabled": false,
    }))
}

async fn instance_list(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let service = param(&params, "serviceName").to_string();
    let clusters: Vec<String> = param(&params, "clusters")
        .split(',')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();
    let healthy_only = param(&params, "healthyOnly") == "true";
    let group = service.split("@@").next().unwrap_or("").to_string();

    let state = state.lock().unwrap();
    let hosts: Vec<Value> = state
        .services
        .get(&service)
        .map(|instances| {
            instances
                .iter()
                .filter(|i| clusters.is_empty() || clusters.contains(&i.cluster))
                .filter(|i| !healthy_only || i.healthy)
                .map(|i| i.to_json(&service))
                .collect()
        })
        .unwrap_or_default();

    Json(json!({
        "name": service,
        "groupName": group,
        "clusters": clusters.join(","),
        "cacheMillis": 1000,
        "hosts": hosts,
        "lastRefTime": 0,
        "checksum": "",
        "allIPs": false,
        "reachProtectionThreshold": false,
        "valid": true,
    }))
}
