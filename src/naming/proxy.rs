use crate::common::grouped_service_name;
use crate::naming::{
    common::{Connect, DecodeResponse, HttpRequest, NamingError, SerializeValue},
    config::{ClientConfig, ServerConfig},
    model::{BeatInfo, BeatResponse, Instance, ServiceInfo},
};
use rand::Rng;
use reqwest::{Client, Method};
use snafu::ResultExt;
use std::time::Duration;

const INSTANCE_PATH: &str = "/v1/ns/instance";
const BEAT_PATH: &str = "/v1/ns/instance/beat";
const INSTANCE_LIST_PATH: &str = "/v1/ns/instance/list";

/// Thin client for the naming server's HTTP open API.
/// Requests are spread over the configured servers and fail over on transport
/// errors and 5xx responses.
#[derive(Debug)]
pub struct NamingProxy {
    client: Client,
    servers: Vec<ServerConfig>,
    namespace_id: String,
}

impl NamingProxy {
    pub fn new(servers: Vec<ServerConfig>, config: &ClientConfig) -> Result<Self, NamingError> {
        if servers.is_empty() {
            return Err(NamingError::NoServers {});
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms()))
            .build()
            .context(Connect {})?;

        Ok(Self {
            client,
            servers,
            namespace_id: config.namespace_id().to_string(),
        })
    }

    pub fn namespace_id(&self) -> &str {
        &self.namespace_id
    }

    pub async fn register_service(
        &self,
        service: &str,
        group: &str,
        instance: &Instance,
    ) -> Result<String, NamingError> {
        let service_name = grouped_service_name(service, group);
        tracing::info!(
            "[REGISTER-SERVICE] {} registering service {} with instance {}:{}",
            self.namespace_id,
            service_name,
            instance.ip,
            instance.port
        );

        let metadata = serde_json::to_string(&instance.metadata).context(SerializeValue {})?;
        let params = vec![
            ("namespaceId", self.namespace_id.clone()),
            ("serviceName", service_name),
            ("groupName", group.to_string()),
            ("clusterName", instance.cluster_name.clone()),
            ("ip", instance.ip.clone()),
            ("port", instance.port.to_string()),
            ("weight", instance.weight.to_string()),
            ("enable", instance.enabled.to_string()),
            ("healthy", instance.healthy.to_string()),
            ("ephemeral", instance.ephemeral.to_string()),
            ("metadata", metadata),
        ];

        self.request(Method::POST, INSTANCE_PATH, &params).await
    }

    pub async fn deregister_service(
        &self,
        service: &str,
        group: &str,
        instance: &Instance,
    ) -> Result<String, NamingError> {
        let service_name = grouped_service_name(service, group);
        tracing::info!(
            "[DEREGISTER-SERVICE] {} deregistering service {} with instance {}:{}",
            self.namespace_id,
            service_name,
            instance.ip,
            instance.port
        );

        let params = vec![
            ("namespaceId", self.namespace_id.clone()),
            ("serviceName", service_name),
            ("groupName", group.to_string()),
            ("clusterName", instance.cluster_name.clone()),
            ("ip", instance.ip.clone()),
            ("port", instance.port.to_string()),
            ("ephemeral", instance.ephemeral.to_string()),
        ];

        self.request(Method::DELETE, INSTANCE_PATH, &params).await
    }

    pub async fn send_beat(&self, beat: &BeatInfo, group: &str) -> Result<BeatResponse, NamingError> {
        let service_name = grouped_service_name(&beat.service_name, group);
        tracing::trace!(
            "[BEAT] {} sending beat to server: {}:{}",
            self.namespace_id,
            beat.ip,
            beat.port
        );

        let payload = serde_json::to_string(beat).context(SerializeValue {})?;
        let params = vec![
            ("namespaceId", self.namespace_id.clone()),
            ("serviceName", service_name),
            ("clusterName", beat.cluster.clone()),
            ("ip", beat.ip.clone()),
            ("port", beat.port.to_string()),
            ("beat", payload),
        ];

        let body = self.request(Method::PUT, BEAT_PATH, &params).await?;
        serde_json::from_str(&body).context(DecodeResponse { url: BEAT_PATH })
    }

    pub async fn query_list(
        &self,
        service: &str,
        group: &str,
        clusters: &[String],
        healthy_only: bool,
    ) -> Result<ServiceInfo, NamingError> {
        let params = vec![
            ("namespaceId", self.namespace_id.clone()),
            ("serviceName", grouped_service_name(service, group)),
            ("clusters", clusters.join(",")),
            ("healthyOnly", healthy_only.to_string()),
        ];

        let body = self.request(Method::GET, INSTANCE_LIST_PATH, &params).await?;
        serde_json::from_str(&body).context(DecodeResponse {
            url: INSTANCE_LIST_PATH,
        })
    }

    /// Send the request to the servers one by one, starting at a random one.
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<String, NamingError> {
        let start = if self.servers.len() > 1 {
            rand::thread_rng().gen_range(0..self.servers.len())
        } else {
            0
        };

        let mut last_error = NamingError::NoServers {};
        for i in 0..self.servers.len() {
            let server = &self.servers[(start + i) % self.servers.len()];
            match self.call_server(server, method.clone(), path, params).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retriable() => {
                    tracing::warn!(
                        "Request {} {} to naming server {}:{} failed, trying next server: {}",
                        method,
                        path,
                        server.ip_addr(),
                        server.port(),
                        e
                    );
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    async fn call_server(
        &self,
        server: &ServerConfig,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<String, NamingError> {
        let url = format!("{}{}", server.base_url(), path);

        let response = self
            .client
            .request(method, &url)
            .query(params)
            .send()
            .await
            .context(HttpRequest { url: url.clone() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context(HttpRequest { url: url.clone() })?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(NamingError::HttpStatus {
                url,
                status: status.as_u16(),
                body,
            })
        }
    }
}
