use crate::naming::common::{
    DEFAULT_BEAT_INTERVAL_MS, DEFAULT_CONTEXT_PATH, DEFAULT_SERVER_PORT, DEFAULT_TIMEOUT_MS,
};
use crate::RegistryError;
use std::path::PathBuf;

/// Address of a single naming server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    ip_addr: String,
    port: u16,
    context_path: String,
    scheme: String,
}

impl ServerConfig {
    pub fn new(ip_addr: impl Into<String>, port: u16) -> Self {
        Self {
            ip_addr: ip_addr.into(),
            port,
            context_path: String::from(DEFAULT_CONTEXT_PATH),
            scheme: String::from("http"),
        }
    }

    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn ip_addr(&self) -> &str {
        &self.ip_addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// `scheme://ip:port/context`, without a trailing slash.
    pub fn base_url(&self) -> String {
        let path = self.context_path.trim_end_matches('/');
        let path = if path.is_empty() || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("{}://{}:{}{}", self.scheme, self.ip_addr, self.port, path)
    }
}

/// Client-side behaviour of the naming client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    namespace_id: String,
    timeout_ms: u64,
    beat_interval_ms: u64,
    update_cache_when_empty: bool,
    not_load_cache_at_start: bool,
    cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace_id: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            beat_interval_ms: DEFAULT_BEAT_INTERVAL_MS,
            update_cache_when_empty: false,
            not_load_cache_at_start: false,
            cache_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn namespace_id(&self) -> &str {
        &self.namespace_id
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn beat_interval_ms(&self) -> u64 {
        self.beat_interval_ms
    }

    pub fn update_cache_when_empty(&self) -> bool {
        self.update_cache_when_empty
    }

    pub fn not_load_cache_at_start(&self) -> bool {
        self.not_load_cache_at_start
    }

    pub fn cache_dir(&self) -> Option<&PathBuf> {
        self.cache_dir.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn with_namespace_id(mut self, namespace_id: impl Into<String>) -> Self {
        self.config.namespace_id = namespace_id.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    pub fn with_beat_interval_ms(mut self, beat_interval_ms: u64) -> Self {
        self.config.beat_interval_ms = beat_interval_ms;
        self
    }

    pub fn with_update_cache_when_empty(mut self, update: bool) -> Self {
        self.config.update_cache_when_empty = update;
        self
    }

    pub fn with_not_load_cache_at_start(mut self, not_load: bool) -> Self {
        self.config.not_load_cache_at_start = not_load;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Everything needed to construct a `NamingClient`.
#[derive(Debug, Clone)]
pub struct NamingClientOptions {
    servers: Vec<ServerConfig>,
    client: ClientConfig,
}

#[derive(Default, Debug)]
pub struct NamingClientOptionsBuilder {
    servers: Vec<ServerConfig>,
    client: Option<ClientConfig>,
}

impl NamingClientOptionsBuilder {
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    pub fn with_servers<S: AsRef<[ServerConfig]>>(mut self, servers: S) -> Self {
        self.servers.extend(servers.as_ref().iter().cloned());
        self
    }

    pub fn with_client_config(mut self, client: ClientConfig) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<NamingClientOptions, RegistryError> {
        if self.servers.is_empty() {
            return Err(RegistryError::InvalidArgument {
                error: String::from("At least one naming server must be configured"),
            });
        }

        Ok(NamingClientOptions {
            servers: self.servers,
            client: self.client.unwrap_or_default(),
        })
    }
}

impl NamingClientOptions {
    pub fn builder() -> NamingClientOptionsBuilder {
        NamingClientOptionsBuilder::default()
    }

    /// Options for a single server taken from the environment:
    /// `serverAddr`, `serverPort` and `namespace`.
    pub fn from_env() -> Result<Self, RegistryError> {
        let addr = env_or("serverAddr", "127.0.0.1");
        let port = match std::env::var("serverPort") {
            Ok(p) if !p.is_empty() => p.parse::<u16>().map_err(|e| {
                RegistryError::InvalidArgument {
                    error: format!("Invalid serverPort '{}': {}", p, e),
                }
            })?,
            _ => DEFAULT_SERVER_PORT,
        };
        let namespace = env_or("namespace", "");

        tracing::debug!(
            "Naming client options from environment: {}:{}, namespace '{}'",
            addr,
            port,
            namespace
        );

        Self::builder()
            .with_server(ServerConfig::new(addr, port))
            .with_client_config(ClientConfig::builder().with_namespace_id(namespace).build())
            .build()
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_base_url() {
        let sc = ServerConfig::new("127.0.0.1", 8848);
        assert_eq!(sc.base_url(), "http://127.0.0.1:8848/nacos");

        let sc = ServerConfig::new("10.0.0.1", 80).with_context_path("nacos/");
        assert_eq!(sc.base_url(), "http://10.0.0.1:80/nacos");
    }

    #[test]
    fn options_require_server() {
        assert!(NamingClientOptions::builder().build().is_err());

        let options = NamingClientOptions::builder()
            .with_server(ServerConfig::new("127.0.0.1", 8848))
            .build()
            .unwrap();
        assert_eq!(options.client_config().timeout_ms(), DEFAULT_TIMEOUT_MS);
        assert!(!options.client_config().update_cache_when_empty());
    }
}
