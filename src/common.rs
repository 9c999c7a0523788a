use crate::naming::NamingError;
use once_cell::sync::Lazy;
use snafu::Snafu;
use std::{fmt, net::UdpSocket};

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub")]
pub enum RegistryError {
    /// Invalid argument passed.
    #[snafu(display("Invalid argument: {}", error))]
    InvalidArgument { error: String },

    /// Can't construct the naming client.
    #[snafu(display("Can't initialize naming client: {}", source))]
    NamingClientInitialize { source: NamingError },

    /// Can't register new service instance.
    #[snafu(display(
        "Failed to register service {} with instance {}. Error='{}'",
        service,
        instance,
        source
    ))]
    ServiceRegister {
        service: String,
        instance: String,
        source: NamingError,
    },

    /// Can't deregister existing service instance.
    #[snafu(display(
        "Failed to deregister service {} with instance {}. Error='{}'",
        service,
        instance,
        source
    ))]
    ServiceDeregister {
        service: String,
        instance: String,
        source: NamingError,
    },

    /// Failed to look up instances of a service.
    #[snafu(display("Failed to resolve service {}. Error='{}'", service, source))]
    ServiceResolve { service: String, source: NamingError },

    /// Service resolved, but nothing can serve the request.
    #[snafu(display("No instance available for service {}", service))]
    NoInstanceAvailable { service: String },

    /// Malformed request URL.
    #[snafu(display("Invalid URL '{}': {}", url, error))]
    InvalidUrl { url: String, error: String },

    /// HTTP request to a resolved instance failed.
    #[snafu(display("Request to {} failed. Error={}", url, source))]
    HttpRequest { url: String, source: reqwest::Error },

    /// Service initializer returned an error.
    #[snafu(display("Failed to initialize service {}. Error={}", service, error))]
    ServiceInitialize { service: String, error: String },

    /// Failed to shutdown the service.
    #[snafu(display("Failed to shutdown service {}. Error={}", service, error))]
    ServiceShutdown { service: String, error: String },
}

pub const DEFAULT_CLUSTER: &str = "DEFAULT";
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
pub const DEFAULT_WEIGHT: u32 = 10;
pub const DEFAULT_NETWORK: &str = "tcp";

/// Separator between group and service in grouped service names.
const SERVICE_GROUP_SEPARATOR: &str = "@@";

/// Best-effort outbound IP of this host, used when a server listens on a wildcard address.
static LOCAL_IP: Lazy<String> = Lazy::new(|| {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|e| {
            tracing::warn!("Can't detect local IP, falling back to loopback: {}", e);
            String::from("127.0.0.1")
        })
});

pub fn local_ip() -> &'static str {
    LOCAL_IP.as_str()
}

/// Builds the names the naming backend keys services by:
/// `group@@service` and, for cache entries, `group@@service@@clusters`.
#[derive(Debug, Default)]
pub struct ServiceNameBuilder {
    service: Option<String>,
    group: Option<String>,
    clusters: Vec<String>,
}

impl ServiceNameBuilder {
    pub fn new(service: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            group: Some(group.into()),
            clusters: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_clusters<C: AsRef<str>, S: AsRef<[C]>>(mut self, clusters: S) -> Self {
        self.clusters = clusters
            .as_ref()
            .iter()
            .map(|c| c.as_ref().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn build(self) -> Result<String, RegistryError> {
        let service = match self.service {
            Some(s) if !s.is_empty() => s,
            _ => {
                return Err(RegistryError::InvalidArgument {
                    error: String::from("Service name is mandatory"),
                })
            }
        };

        let grouped = match self.group {
            Some(g) if !g.is_empty() => {
                format!("{}{}{}", g, SERVICE_GROUP_SEPARATOR, service)
            }
            _ => format!("{}{}{}", DEFAULT_GROUP, SERVICE_GROUP_SEPARATOR, service),
        };

        if self.clusters.is_empty() {
            Ok(grouped)
        } else {
            Ok(format!(
                "{}{}{}",
                grouped,
                SERVICE_GROUP_SEPARATOR,
                self.clusters.join(",")
            ))
        }
    }
}

/// Grouped service name, `service` is returned as-is if it's already grouped.
pub(crate) fn grouped_service_name(service: &str, group: &str) -> String {
    if service.contains(SERVICE_GROUP_SEPARATOR) {
        return service.to_string();
    }
    let group = if group.is_empty() { DEFAULT_GROUP } else { group };
    format!("{}{}{}", group, SERVICE_GROUP_SEPARATOR, service)
}

/// A network address in the form the HTTP framework hands to registries:
/// network name plus `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetAddr {
    network: String,
    address: String,
}

impl NetAddr {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Split `host:port` (IPv6 hosts in brackets) into its parts.
pub(crate) fn split_host_port(address: &str) -> Result<(String, u16), RegistryError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| RegistryError::InvalidArgument {
            error: format!("Address '{}' is missing a port", address),
        })?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port
        .parse::<u16>()
        .map_err(|e| RegistryError::InvalidArgument {
            error: format!("Address '{}' has invalid port: {}", address, e),
        })?;

    Ok((host.to_string(), port))
}

/// Join host and port, bracketing IPv6 hosts.
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
