use crate::common::{
    local_ip, split_host_port, NetAddr, DEFAULT_CLUSTER, DEFAULT_GROUP, DEFAULT_WEIGHT,
};
use crate::naming::{
    DeregisterInstanceParam, NamingClient, NamingClientOptions, RegisterInstanceParam,
};
use crate::RegistryError;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

/// What a server announces about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryInfo {
    pub service_name: String,
    pub addr: NetAddr,
    pub weight: u32,
    pub tags: HashMap<String, String>,
}

impl RegistryInfo {
    pub fn new(service_name: impl Into<String>, addr: NetAddr) -> Self {
        Self {
            service_name: service_name.into(),
            addr,
            weight: DEFAULT_WEIGHT,
            tags: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Registry a server announces itself through on startup and withdraws from on shutdown.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, info: &RegistryInfo) -> Result<(), RegistryError>;

    async fn deregister(&self, info: &RegistryInfo) -> Result<(), RegistryError>;
}

/// `Registry` backed by the naming server.
#[derive(Debug, Clone)]
pub struct NacosRegistry {
    client: Arc<NamingClient>,
    cluster: String,
    group: String,
}

#[derive(Debug)]
pub struct NacosRegistryBuilder {
    client: Arc<NamingClient>,
    cluster: String,
    group: String,
}

impl NacosRegistryBuilder {
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn build(self) -> NacosRegistry {
        NacosRegistry {
            client: self.client,
            cluster: self.cluster,
            group: self.group,
        }
    }
}

impl NacosRegistry {
    pub fn new(client: Arc<NamingClient>) -> Self {
        Self::builder(client).build()
    }

    pub fn builder(client: Arc<NamingClient>) -> NacosRegistryBuilder {
        NacosRegistryBuilder {
            client,
            cluster: String::from(DEFAULT_CLUSTER),
            group: String::from(DEFAULT_GROUP),
        }
    }

    /// Registry over a naming client configured from the environment.
    pub fn from_env() -> Result<Self, RegistryError> {
        let client = NamingClient::new(NamingClientOptions::from_env()?)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn client(&self) -> &Arc<NamingClient> {
        &self.client
    }

    /// Validate registry info and resolve the host:port to register.
    fn instance_address(info: &RegistryInfo) -> Result<(String, u16), RegistryError> {
        if info.service_name.is_empty() {
            return Err(RegistryError::InvalidArgument {
                error: String::from("Registry info service name can not be empty"),
            });
        }

        if info.addr.address().is_empty() {
            return Err(RegistryError::InvalidArgument {
                error: String::from("Registry info address can not be empty"),
            });
        }

        let (host, port) = split_host_port(info.addr.address())?;
        if port == 0 {
            return Err(RegistryError::InvalidArgument {
                error: format!("Registry info address {} has no port", info.addr),
            });
        }

        // Wildcard listeners are announced under this host's outbound IP.
        let host = match host.as_str() {
            "" | "0.0.0.0" | "::" => local_ip().to_string(),
            _ => host,
        };

        Ok((host, port))
    }
}

#[async_trait]
impl Registry for NacosRegistry {
    async fn register(&self, info: &RegistryInfo) -> Result<(), RegistryError> {
        let (ip, port) = Self::instance_address(info)?;
        let weight = if info.weight == 0 {
            DEFAULT_WEIGHT
        } else {
            info.weight
        };

        self.client
            .register_instance(RegisterInstanceParam {
                ip,
                port,
                weight: weight as f64,
                enable: true,
                healthy: true,
                metadata: info.tags.clone(),
                cluster_name: self.cluster.clone(),
                service_name: info.service_name.clone(),
                group_name: self.group.clone(),
                ephemeral: true,
            })
            .await?;

        Ok(())
    }

    async fn deregister(&self, info: &RegistryInfo) -> Result<(), RegistryError> {
        let (ip, port) = Self::instance_address(info)?;

        self.client
            .deregister_instance(DeregisterInstanceParam {
                ip,
                port,
                cluster: self.cluster.clone(),
                service_name: info.service_name.clone(),
                group_name: self.group.clone(),
                ephemeral: true,
            })
            .await?;

        Ok(())
    }
}
