use crate::common::{join_host_port, NetAddr, DEFAULT_CLUSTER, DEFAULT_GROUP, DEFAULT_NETWORK};
use crate::naming::{NamingClient, NamingClientOptions, SelectInstancesParam};
use crate::RegistryError;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

/// What the client knows about the destination of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetInfo {
    pub host: String,
    pub tags: HashMap<String, String>,
}

impl TargetInfo {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            tags: HashMap::new(),
        }
    }
}

/// One resolved endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryInstance {
    pub address: NetAddr,
    pub weight: u32,
    pub tags: HashMap<String, String>,
}

impl DiscoveryInstance {
    pub fn new(address: NetAddr, weight: u32, tags: HashMap<String, String>) -> Self {
        Self {
            address,
            weight,
            tags,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResult {
    pub cache_key: String,
    pub instances: Vec<DiscoveryInstance>,
}

/// Turns a service description into instances a client can talk to.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Service description to resolve for a target.
    fn target(&self, target: &TargetInfo) -> String;

    async fn resolve(&self, desc: &str) -> Result<DiscoveryResult, RegistryError>;

    fn name(&self) -> &str;
}

/// `Resolver` backed by the naming server.
#[derive(Debug, Clone)]
pub struct NacosResolver {
    client: Arc<NamingClient>,
    cluster: String,
    group: String,
}

#[derive(Debug)]
pub struct NacosResolverBuilder {
    client: Arc<NamingClient>,
    cluster: String,
    group: String,
}

impl NacosResolverBuilder {
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn build(self) -> NacosResolver {
        NacosResolver {
            client: self.client,
            cluster: self.cluster,
            group: self.group,
        }
    }
}

impl NacosResolver {
    pub fn new(client: Arc<NamingClient>) -> Self {
        Self::builder(client).build()
    }

    pub fn builder(client: Arc<NamingClient>) -> NacosResolverBuilder {
        NacosResolverBuilder {
            client,
            cluster: String::from(DEFAULT_CLUSTER),
            group: String::from(DEFAULT_GROUP),
        }
    }

    /// Resolver over a naming client configured from the environment.
    pub fn from_env() -> Result<Self, RegistryError> {
        let client = NamingClient::new(NamingClientOptions::from_env()?)?;
        Ok(Self::new(Arc::new(client)))
    }
}

#[async_trait]
impl Resolver for NacosResolver {
    fn target(&self, target: &TargetInfo) -> String {
        target.host.clone()
    }

    async fn resolve(&self, desc: &str) -> Result<DiscoveryResult, RegistryError> {
        let hosts = self
            .client
            .select_instances(SelectInstancesParam {
                service_name: desc.to_string(),
                group_name: self.group.clone(),
                clusters: vec![self.cluster.clone()],
                healthy_only: true,
            })
            .await?;

        let instances: Vec<DiscoveryInstance> = hosts
            .into_iter()
            .filter(|i| i.enabled)
            .map(|i| {
                DiscoveryInstance::new(
                    NetAddr::new(DEFAULT_NETWORK, join_host_port(&i.ip, i.port)),
                    i.weight as u32,
                    i.metadata,
                )
            })
            .collect();

        tracing::debug!("Resolved {} to {} instance(s)", desc, instances.len());

        Ok(DiscoveryResult {
            cache_key: desc.to_string(),
            instances,
        })
    }

    fn name(&self) -> &str {
        "nacos"
    }
}
