use crate::common::{ServiceNameBuilder, DEFAULT_CLUSTER, DEFAULT_GROUP};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

/// A single service instance as known to the naming server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub healthy: bool,
    #[serde(default = "default_true", alias = "enable")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub ephemeral: bool,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Snapshot of a service's instances, as returned by the instance list API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(default, alias = "dom")]
    pub name: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub clusters: String,
    #[serde(default)]
    pub cache_millis: u64,
    #[serde(default)]
    pub hosts: Vec<Instance>,
    #[serde(default)]
    pub last_ref_time: u64,
    #[serde(default)]
    pub checksum: String,
    #[serde(default, rename = "allIPs")]
    pub all_ips: bool,
}

impl ServiceInfo {
    /// Cache key: `group@@service` plus `@@clusters` when clusters are set.
    pub fn key(&self) -> String {
        let (group, service) = match self.name.split_once("@@") {
            Some((g, s)) => (g.to_string(), s.to_string()),
            None => (self.group_name.clone(), self.name.clone()),
        };
        let clusters: Vec<&str> = self.clusters.split(',').collect();

        ServiceNameBuilder::new(service, group)
            .with_clusters(clusters)
            .build()
            .unwrap_or_else(|_| self.name.clone())
    }
}

/// Heartbeat payload for an ephemeral instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatInfo {
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub service_name: String,
    pub cluster: String,
    pub metadata: HashMap<String, String>,
    pub scheduled: bool,
    /// Beat period in milliseconds.
    pub period: u64,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatResponse {
    #[serde(default)]
    pub client_beat_interval: i64,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub light_beat_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RegisterInstanceParam {
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub enable: bool,
    pub healthy: bool,
    pub metadata: HashMap<String, String>,
    pub cluster_name: String,
    pub service_name: String,
    pub group_name: String,
    pub ephemeral: bool,
}

impl Default for RegisterInstanceParam {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 0,
            weight: 1.0,
            enable: true,
            healthy: true,
            metadata: HashMap::new(),
            cluster_name: String::from(DEFAULT_CLUSTER),
            service_name: String::new(),
            group_name: String::from(DEFAULT_GROUP),
            ephemeral: true,
        }
    }
}

impl RegisterInstanceParam {
    pub(crate) fn to_instance(&self) -> Instance {
        Instance {
            instance_id: String::new(),
            ip: self.ip.clone(),
            port: self.port,
            weight: self.weight,
            healthy: self.healthy,
            enabled: self.enable,
            ephemeral: self.ephemeral,
            cluster_name: self.cluster_name.clone(),
            service_name: self.service_name.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeregisterInstanceParam {
    pub ip: String,
    pub port: u16,
    pub cluster: String,
    pub service_name: String,
    pub group_name: String,
    pub ephemeral: bool,
}

impl Default for DeregisterInstanceParam {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 0,
            cluster: String::from(DEFAULT_CLUSTER),
            service_name: String::new(),
            group_name: String::from(DEFAULT_GROUP),
            ephemeral: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectInstancesParam {
    pub service_name: String,
    pub group_name: String,
    pub clusters: Vec<String>,
    pub healthy_only: bool,
}

impl Default for SelectInstancesParam {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            group_name: String::from(DEFAULT_GROUP),
            clusters: Vec::new(),
            healthy_only: true,
        }
    }
}
