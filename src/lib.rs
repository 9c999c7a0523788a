mod balancer;
mod common;
mod discovery;
pub mod naming;
mod registry;
mod resolver;
pub mod service;

pub use common::{
    local_ip, NetAddr, RegistryError, ServiceNameBuilder, DEFAULT_CLUSTER, DEFAULT_GROUP,
    DEFAULT_WEIGHT,
};

pub use registry::{NacosRegistry, NacosRegistryBuilder, Registry, RegistryInfo};

pub use resolver::{
    DiscoveryInstance, DiscoveryResult, NacosResolver, NacosResolverBuilder, Resolver, TargetInfo,
};

pub use balancer::{LoadBalancer, WeightRandomBalancer};

pub use discovery::{DiscoveryClient, DiscoveryClientBuilder};
