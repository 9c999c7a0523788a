mod beat;
mod cache;
mod client;
mod common;
mod config;
mod model;
mod proxy;

pub use client::NamingClient;
pub use common::NamingError;
pub use config::{
    ClientConfig, ClientConfigBuilder, NamingClientOptions, NamingClientOptionsBuilder,
    ServerConfig,
};
pub use model::{
    BeatInfo, BeatResponse, DeregisterInstanceParam, Instance, RegisterInstanceParam,
    SelectInstancesParam, ServiceInfo,
};
