use crate::common::{
    ServiceNameBuilder, NamingClientInitialize, ServiceDeregister, ServiceRegister,
    ServiceResolve,
};
use crate::naming::{
    beat::{BeatReactor, BeatTarget},
    cache::ServiceInfoHolder,
    common::{NamingError, DEFAULT_CACHE_MILLIS},
    config::NamingClientOptions,
    model::{
        BeatInfo, DeregisterInstanceParam, Instance, RegisterInstanceParam,
        SelectInstancesParam, ServiceInfo,
    },
    proxy::NamingProxy,
};
use crate::RegistryError;
use snafu::ResultExt;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle};

/// Client of the naming server: registers instances (keeping ephemeral ones alive
/// with heartbeats) and looks services up through a local cache that is refreshed
/// in the background.
#[derive(Debug)]
pub struct NamingClient {
    proxy: Arc<NamingProxy>,
    beat_reactor: BeatReactor,
    holder: Arc<ServiceInfoHolder>,
    beat_interval_ms: u64,
    updaters: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl NamingClient {
    pub fn new(options: NamingClientOptions) -> Result<Self, RegistryError> {
        let config = options.client_config();
        let proxy = Arc::new(
            NamingProxy::new(options.servers().to_vec(), config)
                .context(NamingClientInitialize {})?,
        );

        tracing::info!(
            "Naming client created for {} server(s), namespace '{}'",
            options.servers().len(),
            config.namespace_id()
        );

        Ok(Self {
            beat_reactor: BeatReactor::new(Arc::clone(&proxy)),
            holder: Arc::new(ServiceInfoHolder::new(config)),
            beat_interval_ms: config.beat_interval_ms(),
            proxy,
            updaters: Mutex::new(HashMap::new()),
        })
    }

    /// Register an instance, ephemeral instances also get a heartbeat loop.
    pub async fn register_instance(
        &self,
        param: RegisterInstanceParam,
    ) -> Result<bool, RegistryError> {
        let instance = param.to_instance();

        self.proxy
            .register_service(&param.service_name, &param.group_name, &instance)
            .await
            .context(ServiceRegister {
                service: param.service_name.clone(),
                instance: format!("{}:{}", param.ip, param.port),
            })?;

        if param.ephemeral {
            let target = BeatTarget {
                beat: BeatInfo {
                    ip: param.ip.clone(),
                    port: param.port,
                    weight: param.weight,
                    service_name: param.service_name.clone(),
                    cluster: param.cluster_name.clone(),
                    metadata: param.metadata.clone(),
                    scheduled: false,
                    period: self.beat_interval_ms,
                    stopped: false,
                },
                group: param.group_name.clone(),
                instance,
            };
            self.beat_reactor.add_beat_info(target).await;
        }

        Ok(true)
    }

    /// Stop the heartbeat, then remove the instance from the server.
    pub async fn deregister_instance(
        &self,
        param: DeregisterInstanceParam,
    ) -> Result<bool, RegistryError> {
        if param.ephemeral {
            self.beat_reactor
                .remove_beat_info(&param.service_name, &param.group_name, &param.ip, param.port)
                .await;
        }

        let instance = Instance {
            instance_id: String::new(),
            ip: param.ip.clone(),
            port: param.port,
            weight: 0.0,
            healthy: false,
            enabled: false,
            ephemeral: param.ephemeral,
            cluster_name: param.cluster.clone(),
            service_name: param.service_name.clone(),
            metadata: HashMap::new(),
        };

        self.proxy
            .deregister_service(&param.service_name, &param.group_name, &instance)
            .await
            .context(ServiceDeregister {
                service: param.service_name.clone(),
                instance: format!("{}:{}", param.ip, param.port),
            })?;

        Ok(true)
    }

    /// Service info from the cache, fetched from the server on first use and
    /// refreshed in the background from then on.
    pub async fn get_service(
        &self,
        service: &str,
        group: &str,
        clusters: &[String],
    ) -> Result<ServiceInfo, RegistryError> {
        let key = ServiceNameBuilder::new(service, group)
            .with_clusters(clusters)
            .build()?;

        if let Some(info) = self.holder.get(&key).await {
            self.schedule_update(&key, service, group, clusters, info.cache_millis)
                .await;
            return Ok(info);
        }

        let info = self
            .proxy
            .query_list(service, group, clusters, false)
            .await
            .context(ServiceResolve { service })?;
        let info = self.holder.process_service_info(info).await;

        self.schedule_update(&key, service, group, clusters, info.cache_millis)
            .await;
        Ok(info)
    }

    /// Instances whose health matches `healthy_only`, which are enabled and carry weight.
    pub async fn select_instances(
        &self,
        param: SelectInstancesParam,
    ) -> Result<Vec<Instance>, RegistryError> {
        let info = self
            .get_service(&param.service_name, &param.group_name, &param.clusters)
            .await?;

        let selected: Vec<Instance> = info
            .hosts
            .into_iter()
            .filter(|i| i.healthy == param.healthy_only && i.enabled && i.weight > 0.0)
            .collect();

        if selected.is_empty() {
            return Err(RegistryError::ServiceResolve {
                service: param.service_name.clone(),
                source: NamingError::EmptyInstanceList {
                    service: param.service_name,
                },
            });
        }

        Ok(selected)
    }

    /// Stop all heartbeat loops and cache refresh tasks.
    pub async fn shutdown(&self) {
        self.beat_reactor.shutdown().await;
        for (key, handle) in self.updaters.lock().await.drain() {
            tracing::debug!("Stopping service update task for {}", key);
            handle.abort();
        }
    }

    pub async fn beat_count(&self) -> usize {
        self.beat_reactor.beat_count().await
    }

    pub fn namespace_id(&self) -> &str {
        self.proxy.namespace_id()
    }

    async fn schedule_update(
        &self,
        key: &str,
        service: &str,
        group: &str,
        clusters: &[String],
        cache_millis: u64,
    ) {
        let mut updaters = self.updaters.lock().await;
        if updaters.contains_key(key) {
            return;
        }

        let proxy = Arc::clone(&self.proxy);
        let holder = Arc::clone(&self.holder);
        let service = service.to_string();
        let group = group.to_string();
        let clusters = clusters.to_vec();
        let mut refresh = refresh_interval(cache_millis);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(refresh).await;
                match proxy.query_list(&service, &group, &clusters, false).await {
                    Ok(info) => {
                        let info = holder.process_service_info(info).await;
                        refresh = refresh_interval(info.cache_millis);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to refresh service {}@@{}: {}", group, service, e);
                    }
                }
            }
        });

        updaters.insert(key.to_string(), handle);
    }
}

impl Drop for NamingClient {
    fn drop(&mut self) {
        if let Ok(mut updaters) = self.updaters.try_lock() {
            updaters.drain().for_each(|(_, h)| h.abort());
        }
    }
}

fn refresh_interval(cache_millis: u64) -> Duration {
    let millis = if cache_millis == 0 {
        DEFAULT_CACHE_MILLIS
    } else {
        cache_millis
    };
    Duration::from_millis(millis.max(1000))
}
