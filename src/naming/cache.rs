use crate::naming::{
    common::{CacheWrite, NamingError, SerializeValue},
    config::ClientConfig,
    model::ServiceInfo,
};
use snafu::ResultExt;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;

/// In-memory service cache, optionally mirrored to disk.
#[derive(Debug)]
pub struct ServiceInfoHolder {
    services: RwLock<HashMap<String, ServiceInfo>>,
    update_cache_when_empty: bool,
    cache_dir: Option<PathBuf>,
}

impl ServiceInfoHolder {
    pub fn new(config: &ClientConfig) -> Self {
        let cache_dir = config.cache_dir().map(|dir| {
            let namespace = if config.namespace_id().is_empty() {
                "public"
            } else {
                config.namespace_id()
            };
            dir.join("naming").join(namespace)
        });

        let services = match cache_dir.as_ref() {
            Some(dir) if !config.not_load_cache_at_start() => load_from_disk(dir),
            _ => HashMap::new(),
        };

        Self {
            services: RwLock::new(services),
            update_cache_when_empty: config.update_cache_when_empty(),
            cache_dir,
        }
    }

    pub async fn get(&self, key: &str) -> Option<ServiceInfo> {
        self.services.read().await.get(key).cloned()
    }

    /// Merge freshly fetched service info into the cache and return what the cache now holds.
    /// An empty host list doesn't evict cached hosts unless `update_cache_when_empty` is set.
    pub async fn process_service_info(&self, info: ServiceInfo) -> ServiceInfo {
        let key = info.key();
        let mut services = self.services.write().await;

        if info.hosts.is_empty() && !self.update_cache_when_empty {
            if let Some(cached) = services.get(&key) {
                tracing::warn!(
                    "Naming server returned empty host list for {}, keeping {} cached hosts",
                    key,
                    cached.hosts.len()
                );
                return cached.clone();
            }
        }

        let changed = services
            .get(&key)
            .map(|old| old.hosts != info.hosts)
            .unwrap_or(true);
        services.insert(key.clone(), info.clone());
        drop(services);

        if changed {
            tracing::info!(
                "Service {} changed, current host count: {}",
                key,
                info.hosts.len()
            );
            // Readers aren't held up by the disk write.
            if let Some(dir) = self.cache_dir.as_ref() {
                if let Err(e) = write_to_disk(dir, &key, &info).await {
                    tracing::error!("Failed to persist service {}: {}", key, e);
                }
            }
        }

        info
    }
}

fn load_from_disk(dir: &Path) -> HashMap<String, ServiceInfo> {
    let mut services = HashMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("No service cache at {}: {}", dir.display(), e);
            return services;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let parsed = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_slice::<ServiceInfo>(&raw).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(info) => {
                services.insert(info.key(), info);
            }
            Err(e) => {
                log::warn!("Skipping unreadable cache file {}: {}", path.display(), e);
            }
        }
    }

    tracing::info!(
        "Loaded {} services from cache directory {}",
        services.len(),
        dir.display()
    );
    services
}

async fn write_to_disk(dir: &Path, key: &str, info: &ServiceInfo) -> Result<(), NamingError> {
    let path = dir.join(key);
    let payload = serde_json::to_vec(info).context(SerializeValue {})?;

    tokio::fs::create_dir_all(dir).await.context(CacheWrite {
        path: dir.display().to_string(),
    })?;
    tokio::fs::write(&path, payload).await.context(CacheWrite {
        path: path.display().to_string(),
    })?;
    Ok(())
}
