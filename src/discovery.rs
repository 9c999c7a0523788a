use crate::balancer::{LoadBalancer, WeightRandomBalancer};
use crate::common::{split_host_port, HttpRequest};
use crate::resolver::{DiscoveryResult, Resolver, TargetInfo};
use crate::RegistryError;
use reqwest::{Client, Method, RequestBuilder, Url};
use snafu::ResultExt;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// HTTP client that treats the URL host as a service name: the host is resolved
/// through a `Resolver`, one instance is picked by the balancer and the request
/// is sent there.
pub struct DiscoveryClient {
    http: Client,
    resolver: Arc<dyn Resolver>,
    balancer: Arc<dyn LoadBalancer>,
    refresh_interval: Duration,
    cache: Mutex<HashMap<String, (Instant, DiscoveryResult)>>,
}

pub struct DiscoveryClientBuilder {
    http: Option<Client>,
    resolver: Arc<dyn Resolver>,
    balancer: Arc<dyn LoadBalancer>,
    refresh_interval: Duration,
}

impl DiscoveryClientBuilder {
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    /// How long a resolution result is reused before the resolver is asked again.
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn build(self) -> DiscoveryClient {
        DiscoveryClient {
            http: self.http.unwrap_or_default(),
            resolver: self.resolver,
            balancer: self.balancer,
            refresh_interval: self.refresh_interval,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl DiscoveryClient {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self::builder(resolver).build()
    }

    pub fn builder(resolver: Arc<dyn Resolver>) -> DiscoveryClientBuilder {
        DiscoveryClientBuilder {
            http: None,
            resolver,
            balancer: Arc::new(WeightRandomBalancer),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Rewrite the URL so that it points to a resolved instance of the service named by its host.
    pub async fn resolve_url(&self, url: &str) -> Result<Url, RegistryError> {
        let mut parsed = Url::parse(url).map_err(|e| RegistryError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| RegistryError::InvalidUrl {
                url: url.to_string(),
                error: String::from("URL has no host"),
            })?
            .to_string();

        let desc = self.resolver.target(&TargetInfo::new(host));
        let result = self.resolve(&desc).await?;

        let instance = self
            .balancer
            .pick(&result)
            .ok_or_else(|| RegistryError::NoInstanceAvailable {
                service: desc.clone(),
            })?;

        let (ip, port) = split_host_port(instance.address.address())?;
        let ip = if ip.contains(':') {
            format!("[{}]", ip)
        } else {
            ip
        };

        parsed
            .set_host(Some(&ip))
            .map_err(|e| RegistryError::InvalidUrl {
                url: url.to_string(),
                error: e.to_string(),
            })?;
        parsed
            .set_port(Some(port))
            .map_err(|_| RegistryError::InvalidUrl {
                url: url.to_string(),
                error: String::from("URL can't carry a port"),
            })?;

        tracing::debug!(
            "Request to {} routed to {} by {}/{}",
            url,
            instance.address,
            self.resolver.name(),
            self.balancer.name()
        );
        Ok(parsed)
    }

    /// Request builder aimed at a resolved instance.
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, RegistryError> {
        let resolved = self.resolve_url(url).await?;
        Ok(self.http.request(method, resolved))
    }

    /// GET through discovery, returning status and body.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<(u16, Vec<u8>), RegistryError> {
        let response = self
            .request(Method::GET, url)
            .await?
            .timeout(timeout)
            .send()
            .await
            .context(HttpRequest { url })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.context(HttpRequest { url })?;
        Ok((status, body.to_vec()))
    }

    /// Resolution result for the description, reusing fresh cached results.
    /// A stale result is still served if the resolver fails.
    async fn resolve(&self, desc: &str) -> Result<DiscoveryResult, RegistryError> {
        if let Some((at, result)) = self.cache.lock().await.get(desc) {
            if at.elapsed() < self.refresh_interval {
                return Ok(result.clone());
            }
        }

        // The cache stays unlocked while the resolver runs.
        let resolved = self.resolver.resolve(desc).await;

        let mut cache = self.cache.lock().await;
        match resolved {
            Ok(result) => {
                cache.insert(desc.to_string(), (Instant::now(), result.clone()));
                Ok(result)
            }
            Err(e) => match cache.get(desc) {
                Some((_, stale)) => {
                    tracing::warn!("Failed to refresh {}, using stale result: {}", desc, e);
                    Ok(stale.clone())
                }
                None => Err(e),
            },
        }
    }
}
