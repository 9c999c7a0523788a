use crate::{Registry, RegistryError, RegistryInfo};
use futures::Future;
use std::{pin::Pin, sync::Arc, time::Duration};

use tracing::instrument;

type AsyncHandler = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;
type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const REGISTER_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Builds a server which announces itself through a `Registry` while it runs.
pub struct Builder {
    info: RegistryInfo,
    registry: Arc<dyn Registry>,
    entrypoint: Option<AsyncHandler>,
    initializer: Option<AsyncHandler>,
    shutdown_handler: Option<AsyncHandler>,
    shutdown_signal: Option<ShutdownSignal>,
    register_retry: bool,
}

enum ServiceState {
    New,
    Running,
    Done,
}

impl ServiceState {
    fn name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Running => "Running",
            Self::Done => "Done",
        }
    }
}

impl Builder {
    pub fn new(info: RegistryInfo, registry: Arc<dyn Registry>) -> Self {
        Self {
            info,
            registry,
            entrypoint: None,
            initializer: None,
            shutdown_handler: None,
            shutdown_signal: None,
            register_retry: false,
        }
    }

    /// Server main loop, typically the HTTP server future.
    pub fn with_entrypoint(
        mut self,
        entrypoint: impl Future<Output = Result<(), String>> + Send + 'static,
    ) -> Self {
        self.entrypoint = Some(Box::pin(entrypoint));
        self
    }

    /// Runs once before registration.
    pub fn with_initializer(
        mut self,
        initializer: impl Future<Output = Result<(), String>> + Send + 'static,
    ) -> Self {
        self.initializer = Some(Box::pin(initializer));
        self
    }

    /// Runs once after the service is deregistered, or when registration fails.
    pub fn with_shutdown_handler(
        mut self,
        shutdown_handler: impl Future<Output = Result<(), String>> + Send + 'static,
    ) -> Self {
        self.shutdown_handler = Some(Box::pin(shutdown_handler));
        self
    }

    /// Stop the service when this future completes, even if the entrypoint is still running.
    pub fn with_shutdown_signal(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown_signal = Some(Box::pin(signal));
        self
    }

    /// Keep retrying registration instead of failing on the first error.
    pub fn with_register_retry(mut self, retry: bool) -> Self {
        self.register_retry = retry;
        self
    }

    pub fn build(self) -> Result<RegisteredService, RegistryError> {
        let entrypoint = self.entrypoint.ok_or_else(|| RegistryError::InvalidArgument {
            error: String::from("Service entrypoint must be provided"),
        })?;

        Ok(RegisteredService {
            info: self.info,
            registry: self.registry,
            entrypoint,
            initializer: self.initializer,
            shutdown_handler: self.shutdown_handler,
            shutdown_signal: self.shutdown_signal,
            register_retry: self.register_retry,
            current_state: Some(ServiceState::New),
        })
    }
}

pub struct RegisteredService {
    info: RegistryInfo,
    registry: Arc<dyn Registry>,
    entrypoint: AsyncHandler,
    initializer: Option<AsyncHandler>,
    shutdown_handler: Option<AsyncHandler>,
    shutdown_signal: Option<ShutdownSignal>,
    register_retry: bool,
    current_state: Option<ServiceState>,
}

impl RegisteredService {
    /// Drive the service through New -> Running -> Done.
    pub async fn start(mut self) -> Result<(), RegistryError> {
        loop {
            let curr_state = self
                .current_state
                .take()
                .unwrap_or(ServiceState::Done);
            let curr_state_name = curr_state.name();

            let new_state = match curr_state {
                ServiceState::New => self.step_new().await,
                ServiceState::Running => self.step_running().await,
                ServiceState::Done => break,
            }?;

            if curr_state_name != new_state.name() {
                tracing::debug!(
                    "Service {}@{} changed state {} => {}",
                    self.info.service_name,
                    self.info.addr,
                    curr_state_name,
                    new_state.name()
                )
            }

            self.current_state = Some(new_state);
        }

        Ok(())
    }

    async fn step_new(&mut self) -> Result<ServiceState, RegistryError> {
        // Invoke service-specific initializer once before registering the service.
        if let Some(initializer) = self.initializer.take() {
            initializer
                .await
                .map_err(|error| RegistryError::ServiceInitialize {
                    service: self.info.service_name.clone(),
                    error,
                })?;
        }

        if let Err(e) = self.register().await {
            tracing::error!(
                "Service {}@{} failed to register: {}",
                self.info.service_name,
                self.info.addr,
                e
            );
            self.shutdown_service().await?;
            return Err(e);
        }

        Ok(ServiceState::Running)
    }

    async fn step_running(&mut self) -> Result<ServiceState, RegistryError> {
        let signal = self.shutdown_signal.take();

        tokio::select! {
            r = &mut self.entrypoint => {
                if let Err(e) = r {
                    tracing::warn!(
                        "Service {}@{} entrypoint completed with error: {}",
                        self.info.service_name,
                        self.info.addr,
                        e
                    );
                }
            },
            _ = async move {
                match signal {
                    Some(s) => s.await,
                    None => futures::future::pending::<()>().await,
                }
            } => {
                tracing::info!(
                    "Service {}@{} received shutdown signal",
                    self.info.service_name,
                    self.info.addr
                );
            }
        }

        let deregistered = self.registry.deregister(&self.info).await;
        self.shutdown_service().await?;
        deregistered?;

        Ok(ServiceState::Done)
    }

    async fn register(&mut self) -> Result<(), RegistryError> {
        loop {
            match self.registry.register(&self.info).await {
                Ok(()) => {
                    tracing::info!(
                        "Service {}@{} registered",
                        self.info.service_name,
                        self.info.addr
                    );
                    return Ok(());
                }
                Err(e @ RegistryError::InvalidArgument { .. }) => return Err(e),
                Err(e) => {
                    if !self.register_retry {
                        return Err(e);
                    }
                    tracing::warn!(
                        "Service {}@{} registration failed, retrying in {:?}: {}",
                        self.info.service_name,
                        self.info.addr,
                        REGISTER_RETRY_INTERVAL,
                        e
                    );
                    tokio::time::sleep(REGISTER_RETRY_INTERVAL).await;
                }
            }
        }
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn shutdown_service(&mut self) -> Result<(), RegistryError> {
        match self.shutdown_handler.take() {
            Some(handler) => handler.await.map_err(|error| RegistryError::ServiceShutdown {
                service: self.info.service_name.clone(),
                error,
            }),
            None => Ok(()),
        }
    }
}
