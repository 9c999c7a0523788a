use nacos_registry::{
    service::Builder, DiscoveryClient, NacosRegistry, NacosResolver, NetAddr, RegistryError,
    RegistryInfo,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::oneshot;

mod common;
use common::nacos::MockNacos;

const SERVICE_NAME: &str = "demo.hertz-contrib.test1";
const GROUPED_SERVICE_NAME: &str = "DEFAULT_GROUP@@demo.hertz-contrib.test1";

#[tokio::test]
async fn test_register_resolve_and_ping() {
    common::init_logging();
    let nacos = MockNacos::start().await;
    let naming_client = nacos.naming_client();

    let (listener, addr, app) = common::ping_server("pong1").await;
    let info = RegistryInfo::new(SERVICE_NAME, NetAddr::new("tcp", addr.to_string())).with_weight(10);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let service = Builder::new(info, Arc::new(NacosRegistry::new(Arc::clone(&naming_client))))
        .with_entrypoint(async move { axum::serve(listener, app).await.map_err(|e| e.to_string()) })
        .with_shutdown_signal(async move {
            let _ = stop_rx.await;
        })
        .build()
        .unwrap();
    let server = tokio::spawn(service.start());

    common::wait_for(
        || !nacos.instances(GROUPED_SERVICE_NAME).is_empty(),
        Duration::from_secs(2),
        "service registration",
    )
    .await;

    let registered = nacos.instances(GROUPED_SERVICE_NAME);
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].port, addr.port());
    assert_eq!(registered[0].weight, 10.0);

    let client = DiscoveryClient::new(Arc::new(NacosResolver::new(Arc::clone(&naming_client))));
    let (status, body) = client
        .get(
            &format!("http://{}/ping", SERVICE_NAME),
            Duration::from_secs(1),
        )
        .await
        .expect("Request through service discovery failed");

    assert_eq!(200, status);
    assert_eq!("pong1", String::from_utf8(body).unwrap());

    // Stopping the server withdraws it from the registry.
    stop_tx.send(()).unwrap();
    server
        .await
        .unwrap()
        .expect("Service did not complete gracefully");
    assert!(nacos.instances(GROUPED_SERVICE_NAME).is_empty());
    assert_eq!(naming_client.beat_count().await, 0);
}

#[tokio::test]
async fn test_service_lifecycle_handlers() {
    common::init_logging();
    let nacos = MockNacos::start().await;
    let naming_client = nacos.naming_client();

    static MAIN_CALLS: AtomicU64 = AtomicU64::new(0);
    static INIT_CALLS: AtomicU64 = AtomicU64::new(0);
    static SHUTDOWN_CALLS: AtomicU64 = AtomicU64::new(0);

    // Service entrypoint that simulates some short work.
    async fn service_main() -> Result<(), String> {
        MAIN_CALLS.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    async fn service_init() -> Result<(), String> {
        INIT_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn service_shutdown() -> Result<(), String> {
        SHUTDOWN_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    let info = RegistryInfo::new("lifecycle", NetAddr::new("tcp", "127.0.0.1:9100"));
    let service = Builder::new(info, Arc::new(NacosRegistry::new(naming_client)))
        .with_initializer(service_init())
        .with_entrypoint(service_main())
        .with_shutdown_handler(service_shutdown())
        .build()
        .unwrap();

    service.start().await.unwrap();

    assert_eq!(1, MAIN_CALLS.load(Ordering::Relaxed), "Incorrect number of entrypoint invocations");
    assert_eq!(1, INIT_CALLS.load(Ordering::Relaxed), "Incorrect number of initializer invocations");
    assert_eq!(
        1,
        SHUTDOWN_CALLS.load(Ordering::Relaxed),
        "Incorrect number of shutdown handler invocations"
    );

    assert_eq!(nacos.registrations(), 1);
    assert!(nacos.instances("DEFAULT_GROUP@@lifecycle").is_empty());
}

#[tokio::test]
async fn test_initializer_failure_skips_registration() {
    let nacos = MockNacos::start().await;

    let info = RegistryInfo::new("never-registered", NetAddr::new("tcp", "127.0.0.1:9101"));
    let service = Builder::new(info, Arc::new(NacosRegistry::new(nacos.naming_client())))
        .with_initializer(async { Err(String::from("boom")) })
        .with_entrypoint(async { Ok(()) })
        .build()
        .unwrap();

    match service.start().await {
        Err(RegistryError::ServiceInitialize { service, error }) => {
            assert_eq!(service, "never-registered");
            assert_eq!(error, "boom");
        }
        other => panic!("Unexpected result: {:?}", other),
    }
    assert_eq!(nacos.registrations(), 0);
}

#[tokio::test]
async fn test_entrypoint_is_mandatory() {
    let nacos = MockNacos::start().await;
    let info = RegistryInfo::new("no-entrypoint", NetAddr::new("tcp", "127.0.0.1:9102"));

    let res = Builder::new(info, Arc::new(NacosRegistry::new(nacos.naming_client()))).build();
    assert!(matches!(res, Err(RegistryError::InvalidArgument { .. })));
}
