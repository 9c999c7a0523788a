#![allow(dead_code)]

pub mod nacos;

use axum::{routing::get, Router};
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Listener for a `/ping` server answering `body`, plus the router to serve on it.
pub async fn ping_server(body: &'static str) -> (TcpListener, SocketAddr, Router) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/ping", get(move || async move { body }));
    (listener, addr, app)
}

/// Port nothing listens on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `check` every 50ms until it holds, panicking after `timeout`.
pub async fn wait_for<F: FnMut() -> bool>(mut check: F, timeout: Duration, what: &str) {
    let started = std::time::Instant::now();
    while !check() {
        if started.elapsed() > timeout {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
