use crate::naming::{
    common::{BEAT_OK, RESOURCE_NOT_FOUND},
    model::{BeatInfo, Instance},
    proxy::NamingProxy,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{
    mpsc::{channel, Receiver, Sender},
    oneshot, Mutex,
};

#[derive(Debug)]
enum BeatLoopCommand {
    Ok,
    StopBeat(oneshot::Sender<BeatLoopCommand>),
}

/// What a heartbeat loop needs to re-register its instance when the server forgets it.
#[derive(Debug, Clone)]
pub struct BeatTarget {
    pub beat: BeatInfo,
    pub group: String,
    pub instance: Instance,
}

impl BeatTarget {
    /// `group@@service#ip#port`
    pub fn key(&self) -> String {
        beat_key(&self.beat.service_name, &self.group, &self.beat.ip, self.beat.port)
    }
}

pub fn beat_key(service: &str, group: &str, ip: &str, port: u16) -> String {
    format!(
        "{}#{}#{}",
        crate::common::grouped_service_name(service, group),
        ip,
        port
    )
}

/// Keeps one heartbeat loop per registered ephemeral instance.
#[derive(Debug)]
pub struct BeatReactor {
    proxy: Arc<NamingProxy>,
    beats: Mutex<HashMap<String, Sender<BeatLoopCommand>>>,
}

impl BeatReactor {
    pub fn new(proxy: Arc<NamingProxy>) -> Self {
        Self {
            proxy,
            beats: Mutex::new(HashMap::new()),
        }
    }

    /// Start the heartbeat loop for the target, replacing the existing one for the same key.
    pub async fn add_beat_info(&self, target: BeatTarget) {
        let key = target.key();
        tracing::info!("[BEAT] adding beat: {} to beat map", key);

        let existing = self.beats.lock().await.remove(&key);
        if let Some(existing) = existing {
            stop_loop(existing, &key).await;
        }

        let (sender, receiver) = channel::<BeatLoopCommand>(1);
        tokio::spawn(beat_loop(Arc::clone(&self.proxy), target, receiver));
        self.beats.lock().await.insert(key, sender);
    }

    /// Stop the heartbeat loop. Stopping a loop which is absent or already
    /// finished is a no-op.
    pub async fn remove_beat_info(&self, service: &str, group: &str, ip: &str, port: u16) {
        let key = beat_key(service, group, ip, port);
        let sender = self.beats.lock().await.remove(&key);

        if let Some(sender) = sender {
            tracing::info!("[BEAT] removing beat: {} from beat map", key);
            stop_loop(sender, &key).await;
        }
    }

    pub async fn beat_count(&self) -> usize {
        self.beats.lock().await.len()
    }

    pub async fn shutdown(&self) {
        let beats: Vec<(String, Sender<BeatLoopCommand>)> =
            self.beats.lock().await.drain().collect();
        for (key, sender) in beats {
            stop_loop(sender, &key).await;
        }
    }
}

async fn stop_loop(channel: Sender<BeatLoopCommand>, key: &str) {
    let (tx, rx) = oneshot::channel();
    // The loop might have exited on its own, so both sides of the handshake may fail.
    if channel.send(BeatLoopCommand::StopBeat(tx)).await.is_ok() && rx.await.is_err() {
        tracing::warn!("Beat loop for {} already stopped", key);
    }
}

/// Send one beat, re-registering the instance if the server has forgotten it.
/// Returns the beat period the server asked for, if any.
async fn beat_once(proxy: &NamingProxy, target: &BeatTarget, key: &str) -> Option<Duration> {
    match proxy.send_beat(&target.beat, &target.group).await {
        Ok(resp) => {
            if resp.code == RESOURCE_NOT_FOUND {
                tracing::warn!(
                    "[BEAT] instance {} is unknown to the server, registering it again",
                    key
                );
                if let Err(e) = proxy
                    .register_service(&target.beat.service_name, &target.group, &target.instance)
                    .await
                {
                    tracing::error!("[BEAT] failed to re-register {}: {}", key, e);
                }
            } else if resp.code != BEAT_OK && resp.code != 0 {
                tracing::warn!("[BEAT] unexpected beat code {} for {}", resp.code, key);
            }

            if resp.client_beat_interval > 0 {
                Some(Duration::from_millis(resp.client_beat_interval as u64))
            } else {
                None
            }
        }
        Err(e) => {
            tracing::error!("[BEAT] failed to send beat for {}: {}", key, e);
            None
        }
    }
}

/// Handle a command received by the loop, returning true if the loop must exit.
fn handle_command(cmd: Option<BeatLoopCommand>, key: &str) -> bool {
    match cmd {
        Some(BeatLoopCommand::StopBeat(tx)) => {
            tracing::info!("Beat loop for {} stopped", key);
            if tx.send(BeatLoopCommand::Ok).is_err() {
                tracing::warn!("Beat stop requester for {} disappeared", key);
            }
            true
        }
        Some(c) => {
            tracing::warn!("Unexpected command for beat loop {}: {:?}", key, c);
            false
        }
        // Reactor dropped.
        None => true,
    }
}

async fn beat_loop(
    proxy: Arc<NamingProxy>,
    target: BeatTarget,
    mut receiver: Receiver<BeatLoopCommand>,
) {
    let key = target.key();
    let mut period = Duration::from_millis(target.beat.period.max(1));

    tracing::debug!(
        "Beat loop for {} started with period {} ms",
        key,
        period.as_millis()
    );

    loop {
        // A beat in flight is abandoned as soon as the loop is asked to stop.
        tokio::select! {
            next = beat_once(&proxy, &target, &key) => {
                if let Some(next) = next {
                    period = next;
                }
            },

            cmd = receiver.recv() => {
                if handle_command(cmd, &key) {
                    break;
                }
            }
        }

        // Wait till either the next beat is due or the loop is asked to stop.
        tokio::select! {
            _ = tokio::time::sleep(period) => {},

            cmd = receiver.recv() => {
                if handle_command(cmd, &key) {
                    break;
                }
            }
        }
    }
}
