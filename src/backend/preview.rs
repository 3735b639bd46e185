/* Preview backend (4.C): stores the latest frame, rate-limits broadcast to
 * subscribers, and serves them over an `axum` WebSocket endpoint. A lagging
 * subscriber simply misses frames — `tokio::sync::broadcast`'s `Lagged`
 * error is treated as "skip to latest", giving silent-drop semantics
 * without a hand-rolled bounded queue. */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{Backend, BackendError};
use crate::config::Config;
use crate::geometry::{DisplayGeometry, Frame};

pub const BACKEND_NAME: &str = "preview";
/* Effectively unreachable during auto-select ordering (4.B). */
pub const PRIORITY: i32 = i32::MAX;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum OutgoingMessage {
    #[serde(rename = "frame")]
    Frame {
        width: u32,
        height: u32,
        frame: Vec<u8>,
        frame_number: u64,
        timestamp_ms: u64,
    },
    #[serde(rename = "config")]
    Config {
        width: u32,
        height: u32,
        target_fps: u32,
    },
}

struct SharedState {
    geometry: DisplayGeometry,
    target_fps: u32,
    current: RwLock<Option<(Frame, u64)>>,
    frame_number: AtomicU64,
    last_broadcast: RwLock<Option<Instant>>,
    tx: broadcast::Sender<OutgoingMessage>,
}

pub struct PreviewBackend {
    state: Arc<SharedState>,
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl PreviewBackend {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let geometry = config.geometry().map_err(|_| BackendError::Disconnected)?;
        let (tx, _rx) = broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        Ok(Self {
            state: Arc::new(SharedState {
                geometry,
                target_fps: config.preview.target_fps,
                current: RwLock::new(None),
                frame_number: AtomicU64::new(0),
                last_broadcast: RwLock::new(None),
                tx,
            }),
        })
    }

    /* The router this backend serves: `/subscribe` for the WebSocket feed,
     * `/healthz` as plain operational wiring (ambient, not spec.md). */
    pub fn router(&self) -> Router {
        Router::new()
            .route("/subscribe", get(subscribe_handler))
            .route("/healthz", get(|| async { "ok" }))
            .with_state(self.state.clone())
    }
}

async fn subscribe_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<SharedState>) {
    let mut rx = state.tx.subscribe();

    let config_msg = OutgoingMessage::Config {
        width: state.geometry.width,
        height: state.geometry.height,
        target_fps: state.target_fps,
    };
    if send_json(&mut socket, &config_msg).await.is_err() {
        return;
    }

    if let Some((frame, frame_number)) = state.current.read().await.clone() {
        let msg = OutgoingMessage::Frame {
            width: frame.geometry.width,
            height: frame.geometry.height,
            frame: frame.bytes,
            frame_number,
            timestamp_ms: now_epoch_ms(),
        };
        if send_json(&mut socket, &msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            biased;
            incoming = rx.recv() => {
                match incoming {
                    Ok(msg) => {
                        if send_json(&mut socket, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "preview subscriber lagged, skipping to latest");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                /* Client messages are reserved and ignored (6); only a
                 * closed/errored socket ends the session. */
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &OutgoingMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_default();
    socket.send(Message::Text(text.into())).await
}

#[async_trait]
impl Backend for PreviewBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), BackendError> {
        let frame_number = self.state.frame_number.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.current.write().await = Some((frame.clone(), frame_number));

        let should_broadcast = if self.state.target_fps == 0 {
            true
        } else {
            let min_interval = Duration::from_secs_f64(1.0 / self.state.target_fps as f64);
            let mut last = self.state.last_broadcast.write().await;
            match *last {
                Some(t) if t.elapsed() < min_interval => false,
                _ => {
                    *last = Some(Instant::now());
                    true
                }
            }
        };

        if should_broadcast {
            let msg = OutgoingMessage::Frame {
                width: frame.geometry.width,
                height: frame.geometry.height,
                frame: frame.bytes.clone(),
                frame_number,
                timestamp_ms: now_epoch_ms(),
            };
            // No subscribers is not an error — `send` only fails on zero receivers.
            let _ = self.state.tx.send(msg);
        }
        Ok(())
    }

    async fn send_frame_multi_res(
        &self,
        frames: &[((u32, u32), Frame)],
        _primary: (u32, u32),
    ) -> Result<(), BackendError> {
        match frames.first() {
            Some((_, frame)) => self.send_frame(frame).await,
            None => Ok(()),
        }
    }

    fn supports_batching(&self) -> bool {
        false
    }
}

pub fn factory(config: &Config) -> Result<Box<dyn Backend>, BackendError> {
    PreviewBackend::new(config).map(|b| Box::new(b) as Box<dyn Backend>)
}
