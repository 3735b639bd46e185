/* Vendor-HTTP backend (4.C, 6): talks to the SteelSeries GameSense service
 * over a loopback HTTP API discovered via `coreProps.json`. Built on
 * `reqwest` the way the pack's other HTTP-facing daemons pull in a client
 * rather than hand-rolling one over `hyper` directly. */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{Backend, BackendError};
use crate::config::Config;
use crate::geometry::{DisplayGeometry, Frame};

pub const BACKEND_NAME: &str = "gamesense";
const HTTP_TIMEOUT: Duration = Duration::from_millis(500);
const EVENT_NAME: &str = "STEELCLOCK_DISPLAY";

fn device_type_for(geometry: DisplayGeometry) -> String {
    format!("screened-{}x{}", geometry.width, geometry.height)
}

/* Read and parse `coreProps.json`, returning its `address` field as-is
 * (e.g. `"127.0.0.1:12345"`). The file layout is `{"address": "host:port", ...}`. */
fn read_core_props(path: &Path) -> Result<String, BackendError> {
    let text = std::fs::read_to_string(path).map_err(|_| BackendError::Disconnected)?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|_| BackendError::Disconnected)?;
    let address = value
        .get("address")
        .and_then(|v| v.as_str())
        .ok_or(BackendError::Disconnected)?;
    validate_host_port(address)?;
    Ok(address.to_string())
}

fn validate_host_port(address: &str) -> Result<(), BackendError> {
    let (host, port) = address.rsplit_once(':').ok_or(BackendError::Disconnected)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(BackendError::Disconnected);
    }
    Ok(())
}

fn core_props_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(program_data) = std::env::var("PROGRAMDATA") {
        candidates.push(
            PathBuf::from(program_data)
                .join("SteelSeries")
                .join("SteelSeries Engine 3")
                .join("coreProps.json"),
        );
    }
    candidates.push(PathBuf::from(
        r"C:\ProgramData\SteelSeries\SteelSeries Engine 3\coreProps.json",
    ));
    candidates
}

fn discover_base_url() -> Result<String, BackendError> {
    for candidate in core_props_candidates() {
        if let Ok(address) = read_core_props(&candidate) {
            return Ok(format!("http://{address}"));
        }
    }
    Err(BackendError::Disconnected)
}

pub struct VendorBackend {
    client: reqwest::Client,
    base_url: String,
    geometry: DisplayGeometry,
    game_name: String,
    batching_supported: AtomicBool,
    batching_probed: AtomicBool,
}

impl VendorBackend {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let base_url = discover_base_url()?;
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(BackendError::Http)?;
        Ok(Self {
            client,
            base_url,
            geometry: config.geometry().map_err(|_| BackendError::Disconnected)?,
            game_name: config.game_name.clone(),
            batching_supported: AtomicBool::new(false),
            batching_probed: AtomicBool::new(false),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(BackendError::Http)?;
        if !response.status().is_success() {
            return Err(BackendError::NonSuccessStatus(response.status().as_u16()));
        }
        Ok(())
    }

    fn frame_as_ints(frame: &Frame) -> Result<&[u8], BackendError> {
        let expected = frame.geometry.bytes_per_frame();
        if frame.bytes.len() != expected {
            return Err(BackendError::SizeMismatch {
                expected,
                actual: frame.bytes.len(),
            });
        }
        Ok(&frame.bytes)
    }

    async fn probe_batching(&self) {
        if self.batching_probed.swap(true, Ordering::SeqCst) {
            return;
        }
        let supported = self
            .client
            .get(self.endpoint("/supports_multiple_game_events"))
            .send()
            .await
            .ok()
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        self.batching_supported.store(supported, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for VendorBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    /* Fire-and-forget by design (9, Open Question a): a failed POST is
     * logged at debug and never surfaced to the compositor. */
    async fn send_frame(&self, frame: &Frame) -> Result<(), BackendError> {
        let bytes = match Self::frame_as_ints(frame) {
            Ok(b) => b,
            Err(e) => {
                debug!("vendor send_frame: {e}");
                return Ok(());
            }
        };
        let body = json!({
            "game": self.game_name,
            "event": EVENT_NAME,
            "data": { "frame": { "image-data": bytes } },
        });
        if let Err(e) = self.post_json("/game_event", body).await {
            debug!("vendor send_frame failed (fire-and-forget): {e}");
        }
        Ok(())
    }

    async fn send_frame_multi_res(
        &self,
        frames: &[((u32, u32), Frame)],
        _primary: (u32, u32),
    ) -> Result<(), BackendError> {
        let mut image_data = serde_json::Map::new();
        for ((w, h), frame) in frames {
            let bytes = match Self::frame_as_ints(frame) {
                Ok(b) => b,
                Err(e) => {
                    debug!("vendor send_frame_multi_res: {e}");
                    continue;
                }
            };
            image_data.insert(format!("image-data-{w}x{h}"), json!(bytes));
        }
        let body = json!({
            "game": self.game_name,
            "event": EVENT_NAME,
            "data": { "frame": serde_json::Value::Object(image_data) },
        });
        if let Err(e) = self.post_json("/game_event", body).await {
            debug!("vendor send_frame_multi_res failed (fire-and-forget): {e}");
        }
        Ok(())
    }

    fn supports_batching(&self) -> bool {
        self.batching_supported.load(Ordering::SeqCst)
    }

    async fn send_multiple(&self, frames: &[Frame]) -> Result<(), BackendError> {
        self.probe_batching().await;
        if !self.supports_batching() {
            return match frames.last() {
                Some(frame) => self.send_frame(frame).await,
                None => Ok(()),
            };
        }
        let events: Vec<serde_json::Value> = frames
            .iter()
            .filter_map(|f| Self::frame_as_ints(f).ok())
            .map(|bytes| {
                json!({
                    "game": self.game_name,
                    "event": EVENT_NAME,
                    "data": { "frame": { "image-data": bytes } },
                })
            })
            .collect();
        self.post_json("/multiple_game_events", json!({ "events": events }))
            .await
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        self.post_json("/game_heartbeat", json!({ "game": self.game_name }))
            .await
    }

    async fn register_game(&self, game_name: &str, display_name: &str) -> Result<(), BackendError> {
        self.post_json(
            "/game_metadata",
            json!({
                "game": game_name,
                "game_display_name": display_name,
                "developer": "steelboard-display-core",
            }),
        )
        .await
    }

    async fn bind_event(
        &self,
        event_name: &str,
        _device_type: &str,
        _zone: &str,
    ) -> Result<(), BackendError> {
        self.post_json(
            "/bind_game_event",
            json!({
                "game": self.game_name,
                "event": event_name,
                "min_value": 0,
                "max_value": 100,
                "icon_id": 0,
                "handlers": [{
                    "device-type": device_type_for(self.geometry),
                    "zone": "one",
                    "mode": "screen",
                    "datas": [{
                        "has-text": false,
                        "image-data": vec![0u8; self.geometry.bytes_per_frame()],
                    }],
                }],
            }),
        )
        .await
    }

    async fn remove_game(&self) -> Result<(), BackendError> {
        self.post_json("/remove_game", json!({ "game": self.game_name }))
            .await
    }
}

pub fn bind_event_name() -> &'static str {
    EVENT_NAME
}

pub fn factory(config: &Config) -> Result<Box<dyn Backend>, BackendError> {
    VendorBackend::new(config).map(|b| Box::new(b) as Box<dyn Backend>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_matches_geometry() {
        assert_eq!(
            device_type_for(DisplayGeometry::STEELSERIES_OLED),
            "screened-128x40"
        );
    }

    #[test]
    fn validates_host_port_numeric() {
        assert!(validate_host_port("127.0.0.1:12345").is_ok());
        assert!(validate_host_port("127.0.0.1:notaport").is_err());
        assert!(validate_host_port("no-colon-here").is_err());
    }

    #[test]
    fn core_props_parses_address_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreProps.json");
        std::fs::write(&path, r#"{"address": "127.0.0.1:54321"}"#).unwrap();
        assert_eq!(read_core_props(&path).unwrap(), "127.0.0.1:54321");
    }

    #[test]
    fn core_props_rejects_missing_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreProps.json");
        std::fs::write(&path, r#"{"nope": true}"#).unwrap();
        assert!(read_core_props(&path).is_err());
    }

    #[test]
    fn frame_as_ints_rejects_wrong_size() {
        let frame = Frame {
            geometry: DisplayGeometry::STEELSERIES_OLED,
            bytes: vec![0u8; 10],
        };
        assert!(matches!(
            VendorBackend::frame_as_ints(&frame),
            Err(BackendError::SizeMismatch { .. })
        ));
    }
}
