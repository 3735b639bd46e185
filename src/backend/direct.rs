/* Direct-HID backend (4.C): drives the USB display directly through the
 * `hid` transport, bypassing the vendor service entirely. Auto-reconnects
 * on heartbeat when the handle has gone away, mirroring the teacher's
 * per-device "disconnected" flag plus lazy-reopen-on-next-use pattern. */

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Backend, BackendError};
use crate::config::Config;
use crate::error::HidError;
use crate::geometry::{DisplayGeometry, Frame};
use crate::hid::{self, HidHandle, HidTransport};

pub const BACKEND_NAME: &str = "direct";

fn parse_hex_u16(field: &str, value: &str) -> Result<u16, BackendError> {
    u16::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|_| {
        BackendError::Hid(HidError::Io {
            path: field.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid hex value {value:?} for {field}"),
            ),
        })
    })
}

pub struct DirectBackend {
    transport: Box<dyn HidTransport>,
    vid: u16,
    pid: u16,
    interface_tag: String,
    geometry: DisplayGeometry,
    handle: Mutex<Option<HidHandle>>,
    disconnected: AtomicBool,
}

impl DirectBackend {
    pub async fn new(config: &Config) -> Result<Self, BackendError> {
        let geometry = config.geometry().map_err(|_| BackendError::Disconnected)?;
        let vid_raw = &config.direct_driver.vid;
        let pid_raw = &config.direct_driver.pid;

        /* A bad hex VID/PID must fail before any device I/O is attempted
         * (8, scenario 6), so these parses happen first. */
        let (vid, pid) = if vid_raw.is_empty() && pid_raw.is_empty() {
            (0, 0)
        } else {
            (parse_hex_u16("direct_driver.vid", vid_raw)?, parse_hex_u16("direct_driver.pid", pid_raw)?)
        };

        let transport = hid::platform_transport();
        let interface_tag = config.direct_driver.interface.clone();

        let path = if vid == 0 && pid == 0 {
            transport.auto_detect(&interface_tag)?
        } else {
            transport.find(vid, pid, &interface_tag)?
        };

        let handle = transport.open(&path).await?;

        Ok(Self {
            transport,
            vid,
            pid,
            interface_tag,
            geometry,
            handle: Mutex::new(Some(handle)),
            disconnected: AtomicBool::new(false),
        })
    }

    async fn reconnect(&self) -> Result<(), BackendError> {
        let path = if self.vid == 0 && self.pid == 0 {
            self.transport.auto_detect(&self.interface_tag)?
        } else {
            self.transport.find(self.vid, self.pid, &self.interface_tag)?
        };
        let new_handle = self.transport.open(&path).await?;
        *self.handle.lock().await = Some(new_handle);
        self.disconnected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), BackendError> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_mut() else {
            self.disconnected.store(true, Ordering::SeqCst);
            return Err(BackendError::Disconnected);
        };

        /* Short frames are zero-padded to the packet size rather than
         * rejected (8, boundary behavior) — unlike the Vendor backend. */
        match self
            .transport
            .send_feature_report(handle, self.geometry, &frame.bytes)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("direct backend write failed, marking disconnected: {e}");
                if let Some(stale) = guard.take() {
                    self.transport.close(stale).await;
                }
                self.disconnected.store(true, Ordering::SeqCst);
                Err(BackendError::Hid(e))
            }
        }
    }
}

#[async_trait]
impl Backend for DirectBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), BackendError> {
        self.write_frame(frame).await
    }

    fn supports_batching(&self) -> bool {
        false
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        if self.disconnected.load(Ordering::SeqCst) {
            debug!("direct backend disconnected, attempting reconnect on heartbeat");
            self.reconnect().await?;
        }
        Ok(())
    }
}

pub async fn factory(config: &Config) -> Result<Box<dyn Backend>, BackendError> {
    DirectBackend::new(config)
        .await
        .map(|b| Box::new(b) as Box<dyn Backend>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_plain_and_0x_prefixed() {
        assert_eq!(parse_hex_u16("vid", "1038").unwrap(), 0x1038);
        assert_eq!(parse_hex_u16("vid", "0x1038").unwrap(), 0x1038);
    }

    #[test]
    fn parse_hex_rejects_invalid_digit() {
        assert!(parse_hex_u16("vid", "103g").is_err());
    }
}
