/* Windows HID transport: enumeration and feature reports via the `hidapi`
 * crate, the same library the pack's Windows HID-discovery code uses.
 * hidapi's API is synchronous, so `open`/`send_feature_report` run the
 * blocking calls on a blocking-pool thread via `spawn_blocking`. */

use async_trait::async_trait;
use tracing::warn;

use super::{build_windows_packet, HidEndpoint, HidHandle, HidTransport};
use crate::error::HidError;
use crate::geometry::DisplayGeometry;

pub struct WindowsHidTransport;

impl WindowsHidTransport {
    pub fn new() -> Self {
        Self
    }

    /* The device-instance path contains `mi_XX` literally for composite HID
     * devices; fall back to the shared default when absent (4.A). */
    fn interface_tag_from_path(path: &str) -> String {
        let lower = path.to_ascii_lowercase();
        if let Some(idx) = lower.find("mi_") {
            let tag = &lower[idx..(idx + 5).min(lower.len())];
            if tag.len() == 5 {
                return tag.to_string();
            }
        }
        super::DEFAULT_INTERFACE_TAG.to_string()
    }
}

impl Default for WindowsHidTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HidTransport for WindowsHidTransport {
    fn enumerate(&self) -> Result<Vec<HidEndpoint>, HidError> {
        let api = hidapi::HidApi::new().map_err(|e| HidError::Io {
            path: "hidapi".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;

        let mut out = Vec::new();
        for info in api.device_list() {
            let path = info.path().to_string_lossy().to_string();
            out.push(HidEndpoint {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                path: path.clone(),
                product_name: info
                    .product_string()
                    .unwrap_or_default()
                    .to_string(),
                interface_tag: Self::interface_tag_from_path(&path),
            });
        }
        Ok(out)
    }

    async fn open(&self, path: &str) -> Result<HidHandle, HidError> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let api = hidapi::HidApi::new().map_err(|e| HidError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
            let cpath = std::ffi::CString::new(path.clone()).map_err(|_| HidError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "nul in path"),
            })?;
            let device = api.open_path(&cpath).map_err(|e| {
                let msg = e.to_string();
                if msg.to_ascii_lowercase().contains("denied")
                    || msg.to_ascii_lowercase().contains("access")
                {
                    HidError::PermissionDenied { path: path.clone() }
                } else {
                    HidError::Io {
                        path: path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::Other, msg),
                    }
                }
            })?;
            Ok(HidHandle::Windows(device))
        })
        .await
        .map_err(|e| HidError::Io {
            path: "spawn_blocking".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?
    }

    async fn send_feature_report(
        &self,
        handle: &mut HidHandle,
        geometry: DisplayGeometry,
        pixel_bytes: &[u8],
    ) -> Result<(), HidError> {
        let HidHandle::Windows(device) = handle else {
            return Err(HidError::NotSupported);
        };

        let packet = build_windows_packet(geometry.bytes_per_frame(), pixel_bytes);

        device.send_feature_report(&packet).map_err(|e| {
            warn!("send_feature_report failed: {e}");
            HidError::Io {
                path: "hid feature report".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            }
        })
    }

    async fn close(&self, handle: HidHandle) {
        let HidHandle::Windows(device) = handle else {
            return;
        };
        drop(device);
    }
}
