/* Linux HID transport: hidraw enumeration via `udev`, feature reports via
 * the `HIDIOCSFEATURE` ioctl. Framing and ioctl plumbing are adapted
 * directly from the hardware-driver `DeviceIo` helper this daemon is
 * descended from (`nix::libc::ioctl` against a raw fd, rather than a
 * higher-level HID library). */

use std::os::unix::io::AsRawFd;

use async_trait::async_trait;
use nix::libc;
use tracing::{debug, warn};

use super::{build_linux_packet, HidEndpoint, HidHandle, HidTransport, LINUX_PACKET_SIZE};
use crate::error::HidError;
use crate::geometry::DisplayGeometry;

/* `_IOC(_IOC_READ|_IOC_WRITE, 'H', 0x06, len)` per Linux's `hidraw.h`.
 * hidraw's ioctl handler checks `_IOC_DIR(cmd) == (_IOC_WRITE|_IOC_READ)`
 * exactly, so the direction must be 3, not 1 — write-only yields -ENOTTY. */
fn hid_set_feature_req(len: usize) -> libc::c_ulong {
    let ioc_readwrite: libc::c_ulong = 3;
    let ioc_type: libc::c_ulong = b'H' as libc::c_ulong;
    let ioc_nr: libc::c_ulong = 0x06;
    (ioc_readwrite << 30) | (ioc_type << 8) | ioc_nr | ((len as libc::c_ulong) << 16)
}

pub struct LinuxHidTransport;

impl LinuxHidTransport {
    pub fn new() -> Self {
        Self
    }

    /* Read the `inputN` sysfs sibling of a hidraw device and normalize it
     * to the shared `mi_%02d` interface-tag convention (4.A). */
    fn interface_tag_for(device: &udev::Device) -> String {
        let mut current = Some(device.clone());
        while let Some(dev) = current {
            if let Some(sysname) = dev.sysname().to_str() {
                if let Some(rest) = sysname.strip_prefix("input") {
                    if let Ok(n) = rest.trim_end_matches(char::is_alphabetic).parse::<u32>() {
                        return super::interface_tag_from_input_number(n);
                    }
                }
            }
            current = dev.parent();
        }
        super::DEFAULT_INTERFACE_TAG.to_string()
    }

    fn usb_ids_for(device: &udev::Device) -> Option<(u16, u16)> {
        let mut current = Some(device.clone());
        while let Some(dev) = current {
            if let (Some(vid), Some(pid)) = (
                dev.property_value("ID_VENDOR_ID"),
                dev.property_value("ID_MODEL_ID"),
            ) {
                let vid = u16::from_str_radix(vid.to_str()?, 16).ok()?;
                let pid = u16::from_str_radix(pid.to_str()?, 16).ok()?;
                return Some((vid, pid));
            }
            current = dev.parent();
        }
        None
    }
}

impl Default for LinuxHidTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HidTransport for LinuxHidTransport {
    fn enumerate(&self) -> Result<Vec<HidEndpoint>, HidError> {
        let context = udev::Enumerator::new().map_err(|e| HidError::Io {
            path: "udev".to_string(),
            source: e,
        })?;
        let mut context = context;
        context
            .match_subsystem("hidraw")
            .map_err(|e| HidError::Io {
                path: "udev".to_string(),
                source: e,
            })?;

        let mut out = Vec::new();
        let devices = context.scan_devices().map_err(|e| HidError::Io {
            path: "udev".to_string(),
            source: e,
        })?;

        for device in devices {
            let path = match device.devnode() {
                Some(p) => p.to_string_lossy().to_string(),
                None => continue,
            };

            let (vid, pid) = match Self::usb_ids_for(&device) {
                Some(ids) => ids,
                None => continue,
            };

            let product_name = device
                .property_value("HID_NAME")
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default();

            let interface_tag = Self::interface_tag_for(&device);

            out.push(HidEndpoint {
                vendor_id: vid,
                product_id: pid,
                path,
                product_name,
                interface_tag,
            });
        }

        Ok(out)
    }

    async fn open(&self, path: &str) -> Result<HidHandle, HidError> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    HidError::PermissionDenied {
                        path: path.to_string(),
                    }
                } else {
                    HidError::Io {
                        path: path.to_string(),
                        source: e,
                    }
                }
            })?;
        Ok(HidHandle::Linux(file))
    }

    async fn send_feature_report(
        &self,
        handle: &mut HidHandle,
        geometry: DisplayGeometry,
        pixel_bytes: &[u8],
    ) -> Result<(), HidError> {
        let HidHandle::Linux(file) = handle else {
            return Err(HidError::NotSupported);
        };

        let _ = geometry;
        let mut packet = build_linux_packet(pixel_bytes);
        let fd = file.as_raw_fd();
        let req = hid_set_feature_req(LINUX_PACKET_SIZE);

        /* SAFETY: `fd` is the raw descriptor of `file`, kept alive by `handle`
         * for the duration of this call. `packet` is a live, correctly-sized
         * buffer whose length matches what `req` encodes. */
        let res = unsafe { libc::ioctl(fd, req, packet.as_mut_ptr()) };

        if res < 0 {
            let err = std::io::Error::last_os_error();
            warn!("HIDIOCSFEATURE failed: {err}");
            return Err(HidError::Io {
                path: "hidraw".to_string(),
                source: err,
            });
        }

        debug!("sent {} byte feature report", packet.len());
        Ok(())
    }

    async fn close(&self, handle: HidHandle) {
        let HidHandle::Linux(file) = handle else {
            return;
        };
        drop(file);
    }
}
