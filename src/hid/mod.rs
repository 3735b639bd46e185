/* HID transport: platform-specific device enumeration, open/close, and
 * feature-report framing (4.A). The rest of the system only ever sees the
 * `HidTransport` trait and `HidHandle`; the three platform builds
 * (Windows/Linux/Other) are selected entirely at compile time via `cfg`. */

pub mod known_devices;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "windows")]
pub mod windows;
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub mod other;

use async_trait::async_trait;

use crate::error::HidError;
use crate::geometry::DisplayGeometry;
use known_devices::KNOWN_DEVICES;

/* Command byte shared by every generation of the wire protocol (6). */
pub const HID_CMD: u8 = 0x61;

/* Default interface tag when the config doesn't specify one. */
pub const DEFAULT_INTERFACE_TAG: &str = "mi_01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidEndpoint {
    pub vendor_id: u16,
    pub product_id: u16,
    pub path: String,
    pub product_name: String,
    pub interface_tag: String,
}

/* An open HID interface. The inner representation is platform-specific and
 * lives entirely in the matching `cfg`-gated submodule; only one variant of
 * this enum is ever reachable in a given build. */
pub enum HidHandle {
    #[cfg(target_os = "linux")]
    Linux(tokio::fs::File),
    #[cfg(target_os = "windows")]
    Windows(hidapi::HidDevice),
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    Unreachable,
}

/* Paths whose device-instance string marks a non-display keyboard
 * collection alias and must never be matched (4.A). */
fn is_excluded_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.contains("kbd") || lower.contains("col02")
}

#[async_trait]
pub trait HidTransport: Send + Sync {
    /* List candidate HID endpoints on this platform. */
    fn enumerate(&self) -> Result<Vec<HidEndpoint>, HidError>;

    /* Select the single interface matching all three fields exactly. */
    fn find(&self, vid: u16, pid: u16, interface_tag: &str) -> Result<String, HidError> {
        self.enumerate()?
            .into_iter()
            .find(|e| {
                e.vendor_id == vid && e.product_id == pid && e.interface_tag == interface_tag
                    && !is_excluded_path(&e.path)
            })
            .map(|e| e.path)
            .ok_or(HidError::NotFound {
                vid,
                pid,
                interface: interface_tag.to_string(),
            })
    }

    /* Iterate the KnownDevice table in declaration order, returning the
     * first device present on the bus with the given interface tag. */
    fn auto_detect(&self, interface_tag: &str) -> Result<String, HidError> {
        let endpoints = self.enumerate()?;
        for known in KNOWN_DEVICES {
            if let Some(e) = endpoints.iter().find(|e| {
                e.vendor_id == known.vendor_id
                    && e.product_id == known.product_id
                    && e.interface_tag == interface_tag
                    && !is_excluded_path(&e.path)
            }) {
                return Ok(e.path.clone());
            }
        }
        Err(HidError::NotFound {
            vid: 0,
            pid: 0,
            interface: interface_tag.to_string(),
        })
    }

    async fn open(&self, path: &str) -> Result<HidHandle, HidError>;
    async fn send_feature_report(
        &self,
        handle: &mut HidHandle,
        geometry: DisplayGeometry,
        pixel_bytes: &[u8],
    ) -> Result<(), HidError>;
    async fn close(&self, handle: HidHandle);
}

/* Construct the Windows feature-report packet (4.A, 6), bit-exact:
 * `[0x00 report_id][0x61 cmd][16 bytes 0x00 padding][pixel_bytes...]`,
 * total length `18 + bytes_per_frame`, zero-padded or truncated to fit. */
pub fn build_windows_packet(bytes_per_frame: usize, pixel_bytes: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; 18 + bytes_per_frame];
    packet[0] = 0x00;
    packet[1] = HID_CMD;
    let n = pixel_bytes.len().min(bytes_per_frame);
    packet[18..18 + n].copy_from_slice(&pixel_bytes[..n]);
    packet
}

/* Construct the Linux feature-report packet (4.A, 6), bit-exact:
 * `[0x61 cmd][pixel_bytes...][0x00 padding]`, total length a FIXED 642 bytes
 * (641 data bytes follow the command byte), regardless of geometry. */
pub const LINUX_PACKET_SIZE: usize = 642;
pub const LINUX_PACKET_DATA_CAPACITY: usize = LINUX_PACKET_SIZE - 1;

pub fn build_linux_packet(pixel_bytes: &[u8]) -> [u8; LINUX_PACKET_SIZE] {
    let mut packet = [0u8; LINUX_PACKET_SIZE];
    packet[0] = HID_CMD;
    let n = pixel_bytes.len().min(LINUX_PACKET_DATA_CAPACITY);
    packet[1..1 + n].copy_from_slice(&pixel_bytes[..n]);
    packet
}

/* Normalize a Linux sysfs `inputN` suffix into the `mi_%02d` interface tag
 * convention shared with the Windows `mi_XX` device-instance substring. */
pub fn interface_tag_from_input_number(input_number: u32) -> String {
    format!("mi_{:02}", input_number)
}

/* Construct the transport implementation for the current platform. */
pub fn platform_transport() -> Box<dyn HidTransport> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxHidTransport::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsHidTransport::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Box::new(other::OtherHidTransport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_packet_framing() {
        let packet = build_windows_packet(640, &[0xAA; 640]);
        assert_eq!(packet.len(), 18 + 640);
        assert_eq!(packet[0], 0x00);
        assert_eq!(packet[1], 0x61);
        assert_eq!(&packet[18..], &[0xAAu8; 640][..]);
    }

    #[test]
    fn windows_packet_short_input_zero_padded() {
        let packet = build_windows_packet(640, &[0xFF; 10]);
        assert_eq!(packet.len(), 658);
        assert_eq!(&packet[18..28], &[0xFFu8; 10][..]);
        assert!(packet[28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn windows_packet_long_input_truncated() {
        let packet = build_windows_packet(4, &[0xFF; 10]);
        assert_eq!(packet.len(), 22);
        assert_eq!(&packet[18..22], &[0xFFu8; 4][..]);
    }

    #[test]
    fn linux_packet_framing_fixed_size() {
        let packet = build_linux_packet(&[0x11; 640]);
        assert_eq!(packet.len(), LINUX_PACKET_SIZE);
        assert_eq!(packet[0], 0x61);
        assert_eq!(&packet[1..641], &[0x11u8; 640][..]);
        assert_eq!(packet[641], 0);
    }

    #[test]
    fn linux_packet_truncates_oversized_data() {
        let packet = build_linux_packet(&[0x22; 1000]);
        assert_eq!(packet.len(), LINUX_PACKET_SIZE);
        assert!(packet[1..].iter().all(|&b| b == 0x22));
    }

    #[test]
    fn excludes_kbd_and_col02_aliases() {
        assert!(is_excluded_path("\\\\?\\hid#vid_1038&pid_1612&col02"));
        assert!(is_excluded_path("/dev/kbd0"));
        assert!(!is_excluded_path("/dev/hidraw3"));
    }

    #[test]
    fn interface_tag_normalization() {
        assert_eq!(interface_tag_from_input_number(1), "mi_01");
        assert_eq!(interface_tag_from_input_number(12), "mi_12");
    }
}
