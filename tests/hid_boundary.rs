//! HID auto-detect boundary behavior (8): `vid=0, pid=0` triggers
//! auto-detect via the known-device table; a non-zero pair forces an
//! exact match. Exercised against a fake `HidTransport` rather than real
//! hardware, since only the "other" platform variant is portable.

use async_trait::async_trait;
use steelboard_display_core::error::HidError;
use steelboard_display_core::geometry::DisplayGeometry;
use steelboard_display_core::hid::{self, known_devices::KNOWN_DEVICES, HidEndpoint, HidHandle, HidTransport};

struct FakeTransport {
    endpoints: Vec<HidEndpoint>,
}

#[async_trait]
impl HidTransport for FakeTransport {
    fn enumerate(&self) -> Result<Vec<HidEndpoint>, HidError> {
        Ok(self.endpoints.clone())
    }

    async fn open(&self, _path: &str) -> Result<HidHandle, HidError> {
        Err(HidError::NotSupported)
    }

    async fn send_feature_report(
        &self,
        _handle: &mut HidHandle,
        _geometry: DisplayGeometry,
        _pixel_bytes: &[u8],
    ) -> Result<(), HidError> {
        Err(HidError::NotSupported)
    }

    async fn close(&self, _handle: HidHandle) {}
}

#[test]
fn auto_detect_matches_first_known_device_present() {
    let known = KNOWN_DEVICES[0];
    let transport = FakeTransport {
        endpoints: vec![HidEndpoint {
            vendor_id: known.vendor_id,
            product_id: known.product_id,
            path: "/dev/hidraw7".to_string(),
            product_name: known.name.to_string(),
            interface_tag: hid::DEFAULT_INTERFACE_TAG.to_string(),
        }],
    };

    let path = transport.auto_detect(hid::DEFAULT_INTERFACE_TAG).unwrap();
    assert_eq!(path, "/dev/hidraw7");
}

#[test]
fn find_requires_exact_vid_pid_and_interface_match() {
    let transport = FakeTransport {
        endpoints: vec![HidEndpoint {
            vendor_id: 0x1038,
            product_id: 0x1612,
            path: "/dev/hidraw0".to_string(),
            product_name: "Apex 7".to_string(),
            interface_tag: "mi_01".to_string(),
        }],
    };

    assert!(transport.find(0x1038, 0x1612, "mi_01").is_ok());
    assert!(matches!(
        transport.find(0x1038, 0x9999, "mi_01"),
        Err(HidError::NotFound { .. })
    ));
}

#[test]
fn excluded_aliases_are_never_matched_even_with_correct_ids() {
    let transport = FakeTransport {
        endpoints: vec![HidEndpoint {
            vendor_id: 0x1038,
            product_id: 0x1612,
            path: "/dev/hidraw-kbd0".to_string(),
            product_name: "Apex 7 keyboard alias".to_string(),
            interface_tag: "mi_01".to_string(),
        }],
    };

    assert!(matches!(
        transport.find(0x1038, 0x1612, "mi_01"),
        Err(HidError::NotFound { .. })
    ));
}
