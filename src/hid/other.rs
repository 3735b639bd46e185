/* Fallback HID transport for platforms with no supported backend. Every
 * operation returns `NotSupported`; the Direct backend's factory treats
 * this as an expected failure during auto-select on such platforms (9). */

use async_trait::async_trait;

use super::{HidEndpoint, HidHandle, HidTransport};
use crate::error::HidError;
use crate::geometry::DisplayGeometry;

pub struct OtherHidTransport;

#[async_trait]
impl HidTransport for OtherHidTransport {
    fn enumerate(&self) -> Result<Vec<HidEndpoint>, HidError> {
        Err(HidError::NotSupported)
    }

    fn find(&self, _vid: u16, _pid: u16, _interface_tag: &str) -> Result<String, HidError> {
        Err(HidError::NotSupported)
    }

    fn auto_detect(&self, _interface_tag: &str) -> Result<String, HidError> {
        Err(HidError::NotSupported)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_is_not_supported() {
        let t = OtherHidTransport;
        assert!(matches!(t.enumerate(), Err(HidError::NotSupported)));
        assert!(matches!(
            t.open("whatever").await,
            Err(HidError::NotSupported)
        ));
    }
}
