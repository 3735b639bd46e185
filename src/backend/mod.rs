/* Backend abstraction (4.B, 4.C). A single `Backend` trait expresses the
 * full capability set (frame delivery, heartbeat, batch delivery, game
 * registration); concrete backends override only the subset they actually
 * support and inherit no-op/best-effort defaults for the rest, so callers
 * in `Compositor`/`LifecycleManager` can hold one `Box<dyn Backend>` and
 * call whichever methods are relevant without downcasting. */

pub mod direct;
pub mod preview;
pub mod registry;
pub mod vendor;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{CoreError, HidError};
use crate::geometry::Frame;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vendor service returned status {0}")]
    NonSuccessStatus(u16),
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Hid(#[from] HidError),
    #[error("no frame for resolution {width}x{height}")]
    ResolutionNotFound { width: u32, height: u32 },
    #[error("backend device is not connected")]
    Disconnected,
    #[error("operation not supported by this backend")]
    NotSupported,
}

impl From<BackendError> for CoreError {
    fn from(e: BackendError) -> Self {
        CoreError::BackendUnavailable(anyhow::anyhow!(e))
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn send_frame(&self, frame: &Frame) -> Result<(), BackendError>;

    /* Deliver the frame matching `primary` when a backend has no native
     * multi-resolution support (9, scenario: device advertises one native
     * resolution). Vendor overrides this to post the full resolution map. */
    async fn send_frame_multi_res(
        &self,
        frames: &[((u32, u32), Frame)],
        primary: (u32, u32),
    ) -> Result<(), BackendError> {
        match frames.iter().find(|(res, _)| *res == primary) {
            Some((_, frame)) => self.send_frame(frame).await,
            None => Err(BackendError::ResolutionNotFound {
                width: primary.0,
                height: primary.1,
            }),
        }
    }

    fn supports_batching(&self) -> bool {
        false
    }

    /* Send a short burst of frames as one logical update. Backends without
     * native batch support send only the last frame (4.C, 8 scenario 4). */
    async fn send_multiple(&self, frames: &[Frame]) -> Result<(), BackendError> {
        match frames.last() {
            Some(frame) => self.send_frame(frame).await,
            None => Ok(()),
        }
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn register_game(&self, _game_name: &str, _display_name: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn bind_event(
        &self,
        _event_name: &str,
        _device_type: &str,
        _zone: &str,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn remove_game(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
