/* Crate-wide error types.
 *
 * `HidError` covers failures internal to the HID transport (4.A); it is
 * never surfaced to a caller outside the Direct backend except wrapped
 * into `CoreError::BackendUnavailable` at the Lifecycle boundary (7). */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HidError {
    #[error("no HID interface found for vid={vid:#06x} pid={pid:#06x} interface={interface}")]
    NotFound {
        vid: u16,
        pid: u16,
        interface: String,
    },

    #[error("HID device at {path} is not connected")]
    DeviceNotConnected { path: String },

    #[error("display resolution {width}x{height} not found on this device")]
    ResolutionNotFound { width: u32, height: u32 },

    #[error("permission denied opening {path} (add a udev rule to grant access)")]
    PermissionDenied { path: String },

    #[error("HID operation not supported on this platform")]
    NotSupported,

    #[error("HID I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/* Top-level error kinds per spec.md §7. */
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no backend available: {0:#}")]
    BackendUnavailable(#[source] anyhow::Error),

    #[error("no widgets enabled in configuration")]
    NoWidgetsEnabled,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("retry aborted by shutdown")]
    Cancelled,

    #[error("unknown backend: {name} (available: {available})")]
    UnknownBackend { name: String, available: String },
}

impl From<HidError> for CoreError {
    fn from(e: HidError) -> Self {
        CoreError::BackendUnavailable(anyhow::anyhow!(e))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/* Desktop-notification seam (7): Lifecycle calls this whenever it enters
 * error-display mode. The concrete notification backend belongs to the
 * tray-UI collaborator (Non-goals, §1); this crate only ships the
 * log-only default so the daemon is still observable headless. */
pub trait NotificationSink: Send + Sync {
    fn notify_error(&self, message: &str) {
        tracing::warn!(message, "SteelClock Error");
    }
}

pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {}
