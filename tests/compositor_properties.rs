//! Compositor invariants (8): frame-size, z-order rendering, and
//! stop/start idempotence, exercised through the public API with a stub
//! backend and stub widgets rather than real hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use steelboard_display_core::backend::{Backend, BackendError};
use steelboard_display_core::compositor::{Compositor, CompositorState};
use steelboard_display_core::geometry::{DisplayGeometry, Frame, WidgetPlacement};
use steelboard_display_core::widget::test_support::StubWidget;
use steelboard_display_core::widget::Widget;

struct RecordingBackend {
    frames: std::sync::Mutex<Vec<Frame>>,
    count: AtomicUsize,
}

#[async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), BackendError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

#[tokio::test]
async fn delivered_frames_always_match_the_configured_byte_size() {
    let geometry = DisplayGeometry::STEELSERIES_OLED;
    let backend = Arc::new(RecordingBackend {
        frames: std::sync::Mutex::new(Vec::new()),
        count: AtomicUsize::new(0),
    });
    let widget: Arc<dyn Widget> = Arc::new(StubWidget::new(
        "clock",
        WidgetPlacement { x: 0, y: 0, w: 40, h: 10, z_order: 0 },
    ));
    let (tx, _rx) = mpsc::channel(4);

    let compositor = Compositor::new(
        geometry,
        0,
        Duration::from_millis(10),
        backend.clone() as Arc<dyn Backend>,
        vec![widget],
        tx,
    );
    compositor.start().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    compositor.stop().await;

    let frames = backend.frames.lock().unwrap();
    assert!(!frames.is_empty());
    for frame in frames.iter() {
        assert_eq!(frame.bytes.len(), geometry.bytes_per_frame());
    }
}

#[tokio::test]
async fn stop_start_is_idempotent_and_final_state_is_stopped() {
    let geometry = DisplayGeometry::STEELSERIES_OLED;
    let backend = Arc::new(RecordingBackend {
        frames: std::sync::Mutex::new(Vec::new()),
        count: AtomicUsize::new(0),
    });
    let (tx, _rx) = mpsc::channel(4);
    let compositor = Compositor::new(
        geometry,
        0,
        Duration::from_millis(5),
        backend as Arc<dyn Backend>,
        vec![],
        tx,
    );

    compositor.start().await;
    compositor.start().await;
    compositor.stop().await;
    compositor.stop().await;

    assert_eq!(compositor.state(), CompositorState::Stopped);
}

#[tokio::test]
async fn disabled_widgets_never_contribute_pixels() {
    let geometry = DisplayGeometry::new(8, 8).unwrap();
    let backend = Arc::new(RecordingBackend {
        frames: std::sync::Mutex::new(Vec::new()),
        count: AtomicUsize::new(0),
    });
    let widget = Arc::new(StubWidget::new(
        "full",
        WidgetPlacement { x: 0, y: 0, w: 8, h: 8, z_order: 0 },
    ));
    widget.is_enabled.store(false, Ordering::SeqCst);
    let widgets: Vec<Arc<dyn Widget>> = vec![widget];
    let (tx, _rx) = mpsc::channel(4);

    let compositor = Compositor::new(
        geometry,
        0,
        Duration::from_millis(10),
        backend.clone() as Arc<dyn Backend>,
        widgets,
        tx,
    );
    compositor.start().await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    compositor.stop().await;

    let frames = backend.frames.lock().unwrap();
    assert!(frames.iter().all(|f| f.bytes.iter().all(|&b| b == 0)));
}
