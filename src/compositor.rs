/* Compositor (4.E): owns the canvas, paces the render loop, composites
 * widgets z-order-sorted, packs to 1bpp, and hands frames to the backend.
 * Modeled on the teacher's actor-per-device task plus `watch`-based
 * shutdown signal rather than an `mpsc` stop message, since a `watch` fits
 * a broadcast-to-many-tasks shutdown (render loop + per-widget update
 * tasks) better than a single-consumer channel. */

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError};
use crate::geometry::{Canvas, DisplayGeometry};
use crate::widget::{BackgroundPolicy, Widget, WidgetRenderOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for CompositorState {
    fn from(v: u8) -> Self {
        match v {
            0 => CompositorState::Created,
            1 => CompositorState::Running,
            2 => CompositorState::Stopping,
            _ => CompositorState::Stopped,
        }
    }
}

/* Emitted once per failure burst when the backend's `send_frame` indicates
 * the device has gone away; the Lifecycle supervisor consumes these over an
 * `mpsc` channel rather than the Compositor holding a back-reference (4.F,
 * 9, cyclic-lifecycle design note). */
#[derive(Debug)]
pub struct BackendFailedEvent {
    pub backend_name: String,
}

pub struct Compositor {
    geometry: DisplayGeometry,
    background: u8,
    refresh_rate: Duration,
    backend: Arc<dyn Backend>,
    widgets: Vec<Arc<dyn Widget>>,
    on_backend_failure: mpsc::Sender<BackendFailedEvent>,
    state: Arc<AtomicU8>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Compositor {
    pub fn new(
        geometry: DisplayGeometry,
        background: u8,
        refresh_rate: Duration,
        backend: Arc<dyn Backend>,
        widgets: Vec<Arc<dyn Widget>>,
        on_backend_failure: mpsc::Sender<BackendFailedEvent>,
    ) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            geometry,
            background,
            refresh_rate,
            backend,
            widgets,
            on_backend_failure,
            state: Arc::new(AtomicU8::new(CompositorState::Created as u8)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CompositorState {
        CompositorState::from(self.state.load(Ordering::SeqCst))
    }

    /* Start the render loop on its own task. Idempotent: calling start on an
     * already-running compositor is a no-op (8, stop/start idempotence). */
    pub async fn start(&self) {
        if self.state() != CompositorState::Created {
            warn!("compositor start() called outside Created state, ignoring");
            return;
        }
        self.state.store(CompositorState::Running as u8, Ordering::SeqCst);

        let geometry = self.geometry;
        let background = self.background;
        let refresh_rate = self.refresh_rate;
        let backend = self.backend.clone();
        let widgets = self.widgets.clone();
        let state = self.state.clone();
        let on_backend_failure = self.on_backend_failure.clone();
        let backend_name = backend.name().to_string();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let failing = AtomicBool::new(false);

        let handle = tokio::spawn(async move {
            let mut deadline = Instant::now();
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let frame = render_once(geometry, background, &widgets);

                match backend.send_frame(&frame).await {
                    Ok(()) => {
                        failing.store(false, Ordering::SeqCst);
                    }
                    Err(e) => {
                        handle_send_failure(&backend_name, e, &on_backend_failure, &failing).await;
                    }
                }

                deadline += refresh_rate;
                let now = Instant::now();
                let sleep_for = deadline.saturating_duration_since(now);
                if sleep_for.is_zero() {
                    // Fell behind; resync rather than busy-loop catching up.
                    deadline = now;
                }

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            state.store(CompositorState::Stopped as u8, Ordering::SeqCst);
            debug!("compositor render loop exited");
        });

        *self.task.lock().await = Some(handle);
    }

    /* Stop synchronously: fire the shutdown signal and await the render
     * task's completion before returning (4.E, ambient). Idempotent. */
    pub async fn stop(&self) {
        if self.state() == CompositorState::Stopped || self.state() == CompositorState::Created {
            self.state.store(CompositorState::Stopped as u8, Ordering::SeqCst);
            return;
        }
        self.state.store(CompositorState::Stopping as u8, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("compositor render task panicked: {e}");
            }
        }
        self.state.store(CompositorState::Stopped as u8, Ordering::SeqCst);
    }
}

/* Fires `on_backend_failure` only on the edge into a failure burst — the
 * `failing` flag is reset to false on every successful send, so a
 * persistent disconnect emits exactly one event, not one per failed frame
 * (4.E, 8 scenario 5). */
async fn handle_send_failure(
    backend_name: &str,
    error: BackendError,
    on_backend_failure: &mpsc::Sender<BackendFailedEvent>,
    failing: &AtomicBool,
) {
    match error {
        BackendError::Disconnected | BackendError::Hid(_) | BackendError::Http(_) => {
            if failing.swap(true, Ordering::SeqCst) {
                debug!(backend = backend_name, %error, "backend send_frame still failing, already notified");
                return;
            }
            warn!(backend = backend_name, %error, "backend send_frame failed, notifying lifecycle");
            let _ = on_backend_failure
                .send(BackendFailedEvent {
                    backend_name: backend_name.to_string(),
                })
                .await;
        }
        other => {
            debug!(backend = backend_name, error = %other, "backend send_frame failed (non-fatal)");
        }
    }
}

/* Clear, composite all widgets in ascending z-order, and pack. Widgets are
 * never asked to update here — only to render a snapshot (4.E, 9). */
fn render_once(geometry: DisplayGeometry, background: u8, widgets: &[Arc<dyn Widget>]) -> crate::geometry::Frame {
    let mut canvas = Canvas::new(geometry);
    canvas.clear(background);

    let mut ordered: Vec<&Arc<dyn Widget>> = widgets.iter().filter(|w| w.enabled()).collect();
    ordered.sort_by_key(|w| w.placement().z_order);

    for widget in ordered {
        let placement = widget.placement();
        match widget.render() {
            WidgetRenderOutcome::Hidden => continue,
            WidgetRenderOutcome::Drawn { pixels } => {
                let transparent = match widget.background_policy() {
                    BackgroundPolicy::Opaque => None,
                    BackgroundPolicy::Transparent { transparent_pixel } => Some(transparent_pixel),
                };
                canvas.blit(&pixels, placement.w, placement.h, placement.x, placement.y, transparent);
            }
        }
    }

    canvas.pack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WidgetPlacement;
    use crate::widget::test_support::StubWidget;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingBackend {
        count: AtomicUsize,
        /// Frames from this index onward (1-based) fail, simulating a
        /// persistent disconnect rather than a single blip.
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send_frame(&self, _frame: &crate::geometry::Frame) -> Result<(), BackendError> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            if matches!(self.fail_after, Some(threshold) if n >= threshold) {
                return Err(BackendError::Disconnected);
            }
            Ok(())
        }
    }

    #[test]
    fn z_order_composites_back_to_front() {
        let geo = DisplayGeometry::new(8, 8).unwrap();
        let back = Arc::new(StubWidget::new(
            "back",
            WidgetPlacement { x: 0, y: 0, w: 8, h: 8, z_order: 0 },
        ));
        let front = Arc::new(StubWidget::new(
            "front",
            WidgetPlacement { x: 2, y: 2, w: 2, h: 2, z_order: 1 },
        ));

        let widgets: Vec<Arc<dyn Widget>> = vec![back, front];
        let frame = render_once(geo, 0, &widgets);
        assert_eq!(frame.bytes.len(), geo.bytes_per_frame());
    }

    #[tokio::test]
    async fn start_stop_is_idempotent() {
        let geo = DisplayGeometry::STEELSERIES_OLED;
        let backend: Arc<dyn Backend> = Arc::new(CountingBackend {
            count: AtomicUsize::new(0),
            fail_after: None,
        });
        let (tx, _rx) = mpsc::channel(4);
        let compositor = Compositor::new(geo, 0, Duration::from_millis(5), backend, vec![], tx);

        compositor.start().await;
        compositor.start().await; // second start is a no-op
        compositor.stop().await;
        compositor.stop().await; // second stop is a no-op
        assert_eq!(compositor.state(), CompositorState::Stopped);
    }

    #[tokio::test]
    async fn send_failure_notifies_lifecycle_exactly_once_per_burst() {
        let geo = DisplayGeometry::STEELSERIES_OLED;
        let backend: Arc<dyn Backend> = Arc::new(CountingBackend {
            count: AtomicUsize::new(0),
            // Every frame from #1 onward fails: a persistent disconnect,
            // not a single blip, spanning many render ticks.
            fail_after: Some(1),
        });
        let (tx, mut rx) = mpsc::channel(4);
        let compositor = Compositor::new(geo, 0, Duration::from_millis(5), backend, vec![], tx);

        compositor.start().await;
        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert_eq!(event.backend_name, "counting");

        // Let several more ticks elapse while still failing; only the one
        // event above should ever be sent.
        tokio::time::sleep(Duration::from_millis(100)).await;
        compositor.stop().await;

        assert!(
            tokio::time::timeout(Duration::from_millis(10), rx.recv())
                .await
                .is_err(),
            "a persistent failure must not emit more than one event per burst"
        );
    }
}
