/* Lifecycle Manager (4.F): the single owner of "no backend" / "backend,
 * no compositor" / "backend, running compositor". All mutation goes
 * through `Mutex<Inner>` so only one state transition runs at a time. */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::backend::vendor::bind_event_name;
use crate::backend::{registry, Backend};
use crate::compositor::{BackendFailedEvent, Compositor};
use crate::config::Config;
use crate::error::{CoreError, LoggingNotificationSink, NotificationSink};
use crate::error_widget::ErrorWidget;
use crate::retry::{retry_with_backoff, RetryCancel};
use crate::splash;
use crate::widget::Widget;

const MAX_BIND_ATTEMPTS: u32 = 10;

/* Builds concrete `Widget`s from a `WidgetConfig`; owned by whatever binary
 * or embedding application supplies the actual widget catalogue — this
 * crate supplies only the seam, per the Non-goals in §1. */
pub trait WidgetFactory: Send + Sync {
    fn build(&self, widget_config: &crate::config::WidgetConfig) -> Option<Arc<dyn Widget>>;
}

struct Inner {
    backend: Option<Arc<dyn Backend>>,
    backend_name: Option<String>,
    /* The `cfg.backend` value the current backend was selected for — used
     * to detect a requested backend change, as distinct from the resolved
     * `backend_name` (which differs from "" whenever auto-select ran). */
    requested_backend: Option<String>,
    compositor: Option<Compositor>,
    last_known_good: Option<Config>,
    started_once: bool,
}

pub struct LifecycleManager {
    inner: Mutex<Inner>,
    retry_cancel: RetryCancel,
    widget_factory: Arc<dyn WidgetFactory>,
    failure_tx: mpsc::Sender<BackendFailedEvent>,
    supervisor_started: AtomicBool,
    notification_sink: Arc<dyn NotificationSink>,
}

impl LifecycleManager {
    pub fn new(widget_factory: Arc<dyn WidgetFactory>) -> Arc<Self> {
        Self::with_notification_sink(widget_factory, Arc::new(LoggingNotificationSink))
    }

    pub fn with_notification_sink(
        widget_factory: Arc<dyn WidgetFactory>,
        notification_sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let (failure_tx, failure_rx) = mpsc::channel(8);
        let manager = Arc::new(Self {
            inner: Mutex::new(Inner {
                backend: None,
                backend_name: None,
                requested_backend: None,
                compositor: None,
                last_known_good: None,
                started_once: false,
            }),
            retry_cancel: RetryCancel::new(),
            widget_factory,
            failure_tx,
            supervisor_started: AtomicBool::new(false),
            notification_sink,
        });
        manager.clone().spawn_supervisor(failure_rx);
        manager
    }

    fn spawn_supervisor(self: Arc<Self>, mut rx: mpsc::Receiver<BackendFailedEvent>) {
        if self.supervisor_started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                info!(backend = %event.backend_name, "received backend failure event");
                let cfg = {
                    let inner = self.inner.lock().await;
                    inner.last_known_good.clone()
                };
                if let Some(cfg) = cfg {
                    if let Err(e) = self.handle_backend_failure(&cfg, &event.backend_name).await {
                        warn!("handle_backend_failure: {e}");
                    }
                }
            }
        });
    }

    /* Install the real failure callback only in auto mode (`cfg.backend`
     * empty) — with an explicit backend choice, a mid-stream disconnect
     * must not silently fail over to a different backend than the one the
     * user configured (4.F step 5). A throwaway sender (its receiver
     * dropped immediately) stands in otherwise; `send` then fails silently,
     * same as an ordinary no-subscriber send. */
    fn failure_sender_for(&self, cfg: &Config) -> mpsc::Sender<BackendFailedEvent> {
        if cfg.backend.is_empty() {
            self.failure_tx.clone()
        } else {
            let (tx, _rx) = mpsc::channel(1);
            tx
        }
    }

    fn build_widgets(&self, cfg: &Config) -> Vec<Arc<dyn Widget>> {
        cfg.enabled_widgets()
            .filter_map(|w| self.widget_factory.build(w))
            .collect()
    }

    async fn bind_with_retry(&self, backend: &Arc<dyn Backend>, geometry_label: &str) -> Result<(), CoreError> {
        let backend = backend.clone();
        let event = bind_event_name();
        retry_with_backoff(
            MAX_BIND_ATTEMPTS,
            crate::retry::DEFAULT_BASE_DELAY,
            crate::retry::DEFAULT_MAX_DELAY,
            &self.retry_cancel,
            |attempt| {
                let backend = backend.clone();
                let geometry_label = geometry_label.to_string();
                async move {
                    debug!(attempt, "binding screen event");
                    backend.bind_event(event, &geometry_label, "one").await
                }
            },
        )
        .await
    }

    /* `start(cfg)` protocol (4.F). */
    pub async fn start(self: &Arc<Self>, cfg: Config) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;

        let geometry = cfg.geometry()?;
        let device_type = format!("screened-{}x{}", geometry.width, geometry.height);

        let needs_new_backend = inner.backend.is_none()
            || inner.requested_backend.as_deref() != Some(cfg.backend.as_str());

        if needs_new_backend {
            if let Some(old) = inner.backend.take() {
                let _ = old.remove_game().await;
            }
            let (backend, name) = registry::create(&cfg).await?;
            let backend: Arc<dyn Backend> = Arc::from(backend);
            inner.backend = Some(backend);
            inner.backend_name = Some(name);
            inner.requested_backend = Some(cfg.backend.clone());
        }

        let backend = inner.backend.clone().expect("backend set above");

        self.bind_with_retry(&backend, &device_type).await?;

        if !inner.started_once {
            inner.started_once = true;
            drop(inner);
            splash::play_startup(geometry, Some(backend.as_ref())).await;
            inner = self.inner.lock().await;
        }

        let widgets = self.build_widgets(&cfg);
        if widgets.is_empty() {
            return Err(CoreError::NoWidgetsEnabled);
        }

        if let Some(old_compositor) = inner.compositor.take() {
            old_compositor.stop().await;
        }

        let on_backend_failure = self.failure_sender_for(&cfg);
        let compositor = Compositor::new(
            geometry,
            cfg.display.background,
            std::time::Duration::from_millis(cfg.refresh_rate_ms),
            backend,
            widgets,
            on_backend_failure,
        );
        compositor.start().await;
        inner.compositor = Some(compositor);
        inner.last_known_good = Some(cfg);

        Ok(())
    }

    /* `handle_backend_failure(cfg)` protocol (4.F). */
    async fn handle_backend_failure(self: &Arc<Self>, cfg: &Config, failed_backend: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;

        if let Some(compositor) = inner.compositor.take() {
            compositor.stop().await;
        }

        let excluded = vec![failed_backend.to_string()];
        let (backend, name) = registry::create_excluding(cfg, &excluded).await?;
        let backend: Arc<dyn Backend> = Arc::from(backend);

        let geometry = cfg.geometry()?;
        let device_type = format!("screened-{}x{}", geometry.width, geometry.height);
        drop(inner);
        self.bind_with_retry(&backend, &device_type).await?;
        inner = self.inner.lock().await;

        let widgets = self.build_widgets(cfg);
        if widgets.is_empty() {
            inner.backend = Some(backend);
            inner.backend_name = Some(name);
            return Err(CoreError::NoWidgetsEnabled);
        }

        let on_backend_failure = self.failure_sender_for(cfg);
        let compositor = Compositor::new(
            geometry,
            cfg.display.background,
            std::time::Duration::from_millis(cfg.refresh_rate_ms),
            backend.clone(),
            widgets,
            on_backend_failure,
        );
        compositor.start().await;

        inner.backend = Some(backend);
        inner.backend_name = Some(name);
        inner.compositor = Some(compositor);

        Ok(())
    }

    /* `start_error_display(msg, w, h)` protocol (4.F). */
    pub async fn start_error_display(self: &Arc<Self>, msg: &str, width: u32, height: u32) -> Result<(), CoreError> {
        let geometry = crate::geometry::DisplayGeometry::new(width, height)
            .map_err(CoreError::ConfigInvalid)?;

        self.notification_sink.notify_error(msg);

        let mut inner = self.inner.lock().await;

        if inner.backend.is_none() {
            let fallback = Config {
                game_name: String::new(),
                game_display_name: String::new(),
                refresh_rate_ms: 500,
                backend: String::new(),
                direct_driver: Default::default(),
                display: crate::config::DisplayConfig {
                    width,
                    height,
                    background: 0,
                },
                widgets: Vec::new(),
                supported_resolutions: Vec::new(),
                preview: Default::default(),
                unregister_on_exit: false,
                bundled_font_url: None,
                reload_settle_ms: 2000,
            };
            if let Ok((backend, name)) = registry::create(&fallback).await {
                inner.backend = Some(Arc::from(backend));
                inner.backend_name = Some(name);
            }
        }

        let backend = inner.backend.clone();

        if let Some(backend) = &backend {
            let device_type = format!("screened-{}x{}", geometry.width, geometry.height);
            drop(inner);
            let _ = self.bind_with_retry(backend, &device_type).await;
            inner = self.inner.lock().await;
        }

        if let Some(old_compositor) = inner.compositor.take() {
            old_compositor.stop().await;
        }

        let error_widget: Arc<dyn Widget> = Arc::new(ErrorWidget::new(msg, geometry));
        let on_backend_failure = self.failure_tx.clone();
        let backend_for_compositor = match &backend {
            Some(b) => b.clone(),
            None => Arc::new(NullBackend) as Arc<dyn Backend>,
        };

        let compositor = Compositor::new(
            geometry,
            0,
            std::time::Duration::from_millis(500),
            backend_for_compositor,
            vec![error_widget],
            on_backend_failure,
        );
        compositor.start().await;
        inner.compositor = Some(compositor);

        Ok(())
    }

    /* `stop()`: stop the running compositor, if any, leaving the backend in
     * place for a subsequent `start()`. This is distinct from `shutdown()`,
     * which also releases the backend and plays the exit animation — the
     * orchestrator calls this one alone before a reload settle-sleep or a
     * profile-switch transition banner so only one compositor is ever
     * writing to the display at a time (4.F, 4.G step 2). */
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(compositor) = inner.compositor.take() {
            compositor.stop().await;
        }
    }

    /* `get_display_dimensions()` (4.F): the geometry of the last
     * successfully started config, if any. */
    pub async fn get_display_dimensions(&self) -> Option<(u32, u32)> {
        let inner = self.inner.lock().await;
        inner
            .last_known_good
            .as_ref()
            .map(|c| (c.display.width, c.display.height))
    }

    pub async fn show_transition_banner(&self, profile_name: &str) {
        let inner = self.inner.lock().await;
        let geometry = inner
            .last_known_good
            .as_ref()
            .and_then(|c| c.geometry().ok())
            .unwrap_or(crate::geometry::DisplayGeometry::STEELSERIES_OLED);
        let backend = inner.backend.clone();
        drop(inner);
        splash::play_transition(geometry, backend.as_deref(), profile_name).await;
    }

    /* `shutdown()` protocol (4.F). */
    pub async fn shutdown(&self) {
        self.retry_cancel.cancel();

        let mut inner = self.inner.lock().await;
        if let Some(compositor) = inner.compositor.take() {
            compositor.stop().await;
        }

        if let Some(backend) = inner.backend.take() {
            let geometry = inner
                .last_known_good
                .as_ref()
                .and_then(|c| c.geometry().ok())
                .unwrap_or(crate::geometry::DisplayGeometry::STEELSERIES_OLED);
            splash::play_exit(geometry, Some(backend.as_ref())).await;

            let unregister = inner
                .last_known_good
                .as_ref()
                .map(|c| c.unregister_on_exit)
                .unwrap_or(false);
            if unregister {
                let _ = backend.remove_game().await;
            }
        }
    }
}

/* A no-op backend used only as a placeholder so `start_error_display` can
 * always construct a compositor even when no real backend is reachable. */
struct NullBackend;

#[async_trait::async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    async fn send_frame(&self, _frame: &crate::geometry::Frame) -> Result<(), crate::backend::BackendError> {
        Ok(())
    }
}
