/* Config/Profile Orchestrator (4.G): the only entity permitted to hold the
 * serialization mutex around a `Lifecycle.start`/`stop` pair. Reload and
 * profile-switch share one mutex so they can never interleave. */

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::lifecycle::LifecycleManager;

pub struct Orchestrator {
    lifecycle: Arc<LifecycleManager>,
    /* Serializes reload()/switch_profile(); holds the active config path so
     * reload() knows what to re-read. */
    serialized: Mutex<PathBuf>,
}

impl Orchestrator {
    pub fn new(lifecycle: Arc<LifecycleManager>, active_config_path: PathBuf) -> Self {
        Self {
            lifecycle,
            serialized: Mutex::new(active_config_path),
        }
    }

    pub async fn active_config_path(&self) -> PathBuf {
        self.serialized.lock().await.clone()
    }

    /* Bring the system to steady state against the currently-active config
     * path. Called once at startup in place of `reload()`/`switch_profile`
     * so the very first `start` shares the same error-display fallback. */
    pub async fn start_initial(&self) {
        let path = self.serialized.lock().await.clone();
        match Config::load(&path) {
            Ok(cfg) => {
                if let Err(e) = self.lifecycle.start(cfg).await {
                    self.report_start_failure(&e).await;
                }
            }
            Err(e) => {
                error!("initial config load failed: {e}");
                self.report_start_failure(&e).await;
            }
        }
    }

    async fn report_start_failure(&self, e: &crate::error::CoreError) {
        let (w, h) = (
            crate::geometry::DisplayGeometry::STEELSERIES_OLED.width,
            crate::geometry::DisplayGeometry::STEELSERIES_OLED.height,
        );
        let _ = self
            .lifecycle
            .start_error_display(&format!("{e}"), w, h)
            .await;
    }

    /* `reload()` protocol (4.G): on invalid config, keep the current system
     * running and log; on valid config, stop and restart against it. */
    pub async fn reload(&self) {
        let _guard = self.serialized.lock().await;
        let path = _guard.clone();

        let cfg = match Config::load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("reload: invalid config, keeping current system running: {e}");
                return;
            }
        };

        info!("reload: applying new config");
        self.lifecycle.stop().await;
        let settle = cfg.reload_settle_duration();
        tokio::time::sleep(settle).await;

        if let Err(e) = self.lifecycle.start(cfg).await {
            error!("reload: lifecycle start failed: {e}");
            self.report_start_failure(&e).await;
        }
    }

    /* `switch_profile(path)` protocol (4.G): on invalid config, stop and
     * show the error display; on valid config, play the transition banner
     * then start. Blocks until any in-progress reload/switch completes,
     * then proceeds atomically (8, concurrent-switch-blocks boundary). */
    pub async fn switch_profile(&self, new_path: PathBuf) {
        let mut guard = self.serialized.lock().await;

        let cfg = match Config::load(&new_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("switch_profile: invalid config: {e}");
                self.report_start_failure(&e).await;
                return;
            }
        };

        let display_name = new_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| new_path.to_string_lossy().to_string());

        self.lifecycle.stop().await;
        self.lifecycle.show_transition_banner(&display_name).await;
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        if let Err(e) = self.lifecycle.start(cfg).await {
            error!("switch_profile: lifecycle start failed: {e}");
            self.report_start_failure(&e).await;
        } else {
            *guard = new_path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::WidgetFactory;
    use std::sync::Arc;

    struct NoWidgets;
    impl WidgetFactory for NoWidgets {
        fn build(&self, _w: &crate::config::WidgetConfig) -> Option<Arc<dyn crate::widget::Widget>> {
            None
        }
    }

    #[tokio::test]
    async fn reload_with_invalid_json_keeps_running_and_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.json");
        std::fs::write(
            &path,
            r#"{"refresh_rate_ms": 100, "display": {"width": 128, "height": 40}}"#,
        )
        .unwrap();

        let lifecycle = LifecycleManager::new(Arc::new(NoWidgets));
        let orchestrator = Orchestrator::new(lifecycle, path.clone());

        std::fs::write(&path, "{ invalid json }").unwrap();
        orchestrator.reload().await;
        // No panic and the path is unchanged; that's the observable contract here.
        assert_eq!(orchestrator.active_config_path().await, path);
    }

    #[tokio::test]
    async fn concurrent_reload_and_switch_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("main.json");
        let other_path = dir.path().join("other.json");
        let body = r#"{"refresh_rate_ms": 100, "display": {"width": 128, "height": 40}}"#;
        std::fs::write(&main_path, body).unwrap();
        std::fs::write(&other_path, body).unwrap();

        let lifecycle = LifecycleManager::new(Arc::new(NoWidgets));
        let orchestrator = Arc::new(Orchestrator::new(lifecycle, main_path.clone()));

        // Both paths fail at NoWidgetsEnabled (NoWidgets builds nothing),
        // so the only thing under test is that the two calls serialize
        // cleanly against the shared mutex without deadlocking or panicking.
        let a = orchestrator.clone();
        let b = orchestrator.clone();
        let other_for_switch = other_path.clone();
        tokio::join!(
            async move { a.reload().await },
            async move { b.switch_profile(other_for_switch).await },
        );

        // Neither start() succeeded (no widgets), so the active path is
        // still the original one.
        assert_eq!(orchestrator.active_config_path().await, main_path);
    }
}
