/* Entry point (ambient, §1.1/§6): CLI parsing, logging setup, static
 * backend registration, config hot-reload wiring, and graceful shutdown on
 * SIGINT/SIGTERM. */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use steelboard_display_core::backend::registry;
use steelboard_display_core::config::WidgetConfig;
use steelboard_display_core::lifecycle::{LifecycleManager, WidgetFactory};
use steelboard_display_core::orchestrator::Orchestrator;
use steelboard_display_core::widget::Widget;

#[derive(Parser, Debug)]
#[command(name = "steelboard-displayd", about = "SteelSeries OLED display daemon")]
struct Cli {
    /// Path to the active configuration JSON file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/* This binary ships no concrete widget catalogue (1, Non-goals): widget
 * implementations are an external collaborator's responsibility. An
 * embedding application links this crate as a library and supplies its own
 * `WidgetFactory`; this placeholder just logs and renders nothing. */
struct NullWidgetFactory;

impl WidgetFactory for NullWidgetFactory {
    fn build(&self, widget_config: &WidgetConfig) -> Option<Arc<dyn Widget>> {
        warn!(
            widget_type = %widget_config.widget_type,
            widget_id = %widget_config.id,
            "no widget catalogue linked in; skipping widget"
        );
        None
    }
}

fn default_config_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Path::new(&appdata).join("steelboard-displayd").join("config.json");
        }
    } else if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("steelboard-displayd").join("config.json");
    } else if let Ok(home) = std::env::var("HOME") {
        return Path::new(&home)
            .join(".config")
            .join("steelboard-displayd")
            .join("config.json");
    }
    PathBuf::from("config.json")
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/* Watch the config file's parent directory and forward a debounced event
 * only when it names the watched file itself (4.G ambient). */
fn spawn_config_watcher(path: PathBuf, tx: mpsc::Sender<()>) -> notify::Result<notify::RecommendedWatcher> {
    use notify::{Event, EventKind, RecursiveMode, Watcher};

    let watched = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(e) => e,
            Err(e) => {
                warn!("config watcher error: {e}");
                return;
            }
        };
        let matches = event.paths.iter().any(|p| p == &watched);
        if !matches {
            return;
        }
        if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            let _ = tx.try_send(());
        }
    })?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    watcher.watch(parent, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    registry::register_builtin_backends();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    info!(path = %config_path.display(), "starting with config");

    let lifecycle = LifecycleManager::new(Arc::new(NullWidgetFactory));
    let orchestrator = Arc::new(Orchestrator::new(lifecycle.clone(), config_path.clone()));

    orchestrator.start_initial().await;

    let (reload_tx, mut reload_rx) = mpsc::channel(4);
    let _watcher = match spawn_config_watcher(config_path.clone(), reload_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            error!("failed to watch config file for hot-reload: {e}");
            None
        }
    };

    let reload_orchestrator = orchestrator.clone();
    let reload_task = tokio::spawn(async move {
        while reload_rx.recv().await.is_some() {
            reload_orchestrator.reload().await;
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!("failed to install signal handler: {e}"),
    }

    reload_task.abort();
    lifecycle.shutdown().await;
    info!("shutdown complete");
}
