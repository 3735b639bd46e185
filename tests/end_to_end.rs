//! End-to-end scenarios from (8) that don't require real hardware or a
//! reachable vendor service: explicit-unknown-backend and invalid-hex-VID.

use std::sync::Arc;

use steelboard_display_core::backend::registry;
use steelboard_display_core::config::Config;
use steelboard_display_core::lifecycle::{LifecycleManager, WidgetFactory};
use steelboard_display_core::widget::Widget;

struct NoWidgets;
impl WidgetFactory for NoWidgets {
    fn build(&self, _w: &steelboard_display_core::config::WidgetConfig) -> Option<Arc<dyn Widget>> {
        None
    }
}

fn config_json(backend: &str, vid: &str) -> String {
    format!(
        r#"{{
            "refresh_rate_ms": 100,
            "backend": "{backend}",
            "direct_driver": {{"vid": "{vid}", "pid": "1612", "interface": "mi_01"}},
            "display": {{"width": 128, "height": 40, "background": 0}},
            "widgets": []
        }}"#
    )
}

#[tokio::test]
async fn scenario_3_explicit_unknown_backend_is_rejected_before_parsing_succeeds() {
    registry::register_builtin_backends();
    // An unknown backend name must fail Config::parse's own validation
    // (the registry's is_registered callback), before Lifecycle ever runs.
    let json = config_json("zzz", "1038");
    let err = Config::parse(&json).unwrap_err();
    assert!(format!("{err}").contains("zzz"));
}

#[tokio::test]
async fn scenario_6_invalid_direct_driver_hex_fails_before_any_device_io() {
    registry::register_builtin_backends();
    let json = config_json("direct", "103g");
    let cfg = Config::parse(&json).expect("backend name itself is valid, only the hex is bad");

    let lifecycle = LifecycleManager::new(Arc::new(NoWidgets));
    let err = lifecycle.start(cfg).await.unwrap_err();
    let message = format!("{err}");
    assert!(!message.to_ascii_lowercase().contains("permission"));
}
