/* Widget interface consumed by the compositor (4.E). Concrete widgets (clock,
 * CPU gauge, etc.) are external collaborators; this module only defines the
 * seam they implement. */

use crate::geometry::WidgetPlacement;

/* What `Widget::render` produced for this tick. */
pub enum WidgetRenderOutcome {
    /* `pixels` is `placement.w * placement.h` bytes, row-major grayscale. */
    Drawn { pixels: Vec<u8> },
    /* The widget has nothing to show this tick; the compositor skips it. */
    Hidden,
}

/* A widget's declared background policy, resolved once at construction from
 * its configured `background_color` (-1 means transparent, per 3). */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPolicy {
    Opaque,
    Transparent { transparent_pixel: u8 },
}

/* The compositor's view of a widget: placement, background policy, and a
 * pure render snapshot. Widgets with their own update cadence run that work
 * on a separate task and only publish state this trait's `render` reads —
 * the compositor never calls an update hook during render (4.E, 9). */
pub trait Widget: Send + Sync {
    fn id(&self) -> &str;
    fn placement(&self) -> WidgetPlacement;
    fn background_policy(&self) -> BackgroundPolicy;
    fn enabled(&self) -> bool;

    /* Snapshot current internal state into a grayscale buffer. Must not
     * block on I/O or acquire locks shared with an update task for longer
     * than a snapshot read. */
    fn render(&self) -> WidgetRenderOutcome;
}

#[cfg(any(test, feature = "dev-hooks"))]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /* A widget stub for compositor/lifecycle tests: flips between Drawn and
     * Hidden on command, with a fixed solid fill. */
    pub struct StubWidget {
        pub name: String,
        pub placement: WidgetPlacement,
        pub policy: BackgroundPolicy,
        pub fill: u8,
        pub visible: AtomicBool,
        pub is_enabled: AtomicBool,
    }

    impl StubWidget {
        pub fn new(name: &str, placement: WidgetPlacement) -> Self {
            Self {
                name: name.to_string(),
                placement,
                policy: BackgroundPolicy::Opaque,
                fill: 255,
                visible: AtomicBool::new(true),
                is_enabled: AtomicBool::new(true),
            }
        }

        pub fn set_visible(&self, visible: bool) {
            self.visible.store(visible, Ordering::SeqCst);
        }
    }

    impl Widget for StubWidget {
        fn id(&self) -> &str {
            &self.name
        }

        fn placement(&self) -> WidgetPlacement {
            self.placement
        }

        fn background_policy(&self) -> BackgroundPolicy {
            self.policy
        }

        fn enabled(&self) -> bool {
            self.is_enabled.load(Ordering::SeqCst)
        }

        fn render(&self) -> WidgetRenderOutcome {
            if !self.visible.load(Ordering::SeqCst) {
                return WidgetRenderOutcome::Hidden;
            }
            let n = (self.placement.w * self.placement.h) as usize;
            WidgetRenderOutcome::Drawn {
                pixels: vec![self.fill; n],
            }
        }
    }
}
