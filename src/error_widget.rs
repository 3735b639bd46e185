/* The ErrorWidget the Lifecycle Manager uses to flash a configuration error
 * on the physical display (4.F, 7). It is the one "widget implementation"
 * this crate owns directly, since it is how the core communicates its own
 * failures rather than something an external widget author supplies. */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::font::render_text;
use crate::geometry::{DisplayGeometry, WidgetPlacement};
use crate::widget::{BackgroundPolicy, Widget, WidgetRenderOutcome};

const FLASH_INTERVAL: Duration = Duration::from_millis(600);

pub struct ErrorWidget {
    message: String,
    placement: WidgetPlacement,
    started_at: Instant,
    /* ticks since start, advanced externally so the widget stays a pure
     * snapshot for `render()` rather than reading the wall clock itself */
    tick: AtomicU64,
}

impl ErrorWidget {
    pub fn new(message: impl Into<String>, geometry: DisplayGeometry) -> Self {
        Self {
            message: message.into(),
            placement: WidgetPlacement {
                x: 0,
                y: 0,
                w: geometry.width,
                h: geometry.height,
                z_order: 0,
            },
            started_at: Instant::now(),
            tick: AtomicU64::new(0),
        }
    }

    /* Called once per compositor tick; advances the flash phase. */
    pub fn tick(&self) {
        self.tick.fetch_add(1, Ordering::SeqCst);
    }

    fn visible_phase(&self) -> bool {
        let elapsed = self.started_at.elapsed();
        (elapsed.as_millis() / FLASH_INTERVAL.as_millis()) % 2 == 0
    }
}

impl Widget for ErrorWidget {
    fn id(&self) -> &str {
        "error"
    }

    fn placement(&self) -> WidgetPlacement {
        self.placement
    }

    fn background_policy(&self) -> BackgroundPolicy {
        BackgroundPolicy::Opaque
    }

    fn enabled(&self) -> bool {
        true
    }

    fn render(&self) -> WidgetRenderOutcome {
        if !self.visible_phase() {
            return WidgetRenderOutcome::Hidden;
        }

        let mut canvas_buf = vec![0u8; (self.placement.w * self.placement.h) as usize];
        let (text_buf, text_w, text_h) = render_text(&self.message, 255);

        let ox = (self.placement.w.saturating_sub(text_w)) as i32 / 2;
        let oy = (self.placement.h.saturating_sub(text_h)) as i32 / 2;

        for row in 0..text_h as i32 {
            for col in 0..text_w as i32 {
                let px = text_buf[(row as u32 * text_w + col as u32) as usize];
                if px == 0 {
                    continue;
                }
                let x = ox + col;
                let y = oy + row;
                if x < 0 || y < 0 || x as u32 >= self.placement.w || y as u32 >= self.placement.h {
                    continue;
                }
                canvas_buf[(y as u32 * self.placement.w + x as u32) as usize] = px;
            }
        }

        WidgetRenderOutcome::Drawn { pixels: canvas_buf }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_placement_to_canvas_size() {
        let geo = DisplayGeometry::STEELSERIES_OLED;
        let widget = ErrorWidget::new("CONFIG", geo);
        match widget.render() {
            WidgetRenderOutcome::Drawn { pixels } => {
                assert_eq!(pixels.len(), (geo.width * geo.height) as usize);
            }
            WidgetRenderOutcome::Hidden => panic!("expected visible phase at t=0"),
        }
    }
}
