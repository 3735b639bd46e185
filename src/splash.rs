/* Splash renderer (4.H): startup/transition/exit animations and the static
 * "PREVIEW MODE" card. Runs on the calling task rather than being spawned,
 * shares the compositor's pack-and-send path, and tolerates a missing
 * backend (every send is skipped, not an error) so it can run before a
 * backend is even known to exist. */

use std::time::Duration;

use tracing::debug;

use crate::backend::Backend;
use crate::font::render_text;
use crate::geometry::{Canvas, DisplayGeometry};

const STARTUP_DURATION: Duration = Duration::from_millis(1500);
const STARTUP_FPS: u32 = 33;
const TRANSITION_DURATION: Duration = Duration::from_millis(1200);
const TRANSITION_FPS: u32 = 20;
const EXIT_DURATION: Duration = Duration::from_millis(800);
const EXIT_FPS: u32 = 20;

const WINAMP_LINE_1: &str = "WINAMP";
const WINAMP_LINE_2: &str = "LLAMA APPROVED";

fn frame_count(duration: Duration, fps: u32) -> u32 {
    ((duration.as_secs_f64() * fps as f64).round() as u32).max(1)
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps as f64)
}

/* Build one frame with up to two centered lines of text, offsetting the
 * first line horizontally by `scroll_offset` pixels for a simple marquee
 * feel across the animation's frame sequence. */
fn build_text_frame(
    geometry: DisplayGeometry,
    lines: &[&str],
    background: u8,
    scroll_offset: i32,
) -> crate::geometry::Frame {
    let mut canvas = Canvas::new(geometry);
    canvas.clear(background);

    let line_height = crate::font::GLYPH_HEIGHT + 2;
    let total_height = line_height * lines.len() as u32;
    let mut oy = (geometry.height.saturating_sub(total_height)) as i32 / 2;

    for (i, line) in lines.iter().enumerate() {
        let (buf, w, h) = render_text(line, 255);
        let mut ox = (geometry.width as i32 - w as i32) / 2;
        if i == 0 {
            ox += scroll_offset;
        }
        canvas.blit(&buf, w, h, ox, oy, Some(0));
        oy += line_height as i32;
    }

    canvas.pack()
}

async fn send_if_present(backend: Option<&dyn Backend>, frame: &crate::geometry::Frame) {
    if let Some(backend) = backend {
        if let Err(e) = backend.send_frame(frame).await {
            debug!("splash send_frame failed (non-fatal): {e}");
        }
    }
}

async fn play_animation(
    geometry: DisplayGeometry,
    backend: Option<&dyn Backend>,
    lines: &[&str],
    duration: Duration,
    fps: u32,
) {
    let frames = frame_count(duration, fps);
    let interval = frame_interval(fps);
    let amplitude = 4i32;

    for i in 0..frames {
        let phase = (i as f64 / frames.max(1) as f64) * std::f64::consts::TAU;
        let scroll_offset = (phase.sin() * amplitude as f64).round() as i32;
        let frame = build_text_frame(geometry, lines, 0, scroll_offset);
        send_if_present(backend, &frame).await;
        tokio::time::sleep(interval).await;
    }
}

/* Plays once, on the very first successful start of the process (4.F.3). */
pub async fn play_startup(geometry: DisplayGeometry, backend: Option<&dyn Backend>) {
    play_animation(geometry, backend, &["STEELBOARD"], STARTUP_DURATION, STARTUP_FPS).await;
}

/* Plays on profile switch; renders the Winamp easter egg instead of the
 * profile name when `profile_name` matches case-insensitively (4.H). */
pub async fn play_transition(geometry: DisplayGeometry, backend: Option<&dyn Backend>, profile_name: &str) {
    if profile_name.eq_ignore_ascii_case("winamp") {
        play_animation(geometry, backend, &[WINAMP_LINE_1, WINAMP_LINE_2], TRANSITION_DURATION, TRANSITION_FPS).await;
    } else {
        play_animation(geometry, backend, &[profile_name], TRANSITION_DURATION, TRANSITION_FPS).await;
    }
}

/* Plays during shutdown, before the backend is torn down (4.F). */
pub async fn play_exit(geometry: DisplayGeometry, backend: Option<&dyn Backend>) {
    play_animation(geometry, backend, &["GOODBYE"], EXIT_DURATION, EXIT_FPS).await;
}

/* A single static card sent once, for the Preview backend's idle state. */
pub async fn send_preview_card(geometry: DisplayGeometry, backend: Option<&dyn Backend>) {
    let frame = build_text_frame(geometry, &["PREVIEW MODE"], 0, 0);
    send_if_present(backend, &frame).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_duration_and_fps() {
        assert_eq!(frame_count(STARTUP_DURATION, STARTUP_FPS), 50);
        assert_eq!(frame_count(EXIT_DURATION, EXIT_FPS), 16);
    }

    #[test]
    fn builds_a_full_size_frame() {
        let geo = DisplayGeometry::STEELSERIES_OLED;
        let frame = build_text_frame(geo, &["HELLO"], 0, 0);
        assert_eq!(frame.bytes.len(), geo.bytes_per_frame());
    }

    #[tokio::test]
    async fn tolerates_missing_backend() {
        let geo = DisplayGeometry::STEELSERIES_OLED;
        play_startup(geo, None).await;
    }
}
