use crate::plot::Raster;
use anyhow::{Context, Result, bail};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

/// Finite value range over every frame, so colours are comparable across time.
pub fn value_range(frames: &[Raster]) -> Result<(f64, f64)> {
    let mut vmin = f64::INFINITY;
    let mut vmax = f64::NEG_INFINITY;
    for v in frames.iter().flat_map(|f| &f.data) {
        if v.is_finite() {
            vmin = vmin.min(*v);
            vmax = vmax.max(*v);
        }
    }

    if !vmin.is_finite() || !vmax.is_finite() {
        bail!("Selection contains no finite values.");
    }
    Ok((vmin, vmax))
}

/// Viridis pixels for one frame; non-finite values are black.
pub fn render_viridis(raster: &Raster, vmin: f64, vmax: f64) -> Vec<u32> {
    let denom = if (vmax - vmin).abs() > 0.0 {
        vmax - vmin
    } else {
        1.0
    };

    raster
        .data
        .iter()
        .map(|&v| {
            if v.is_finite() {
                let t = ((v - vmin) / denom).clamp(0.0, 1.0);
                let c = colorous::VIRIDIS.eval_continuous(t);
                rgb_u32(c.r, c.g, c.b)
            } else {
                0
            }
        })
        .collect()
}

const MARKER_COLOR: u32 = 0x00ff_ffff;
const MARKER_ARM: usize = 3;

/// Draw a small cross centred on each `(x, y)` pixel, clipped to the frame.
pub fn draw_markers(buffer: &mut [u32], width: usize, height: usize, markers: &[(usize, usize)]) {
    for &(x, y) in markers {
        for dx in x.saturating_sub(MARKER_ARM)..=(x + MARKER_ARM).min(width.saturating_sub(1)) {
            buffer[y * width + dx] = MARKER_COLOR;
        }
        for dy in y.saturating_sub(MARKER_ARM)..=(y + MARKER_ARM).min(height.saturating_sub(1)) {
            buffer[dy * width + x] = MARKER_COLOR;
        }
    }
}

/// Interactive window: Left/Right step through time, Escape or Q quits.
///
/// `markers` are pixel positions drawn on every frame, e.g. region centres.
pub fn show_frames(title: &str, frames: &[Raster], markers: &[(usize, usize)]) -> Result<()> {
    let Some(first) = frames.first() else {
        bail!("Nothing to plot.");
    };
    let (width, height) = (first.width, first.height);
    let (vmin, vmax) = value_range(frames)?;
    println!("color range: [{}, {}]", vmin, vmax);

    let buffers: Vec<Vec<u32>> = frames
        .iter()
        .map(|f| {
            let mut pixels = render_viridis(f, vmin, vmax);
            draw_markers(&mut pixels, width, height, markers);
            pixels
        })
        .collect();

    let mut window = Window::new(title, width, height, WindowOptions::default()).with_context(
        || "Failed to create window (is an X server available, and is $DISPLAY set?)",
    )?;
    window.set_target_fps(60);

    let mut current = 0usize;
    let mut shown = usize::MAX;
    while window.is_open() {
        if window.is_key_down(Key::Escape) || window.is_key_down(Key::Q) {
            break;
        }
        if window.is_key_pressed(Key::Right, KeyRepeat::Yes) {
            current = (current + 1) % buffers.len();
        }
        if window.is_key_pressed(Key::Left, KeyRepeat::Yes) {
            current = (current + buffers.len() - 1) % buffers.len();
        }
        if current != shown {
            window.set_title(&format!("{} [{}/{}]", title, current + 1, buffers.len()));
            shown = current;
        }

        window
            .update_with_buffer(&buffers[current], width, height)
            .context("Failed to update window buffer")?;
    }

    Ok(())
}

fn rgb_u32(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}
