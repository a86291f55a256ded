//! Progress-aware waveform rendering.
//!
//! `layout_waveform` turns a peak buffer into a list of mirrored bars (or a
//! flat center line when there is nothing to draw); `rasterize` paints that
//! layout into an RGBA buffer for hosts without a vector canvas.

pub type Rgba = [u8; 4];

/// Tallest bar covers this fraction of the half-height.
const MAX_BAR_FILL: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformTheme {
    pub played: Rgba,
    pub unplayed: Rgba,
    pub background: Rgba,
}

impl Default for WaveformTheme {
    fn default() -> Self {
        Self {
            played: [0x4f, 0xc3, 0xf7, 0xff],
            unplayed: [0x5a, 0x5f, 0x6b, 0xff],
            background: [0x12, 0x14, 0x18, 0xff],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformBar {
    pub x: f32,
    pub width: f32,
    /// Extent above (and below) the center line.
    pub half_height: f32,
    pub played: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaveformShape {
    Bars(Vec<WaveformBar>),
    FlatLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveformFrame {
    pub width: f32,
    pub height: f32,
    pub center_y: f32,
    /// Everything at or left of this x counts as played.
    pub progress_x: f32,
    pub shape: WaveformShape,
}

pub fn layout_waveform(
    peaks: Option<&[f32]>,
    current_time: f64,
    duration: f64,
    width: f32,
    height: f32,
) -> WaveformFrame {
    let width = width.max(0.0);
    let height = height.max(0.0);
    let center_y = height / 2.0;
    let progress = if duration > 0.0 && current_time.is_finite() {
        (current_time / duration).clamp(0.0, 1.0) as f32
    } else {
        0.0
    };
    let progress_x = width * progress;

    let flat = |progress_x| WaveformFrame {
        width,
        height,
        center_y,
        progress_x,
        shape: WaveformShape::FlatLine,
    };

    let Some(peaks) = peaks.filter(|p| !p.is_empty()) else {
        return flat(progress_x);
    };
    let max = peaks.iter().copied().filter(|p| p.is_finite()).fold(0.0f32, f32::max);
    if max <= 0.0 || width <= 0.0 {
        return flat(progress_x);
    }

    let spacing = width / peaks.len() as f32;
    let bar_width = if spacing >= 2.0 { spacing - 1.0 } else { spacing };
    let scale = center_y * MAX_BAR_FILL / max;

    let bars = peaks
        .iter()
        .enumerate()
        .map(|(i, &peak)| {
            let x = i as f32 * spacing;
            let peak = if peak.is_finite() { peak.max(0.0) } else { 0.0 };
            WaveformBar { x, width: bar_width, half_height: peak * scale, played: x <= progress_x }
        })
        .collect();

    WaveformFrame { width, height, center_y, progress_x, shape: WaveformShape::Bars(bars) }
}

/// Seek target for a click at `x` on a waveform `width` pixels wide.
pub fn seek_time_for_click(x: f32, width: f32, duration: f64) -> f64 {
    if width <= 0.0 || !x.is_finite() || duration <= 0.0 {
        return 0.0;
    }
    duration * (x / width).clamp(0.0, 1.0) as f64
}

/// Paints `frame` into a `width x height` RGBA buffer (row-major).
pub fn rasterize(frame: &WaveformFrame, theme: &WaveformTheme) -> Vec<u8> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let mut pixels = Vec::with_capacity(width * height * 4);
    for _ in 0..width * height {
        pixels.extend_from_slice(&theme.background);
    }
    if width == 0 || height == 0 {
        return pixels;
    }

    let mut put = |x: usize, y: usize, color: &Rgba| {
        let idx = (y * width + x) * 4;
        pixels[idx..idx + 4].copy_from_slice(color);
    };
    let center = (frame.center_y as usize).min(height - 1);

    match &frame.shape {
        WaveformShape::FlatLine => {
            for x in 0..width {
                let color = if x as f32 <= frame.progress_x { &theme.played } else { &theme.unplayed };
                put(x, center, color);
            }
        }
        WaveformShape::Bars(bars) => {
            for bar in bars {
                let color = if bar.played { &theme.played } else { &theme.unplayed };
                let x0 = (bar.x.floor() as usize).min(width - 1);
                let x1 = ((bar.x + bar.width).ceil() as usize).clamp(x0 + 1, width);
                // Keep at least the center row so quiet bars stay visible.
                let half = bar.half_height.round() as usize;
                let y0 = center.saturating_sub(half);
                let y1 = (center + half).min(height - 1);
                for x in x0..x1 {
                    for y in y0..=y1 {
                        put(x, y, color);
                    }
                }
            }
        }
    }
    pixels
}
