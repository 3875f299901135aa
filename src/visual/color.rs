use crate::error::PaletteError;
use std::f64::consts::TAU;

pub type Rgb = [u8; 3];

/// Phase step per unit of fractal time.
pub const PHASE_RATE: f64 = 0.01;
pub const SHIMMER_AMPLITUDE: f64 = 50.0;
const CHANNEL_PHASE: [f64; 3] = [0.0, TAU / 3.0, 2.0 * TAU / 3.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub primary: Rgb,
    pub secondary: Rgb,
    pub background: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self::CLASSIC
    }
}

impl Palette {
    pub const CLASSIC: Palette = Palette {
        primary: [255, 0, 0],
        secondary: [0, 0, 255],
        background: [0, 0, 0],
    };

    pub const NAMES: [&'static str; 5] = ["classic", "fire", "ocean", "neon", "mono"];

    pub fn named(name: &str) -> Result<Self, PaletteError> {
        let p = match name.trim().to_ascii_lowercase().as_str() {
            "classic" | "default" => Self::CLASSIC,
            "fire" => Palette {
                primary: [255, 200, 0],
                secondary: [200, 0, 0],
                background: [10, 0, 0],
            },
            "ocean" => Palette {
                primary: [0, 255, 200],
                secondary: [0, 40, 160],
                background: [0, 5, 20],
            },
            "neon" => Palette {
                primary: [255, 0, 255],
                secondary: [0, 255, 255],
                background: [5, 0, 10],
            },
            "mono" => Palette {
                primary: [255, 255, 255],
                secondary: [40, 40, 40],
                background: [0, 0, 0],
            },
            _ => return Err(PaletteError::UnknownName(name.to_string())),
        };
        Ok(p)
    }

    /// Name of the palette after `current` in [`Palette::NAMES`], wrapping.
    pub fn next_name(current: &str) -> &'static str {
        let idx = Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(current))
            .map(|i| (i + 1) % Self::NAMES.len())
            .unwrap_or(0);
        Self::NAMES[idx]
    }
}

/// Parse `#rrggbb` or `rrggbb`.
pub fn parse_hex(s: &str) -> Result<Rgb, PaletteError> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(PaletteError::BadHex(s.to_string()));
    }
    let mut rgb = [0u8; 3];
    for (i, c) in rgb.iter_mut().enumerate() {
        *c = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| PaletteError::BadHex(s.to_string()))?;
    }
    Ok(rgb)
}

/// Map an iteration result to a color.
///
/// Saturated values (`value >= max_iterations`) are the interior and get the
/// background unmodified. Everything else blends primary into secondary by
/// `t = value / max_iterations` and adds a per-channel sine shimmer whose phase
/// advances with `time`.
pub fn color_for(value: u32, max_iterations: u32, time: f64, palette: &Palette) -> Rgb {
    if value >= max_iterations {
        return palette.background;
    }
    let t = value as f64 / max_iterations.max(1) as f64;
    let phase = time * PHASE_RATE + t * TAU;
    let mut rgb = [0u8; 3];
    for (c, out) in rgb.iter_mut().enumerate() {
        let base = palette.primary[c] as f64 * (1.0 - t) + palette.secondary[c] as f64 * t;
        let v = (base + (phase + CHANNEL_PHASE[c]).sin() * SHIMMER_AMPLITUDE).floor();
        *out = if v.is_nan() { 0 } else { v.clamp(0.0, 255.0) as u8 };
    }
    rgb
}
