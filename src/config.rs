use crate::error::PaletteError;
use crate::visual::{EngineConfig, FormulaId, FormulaRegistry, Palette, RenderState, parse_hex};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fractal-visualizer",
    version,
    about = "Audio-reactive escape-time fractals in the terminal"
)]
pub struct Config {
    #[arg(long, value_enum, default_value_t = AudioSource::Mic)]
    pub source: AudioSource,

    /// WAV file for `--source file`.
    #[arg(long)]
    pub file: Option<PathBuf>,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Use the simulated spectrum when the microphone cannot be opened.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub fallback_simulated: bool,

    #[arg(long, default_value = "mandelbrot")]
    pub formula: String,

    #[arg(long, default_value_t = 100)]
    pub iterations: u32,

    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,

    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    #[arg(long, default_value_t = false)]
    pub paused: bool,

    #[arg(long, default_value = "classic")]
    pub palette: String,

    #[arg(long)]
    pub primary: Option<String>,

    #[arg(long)]
    pub secondary: Option<String>,

    #[arg(long)]
    pub background: Option<String>,

    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    #[arg(long, default_value_t = 0.5)]
    pub render_scale: f64,

    #[arg(long, value_enum, default_value_t = RendererMode::HalfBlock)]
    pub renderer: RendererMode,

    /// Service audio-features JSON, applied once at startup.
    #[arg(long)]
    pub track_features: Option<PathBuf>,

    /// Service audio-analysis JSON; its segments drive parameters during playback.
    #[arg(long)]
    pub track_analysis: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub audio_reactive: bool,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioSource {
    #[value(alias = "microphone")]
    Mic,
    #[value(alias = "wav")]
    File,
    #[value(alias = "sim", alias = "random")]
    Simulated,
    #[value(name = "none", alias = "off")]
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererMode {
    #[value(alias = "ansi", alias = "text")]
    Ascii,
    #[value(name = "half-block", alias = "halfblock", alias = "half_block", alias = "hb")]
    HalfBlock,
    Kitty,
}

impl RendererMode {
    /// Engine pixels per terminal cell, (columns, rows).
    pub fn pixels_per_cell(self) -> (usize, usize) {
        match self {
            Self::Ascii => (1, 1),
            Self::HalfBlock => (1, 2),
            Self::Kitty => (2, 4),
        }
    }
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            render_scale: self.render_scale,
            target_fps: self.fps.max(1),
            registry: FormulaRegistry::builtin(),
        }
    }

    /// Named palette with any hex overrides applied.
    pub fn palette(&self) -> Result<Palette, PaletteError> {
        let mut p = Palette::named(&self.palette)?;
        if let Some(hex) = &self.primary {
            p.primary = parse_hex(hex)?;
        }
        if let Some(hex) = &self.secondary {
            p.secondary = parse_hex(hex)?;
        }
        if let Some(hex) = &self.background {
            p.background = parse_hex(hex)?;
        }
        Ok(p)
    }

    pub fn initial_state(&self) -> Result<RenderState, PaletteError> {
        let mut s = RenderState::default();
        s.set_formula(FormulaId::from_name(&self.formula));
        s.set_max_iterations(self.iterations);
        s.set_zoom(self.zoom);
        s.set_animation_speed(self.speed);
        s.set_animating(!self.paused);
        s.set_palette(self.palette()?);
        Ok(s)
    }
}
