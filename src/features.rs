//! Audio feature adapter.
//!
//! Three input shapes (raw spectrum bins, track descriptors, timed analysis
//! segments) are resolved once into an [`AudioFeatureVector`], which is then
//! written into renderer parameters through a [`ParamSink`].

use crate::error::FeedError;
use crate::visual::{Palette, RenderState};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Bins considered from a spectrum snapshot.
pub const SPECTRUM_BINS_USED: usize = 180;
pub const DEFAULT_SCALAR: f64 = 0.5;
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

const SPECTRUM_SPEED_BASE: f64 = 0.5;
const SPECTRUM_SPEED_GAIN: f64 = 2.0;
const TRACK_SPEED_BASE: f64 = 0.3;
const TRACK_SPEED_ENERGY: f64 = 2.0;
const TRACK_SPEED_TEMPO: f64 = 0.5;
const JULIA_VALENCE_GAIN: f64 = 0.5;
const JULIA_DANCE_GAIN: f64 = 0.3;
const ZOOM_BASE: f64 = 0.8;
const ZOOM_GAIN: f64 = 0.4;
const ITERATIONS_BASE: f64 = 50.0;
const ITERATIONS_GAIN: f64 = 150.0;

/// Service-style track descriptors. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackFeatures {
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub danceability: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    /// Typically negative dB.
    pub loudness: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Segment {
    pub start: Option<f64>,
    pub duration: Option<f64>,
    pub loudness_start: Option<f64>,
    pub loudness_max: Option<f64>,
    pub pitches: Vec<f64>,
    pub timbre: Vec<f64>,
}

impl Segment {
    pub fn contains(&self, position_s: f64) -> bool {
        let start = self.start.unwrap_or(0.0);
        let duration = self.duration.unwrap_or(0.0);
        position_s >= start && position_s < start + duration
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackAnalysis {
    pub segments: Vec<Segment>,
}

impl TrackAnalysis {
    pub fn segment_at(&self, position_s: f64) -> Option<&Segment> {
        if !position_s.is_finite() {
            return None;
        }
        self.segments.iter().find(|s| s.contains(position_s))
    }

    pub fn load(path: &Path) -> Result<Self, FeedError> {
        load_json(path)
    }
}

impl TrackFeatures {
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        load_json(path)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, FeedError> {
    let text = std::fs::read_to_string(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| FeedError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// One audio tick, in whichever shape the source produced.
#[derive(Debug, Clone, Copy)]
pub enum AudioInput<'a> {
    Spectrum(&'a [u8]),
    Descriptors(&'a TrackFeatures),
    Segment {
        analysis: &'a TrackAnalysis,
        position_s: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimbreSummary {
    pub brightness: f64,
    pub centroid: f64,
    pub roughness: f64,
}

/// Canonical normalized audio features. Built fresh per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFeatureVector {
    pub energy: f64,
    pub valence: f64,
    pub tempo: f64,
    pub danceability: f64,
    pub bass: f64,
    pub mid: f64,
    pub treble: f64,
    pub intensity: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub timbre: Option<TimbreSummary>,
    /// Set when the values came from descriptors or analysis rather than raw bins.
    pub descriptive: bool,
}

impl AudioFeatureVector {
    /// `None` when the input carries nothing to apply (no segment at the position).
    pub fn from_input(input: AudioInput<'_>, track: Option<&TrackFeatures>) -> Option<Self> {
        match input {
            AudioInput::Spectrum(bins) => Some(Self::from_spectrum(bins)),
            AudioInput::Descriptors(f) => Some(Self::from_descriptors(f)),
            AudioInput::Segment {
                analysis,
                position_s,
            } => analysis
                .segment_at(position_s)
                .map(|seg| Self::from_segment(seg, track)),
        }
    }

    pub fn from_spectrum(bins: &[u8]) -> Self {
        let [bass, mid, treble] = spectrum_bands(bins);
        Self {
            energy: (bass + mid + treble) / 3.0,
            valence: DEFAULT_SCALAR,
            tempo: DEFAULT_TEMPO_BPM,
            danceability: DEFAULT_SCALAR,
            bass,
            mid,
            treble,
            intensity: None,
            acousticness: None,
            instrumentalness: None,
            timbre: None,
            descriptive: false,
        }
    }

    pub fn from_descriptors(f: &TrackFeatures) -> Self {
        Self {
            energy: unit_or_default(f.energy),
            valence: unit_or_default(f.valence),
            tempo: tempo_or_default(f.tempo),
            danceability: unit_or_default(f.danceability),
            bass: DEFAULT_SCALAR,
            mid: DEFAULT_SCALAR,
            treble: DEFAULT_SCALAR,
            intensity: f.loudness.and_then(normalize_loudness),
            acousticness: f.acousticness.and_then(finite_unit),
            instrumentalness: f.instrumentalness.and_then(finite_unit),
            timbre: None,
            descriptive: true,
        }
    }

    /// Segment values on top of the last known track descriptors.
    pub fn from_segment(seg: &Segment, track: Option<&TrackFeatures>) -> Self {
        let base = track.map(Self::from_descriptors);
        let intensity = seg
            .loudness_max
            .or(seg.loudness_start)
            .and_then(normalize_loudness);
        let timbre = (seg.timbre.len() >= 4).then(|| TimbreSummary {
            brightness: normalize_timbre(seg.timbre[1]),
            centroid: normalize_timbre(seg.timbre[2]),
            roughness: normalize_timbre(seg.timbre[3]),
        });
        Self {
            energy: intensity.unwrap_or(DEFAULT_SCALAR),
            valence: base.map_or(DEFAULT_SCALAR, |b| b.valence),
            tempo: base.map_or(DEFAULT_TEMPO_BPM, |b| b.tempo),
            danceability: base.map_or(DEFAULT_SCALAR, |b| b.danceability),
            bass: pitch_band(&seg.pitches, 0..3),
            mid: pitch_band(&seg.pitches, 3..6),
            treble: pitch_band(&seg.pitches, 6..9),
            intensity,
            acousticness: base.and_then(|b| b.acousticness),
            instrumentalness: base.and_then(|b| b.instrumentalness),
            timbre,
            descriptive: true,
        }
    }

    pub fn animation_speed(&self) -> f64 {
        if self.descriptive {
            TRACK_SPEED_BASE
                + self.energy * TRACK_SPEED_ENERGY
                + (self.tempo / DEFAULT_TEMPO_BPM) * TRACK_SPEED_TEMPO
        } else {
            SPECTRUM_SPEED_BASE + self.bass * SPECTRUM_SPEED_GAIN
        }
    }
}

/// Average of three contiguous thirds of the first 180 bins, scaled to [0, 1].
pub fn spectrum_bands(bins: &[u8]) -> [f64; 3] {
    let n = bins.len().min(SPECTRUM_BINS_USED);
    let bounds = [0, n / 3, 2 * n / 3, n];
    let mut out = [0.0f64; 3];
    for (band, v) in out.iter_mut().enumerate() {
        let slice = &bins[bounds[band]..bounds[band + 1]];
        if slice.is_empty() {
            continue;
        }
        let sum: u32 = slice.iter().map(|&b| b as u32).sum();
        *v = sum as f64 / slice.len() as f64 / 255.0;
    }
    out
}

/// `(loudness + 60) / 60`, clamped to [0, 1].
pub fn normalize_loudness(db: f64) -> Option<f64> {
    db.is_finite().then(|| ((db + 60.0) / 60.0).clamp(0.0, 1.0))
}

/// `(t + 100) / 200`, clamped to [0, 1].
pub fn normalize_timbre(t: f64) -> f64 {
    if !t.is_finite() {
        return DEFAULT_SCALAR;
    }
    ((t + 100.0) / 200.0).clamp(0.0, 1.0)
}

fn finite_unit(v: f64) -> Option<f64> {
    v.is_finite().then(|| v.clamp(0.0, 1.0))
}

fn unit_or_default(v: Option<f64>) -> f64 {
    v.and_then(finite_unit).unwrap_or(DEFAULT_SCALAR)
}

fn tempo_or_default(v: Option<f64>) -> f64 {
    v.filter(|t| t.is_finite() && *t >= 0.0)
        .unwrap_or(DEFAULT_TEMPO_BPM)
}

fn pitch_band(pitches: &[f64], range: std::ops::Range<usize>) -> f64 {
    let vals = pitches
        .get(range.start..range.end.min(pitches.len()))
        .unwrap_or(&[]);
    let vals = vals.iter().copied().filter(|v| v.is_finite());
    let (sum, n) = vals.fold((0.0, 0usize), |(s, n), v| (s + v.clamp(0.0, 1.0), n + 1));
    if n == 0 {
        DEFAULT_SCALAR
    } else {
        sum / n as f64
    }
}

fn to_channel(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (255.0 * v.clamp(0.0, 1.0)).floor() as u8
}

/// Renderer parameters the adapter is allowed to drive.
pub trait ParamSink {
    fn palette(&self) -> Palette;
    fn set_palette(&mut self, palette: Palette);
    fn set_animation_speed(&mut self, speed: f64);
    fn set_julia_c(&mut self, re: f64, im: f64);
    fn set_zoom(&mut self, zoom: f64);
    fn set_max_iterations(&mut self, n: u32);
}

impl ParamSink for RenderState {
    fn palette(&self) -> Palette {
        RenderState::palette(self)
    }
    fn set_palette(&mut self, palette: Palette) {
        RenderState::set_palette(self, palette);
    }
    fn set_animation_speed(&mut self, speed: f64) {
        RenderState::set_animation_speed(self, speed);
    }
    fn set_julia_c(&mut self, re: f64, im: f64) {
        RenderState::set_julia_c(self, re, im);
    }
    fn set_zoom(&mut self, zoom: f64) {
        RenderState::set_zoom(self, zoom);
    }
    fn set_max_iterations(&mut self, n: u32) {
        RenderState::set_max_iterations(self, n);
    }
}

/// Writes a feature vector into renderer parameters. Deterministic and total.
pub fn apply_vector(v: &AudioFeatureVector, sink: &mut dyn ParamSink) {
    sink.set_animation_speed(v.animation_speed());

    let mut palette = sink.palette();
    if v.descriptive {
        palette.primary[0] = to_channel(v.treble);
        palette.primary[1] = to_channel(v.mid);
        palette.secondary[2] = to_channel(v.bass);
        palette.secondary[0] = to_channel(v.valence);
        if let Some(a) = v.acousticness {
            palette.secondary[1] = to_channel(a);
        }
        if let Some(t) = v.timbre {
            palette.primary[2] = to_channel(t.brightness);
        }
    } else {
        palette.primary[0] = to_channel(v.treble);
        palette.secondary[2] = to_channel(1.0 - v.treble);
    }
    sink.set_palette(palette);

    if v.descriptive {
        let (re, im) = crate::visual::DEFAULT_JULIA_C;
        sink.set_julia_c(
            re + (v.valence - 0.5) * JULIA_VALENCE_GAIN,
            im + (v.danceability - 0.5) * JULIA_DANCE_GAIN,
        );
        if let Some(i) = v.intensity {
            sink.set_zoom(ZOOM_BASE + i * ZOOM_GAIN);
        }
        if let Some(instr) = v.instrumentalness {
            sink.set_max_iterations((ITERATIONS_BASE + (instr * ITERATIONS_GAIN).round()) as u32);
        }
    }
}

/// Resolves inputs into feature vectors and applies them.
///
/// Remembers the last descriptors so analysis segments can inherit
/// valence, tempo and danceability.
#[derive(Debug, Clone)]
pub struct AudioAdapter {
    enabled: bool,
    track: Option<TrackFeatures>,
    applied: u64,
}

impl Default for AudioAdapter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AudioAdapter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            track: None,
            applied: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
    }

    pub fn applied_count(&self) -> u64 {
        self.applied
    }

    pub fn track(&self) -> Option<&TrackFeatures> {
        self.track.as_ref()
    }

    /// A `None` input, a disabled adapter or a position with no segment are no-ops.
    pub fn apply(
        &mut self,
        input: Option<AudioInput<'_>>,
        sink: &mut dyn ParamSink,
    ) -> Option<AudioFeatureVector> {
        let input = input?;
        if let AudioInput::Descriptors(f) = input {
            self.track = Some(f.clone());
            tracing::debug!(?f, "track descriptors received");
        }
        if !self.enabled {
            return None;
        }
        let v = AudioFeatureVector::from_input(input, self.track.as_ref())?;
        apply_vector(&v, sink);
        self.applied += 1;
        Some(v)
    }
}
