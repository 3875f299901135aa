pub mod color;
pub mod formulas;

pub use color::{Palette, Rgb, color_for, parse_hex};
pub use formulas::{FormulaFn, FormulaId, FormulaRegistry, SamplePoint};

use crate::clock::{AnimationClock, FramePacer};
use crate::error::SurfaceError;
use std::time::Instant;

pub const ZOOM_EPSILON: f64 = 1e-6;
pub const DEFAULT_JULIA_C: (f64, f64) = (-0.7, 0.27015);

/// Every parameter the next render pass reads.
///
/// All mutation goes through setters that raise `dirty`, so the engine can
/// never miss a change. Non-finite inputs are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    formula: FormulaId,
    max_iterations: u32,
    zoom: f64,
    offset: (f64, f64),
    time: f64,
    animation_speed: f64,
    is_animating: bool,
    palette: Palette,
    julia_c: (f64, f64),
    dirty: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            formula: FormulaId::Mandelbrot,
            max_iterations: 100,
            zoom: 1.0,
            offset: (0.0, 0.0),
            time: 0.0,
            animation_speed: 1.0,
            is_animating: true,
            palette: Palette::default(),
            julia_c: DEFAULT_JULIA_C,
            dirty: true,
        }
    }
}

impl RenderState {
    pub fn formula(&self) -> FormulaId {
        self.formula
    }
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
    pub fn zoom(&self) -> f64 {
        self.zoom
    }
    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }
    pub fn time(&self) -> f64 {
        self.time
    }
    pub fn animation_speed(&self) -> f64 {
        self.animation_speed
    }
    pub fn is_animating(&self) -> bool {
        self.is_animating
    }
    pub fn palette(&self) -> Palette {
        self.palette
    }
    pub fn julia_c(&self) -> (f64, f64) {
        self.julia_c
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn set_formula(&mut self, formula: FormulaId) {
        self.formula = formula;
        self.dirty = true;
    }

    pub fn set_max_iterations(&mut self, n: u32) {
        self.max_iterations = n.max(1);
        self.dirty = true;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if !zoom.is_finite() {
            return;
        }
        self.zoom = zoom.max(ZOOM_EPSILON);
        self.dirty = true;
    }

    pub fn set_offset(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.offset = (x, y);
        self.dirty = true;
    }

    pub fn set_animation_speed(&mut self, speed: f64) {
        if !speed.is_finite() {
            return;
        }
        self.animation_speed = speed.max(0.0);
        self.dirty = true;
    }

    pub fn set_animating(&mut self, on: bool) {
        self.is_animating = on;
        self.dirty = true;
    }

    /// Flips animation without touching `time`.
    pub fn toggle_animation(&mut self) {
        self.set_animating(!self.is_animating);
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
        self.dirty = true;
    }

    pub fn set_julia_c(&mut self, re: f64, im: f64) {
        if !re.is_finite() || !im.is_finite() {
            return;
        }
        self.julia_c = (re, im);
        self.dirty = true;
    }

    /// Advances fractal time by one step of `animation_speed` when animating.
    pub fn advance_time(&mut self) -> bool {
        if !self.is_animating {
            return false;
        }
        self.time += self.animation_speed;
        self.dirty = true;
        true
    }

    /// Zeroes time, zoom back to 1 and offset back to the origin.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.zoom = 1.0;
        self.offset = (0.0, 0.0);
        self.dirty = true;
    }
}

#[derive(Clone)]
pub struct EngineConfig {
    /// Working buffer size relative to the visible surface, in (0, 1].
    pub render_scale: f64,
    pub target_fps: u32,
    pub registry: FormulaRegistry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_scale: 0.5,
            target_fps: 30,
            registry: FormulaRegistry::builtin(),
        }
    }
}

/// A packed RGBA pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSurface {
    width: usize,
    height: usize,
    rgba: Vec<u8>,
}

impl PixelSurface {
    pub fn new(width: usize, height: usize) -> Result<Self, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::ZeroSized { width, height });
        }
        let len = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| SurfaceError::Unavailable(format!("{width}x{height} overflows")))?;
        Ok(Self {
            width,
            height,
            rgba: vec![0; len],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Replaces the whole buffer. Length must match exactly.
    pub fn set_buffer(&mut self, rgba: &[u8]) -> Result<(), SurfaceError> {
        if rgba.len() != self.rgba.len() {
            return Err(SurfaceError::Unavailable(format!(
                "buffer length {} does not match {}x{}",
                rgba.len(),
                self.width,
                self.height
            )));
        }
        self.rgba.copy_from_slice(rgba);
        Ok(())
    }

    /// Nearest-neighbour scale of `self` onto `dst`.
    pub fn upscale_into(&self, dst: &mut PixelSurface) {
        let (sw, sh) = (self.width, self.height);
        let (dw, dh) = (dst.width, dst.height);
        for y in 0..dh {
            let sy = (y * sh / dh).min(sh - 1);
            let src_row = sy * sw * 4;
            let dst_row = y * dw * 4;
            for x in 0..dw {
                let sx = (x * sw / dw).min(sw - 1);
                let si = src_row + sx * 4;
                let di = dst_row + x * 4;
                dst.rgba[di..di + 4].copy_from_slice(&self.rgba[si..si + 4]);
            }
        }
    }
}

/// Working buffer plus the visible surface it is upscaled onto.
pub struct RenderSurface {
    scale: f64,
    work: PixelSurface,
    visible: PixelSurface,
}

impl RenderSurface {
    pub fn new(width: usize, height: usize, scale: f64) -> Result<Self, SurfaceError> {
        let scale = if scale.is_finite() { scale.clamp(0.01, 1.0) } else { 1.0 };
        let (ww, wh) = working_dims(width, height, scale);
        Ok(Self {
            scale,
            visible: PixelSurface::new(width, height)?,
            work: PixelSurface::new(ww, wh)?,
        })
    }

    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), SurfaceError> {
        *self = Self::new(width, height, self.scale)?;
        Ok(())
    }

    pub fn work(&self) -> &PixelSurface {
        &self.work
    }

    pub fn visible(&self) -> &PixelSurface {
        &self.visible
    }

    /// Runs one full pass over the working buffer, then upscales.
    pub fn draw(&mut self, state: &RenderState, formula: FormulaFn) {
        let (w, h) = (self.work.width, self.work.height);
        let max = state.max_iterations;
        for y in 0..h {
            for x in 0..w {
                let it = formula(SamplePoint::new(x, y, w, h), state).min(max);
                let [r, g, b] = color_for(it, max, state.time, &state.palette);
                let i = (y * w + x) * 4;
                self.work.rgba[i..i + 4].copy_from_slice(&[r, g, b, 255]);
            }
        }
        self.work.upscale_into(&mut self.visible);
    }
}

pub fn working_dims(width: usize, height: usize, scale: f64) -> (usize, usize) {
    let w = ((width as f64) * scale).floor().max(1.0) as usize;
    let h = ((height as f64) * scale).floor().max(1.0) as usize;
    (w, h)
}

/// The fractal engine: render state, surfaces, formula table and pacing.
pub struct FractalEngine {
    state: RenderState,
    surface: RenderSurface,
    registry: FormulaRegistry,
    pacer: FramePacer,
    clock: AnimationClock,
}

impl FractalEngine {
    pub fn new(config: EngineConfig, width: usize, height: usize) -> Result<Self, SurfaceError> {
        Self::with_state(config, RenderState::default(), width, height)
    }

    pub fn with_state(
        config: EngineConfig,
        mut state: RenderState,
        width: usize,
        height: usize,
    ) -> Result<Self, SurfaceError> {
        let surface = RenderSurface::new(width, height, config.render_scale)?;
        state.mark_dirty();
        tracing::info!(
            width,
            height,
            work_width = surface.work().width(),
            work_height = surface.work().height(),
            fps = config.target_fps,
            "fractal engine ready"
        );
        Ok(Self {
            state,
            surface,
            registry: config.registry,
            pacer: FramePacer::new(config.target_fps),
            clock: AnimationClock::new(),
        })
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    pub fn registry(&self) -> &FormulaRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    pub fn pixels(&self) -> &[u8] {
        self.surface.visible().rgba()
    }

    pub fn width(&self) -> usize {
        self.surface.visible().width()
    }

    pub fn height(&self) -> usize {
        self.surface.visible().height()
    }

    /// Renders when dirty. Returns whether a pass ran.
    ///
    /// The state is borrowed for the whole pass, so every pixel sees the
    /// same snapshot.
    pub fn render(&mut self) -> bool {
        if !self.state.is_dirty() {
            return false;
        }
        let formula = self.registry.lookup(self.state.formula());
        self.surface.draw(&self.state, formula);
        self.state.clear_dirty();
        true
    }

    /// One scheduling tick: gated by the frame pacer, advances the clock and
    /// renders. Returns whether the tick was allowed to run.
    pub fn animate(&mut self, now: Instant) -> bool {
        if !self.pacer.ready(now) {
            return false;
        }
        self.clock.tick(&mut self.state);
        self.render();
        true
    }

    /// How long until [`FractalEngine::animate`] will accept another tick.
    pub fn until_next_frame(&self, now: Instant) -> std::time::Duration {
        self.pacer.remaining(now)
    }

    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), SurfaceError> {
        self.surface.resize(width, height)?;
        self.state.mark_dirty();
        Ok(())
    }

    /// Point under a visible pixel, in the same frame as the state's offset,
    /// so setting it as the offset centers the view on that pixel.
    pub fn visible_to_complex(&self, x: f64, y: f64) -> (f64, f64) {
        let (w, h) = (self.width() as f64, self.height() as f64);
        let (zoom, offset) = (self.state.zoom(), self.state.offset());
        match self.state.formula() {
            FormulaId::Sierpinski => {
                let (ux, uy) = formulas::sample_to_unit_square(x, y, w, h, zoom, offset);
                (ux - 0.5, uy - 0.5)
            }
            _ => formulas::sample_to_complex(x, y, w, h, zoom, offset),
        }
    }
}
