//! Interaction controller: keys, mouse and wheel become parameter writes.

use crate::features::AudioAdapter;
use crate::media::PlaybackControl;
use crate::visual::{FractalEngine, Palette, RenderState};
use crossterm::event::{KeyCode, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

pub const ZOOM_MIN: f64 = 0.1;
pub const ZOOM_MAX: f64 = 10.0;
pub const ZOOM_OUT_FACTOR: f64 = 0.9;
pub const ZOOM_IN_FACTOR: f64 = 1.1;
pub const ITERATION_STEP: u32 = 10;
pub const SPEED_STEP: f64 = 0.25;
pub const SEEK_STEP_S: f64 = 5.0;
pub const VOLUME_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    /// Scroll up: zoom in.
    Up,
    /// Scroll down: zoom out.
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NextFormula,
    PrevFormula,
    MoreIterations,
    FewerIterations,
    ZoomIn,
    ZoomOut,
    ToggleAnimation,
    Reset,
    CyclePalette,
    Faster,
    Slower,
    ToggleAudio,
    PlayPause,
    SeekBack,
    SeekForward,
    NextTrack,
    PrevTrack,
    VolumeDown,
    VolumeUp,
    ToggleHud,
    ToggleHelp,
    Quit,
}

pub fn command_for_key(code: KeyCode, mods: KeyModifiers) -> Option<Command> {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return Some(Command::Quit);
    }
    let cmd = match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Command::Quit,
        KeyCode::Right => Command::NextFormula,
        KeyCode::Left => Command::PrevFormula,
        KeyCode::Up => Command::MoreIterations,
        KeyCode::Down => Command::FewerIterations,
        KeyCode::Char('+') | KeyCode::Char('=') => Command::ZoomIn,
        KeyCode::Char('-') | KeyCode::Char('_') => Command::ZoomOut,
        KeyCode::Char(' ') => Command::ToggleAnimation,
        KeyCode::Char('r') | KeyCode::Char('R') => Command::Reset,
        KeyCode::Char('c') | KeyCode::Char('C') => Command::CyclePalette,
        KeyCode::Char(']') => Command::Faster,
        KeyCode::Char('[') => Command::Slower,
        KeyCode::Char('a') | KeyCode::Char('A') => Command::ToggleAudio,
        KeyCode::Char('p') | KeyCode::Char('P') => Command::PlayPause,
        KeyCode::Char(',') => Command::SeekBack,
        KeyCode::Char('.') => Command::SeekForward,
        KeyCode::Char('n') | KeyCode::Char('N') => Command::NextTrack,
        KeyCode::Char('b') | KeyCode::Char('B') => Command::PrevTrack,
        KeyCode::Char('9') => Command::VolumeDown,
        KeyCode::Char('0') => Command::VolumeUp,
        KeyCode::Char('i') | KeyCode::Char('I') => Command::ToggleHud,
        KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::Char('H') | KeyCode::F(1) => {
            Command::ToggleHelp
        }
        _ => return None,
    };
    Some(cmd)
}

/// Multiplies zoom by the wheel factor, clamped to [`ZOOM_MIN`, `ZOOM_MAX`].
pub fn wheel_zoom(state: &mut RenderState, dir: WheelDirection) {
    let factor = match dir {
        WheelDirection::Up => ZOOM_IN_FACTOR,
        WheelDirection::Down => ZOOM_OUT_FACTOR,
    };
    state.set_zoom((state.zoom() * factor).clamp(ZOOM_MIN, ZOOM_MAX));
}

/// Centers the view on a visible pixel and renders right away.
pub fn pan_to(engine: &mut FractalEngine, x: f64, y: f64) -> bool {
    let (cx, cy) = engine.visible_to_complex(x, y);
    engine.state_mut().set_offset(cx, cy);
    engine.render()
}

/// How terminal cells map onto the engine's visible pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellGeometry {
    pub px_per_col: usize,
    pub px_per_row: usize,
    pub visual_rows: u16,
}

impl CellGeometry {
    /// Pixel at the centre of a cell, or `None` for cells outside the image.
    pub fn cell_center(&self, col: u16, row: u16) -> Option<(f64, f64)> {
        if row >= self.visual_rows {
            return None;
        }
        let x = col as f64 * self.px_per_col as f64 + self.px_per_col as f64 / 2.0;
        let y = row as f64 * self.px_per_row as f64 + self.px_per_row as f64 / 2.0;
        Some((x, y))
    }
}

pub struct Controller {
    palette_name: String,
    pub show_hud: bool,
    pub show_help: bool,
}

impl Controller {
    pub fn new(palette_name: &str) -> Self {
        Self {
            palette_name: palette_name.to_string(),
            show_hud: true,
            show_help: false,
        }
    }

    pub fn palette_name(&self) -> &str {
        &self.palette_name
    }

    /// Returns true when the app should quit.
    pub fn handle_command(
        &mut self,
        cmd: Command,
        engine: &mut FractalEngine,
        adapter: &mut AudioAdapter,
        player: Option<&mut dyn PlaybackControl>,
    ) -> bool {
        let state = engine.state_mut();
        match cmd {
            Command::Quit => return true,
            Command::NextFormula => state.set_formula(state.formula().next()),
            Command::PrevFormula => state.set_formula(state.formula().prev()),
            Command::MoreIterations => {
                state.set_max_iterations(state.max_iterations().saturating_add(ITERATION_STEP))
            }
            Command::FewerIterations => {
                state.set_max_iterations(state.max_iterations().saturating_sub(ITERATION_STEP))
            }
            Command::ZoomIn => wheel_zoom(state, WheelDirection::Up),
            Command::ZoomOut => wheel_zoom(state, WheelDirection::Down),
            Command::ToggleAnimation => state.toggle_animation(),
            Command::Reset => state.reset(),
            Command::CyclePalette => {
                let next = Palette::next_name(&self.palette_name);
                if let Ok(p) = Palette::named(next) {
                    state.set_palette(p);
                    self.palette_name = next.to_string();
                }
            }
            Command::Faster => state.set_animation_speed(state.animation_speed() + SPEED_STEP),
            Command::Slower => state.set_animation_speed(state.animation_speed() - SPEED_STEP),
            Command::ToggleAudio => {
                adapter.set_enabled(!adapter.enabled());
                tracing::info!(enabled = adapter.enabled(), "audio reactivity toggled");
            }
            Command::ToggleHud => self.show_hud = !self.show_hud,
            Command::ToggleHelp => self.show_help = !self.show_help,
            Command::PlayPause
            | Command::SeekBack
            | Command::SeekForward
            | Command::NextTrack
            | Command::PrevTrack
            | Command::VolumeDown
            | Command::VolumeUp => match player {
                Some(p) => playback_command(cmd, p),
                None => tracing::debug!(?cmd, "no playback control for this source"),
            },
        }
        false
    }

    /// Left click pans, wheel zooms. Returns whether a render pass ran.
    pub fn handle_mouse(
        &mut self,
        ev: MouseEvent,
        geometry: CellGeometry,
        engine: &mut FractalEngine,
    ) -> bool {
        match ev.kind {
            MouseEventKind::Down(MouseButton::Left) => match geometry.cell_center(ev.column, ev.row)
            {
                Some((x, y)) => pan_to(engine, x, y),
                None => false,
            },
            MouseEventKind::ScrollUp => {
                wheel_zoom(engine.state_mut(), WheelDirection::Up);
                false
            }
            MouseEventKind::ScrollDown => {
                wheel_zoom(engine.state_mut(), WheelDirection::Down);
                false
            }
            _ => false,
        }
    }
}

fn playback_command(cmd: Command, p: &mut dyn PlaybackControl) {
    match cmd {
        Command::PlayPause => p.toggle(),
        Command::SeekBack => p.seek((p.position_s() - SEEK_STEP_S).max(0.0)),
        Command::SeekForward => p.seek(p.position_s() + SEEK_STEP_S),
        Command::NextTrack => p.next(),
        Command::PrevTrack => p.previous(),
        Command::VolumeDown => p.set_volume(p.volume() - VOLUME_STEP),
        Command::VolumeUp => p.set_volume(p.volume() + VOLUME_STEP),
        _ => {}
    }
}
