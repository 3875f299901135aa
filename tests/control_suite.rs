use crossterm::event::{KeyCode, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use fractal_visualizer::control::{
    CellGeometry, Command, Controller, WheelDirection, ZOOM_MAX, ZOOM_MIN, command_for_key,
    pan_to, wheel_zoom,
};
use fractal_visualizer::features::AudioAdapter;
use fractal_visualizer::media::{PlaybackControl, Playhead};
use fractal_visualizer::visual::{EngineConfig, FormulaId, FractalEngine, Palette, RenderState};

fn engine() -> FractalEngine {
    let mut e = FractalEngine::new(EngineConfig::default(), 80, 40).expect("engine");
    e.state_mut().set_animating(false);
    e
}

fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
    MouseEvent {
        kind,
        column,
        row,
        modifiers: KeyModifiers::NONE,
    }
}

fn run(cmd: Command, c: &mut Controller, e: &mut FractalEngine) -> bool {
    let mut adapter = AudioAdapter::new(true);
    c.handle_command(cmd, e, &mut adapter, None)
}

/// Counts track navigation, which a single-file playhead only logs.
#[derive(Default)]
struct TrackList {
    index: usize,
    playing: bool,
    position: f64,
    volume: f32,
}

impl PlaybackControl for TrackList {
    fn play(&mut self) {
        self.playing = true;
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn is_playing(&self) -> bool {
        self.playing
    }
    fn seek(&mut self, position_s: f64) {
        self.position = position_s;
    }
    fn position_s(&self) -> f64 {
        self.position
    }
    fn duration_s(&self) -> f64 {
        180.0
    }
    fn next(&mut self) {
        self.index += 1;
    }
    fn previous(&mut self) {
        self.index = self.index.saturating_sub(1);
    }
    fn volume(&self) -> f32 {
        self.volume
    }
    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

#[test]
fn wheel_zoom_is_multiplicative_and_clamped() {
    let mut s = RenderState::default();
    wheel_zoom(&mut s, WheelDirection::Down);
    assert!((s.zoom() - 0.9).abs() < 1e-12);
    wheel_zoom(&mut s, WheelDirection::Up);
    assert!((s.zoom() - 0.99).abs() < 1e-12);

    for _ in 0..200 {
        wheel_zoom(&mut s, WheelDirection::Up);
    }
    assert_eq!(s.zoom(), ZOOM_MAX);
    for _ in 0..200 {
        wheel_zoom(&mut s, WheelDirection::Down);
    }
    assert_eq!(s.zoom(), ZOOM_MIN);
}

#[test]
fn click_centers_the_view_on_the_clicked_point() {
    let mut e = engine();
    e.state_mut().set_zoom(2.0);
    e.state_mut().set_offset(-0.5, 0.25);
    e.render();

    let target = e.visible_to_complex(60.5, 21.0);
    assert!(pan_to(&mut e, 60.5, 21.0), "pan renders immediately");
    assert_eq!(e.state().offset(), target);

    let (cx, cy) = e.visible_to_complex(40.0, 20.0);
    assert!((cx - target.0).abs() < 1e-12 && (cy - target.1).abs() < 1e-12);
    assert!(!e.state().is_dirty());
}

#[test]
fn clicking_the_center_keeps_the_view() {
    let mut e = engine();
    e.state_mut().set_offset(0.3, -0.2);
    pan_to(&mut e, 40.0, 20.0);
    let (x, y) = e.state().offset();
    assert!((x - 0.3).abs() < 1e-12 && (y + 0.2).abs() < 1e-12);
}

#[test]
fn sierpinski_click_pans_in_unit_square_units() {
    let mut e = engine();
    e.state_mut().set_formula(FormulaId::Sierpinski);
    // The 40-pixel short side spans the unit square, so 20 pixels is half of it.
    assert!(pan_to(&mut e, 60.0, 20.0));
    let (x, y) = e.state().offset();
    assert!((x - 0.5).abs() < 1e-12 && y.abs() < 1e-12, "got ({x}, {y})");
}

#[test]
fn mouse_events_map_through_cell_geometry() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    let geo = CellGeometry {
        px_per_col: 1,
        px_per_row: 2,
        visual_rows: 20,
    };
    assert_eq!(geo.cell_center(3, 4), Some((3.5, 9.0)));
    assert_eq!(geo.cell_center(3, 20), None, "HUD rows are not part of the image");

    let expected = e.visible_to_complex(10.5, 5.0);
    assert!(c.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 10, 2), geo, &mut e));
    assert_eq!(e.state().offset(), expected);

    assert!(!c.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 10, 25), geo, &mut e));
    assert_eq!(e.state().offset(), expected, "click on HUD ignored");

    c.handle_mouse(mouse(MouseEventKind::ScrollUp, 0, 0), geo, &mut e);
    assert!((e.state().zoom() - 1.1).abs() < 1e-12);
    c.handle_mouse(mouse(MouseEventKind::ScrollDown, 0, 0), geo, &mut e);
    assert!((e.state().zoom() - 0.99).abs() < 1e-12);
}

#[test]
fn keys_map_to_commands() {
    let none = KeyModifiers::NONE;
    assert_eq!(command_for_key(KeyCode::Right, none), Some(Command::NextFormula));
    assert_eq!(command_for_key(KeyCode::Left, none), Some(Command::PrevFormula));
    assert_eq!(command_for_key(KeyCode::Up, none), Some(Command::MoreIterations));
    assert_eq!(command_for_key(KeyCode::Char(' '), none), Some(Command::ToggleAnimation));
    assert_eq!(command_for_key(KeyCode::Char('='), none), Some(Command::ZoomIn));
    assert_eq!(command_for_key(KeyCode::Char('q'), none), Some(Command::Quit));
    assert_eq!(command_for_key(KeyCode::Char('c'), none), Some(Command::CyclePalette));
    assert_eq!(
        command_for_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
        Some(Command::Quit)
    );
    assert_eq!(command_for_key(KeyCode::Char('z'), none), None);
}

#[test]
fn formula_and_iteration_commands() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    run(Command::PrevFormula, &mut c, &mut e);
    assert_eq!(e.state().formula(), FormulaId::Sierpinski);
    run(Command::NextFormula, &mut c, &mut e);
    run(Command::NextFormula, &mut c, &mut e);
    assert_eq!(e.state().formula(), FormulaId::Julia);

    run(Command::MoreIterations, &mut c, &mut e);
    assert_eq!(e.state().max_iterations(), 110);
    for _ in 0..20 {
        run(Command::FewerIterations, &mut c, &mut e);
    }
    assert_eq!(e.state().max_iterations(), 1, "iterations never reach zero");
}

#[test]
fn animation_speed_and_reset_commands() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    run(Command::Faster, &mut c, &mut e);
    assert_eq!(e.state().animation_speed(), 1.25);
    for _ in 0..10 {
        run(Command::Slower, &mut c, &mut e);
    }
    assert_eq!(e.state().animation_speed(), 0.0);

    run(Command::ToggleAnimation, &mut c, &mut e);
    assert!(e.state().is_animating());
    e.state_mut().advance_time();
    run(Command::ZoomIn, &mut c, &mut e);
    run(Command::Reset, &mut c, &mut e);
    assert_eq!(e.state().zoom(), 1.0);
    assert_eq!(e.state().time(), 0.0);
}

#[test]
fn palette_command_cycles_named_palettes() {
    let mut e = engine();
    let mut c = Controller::new("neon");
    run(Command::CyclePalette, &mut c, &mut e);
    assert_eq!(c.palette_name(), "mono");
    assert_eq!(Some(e.state().palette()), Palette::named("mono").ok());
    run(Command::CyclePalette, &mut c, &mut e);
    assert_eq!(c.palette_name(), "classic");
}

#[test]
fn ui_toggles_and_quit() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    assert!(c.show_hud && !c.show_help);
    assert!(!run(Command::ToggleHud, &mut c, &mut e));
    assert!(!c.show_hud);
    run(Command::ToggleHelp, &mut c, &mut e);
    assert!(c.show_help);
    assert!(run(Command::Quit, &mut c, &mut e));
}

#[test]
fn audio_toggle_flips_adapter() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    let mut adapter = AudioAdapter::new(true);
    c.handle_command(Command::ToggleAudio, &mut e, &mut adapter, None);
    assert!(!adapter.enabled());
    c.handle_command(Command::ToggleAudio, &mut e, &mut adapter, None);
    assert!(adapter.enabled());
}

#[test]
fn playback_commands_drive_the_playhead() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    let mut adapter = AudioAdapter::new(true);
    let mut head = Playhead::new(100, vec![0.0; 2000]);

    c.handle_command(Command::PlayPause, &mut e, &mut adapter, Some(&mut head));
    assert!(head.is_playing());
    c.handle_command(Command::SeekForward, &mut e, &mut adapter, Some(&mut head));
    assert!((head.position_s() - 5.0).abs() < 1e-9);
    for _ in 0..5 {
        c.handle_command(Command::SeekForward, &mut e, &mut adapter, Some(&mut head));
    }
    assert!((head.position_s() - 20.0).abs() < 1e-9, "seek clamps to duration");
    for _ in 0..6 {
        c.handle_command(Command::SeekBack, &mut e, &mut adapter, Some(&mut head));
    }
    assert_eq!(head.position_s(), 0.0);

    for _ in 0..3 {
        c.handle_command(Command::VolumeUp, &mut e, &mut adapter, Some(&mut head));
    }
    assert_eq!(head.volume(), 1.0);
    c.handle_command(Command::PlayPause, &mut e, &mut adapter, Some(&mut head));
    assert!(!head.is_playing());
}

#[test]
fn track_navigation_reaches_the_player() {
    let mut e = engine();
    let mut c = Controller::new("classic");
    let mut adapter = AudioAdapter::new(true);
    let mut list = TrackList {
        volume: 0.5,
        ..TrackList::default()
    };
    c.handle_command(Command::NextTrack, &mut e, &mut adapter, Some(&mut list));
    c.handle_command(Command::NextTrack, &mut e, &mut adapter, Some(&mut list));
    c.handle_command(Command::PrevTrack, &mut e, &mut adapter, Some(&mut list));
    assert_eq!(list.index, 1);
    c.handle_command(Command::VolumeDown, &mut e, &mut adapter, Some(&mut list));
    assert!((list.volume - 0.4).abs() < 1e-6);

    // No player: playback keys are ignored.
    assert!(!c.handle_command(Command::PlayPause, &mut e, &mut adapter, None));
}
