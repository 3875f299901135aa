use crate::audio::{AudioSystem, SourceOptions};
use crate::config::{Config, RendererMode};
use crate::control::{CellGeometry, Controller, command_for_key};
use crate::features::{AudioAdapter, AudioInput, TrackAnalysis, TrackFeatures};
use crate::media::PlaybackControl;
use crate::render::{
    AsciiRenderer, Frame, HalfBlockRenderer, KittyRenderer, Renderer, hard_wrap_line,
};
use crate::terminal::TerminalGuard;
use crate::visual::FractalEngine;
use anyhow::Context;
use crossterm::event::{self, Event, KeyEventKind};
use std::io::BufWriter;
use std::time::{Duration, Instant};

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let initial_state = cfg.initial_state().context("palette options")?;
    let track_features = cfg
        .track_features
        .as_deref()
        .map(TrackFeatures::load)
        .transpose()?;
    let track_analysis = cfg
        .track_analysis
        .as_deref()
        .map(TrackAnalysis::load)
        .transpose()?;
    if let Some(a) = &track_analysis {
        tracing::info!(segments = a.segments.len(), "track analysis loaded");
    }

    let mut audio = AudioSystem::new(SourceOptions {
        source: cfg.source,
        device: cfg.device.as_deref(),
        file: cfg.file.as_deref(),
        fallback_simulated: cfg.fallback_simulated,
    })
    .with_context(|| format!("start audio (source={:?})", cfg.source))?;
    let spectrum = audio.spectrum();

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let mut renderer: Box<dyn Renderer> = match cfg.renderer {
        RendererMode::Ascii => Box::new(AsciiRenderer::new()),
        RendererMode::HalfBlock => Box::new(HalfBlockRenderer::new()),
        RendererMode::Kitty => Box::new(KittyRenderer::new()),
    };
    let (px_w_mul, px_h_mul) = cfg.renderer.pixels_per_cell();

    let mut last_size = crossterm::terminal::size().context("get terminal size")?;
    if last_size.1 < 2 || last_size.0 < 4 {
        return Err(anyhow::anyhow!(
            "terminal too small (need at least 4x2, got {}x{})",
            last_size.0,
            last_size.1
        ));
    }

    let mut controller = Controller::new(&cfg.palette);
    let mut hud_rows = hud_rows_for_size(last_size, controller.show_hud);
    let (w, h) = visible_pixels(last_size, px_w_mul, px_h_mul, hud_rows);
    let mut engine = FractalEngine::with_state(cfg.engine_config(), initial_state, w, h)
        .context("create render surface")?;

    let mut adapter = AudioAdapter::new(cfg.audio_reactive);
    if let Some(f) = &track_features {
        adapter.apply(Some(AudioInput::Descriptors(f)), engine.state_mut());
    }

    let start = Instant::now();
    let mut fps = FpsCounter::new();
    let mut last_pass_ms = 0.0f32;

    loop {
        let now = Instant::now();
        let geometry = CellGeometry {
            px_per_col: px_w_mul,
            px_per_row: px_h_mul,
            visual_rows: last_size.1.saturating_sub(hud_rows).max(1),
        };

        // Drain input events (non-blocking).
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    let Some(cmd) = command_for_key(k.code, k.modifiers) else {
                        continue;
                    };
                    let old_hud = controller.show_hud;
                    let player = audio.player_mut();
                    if controller.handle_command(cmd, &mut engine, &mut adapter, player) {
                        tracing::info!("quit requested");
                        return Ok(());
                    }
                    if controller.show_hud != old_hud {
                        hud_rows = hud_rows_for_size(last_size, controller.show_hud);
                        resize_engine(&mut engine, last_size, px_w_mul, px_h_mul, hud_rows)?;
                    }
                }
                Event::Mouse(m) => {
                    controller.handle_mouse(m, geometry, &mut engine);
                }
                Event::Resize(c, r) => {
                    last_size = (c, r);
                    hud_rows = hud_rows_for_size(last_size, controller.show_hud);
                    resize_engine(&mut engine, last_size, px_w_mul, px_h_mul, hud_rows)?;
                }
                _ => {}
            }
        }

        // Resize events can be missed in some terminals.
        let sz = crossterm::terminal::size()?;
        if sz != last_size {
            last_size = sz;
            hud_rows = hud_rows_for_size(last_size, controller.show_hud);
            resize_engine(&mut engine, last_size, px_w_mul, px_h_mul, hud_rows)?;
        }

        let feed = if let Some(analysis) = &track_analysis {
            let position_s = audio
                .player()
                .map(|p| p.position_s())
                .unwrap_or_else(|| start.elapsed().as_secs_f64());
            adapter.apply(
                Some(AudioInput::Segment {
                    analysis,
                    position_s,
                }),
                engine.state_mut(),
            );
            "analysis"
        } else if audio.produces_spectrum() && spectrum.has_data() {
            let snap = spectrum.load();
            adapter.apply(Some(AudioInput::Spectrum(&snap.bins)), engine.state_mut());
            "spectrum"
        } else {
            "none"
        };

        let pass_start = Instant::now();
        if !engine.animate(now) {
            let wait = engine.until_next_frame(Instant::now());
            std::thread::sleep(wait.min(Duration::from_millis(4)));
            continue;
        }
        let pass_ms = pass_start.elapsed().as_secs_f32() * 1000.0;
        last_pass_ms = last_pass_ms * 0.9 + pass_ms * 0.1;

        let (term_cols, term_rows) = last_size;
        let hud = if controller.show_hud {
            build_hud(
                term_cols as usize,
                &engine,
                &controller,
                &audio,
                adapter.enabled(),
                feed,
                fps.fps(),
                last_pass_ms,
                renderer.name(),
            )
        } else {
            String::new()
        };

        let target_hud_rows = hud_rows_for_text(term_rows, controller.show_hud, &hud);
        if target_hud_rows != hud_rows {
            hud_rows = target_hud_rows;
            resize_engine(&mut engine, last_size, px_w_mul, px_h_mul, hud_rows)?;
            engine.render();
        }
        let visual_rows = term_rows.saturating_sub(hud_rows).max(1);

        let frame = Frame {
            term_cols,
            term_rows,
            visual_rows,
            pixel_width: engine.width(),
            pixel_height: engine.height(),
            pixels_rgba: engine.pixels(),
            hud: &hud,
            hud_rows,
            overlay: controller.show_help.then(help_popup_text),
            sync_updates: cfg.sync_updates,
        };
        renderer.render(&frame, &mut out)?;
        fps.tick();
    }
}

fn visible_pixels(
    size: (u16, u16),
    px_w_mul: usize,
    px_h_mul: usize,
    hud_rows: u16,
) -> (usize, usize) {
    let (cols, rows) = size;
    let visual_rows = rows.saturating_sub(hud_rows).max(1);
    (
        (cols as usize).saturating_mul(px_w_mul),
        (visual_rows as usize).saturating_mul(px_h_mul),
    )
}

fn resize_engine(
    engine: &mut FractalEngine,
    size: (u16, u16),
    px_w_mul: usize,
    px_h_mul: usize,
    hud_rows: u16,
) -> anyhow::Result<()> {
    let (w, h) = visible_pixels(size, px_w_mul, px_h_mul, hud_rows);
    if (w, h) == (engine.width(), engine.height()) {
        return Ok(());
    }
    engine
        .resize(w, h)
        .with_context(|| format!("resize render surface to {w}x{h}"))
}

fn hud_rows_for_size(size: (u16, u16), show_hud: bool) -> u16 {
    if !show_hud || size.1 <= 1 {
        return 0;
    }
    (size.1 - 1).min(3)
}

fn hud_rows_for_text(term_rows: u16, show_hud: bool, hud: &str) -> u16 {
    if !show_hud {
        return 0;
    }
    (hud.lines().count() as u16).min(term_rows.saturating_sub(1))
}

fn build_hud(
    cols: usize,
    engine: &FractalEngine,
    controller: &Controller,
    audio: &AudioSystem,
    reactive: bool,
    feed: &str,
    fps: f32,
    pass_ms: f32,
    renderer_name: &str,
) -> String {
    let s = engine.state();
    let on_off = |b: bool| if b { "on" } else { "off" };
    let track = track_segment(audio.track_name().as_deref(), audio.player());
    let logical = [
        format!(
            concat!(
                "Formula: {} | Iter: {} | Zoom: {:.3} | Center: ({:+.4}, {:+.4}) | ",
                "Speed: {:.2} | Anim: {} | Palette: {} | FPS: {:>4.1} ({:.1} ms)",
            ),
            s.formula().name(),
            s.max_iterations(),
            s.zoom(),
            s.offset().0,
            s.offset().1,
            s.animation_speed(),
            on_off(s.is_animating()),
            controller.palette_name(),
            fps,
            pass_ms,
        ),
        format!(
            "Audio: {}{} | Reactive: {} | Feed: {} | Renderer: {}{}",
            audio.label(),
            if audio.is_simulated() { " (random)" } else { "" },
            on_off(reactive),
            feed,
            renderer_name,
            track,
        ),
        concat!(
            "Keys: ←/→ formula | ↑/↓ iterations | +/- or wheel zoom | click center | ",
            "space anim | c palette | [/] speed | r reset | a audio | ?/h help | q quit",
        )
        .to_string(),
    ];

    logical
        .iter()
        .flat_map(|l| hard_wrap_line(l, cols))
        .collect::<Vec<_>>()
        .join("\n")
}

fn track_segment(name: Option<&str>, player: Option<&dyn PlaybackControl>) -> String {
    let Some(p) = player else {
        return String::new();
    };
    format!(
        " | Track: {} {:>5.1}/{:.1}s {} vol {:.0}%",
        name.unwrap_or("?"),
        p.position_s(),
        p.duration_s(),
        if p.is_playing() { "playing" } else { "paused" },
        p.volume() * 100.0
    )
}

fn help_popup_text() -> &'static str {
    "Fractal Visualizer Hotkeys\n\
←/→  previous/next formula\n\
↑/↓  iterations +/- 10\n\
+ / -  zoom in/out (mouse wheel works too)\n\
click  center the view on that point\n\
space  pause/resume animation\n\
[ / ]  animation speed down/up\n\
r  reset time, zoom and center\n\
c  cycle palette\n\
a  toggle audio reactivity\n\
p  play/pause (file source)\n\
, / .  seek -5s / +5s\n\
b / n  previous/next track\n\
9 / 0  volume down/up\n\
i  show/hide HUD\n\
? or h or F1  toggle this help\n\
q or esc  quit"
}

struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f32();
        if elapsed >= 0.5 {
            self.fps = self.frames as f32 / elapsed;
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Playhead;

    #[test]
    fn hud_rows_leave_at_least_one_visual_row() {
        assert_eq!(hud_rows_for_size((80, 2), true), 1);
        assert_eq!(hud_rows_for_size((80, 40), true), 3);
        assert_eq!(hud_rows_for_size((80, 40), false), 0);
        assert_eq!(hud_rows_for_text(3, true, "a\nb\nc\nd"), 2);
    }

    #[test]
    fn track_segment_names_the_file() {
        let mut head = Playhead::new(10, vec![0.0; 100]);
        head.set_volume(0.5);
        let seg = track_segment(Some("song.wav"), Some(&head as &dyn PlaybackControl));
        assert_eq!(seg, " | Track: song.wav   0.0/10.0s paused vol 50%");
        assert_eq!(track_segment(Some("song.wav"), None), "");
    }

    #[test]
    fn visible_pixels_follow_cell_geometry() {
        assert_eq!(visible_pixels((80, 24), 1, 2, 3), (80, 42));
        assert_eq!(visible_pixels((10, 4), 2, 4, 4), (20, 4));
    }
}
