use fractal_visualizer::visual::formulas::{
    self, julia_constant, sample_to_complex, sample_to_unit_square,
};
use fractal_visualizer::visual::{
    FormulaId, FormulaRegistry, Palette, RenderState, SamplePoint, color_for, parse_hex,
};

const W: usize = 48;
const H: usize = 32;

fn state_for(id: FormulaId) -> RenderState {
    let mut s = RenderState::default();
    s.set_formula(id);
    s.set_max_iterations(64);
    s
}

fn center() -> SamplePoint {
    SamplePoint::new(W / 2, H / 2, W, H)
}

/// State whose center pixel maps exactly onto `(re, im)`.
fn state_at(id: FormulaId, re: f64, im: f64) -> RenderState {
    let mut s = state_for(id);
    s.set_offset(re, im);
    s
}

fn grid(id: FormulaId) -> Vec<u32> {
    let f = FormulaRegistry::builtin().lookup(id);
    let s = state_for(id);
    (0..H)
        .flat_map(|y| (0..W).map(move |x| SamplePoint::new(x, y, W, H)))
        .map(|p| f(p, &s))
        .collect()
}

#[test]
fn every_formula_stays_in_range_across_the_image() {
    let reg = FormulaRegistry::builtin();
    for id in FormulaId::ALL {
        let f = reg.lookup(id);
        for time in [0.0, 37.5, 400.0] {
            let mut s = state_for(id);
            for _ in 0..(time as usize) {
                s.advance_time();
            }
            for y in (0..H).step_by(3) {
                for x in (0..W).step_by(3) {
                    let v = f(SamplePoint::new(x, y, W, H), &s);
                    assert!(
                        v <= s.max_iterations(),
                        "{} returned {v} > {} at ({x},{y})",
                        id.name(),
                        s.max_iterations()
                    );
                }
            }
        }
    }
}

#[test]
fn formulas_survive_extreme_zoom_and_offset() {
    let reg = FormulaRegistry::builtin();
    for id in FormulaId::ALL {
        let f = reg.lookup(id);
        for (zoom, off) in [(1e-6, (0.0, 0.0)), (1e9, (1e6, -1e6)), (0.5, (-1e300, 1e300))] {
            let mut s = state_for(id);
            s.set_zoom(zoom);
            s.set_offset(off.0, off.1);
            let v = f(center(), &s);
            assert!(v <= s.max_iterations(), "{} out of range at zoom {zoom}", id.name());
        }
    }
}

#[test]
fn mandelbrot_center_is_interior_and_painted_background() {
    let mut s = RenderState::default();
    s.set_max_iterations(100);
    let v = formulas::mandelbrot(center(), &s);
    assert_eq!(v, 100, "origin never escapes");
    let rgb = color_for(v, s.max_iterations(), s.time(), &s.palette());
    assert_eq!(rgb, s.palette().background);
}

#[test]
fn mandelbrot_far_corner_escapes_quickly() {
    let s = state_for(FormulaId::Mandelbrot);
    let v = formulas::mandelbrot(SamplePoint::new(0, 0, W, H), &s);
    assert!(v < 5, "corner should escape within a few steps, got {v}");
}

#[test]
fn newton_returns_current_index_on_zero_derivative() {
    let s = state_for(FormulaId::Newton);
    assert_eq!(formulas::newton(center(), &s), 0);
}

#[test]
fn newton_converges_near_a_root() {
    let mut s = state_for(FormulaId::Newton);
    s.set_offset(1.0, 0.0);
    let v = formulas::newton(center(), &s);
    assert!(v < 3, "z=1 is a root, got {v}");
}

#[test]
fn lyapunov_bails_to_zero_when_orbit_leaves_unit_interval() {
    let mut s = state_for(FormulaId::Lyapunov);
    // a = b = 5 pushes x out of (0, 1) on the first step.
    s.set_offset(2.0, 2.0);
    assert_eq!(formulas::lyapunov(center(), &s), 0);
}

#[test]
fn every_formula_draws_its_own_image() {
    let grids: Vec<(FormulaId, Vec<u32>)> =
        FormulaId::ALL.iter().map(|&id| (id, grid(id))).collect();
    for (i, (a, ga)) in grids.iter().enumerate() {
        let first = ga[0];
        assert!(ga.iter().any(|&v| v != first), "{} renders a flat fill", a.name());
        for (b, gb) in &grids[i + 1..] {
            assert!(ga != gb, "{} and {} render identical images", a.name(), b.name());
        }
    }
}

#[test]
fn magnet_returns_current_index_on_zero_denominator() {
    // c = 2 makes 2z + c - 2 vanish at z = 0.
    let s = state_at(FormulaId::Magnet, 2.0, 0.0);
    assert_eq!(formulas::magnet(center(), &s), 0);
}

#[test]
fn magnet_bails_out_past_one_hundred() {
    // |z|² runs 0, 0.27, 1.28, 33.6, 73.6 before passing 100.
    let s = state_at(FormulaId::Magnet, 0.0, 1.5);
    assert_eq!(formulas::magnet(center(), &s), 5);
}

#[test]
fn magnet_stops_when_orbit_settles_on_one() {
    let s = state_at(FormulaId::Magnet, 50.0, 0.0);
    assert_eq!(formulas::magnet(center(), &s), 1);
}

#[test]
fn biomorph_escapes_on_either_component_not_modulus() {
    // |z|² = 9 is past the usual bailout, but both parts are within 10.
    let s = state_at(FormulaId::Biomorph, 3.0, 0.0);
    assert_eq!(formulas::biomorph(center(), &s), 1);

    let s = state_at(FormulaId::Biomorph, 0.0, 10.5);
    assert_eq!(formulas::biomorph(center(), &s), 0);
}

#[test]
fn cosmic_uses_the_wide_bailout() {
    // z = 3 after one step, then sinh(3) + 3 ≈ 13.
    let s = state_at(FormulaId::Cosmic, 3.0, 0.0);
    assert_eq!(formulas::cosmic(center(), &s), 2);
}

#[test]
fn sierpinski_counts_folds_until_the_point_leaves() {
    // (0.6, 0.2) -> (0.2, 0.4) -> (0.4, 0.8) -> (0.8, 1.6).
    let s = state_at(FormulaId::Sierpinski, 0.1, -0.3);
    assert_eq!(formulas::sierpinski(center(), &s), 2);

    let s = state_at(FormulaId::Sierpinski, 2.0, 2.0);
    assert_eq!(formulas::sierpinski(center(), &s), 0, "outside the unit square");

    let s = state_for(FormulaId::Sierpinski);
    assert_eq!(formulas::sierpinski(center(), &s), 64, "(0.5, 0.5) folds onto the origin");
}

#[test]
fn sierpinski_default_view_shows_the_figure() {
    let g = grid(FormulaId::Sierpinski);
    let lit = g.iter().filter(|&&v| v > 0).count();
    assert!(lit * 3 > g.len(), "only {lit}/{} pixels inside the figure", g.len());

    let mut levels = g.clone();
    levels.sort_unstable();
    levels.dedup();
    assert!(levels.len() >= 4, "expected nested bands, got {levels:?}");
}

#[test]
fn julia_constant_sways_with_time() {
    let mut s = RenderState::default();
    s.set_animation_speed(10.0);
    let before = julia_constant(&s);
    s.advance_time();
    let after = julia_constant(&s);
    assert!(before != after, "julia constant should move with time");
    let (re, im) = s.julia_c();
    assert!((after.0 - re).abs() <= 0.3 + 1e-12);
    assert!((after.1 - im).abs() <= 0.3 + 1e-12);
}

#[test]
fn sample_mapping_centers_on_offset() {
    let (cx, cy) = sample_to_complex(50.0, 25.0, 100.0, 50.0, 2.0, (0.25, -0.5));
    assert!((cx - 0.25).abs() < 1e-12);
    assert!((cy + 0.5).abs() < 1e-12);
    let (lx, _) = sample_to_complex(0.0, 25.0, 100.0, 50.0, 1.0, (0.0, 0.0));
    assert!((lx + 2.0).abs() < 1e-12, "left edge is -2 at zoom 1, got {lx}");
}

#[test]
fn unit_square_fits_the_shorter_side() {
    let (ux, uy) = sample_to_unit_square(50.0, 25.0, 100.0, 50.0, 1.0, (0.0, 0.0));
    assert!((ux - 0.5).abs() < 1e-12 && (uy - 0.5).abs() < 1e-12);
    let (_, top) = sample_to_unit_square(50.0, 0.0, 100.0, 50.0, 1.0, (0.0, 0.0));
    assert!(top.abs() < 1e-12, "top edge is 0, got {top}");
    let (lx, _) = sample_to_unit_square(25.0, 25.0, 100.0, 50.0, 2.0, (0.25, 0.0));
    assert!((lx - 0.5).abs() < 1e-12, "zoom halves the span, got {lx}");
}

#[test]
fn unknown_formula_name_falls_back_to_mandelbrot() {
    assert_eq!(FormulaId::from_name("definitely-not-a-fractal"), FormulaId::Mandelbrot);
    assert_eq!(FormulaId::parse_name("definitely-not-a-fractal"), None);
    assert_eq!(FormulaId::from_name("Burning_Ship"), FormulaId::BurningShip);
    assert_eq!(FormulaId::from_name("fisheye"), FormulaId::FishEye);
}

#[test]
fn formula_names_round_trip_and_cycle() {
    for id in FormulaId::ALL {
        assert_eq!(FormulaId::parse_name(id.name()), Some(id));
        assert_eq!(id.next().prev(), id);
    }
    assert_eq!(FormulaId::Sierpinski.next(), FormulaId::Mandelbrot);
    assert_eq!(FormulaId::Mandelbrot.prev(), FormulaId::Sierpinski);
}

#[test]
fn registry_lookup_falls_back_for_missing_entries() {
    fn constant_seven(_: SamplePoint, _: &RenderState) -> u32 {
        7
    }

    let s = state_for(FormulaId::Julia);
    let empty = FormulaRegistry::empty();
    assert!(!empty.is_registered(FormulaId::Julia));
    assert_eq!(empty.lookup(FormulaId::Julia)(center(), &s), 64, "built-in mandelbrot");

    let mut reg = FormulaRegistry::empty();
    reg.register(FormulaId::Mandelbrot, constant_seven);
    assert_eq!(reg.lookup(FormulaId::Heart)(center(), &s), 7, "registered mandelbrot entry");
    assert_eq!(reg.registered().collect::<Vec<_>>(), vec![FormulaId::Mandelbrot]);

    assert_eq!(FormulaRegistry::builtin().registered().count(), FormulaId::ALL.len());
}

#[test]
fn color_channels_stay_in_byte_range_for_any_palette() {
    let palettes = [
        Palette::CLASSIC,
        Palette {
            primary: [255, 255, 255],
            secondary: [255, 255, 255],
            background: [1, 2, 3],
        },
        Palette {
            primary: [0, 0, 0],
            secondary: [0, 0, 0],
            background: [9, 9, 9],
        },
    ];
    for p in palettes {
        for time in [0.0, 1.0, 1e6, f64::NAN] {
            for v in 0..=20u32 {
                let rgb = color_for(v, 20, time, &p);
                if v == 20 {
                    assert_eq!(rgb, p.background, "saturated value must paint background");
                }
            }
        }
    }
    // Bright palette with positive shimmer saturates instead of wrapping.
    let white = Palette {
        primary: [255, 255, 255],
        secondary: [255, 255, 255],
        background: [0, 0, 0],
    };
    let rgb = color_for(0, 10, 0.0, &white);
    assert!(rgb.iter().all(|&c| c >= 205), "got {rgb:?}");
}

#[test]
fn palette_names_and_hex_parse() {
    assert_eq!(Palette::named("classic"), Ok(Palette::CLASSIC));
    assert!(Palette::named("nope").is_err());
    assert_eq!(Palette::next_name("mono"), "classic");
    assert_eq!(Palette::next_name("unknown"), "classic");
    assert_eq!(parse_hex("#ff8000"), Ok([255, 128, 0]));
    assert_eq!(parse_hex("00ff00"), Ok([0, 255, 0]));
    assert!(parse_hex("#fff").is_err());
    assert!(parse_hex("#gg0000").is_err());
}
