use std::time::{Duration, Instant};

use anyhow::Result;
use fractal_visualizer::features::{AudioAdapter, AudioInput};
use fractal_visualizer::visual::{EngineConfig, FormulaId, FractalEngine};

struct Args {
    frames: usize,
    w: usize,
    h: usize,
    scale: f64,
    iterations: u32,
    formula: Option<FormulaId>,
    ci_smoke: bool,
    quick: bool,
    max_ms: f64,
}

fn parse_args() -> Args {
    let mut args = Args {
        frames: 60,
        w: 160,
        h: 88,
        scale: 0.5,
        iterations: 100,
        formula: None,
        ci_smoke: false,
        quick: false,
        max_ms: 40.0,
    };

    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--frames", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.frames = n.max(1);
                }
                i += 2;
            }
            ("--w", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.w = n.max(1);
                }
                i += 2;
            }
            ("--h", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.h = n.max(1);
                }
                i += 2;
            }
            ("--scale", Some(x)) => {
                if let Ok(s) = x.parse::<f64>() {
                    args.scale = s.clamp(0.05, 1.0);
                }
                i += 2;
            }
            ("--iterations", Some(x)) => {
                if let Ok(n) = x.parse::<u32>() {
                    args.iterations = n.max(1);
                }
                i += 2;
            }
            ("--formula", Some(x)) => {
                args.formula = FormulaId::parse_name(x);
                if args.formula.is_none() {
                    eprintln!("unknown formula '{x}', benchmarking all");
                }
                i += 2;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(ms) = x.parse::<f64>() {
                    args.max_ms = ms.max(0.1);
                }
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            ("--quick", _) => {
                args.quick = true;
                i += 1;
            }
            _ => i += 1,
        }
    }

    if args.quick {
        args.frames = args.frames.min(12);
    }
    args
}

/// Deterministic spectrum sweep so runs are comparable.
fn synth_bins(step: usize) -> [u8; 128] {
    let t = step as f32 / 30.0;
    std::array::from_fn(|k| {
        let x = k as f32 / 128.0;
        let level = (0.5 + 0.5 * (t * 2.0 + x * 9.0).sin()) * (1.0 - x * 0.6);
        (level * 255.0) as u8
    })
}

fn bench_formula(args: &Args, id: FormulaId) -> Result<(f64, usize)> {
    let cfg = EngineConfig {
        render_scale: args.scale,
        ..EngineConfig::default()
    };
    let mut engine = FractalEngine::new(cfg, args.w, args.h)?;
    engine.state_mut().set_formula(id);
    engine.state_mut().set_max_iterations(args.iterations);
    let mut adapter = AudioAdapter::new(true);

    let mut busy = Duration::ZERO;
    let mut lit = 0usize;
    for f in 0..args.frames {
        let bins = synth_bins(f);
        adapter.apply(Some(AudioInput::Spectrum(&bins)), engine.state_mut());
        engine.state_mut().advance_time();

        let start = Instant::now();
        engine.render();
        busy += start.elapsed();

        if engine
            .pixels()
            .chunks_exact(4)
            .any(|p| p[0] != 0 || p[1] != 0 || p[2] != 0)
        {
            lit += 1;
        }
    }
    Ok((busy.as_secs_f64() * 1000.0 / args.frames as f64, lit))
}

fn main() -> Result<()> {
    let args = parse_args();
    let ids: Vec<FormulaId> = match args.formula {
        Some(id) => vec![id],
        None => FormulaId::ALL.to_vec(),
    };

    println!(
        "Formula benchmark: formulas={} frames/formula={} size={}x{} scale={} iterations={}",
        ids.len(),
        args.frames,
        args.w,
        args.h,
        args.scale,
        args.iterations
    );

    let mut total_ms = 0.0f64;
    let mut slow = Vec::new();
    let mut black = Vec::new();
    for (idx, id) in ids.iter().enumerate() {
        let (ms, lit) = bench_formula(&args, *id)?;
        total_ms += ms;
        println!(
            "{:>2}. {:<14} {:>8.3} ms/frame  lit={:>3}/{}",
            idx,
            id.name(),
            ms,
            lit,
            args.frames
        );
        if ms > args.max_ms {
            slow.push((id.name(), ms));
        }
        if lit == 0 {
            black.push(id.name());
        }
    }

    let avg_ms = total_ms / ids.len().max(1) as f64;
    let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
    println!("Summary: {:>8.3} ms/frame avg  {:>7.2} FPS", avg_ms, fps);

    if args.ci_smoke {
        if !slow.is_empty() || !black.is_empty() {
            eprintln!("CI smoke: FAIL");
            if !black.is_empty() {
                eprintln!("  black formulas: {}", black.join(", "));
            }
            for (name, ms) in slow {
                eprintln!("  slow formula: {} ({:.3} ms/frame > {:.3})", name, ms, args.max_ms);
            }
            anyhow::bail!("ci smoke failed");
        }
        println!("CI smoke: PASS (max_ms={:.3})", args.max_ms);
    }

    Ok(())
}
