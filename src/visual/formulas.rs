//! Per-pixel fractal formulas.
//!
//! Every formula is a plain function from a working-buffer pixel and the
//! current [`RenderState`] to an iteration count in `[0, max_iterations]`.
//! `max_iterations` means "never escaped" and is painted with the background.

use super::RenderState;

pub type FormulaFn = fn(SamplePoint, &RenderState) -> u32;

/// Pixel position inside a working buffer of `width` x `height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SamplePoint {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x: x as f64,
            y: y as f64,
            width: width as f64,
            height: height as f64,
        }
    }

    /// Complex-plane coordinate of this pixel at the state's zoom and offset.
    pub fn to_complex(self, state: &RenderState) -> (f64, f64) {
        sample_to_complex(self.x, self.y, self.width, self.height, state.zoom, state.offset)
    }

    /// Unit-square coordinate of this pixel; see [`sample_to_unit_square`].
    pub fn to_unit_square(self, state: &RenderState) -> (f64, f64) {
        sample_to_unit_square(self.x, self.y, self.width, self.height, state.zoom, state.offset)
    }
}

pub fn sample_to_complex(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    zoom: f64,
    offset: (f64, f64),
) -> (f64, f64) {
    let cx = (x - width / 2.0) / (width / 4.0) / zoom + offset.0;
    let cy = (y - height / 2.0) / (height / 4.0) / zoom + offset.1;
    (cx, cy)
}

/// Fits `[0, 1]²` to the shorter side of the buffer at zoom 1, centered.
/// The offset pans in unit-square units, so offset `(0, 0)` centers on `(0.5, 0.5)`.
pub fn sample_to_unit_square(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    zoom: f64,
    offset: (f64, f64),
) -> (f64, f64) {
    let span = width.min(height).max(1.0) * zoom;
    let ux = 0.5 + (x - width / 2.0) / span + offset.0;
    let uy = 0.5 + (y - height / 2.0) / span + offset.1;
    (ux, uy)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaId {
    Mandelbrot,
    Julia,
    BurningShip,
    Tricorn,
    Multibrot,
    Phoenix,
    Newton,
    Biomorph,
    Lyapunov,
    Magnet,
    Celtic,
    Heart,
    Spider,
    FishEye,
    Duck,
    Cosmic,
    Buffalo,
    Sierpinski,
}

impl Default for FormulaId {
    fn default() -> Self {
        Self::Mandelbrot
    }
}

impl FormulaId {
    pub const ALL: [FormulaId; 18] = [
        Self::Mandelbrot,
        Self::Julia,
        Self::BurningShip,
        Self::Tricorn,
        Self::Multibrot,
        Self::Phoenix,
        Self::Newton,
        Self::Biomorph,
        Self::Lyapunov,
        Self::Magnet,
        Self::Celtic,
        Self::Heart,
        Self::Spider,
        Self::FishEye,
        Self::Duck,
        Self::Cosmic,
        Self::Buffalo,
        Self::Sierpinski,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mandelbrot => "mandelbrot",
            Self::Julia => "julia",
            Self::BurningShip => "burning-ship",
            Self::Tricorn => "tricorn",
            Self::Multibrot => "multibrot",
            Self::Phoenix => "phoenix",
            Self::Newton => "newton",
            Self::Biomorph => "biomorph",
            Self::Lyapunov => "lyapunov",
            Self::Magnet => "magnet",
            Self::Celtic => "celtic",
            Self::Heart => "heart",
            Self::Spider => "spider",
            Self::FishEye => "fish-eye",
            Self::Duck => "duck",
            Self::Cosmic => "cosmic",
            Self::Buffalo => "buffalo",
            Self::Sierpinski => "sierpinski",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Exact lookup; `None` for unknown names.
    pub fn parse_name(name: &str) -> Option<Self> {
        let norm = name
            .trim()
            .to_ascii_lowercase()
            .replace(['_', ' '], "-");
        let norm = match norm.as_str() {
            "burningship" => "burning-ship",
            "fisheye" => "fish-eye",
            "biomorphs" => "biomorph",
            other => other,
        };
        Self::ALL.iter().copied().find(|f| f.name() == norm)
    }

    /// Lookup with the Mandelbrot fallback for unrecognized names.
    pub fn from_name(name: &str) -> Self {
        match Self::parse_name(name) {
            Some(id) => id,
            None => {
                tracing::warn!(formula = name, "unknown formula, using mandelbrot");
                Self::Mandelbrot
            }
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Lookup table from [`FormulaId`] to its function, filled once at startup.
#[derive(Clone)]
pub struct FormulaRegistry {
    table: [Option<FormulaFn>; FormulaId::ALL.len()],
}

impl Default for FormulaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormulaRegistry {
    pub fn empty() -> Self {
        Self {
            table: [None; FormulaId::ALL.len()],
        }
    }

    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(FormulaId::Mandelbrot, mandelbrot);
        reg.register(FormulaId::Julia, julia);
        reg.register(FormulaId::BurningShip, burning_ship);
        reg.register(FormulaId::Tricorn, tricorn);
        reg.register(FormulaId::Multibrot, multibrot);
        reg.register(FormulaId::Phoenix, phoenix);
        reg.register(FormulaId::Newton, newton);
        reg.register(FormulaId::Biomorph, biomorph);
        reg.register(FormulaId::Lyapunov, lyapunov);
        reg.register(FormulaId::Magnet, magnet);
        reg.register(FormulaId::Celtic, celtic);
        reg.register(FormulaId::Heart, heart);
        reg.register(FormulaId::Spider, spider);
        reg.register(FormulaId::FishEye, fish_eye);
        reg.register(FormulaId::Duck, duck);
        reg.register(FormulaId::Cosmic, cosmic);
        reg.register(FormulaId::Buffalo, buffalo);
        reg.register(FormulaId::Sierpinski, sierpinski);
        reg
    }

    /// Adds or replaces the function for `id`.
    pub fn register(&mut self, id: FormulaId, f: FormulaFn) {
        self.table[id.index()] = Some(f);
    }

    pub fn is_registered(&self, id: FormulaId) -> bool {
        self.table[id.index()].is_some()
    }

    /// Function for `id`, or the Mandelbrot entry when `id` has none.
    pub fn lookup(&self, id: FormulaId) -> FormulaFn {
        self.table[id.index()]
            .or(self.table[FormulaId::Mandelbrot.index()])
            .unwrap_or(mandelbrot)
    }

    pub fn registered(&self) -> impl Iterator<Item = FormulaId> + '_ {
        FormulaId::ALL
            .into_iter()
            .filter(|id| self.table[id.index()].is_some())
    }
}

pub const BAILOUT: f64 = 4.0;
pub const WIDE_BAILOUT: f64 = 100.0;

const JULIA_SWAY: f64 = 0.3;
const JULIA_SWAY_RATE: f64 = 0.01;
const MULTIBROT_RATE: f64 = 0.01;
const PHOENIX_C: f64 = 0.5667;
const PHOENIX_P: f64 = -0.5;
const NEWTON_TOLERANCE: f64 = 1e-3;
const BIOMORPH_LIMIT: f64 = 10.0;
const BIOMORPH_C: f64 = 0.5;
const MAGNET_CONVERGENCE: f64 = 1e-6;

/// Escape-time loop: test `|z|² > bailout` before every update.
#[inline]
fn escape_time(
    max: u32,
    seed: (f64, f64),
    bailout: f64,
    mut step: impl FnMut(f64, f64) -> (f64, f64),
) -> u32 {
    let (mut zx, mut zy) = seed;
    for i in 0..max {
        if zx * zx + zy * zy > bailout {
            return i;
        }
        (zx, zy) = step(zx, zy);
    }
    max
}

pub fn mandelbrot(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        (zx * zx - zy * zy + cx, 2.0 * zx * zy + cy)
    })
}

/// Julia constant after the time sway is applied.
pub fn julia_constant(s: &RenderState) -> (f64, f64) {
    let a = s.time * JULIA_SWAY_RATE;
    (
        s.julia_c.0 + a.sin() * JULIA_SWAY,
        s.julia_c.1 + a.cos() * JULIA_SWAY,
    )
}

pub fn julia(p: SamplePoint, s: &RenderState) -> u32 {
    let (kx, ky) = julia_constant(s);
    escape_time(s.max_iterations, p.to_complex(s), BAILOUT, |zx, zy| {
        (zx * zx - zy * zy + kx, 2.0 * zx * zy + ky)
    })
}

pub fn burning_ship(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        let (x, y) = (zx.abs(), zy.abs());
        (x * x - y * y + cx, 2.0 * x * y + cy)
    })
}

pub fn tricorn(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        (zx * zx - zy * zy + cx, -2.0 * zx * zy + cy)
    })
}

pub fn multibrot(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    let power = 3.0 + (s.time * MULTIBROT_RATE).sin();
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        let r = zx.hypot(zy).powf(power);
        let theta = zy.atan2(zx) * power;
        (r * theta.cos() + cx, r * theta.sin() + cy)
    })
}

pub fn phoenix(p: SamplePoint, s: &RenderState) -> u32 {
    let (mut px, mut py) = (0.0, 0.0);
    escape_time(s.max_iterations, p.to_complex(s), BAILOUT, |zx, zy| {
        let nx = zx * zx - zy * zy + PHOENIX_C + PHOENIX_P * px;
        let ny = 2.0 * zx * zy + PHOENIX_P * py;
        (px, py) = (zx, zy);
        (nx, ny)
    })
}

/// Newton's method on `z³ - 1`.
///
/// Stops at the current index when the derivative vanishes or when the L1
/// step drops below the convergence tolerance.
pub fn newton(p: SamplePoint, s: &RenderState) -> u32 {
    let (mut zx, mut zy) = p.to_complex(s);
    for i in 0..s.max_iterations {
        let z2x = zx * zx - zy * zy;
        let z2y = 2.0 * zx * zy;
        let fx = z2x * zx - z2y * zy - 1.0;
        let fy = z2x * zy + z2y * zx;
        let dx = 3.0 * z2x;
        let dy = 3.0 * z2y;
        let denom = dx * dx + dy * dy;
        if denom == 0.0 {
            return i;
        }
        let qx = (fx * dx + fy * dy) / denom;
        let qy = (fy * dx - fx * dy) / denom;
        let nx = zx - qx;
        let ny = zy - qy;
        let step = (nx - zx).abs() + (ny - zy).abs();
        zx = nx;
        zy = ny;
        if step < NEWTON_TOLERANCE {
            return i;
        }
    }
    s.max_iterations
}

pub fn biomorph(p: SamplePoint, s: &RenderState) -> u32 {
    let (mut zx, mut zy) = p.to_complex(s);
    for i in 0..s.max_iterations {
        if zx.abs() > BIOMORPH_LIMIT || zy.abs() > BIOMORPH_LIMIT {
            return i;
        }
        let nx = zx * zx * zx - 3.0 * zx * zy * zy + BIOMORPH_C;
        let ny = 3.0 * zx * zx * zy - zy * zy * zy;
        zx = nx;
        zy = ny;
    }
    s.max_iterations
}

/// Lyapunov exponent of the logistic map with rates alternating A/B.
///
/// Returns 0 as soon as the orbit leaves (0, 1). Otherwise the exponent is
/// scaled to `max * (0.5 + λ/4)` and clamped.
pub fn lyapunov(p: SamplePoint, s: &RenderState) -> u32 {
    let max = s.max_iterations;
    let half_w = (p.width / 2.0).max(f64::MIN_POSITIVE);
    let half_h = (p.height / 2.0).max(f64::MIN_POSITIVE);
    let a = 3.0 + (p.x - p.width / 2.0) / half_w / s.zoom + s.offset.0;
    let b = 3.0 + (p.y - p.height / 2.0) / half_h / s.zoom + s.offset.1;

    let mut x = 0.5f64;
    let mut sum = 0.0f64;
    for i in 0..max {
        let r = if i % 2 == 0 { a } else { b };
        x = r * x * (1.0 - x);
        if !(x > 0.0 && x < 1.0) {
            return 0;
        }
        sum += (r * (1.0 - 2.0 * x)).abs().ln();
    }
    let lambda = sum / max as f64;
    let v = max as f64 * (0.5 + lambda * 0.25);
    if v.is_nan() {
        return 0;
    }
    v.clamp(0.0, max as f64).floor() as u32
}

/// Magnet type I: `z ← ((z² + c - 1) / (2z + c - 2))²`.
pub fn magnet(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    let (mut zx, mut zy) = (0.0f64, 0.0f64);
    for i in 0..s.max_iterations {
        if zx * zx + zy * zy > WIDE_BAILOUT {
            return i;
        }
        let nx = zx * zx - zy * zy + cx - 1.0;
        let ny = 2.0 * zx * zy + cy;
        let dx = 2.0 * zx + cx - 2.0;
        let dy = 2.0 * zy + cy;
        let denom = dx * dx + dy * dy;
        if denom == 0.0 {
            return i;
        }
        let qx = (nx * dx + ny * dy) / denom;
        let qy = (ny * dx - nx * dy) / denom;
        zx = qx * qx - qy * qy;
        zy = 2.0 * qx * qy;
        let (ex, ey) = (zx - 1.0, zy);
        if ex * ex + ey * ey < MAGNET_CONVERGENCE {
            return i;
        }
    }
    s.max_iterations
}

pub fn celtic(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        ((zx * zx - zy * zy).abs() + cx, 2.0 * zx * zy + cy)
    })
}

pub fn heart(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        (zx * zx - zy * zy + cx, 2.0 * zx.abs() * zy + cy)
    })
}

/// `z ← z² + c`, then the constant chases the orbit: `c ← c/2 + z`.
pub fn spider(p: SamplePoint, s: &RenderState) -> u32 {
    let (mut cx, mut cy) = p.to_complex(s);
    escape_time(s.max_iterations, (cx, cy), BAILOUT, |zx, zy| {
        let nx = zx * zx - zy * zy + cx;
        let ny = 2.0 * zx * zy + cy;
        cx = cx / 2.0 + nx;
        cy = cy / 2.0 + ny;
        (nx, ny)
    })
}

/// Mandelbrot seen through a radial lens: `r' = r²/2`.
pub fn fish_eye(p: SamplePoint, s: &RenderState) -> u32 {
    let (sx, sy) = p.to_complex(s);
    let r = sx.hypot(sy);
    let theta = sy.atan2(sx);
    let lens = r * r / 2.0;
    let (cx, cy) = (lens * theta.cos(), lens * theta.sin());
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        (zx * zx - zy * zy + cx, 2.0 * zx * zy + cy)
    })
}

pub fn duck(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        (zx * zx - zy * zy + cx, 2.0 * zx * zy.abs() + cy)
    })
}

/// `z ← sinh(z) + c`.
pub fn cosmic(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), WIDE_BAILOUT, |zx, zy| {
        (zx.sinh() * zy.cos() + cx, zx.cosh() * zy.sin() + cy)
    })
}

pub fn buffalo(p: SamplePoint, s: &RenderState) -> u32 {
    let (cx, cy) = p.to_complex(s);
    escape_time(s.max_iterations, (0.0, 0.0), BAILOUT, |zx, zy| {
        let cross = (2.0 * zx * zy).abs();
        ((zx * zx - zy * zy).abs() - cross + cx, cross + cy)
    })
}

/// Quadrant folding on the unit square; counts steps until the point leaves it.
pub fn sierpinski(p: SamplePoint, s: &RenderState) -> u32 {
    let (mut x, mut y) = p.to_unit_square(s);
    for i in 0..s.max_iterations {
        if x < 0.5 {
            x *= 2.0;
            y *= 2.0;
        } else if y < 0.5 {
            x = 2.0 * x - 1.0;
            y *= 2.0;
        } else {
            x = 2.0 * x - 1.0;
            y = 2.0 * y - 1.0;
        }
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return i;
        }
    }
    s.max_iterations
}
