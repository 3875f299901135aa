use crate::visual::RenderState;
use std::time::{Duration, Instant};

/// Advances fractal time once per scheduling tick.
#[derive(Debug, Default, Clone)]
pub struct AnimationClock {
    ticks: u64,
    advanced: u64,
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps `time` by `animation_speed` when animating. Ticks are counted
    /// either way so the caller keeps scheduling.
    pub fn tick(&mut self, state: &mut RenderState) -> bool {
        self.ticks += 1;
        let moved = state.advance_time();
        if moved {
            self.advanced += 1;
        }
        moved
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn advanced(&self) -> u64 {
        self.advanced
    }
}

/// Lets a pass through at most once per target interval.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: u32) -> Self {
        Self::with_interval(Duration::from_secs_f64(1.0 / target_fps.max(1) as f64))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True (and records `now`) when at least one interval has passed since
    /// the last accepted call. The first call is always accepted.
    pub fn ready(&mut self, now: Instant) -> bool {
        let ok = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if ok {
            self.last = Some(now);
        }
        ok
    }

    /// Time left until the next pass may run.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            None => Duration::ZERO,
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }
}
