use crate::config::AudioSource;
use crate::media::{FilePlayer, PlaybackControl};
use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const FFT_SIZE: usize = 256;
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2;
pub const SMOOTHING: f32 = 0.8;
pub const MIN_DB: f32 = -100.0;
pub const MAX_DB: f32 = -30.0;
pub const SIMULATED_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spectrum {
    pub bins: [u8; SPECTRUM_BINS],
}

impl Default for Spectrum {
    fn default() -> Self {
        Self {
            bins: [0; SPECTRUM_BINS],
        }
    }
}

/// Latest spectrum snapshot, written by one thread and polled by the frame loop.
pub struct AtomicSpectrum {
    seq: AtomicU64,
    bins: [AtomicU8; SPECTRUM_BINS],
    updated_ms: AtomicU64,
}

impl Default for AtomicSpectrum {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicSpectrum {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            bins: std::array::from_fn(|_| AtomicU8::new(0)),
            updated_ms: AtomicU64::new(0),
        }
    }

    pub fn store(&self, s: &Spectrum) {
        self.seq.fetch_add(1, Ordering::Release); // odd => write in progress
        for (dst, &src) in self.bins.iter().zip(s.bins.iter()) {
            dst.store(src, Ordering::Relaxed);
        }
        self.updated_ms.store(now_ms(), Ordering::Relaxed);
        self.seq.fetch_add(1, Ordering::Release); // even => stable
    }

    pub fn load(&self) -> Spectrum {
        loop {
            let v1 = self.seq.load(Ordering::Acquire);
            if v1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let mut out = Spectrum::default();
            for (dst, src) in out.bins.iter_mut().zip(self.bins.iter()) {
                *dst = src.load(Ordering::Relaxed);
            }
            let v2 = self.seq.load(Ordering::Acquire);
            if v1 == v2 {
                return out;
            }
        }
    }

    /// False until the first snapshot lands.
    pub fn has_data(&self) -> bool {
        self.updated_ms.load(Ordering::Relaxed) != 0
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_millis(0))
        .as_millis() as u64
}

/// Byte frequency data the way a browser analyser node reports it.
///
/// Blackman window, `|X[k]| / N`, exponential smoothing across calls, then
/// decibels mapped from [`MIN_DB`, `MAX_DB`] onto 0..=255.
pub struct SpectrumAnalyzer {
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buf: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let n = FFT_SIZE;
        let window = (0..n)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / n as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        Self {
            window,
            fft: planner.plan_fft_forward(n),
            buf: vec![Complex { re: 0.0, im: 0.0 }; n],
            smoothed: vec![0.0; n / 2],
        }
    }

    /// Analyzes the last [`FFT_SIZE`] samples of `samples` (zero-padded in front).
    pub fn process(&mut self, samples: &[f32]) -> Spectrum {
        let n = FFT_SIZE;
        let tail = &samples[samples.len().saturating_sub(n)..];
        let pad = n - tail.len();
        for (i, c) in self.buf.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *c = Complex {
                re: s * self.window[i],
                im: 0.0,
            };
        }
        self.fft.process(&mut self.buf);

        let mut out = Spectrum::default();
        let range = MAX_DB - MIN_DB;
        for (k, bin) in out.bins.iter_mut().enumerate() {
            let mag = self.buf[k].norm() / n as f32;
            let sm = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * mag;
            self.smoothed[k] = if sm.is_finite() { sm } else { 0.0 };
            let db = 20.0 * self.smoothed[k].log10();
            let scaled = (255.0 * (db - MIN_DB) / range).floor();
            *bin = if scaled.is_nan() { 0 } else { scaled.clamp(0.0, 255.0) as u8 };
        }
        out
    }
}

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("enumerate input devices")?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

enum AudioBackend {
    Mic(cpal::Stream),
    File(FilePlayer),
    Simulated,
    Silent,
}

/// Options for opening an audio source.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions<'a> {
    pub source: AudioSource,
    pub device: Option<&'a str>,
    pub file: Option<&'a Path>,
    pub fallback_simulated: bool,
}

pub struct AudioSystem {
    backend: AudioBackend,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    spectrum: Arc<AtomicSpectrum>,
}

impl AudioSystem {
    pub fn new(opts: SourceOptions<'_>) -> anyhow::Result<Self> {
        match opts.source {
            AudioSource::Mic => match Self::new_mic(opts.device) {
                Ok(sys) => Ok(sys),
                Err(err) if opts.fallback_simulated => {
                    tracing::warn!(
                        error = %format!("{err:#}"),
                        "microphone unavailable, using simulated spectrum"
                    );
                    Ok(Self::new_simulated())
                }
                Err(err) => Err(err),
            },
            AudioSource::File => {
                let path = opts
                    .file
                    .ok_or_else(|| anyhow!("--source file needs --file <path.wav>"))?;
                Self::new_file(path)
            }
            AudioSource::Simulated => Ok(Self::new_simulated()),
            AudioSource::Silent => Ok(Self::silent()),
        }
    }

    fn new_mic(device_query: Option<&str>) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_mic_input_device(&host, device_query)?;
        let supported = device
            .default_input_config()
            .context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let rb = HeapRb::<f32>::new((sample_rate_hz as usize).saturating_mul(4));
        let (mut prod, mut cons) = rb.split();

        let stop = Arc::new(AtomicBool::new(false));
        let spectrum = Arc::new(AtomicSpectrum::new());
        let spectrum_for_thread = Arc::clone(&spectrum);
        let stop_for_thread = Arc::clone(&stop);

        let err_fn = |err: cpal::StreamError| tracing::warn!(%err, "input stream error");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };

        stream.play().context("start input stream")?;

        let worker = thread::spawn(move || {
            analyze_loop(&mut cons, &stop_for_thread, &spectrum_for_thread)
        });

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate_hz,
            channels,
            "microphone capture started"
        );
        Ok(Self {
            backend: AudioBackend::Mic(stream),
            stop,
            worker: Some(worker),
            spectrum,
        })
    }

    fn new_file(path: &Path) -> anyhow::Result<Self> {
        let rb = HeapRb::<f32>::new(FFT_SIZE * 512);
        let (prod, mut cons) = rb.split();
        let player = FilePlayer::open(path, prod)?;

        let stop = Arc::new(AtomicBool::new(false));
        let spectrum = Arc::new(AtomicSpectrum::new());
        let spectrum_for_thread = Arc::clone(&spectrum);
        let stop_for_thread = Arc::clone(&stop);
        let worker = thread::spawn(move || {
            analyze_loop(&mut cons, &stop_for_thread, &spectrum_for_thread)
        });

        Ok(Self {
            backend: AudioBackend::File(player),
            stop,
            worker: Some(worker),
            spectrum,
        })
    }

    /// Random spectrum every [`SIMULATED_INTERVAL`]. Not deterministic.
    fn new_simulated() -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let spectrum = Arc::new(AtomicSpectrum::new());
        let spectrum_for_thread = Arc::clone(&spectrum);
        let stop_for_thread = Arc::clone(&stop);
        let worker = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Relaxed) {
                spectrum_for_thread.store(&random_spectrum());
                thread::sleep(SIMULATED_INTERVAL);
            }
        });
        tracing::info!("simulated spectrum source started");
        Self {
            backend: AudioBackend::Simulated,
            stop,
            worker: Some(worker),
            spectrum,
        }
    }

    fn silent() -> Self {
        Self {
            backend: AudioBackend::Silent,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            spectrum: Arc::new(AtomicSpectrum::new()),
        }
    }

    pub fn spectrum(&self) -> Arc<AtomicSpectrum> {
        Arc::clone(&self.spectrum)
    }

    pub fn label(&self) -> &'static str {
        match self.backend {
            AudioBackend::Mic(_) => "mic",
            AudioBackend::File(_) => "file",
            AudioBackend::Simulated => "simulated",
            AudioBackend::Silent => "none",
        }
    }

    /// Simulated data is random and must not be treated as a real signal.
    pub fn is_simulated(&self) -> bool {
        matches!(self.backend, AudioBackend::Simulated)
    }

    pub fn produces_spectrum(&self) -> bool {
        !matches!(self.backend, AudioBackend::Silent)
    }

    pub fn player(&self) -> Option<&dyn PlaybackControl> {
        match &self.backend {
            AudioBackend::File(p) => Some(p.playhead()),
            _ => None,
        }
    }

    /// File name of the playing track, when playing from a file.
    pub fn track_name(&self) -> Option<String> {
        match &self.backend {
            AudioBackend::File(p) => p.path().file_name().map(|n| n.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut dyn PlaybackControl> {
        match &mut self.backend {
            AudioBackend::File(p) => Some(p.playhead_mut()),
            _ => None,
        }
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        if let AudioBackend::Mic(stream) = &self.backend {
            let _ = stream.pause();
        }
    }
}

pub fn random_spectrum() -> Spectrum {
    Spectrum {
        bins: std::array::from_fn(|_| fastrand::u8(..)),
    }
}

fn select_mic_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> anyhow::Result<cpal::Device> {
    let devices = host
        .input_devices()
        .context("enumerate input devices")?
        .collect::<Vec<_>>();

    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        if let Some(dev) = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
        }) {
            return Ok(dev.clone());
        }
        return Err(anyhow!("no input device matching: {want}"));
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device found"))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
) {
    for frame in data.chunks(channels.max(1)) {
        let acc: f32 = frame.iter().map(|s| s.to_float_sample()).sum();
        let _ = prod.try_push(acc / frame.len() as f32);
    }
}

fn analyze_loop(cons: &mut ringbuf::HeapCons<f32>, stop: &AtomicBool, spectrum: &AtomicSpectrum) {
    let n = FFT_SIZE;
    let hop = n / 2;
    let mut ring = vec![0.0f32; n];
    let mut ordered = vec![0.0f32; n];
    let mut write_pos = 0usize;
    let mut since_last = 0usize;
    let mut analyzer = SpectrumAnalyzer::new();

    while !stop.load(Ordering::Relaxed) {
        let mut got_any = false;
        while let Some(s) = cons.try_pop() {
            got_any = true;
            ring[write_pos] = s;
            write_pos = (write_pos + 1) % n;
            since_last += 1;
            if since_last >= hop {
                since_last = 0;
                for (i, dst) in ordered.iter_mut().enumerate() {
                    *dst = ring[(write_pos + i) % n];
                }
                spectrum.store(&analyzer.process(&ordered));
            }
        }
        if !got_any {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(bin: usize, amp: f32) -> Vec<f32> {
        (0..FFT_SIZE)
            .map(|i| amp * (2.0 * PI * bin as f32 * i as f32 / FFT_SIZE as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut a = SpectrumAnalyzer::new();
        let s = a.process(&[0.0; FFT_SIZE]);
        assert!(s.bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut a = SpectrumAnalyzer::new();
        // Quiet enough that the peak and its neighbours stay below the clamp.
        let tone = sine(20, 0.08);
        let mut s = Spectrum::default();
        for _ in 0..30 {
            s = a.process(&tone);
        }
        let peak = s
            .bins
            .iter()
            .enumerate()
            .max_by_key(|(_, b)| **b)
            .map(|(i, _)| i)
            .expect("non-empty");
        assert_eq!(peak, 20);
        assert!(s.bins[20] > 200, "peak byte too low: {}", s.bins[20]);
        assert!(s.bins[100] < s.bins[20]);
    }

    #[test]
    fn smoothing_delays_response() {
        let mut a = SpectrumAnalyzer::new();
        let tone = sine(10, 0.08);
        let first = a.process(&tone).bins[10];
        let later = (0..20).map(|_| a.process(&tone).bins[10]).last().unwrap_or(0);
        assert!(later > first, "expected rise under smoothing ({first} -> {later})");
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut a = SpectrumAnalyzer::new();
        let s = a.process(&[0.0; 10]);
        assert!(s.bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn atomic_spectrum_round_trips_latest_store() {
        let store = AtomicSpectrum::new();
        assert!(!store.has_data());
        let mut s = Spectrum::default();
        s.bins[3] = 77;
        store.store(&s);
        assert!(store.has_data());
        assert_eq!(store.load(), s);
    }
}
