//! Local file playback: WAV decoding, a shared playhead and the cpal output
//! stream that plays it while feeding the analyzer.

use crate::error::WavError;
use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use ringbuf::traits::Producer as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

pub const DEFAULT_VOLUME: f32 = 0.8;

/// Transport controls the interaction layer may drive.
pub trait PlaybackControl {
    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    fn seek(&mut self, position_s: f64);
    fn position_s(&self) -> f64;
    fn duration_s(&self) -> f64;
    fn next(&mut self);
    fn previous(&mut self);
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);

    fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }
}

struct PlayheadShared {
    playing: AtomicBool,
    // f64 bits, in source samples
    cursor: AtomicU64,
    // f32 bits
    volume: AtomicU32,
}

/// Mono samples plus a cursor shared with the audio callback.
#[derive(Clone)]
pub struct Playhead {
    samples: Arc<Vec<f32>>,
    sample_rate_hz: u32,
    shared: Arc<PlayheadShared>,
}

impl Playhead {
    pub fn new(sample_rate_hz: u32, samples: Vec<f32>) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate_hz: sample_rate_hz.max(1),
            shared: Arc::new(PlayheadShared {
                playing: AtomicBool::new(false),
                cursor: AtomicU64::new(0f64.to_bits()),
                volume: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
            }),
        }
    }


    fn cursor(&self) -> f64 {
        f64::from_bits(self.shared.cursor.load(Ordering::Acquire))
    }

    /// Fills `out` (interleaved, `channels` wide) at `out_rate_hz`.
    ///
    /// Every produced mono sample is also handed to `tap` before volume is
    /// applied. Playback stops at the end of the file.
    pub fn render_into(
        &self,
        out: &mut [f32],
        channels: usize,
        out_rate_hz: u32,
        mut tap: impl FnMut(f32),
    ) {
        let channels = channels.max(1);
        if !self.shared.playing.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }
        let volume = f32::from_bits(self.shared.volume.load(Ordering::Relaxed));
        let step = self.sample_rate_hz as f64 / out_rate_hz.max(1) as f64;
        let start_bits = self.shared.cursor.load(Ordering::Acquire);
        let mut pos = f64::from_bits(start_bits);
        let mut ended = false;
        for frame in out.chunks_mut(channels) {
            let idx = pos as usize;
            let s = match self.samples.get(idx) {
                Some(&s) => s,
                None => {
                    ended = true;
                    0.0
                }
            };
            if !ended {
                tap(s);
                pos += step;
            }
            frame.fill(s * volume);
        }
        // A seek that landed during this callback wins over our advance.
        let _ = self.shared.cursor.compare_exchange(
            start_bits,
            pos.to_bits(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
        if ended {
            self.shared.playing.store(false, Ordering::Release);
        }
    }
}

impl PlaybackControl for Playhead {
    fn play(&mut self) {
        if self.cursor() as usize >= self.samples.len() {
            self.seek(0.0);
        }
        self.shared.playing.store(true, Ordering::Release);
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    fn seek(&mut self, position_s: f64) {
        let pos = if position_s.is_finite() {
            position_s.clamp(0.0, self.duration_s())
        } else {
            0.0
        };
        let cursor = pos * self.sample_rate_hz as f64;
        self.shared.cursor.store(cursor.to_bits(), Ordering::Release);
        tracing::debug!(position_s = pos, "seek");
    }

    fn position_s(&self) -> f64 {
        self.cursor() / self.sample_rate_hz as f64
    }

    fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }

    fn next(&mut self) {
        tracing::info!("single-file source has no next track");
    }

    fn previous(&mut self) {
        tracing::info!("single-file source has no previous track");
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.shared.volume.load(Ordering::Relaxed))
    }

    fn set_volume(&mut self, volume: f32) {
        let v = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { DEFAULT_VOLUME };
        self.shared.volume.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// A WAV file playing on the default output device.
pub struct FilePlayer {
    path: PathBuf,
    playhead: Playhead,
    _stream: cpal::Stream,
}

impl FilePlayer {
    pub fn open(path: &Path, tap: ringbuf::HeapProd<f32>) -> anyhow::Result<Self> {
        let (rate, samples) =
            read_wav_mono_f32(path).with_context(|| format!("load {}", path.display()))?;
        let mut playhead = Playhead::new(rate, samples);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device found"))?;
        let supported = device
            .default_output_config()
            .context("get default output config")?;
        let out_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let err_fn = |err: cpal::StreamError| tracing::warn!(%err, "output stream error");
        let head = playhead.clone();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_output::<f32>(&device, &config, head, channels, out_rate, tap, err_fn)?
            }
            SampleFormat::I16 => {
                build_output::<i16>(&device, &config, head, channels, out_rate, tap, err_fn)?
            }
            SampleFormat::U16 => {
                build_output::<u16>(&device, &config, head, channels, out_rate, tap, err_fn)?
            }
            fmt => return Err(anyhow!("unsupported output sample format: {fmt:?}")),
        };
        stream.play().context("start output stream")?;
        playhead.play();

        tracing::info!(
            path = %path.display(),
            source_rate = rate,
            output_rate = out_rate,
            duration_s = playhead.duration_s(),
            "file playback ready"
        );
        Ok(Self {
            path: path.to_path_buf(),
            playhead,
            _stream: stream,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn playhead(&self) -> &Playhead {
        &self.playhead
    }

    pub fn playhead_mut(&mut self) -> &mut Playhead {
        &mut self.playhead
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    head: Playhead,
    channels: usize,
    out_rate: u32,
    mut tap: ringbuf::HeapProd<f32>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            head.render_into(&mut scratch, channels, out_rate, |s| {
                let _ = tap.try_push(s);
            });
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

pub fn read_wav_mono_f32(path: &Path) -> Result<(u32, Vec<f32>), WavError> {
    let bytes = std::fs::read(path)?;
    decode_wav_mono_f32(&bytes)
}

/// Decodes PCM16 or Float32 RIFF/WAVE, averaging channels to mono.
pub fn decode_wav_mono_f32(bytes: &[u8]) -> Result<(u32, Vec<f32>), WavError> {
    if bytes.len() < 44 {
        return Err(WavError::TooSmall);
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotRiff);
    }

    let mut format = 0u16;
    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut bits = 0u16;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size_bytes = [bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]];
        let size = u32::from_le_bytes(size_bytes) as usize;
        let start = pos + 8;
        let end = start.saturating_add(size);
        if end > bytes.len() {
            break;
        }
        match id {
            b"fmt " => {
                if size < 16 {
                    return Err(WavError::BadFormatChunk);
                }
                let c = &bytes[start..end];
                format = u16::from_le_bytes([c[0], c[1]]);
                channels = u16::from_le_bytes([c[2], c[3]]);
                sample_rate = u32::from_le_bytes([c[4], c[5], c[6], c[7]]);
                bits = u16::from_le_bytes([c[14], c[15]]);
            }
            b"data" => data = Some(&bytes[start..end]),
            _ => {}
        }
        pos = end + (size % 2);
    }

    let data = data.ok_or(WavError::MissingData)?;
    if channels == 0 {
        return Err(WavError::BadChannels);
    }
    let ch = channels as usize;
    let samples = match (format, bits) {
        (1, 16) => mix_down(data, ch, 2, |b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
        (3, 32) => mix_down(data, ch, 4, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        _ => return Err(WavError::Unsupported { format, bits }),
    };
    Ok((sample_rate, samples))
}

fn mix_down(
    data: &[u8],
    channels: usize,
    width: usize,
    decode: impl Fn(&[u8]) -> f32,
) -> Vec<f32> {
    data.chunks_exact(channels * width)
        .map(|frame| {
            let acc: f32 = frame.chunks_exact(width).map(&decode).sum();
            (acc / channels as f32).clamp(-1.0, 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_pcm16(rate: u32, channels: u16, frames: &[i16]) -> Vec<u8> {
        let data_len = (frames.len() * 2) as u32;
        let mut b = Vec::new();
        b.extend_from_slice(b"RIFF");
        b.extend_from_slice(&(36 + data_len).to_le_bytes());
        b.extend_from_slice(b"WAVE");
        b.extend_from_slice(b"fmt ");
        b.extend_from_slice(&16u32.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&channels.to_le_bytes());
        b.extend_from_slice(&rate.to_le_bytes());
        b.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        b.extend_from_slice(&(channels * 2).to_le_bytes());
        b.extend_from_slice(&16u16.to_le_bytes());
        b.extend_from_slice(b"data");
        b.extend_from_slice(&data_len.to_le_bytes());
        for s in frames {
            b.extend_from_slice(&s.to_le_bytes());
        }
        b
    }

    #[test]
    fn decodes_stereo_pcm16_to_mono() {
        let bytes = wav_pcm16(8000, 2, &[16384, -16384, 16384, 16384]);
        let (rate, samples) = decode_wav_mono_f32(&bytes).expect("decode");
        assert_eq!(rate, 8000);
        assert_eq!(samples.len(), 2);
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_non_riff_input() {
        let mut bytes = wav_pcm16(8000, 1, &[0; 8]);
        bytes[0..4].copy_from_slice(b"JUNK");
        assert!(matches!(decode_wav_mono_f32(&bytes), Err(WavError::NotRiff)));
    }

    #[test]
    fn rejects_unsupported_bit_depth() {
        let mut bytes = wav_pcm16(8000, 1, &[0; 8]);
        // bits-per-sample field of the fmt chunk
        bytes[34..36].copy_from_slice(&24u16.to_le_bytes());
        assert!(matches!(
            decode_wav_mono_f32(&bytes),
            Err(WavError::Unsupported { format: 1, bits: 24 })
        ));
    }

    #[test]
    fn playhead_seek_is_clamped_to_duration() {
        let mut head = Playhead::new(10, vec![0.0; 50]);
        head.seek(100.0);
        assert!((head.position_s() - 5.0).abs() < 1e-9);
        head.seek(-3.0);
        assert_eq!(head.position_s(), 0.0);
    }

    #[test]
    fn playhead_stops_at_end_and_taps_samples() {
        let mut head = Playhead::new(4, vec![0.25; 4]);
        head.play();
        let mut out = vec![1.0f32; 12];
        let mut tapped = 0;
        head.render_into(&mut out, 2, 4, |_| tapped += 1);
        assert_eq!(tapped, 4);
        assert!(!head.is_playing());
        assert_eq!(&out[8..], &[0.0; 4]);
        assert!((out[0] - 0.25 * DEFAULT_VOLUME).abs() < 1e-6);
    }

    #[test]
    fn paused_playhead_outputs_silence() {
        let head = Playhead::new(4, vec![0.9; 16]);
        let mut out = vec![1.0f32; 8];
        head.render_into(&mut out, 1, 4, |_| panic!("paused playhead must not tap"));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn volume_is_clamped() {
        let mut head = Playhead::new(4, vec![0.0; 4]);
        head.set_volume(3.0);
        assert_eq!(head.volume(), 1.0);
        head.set_volume(-1.0);
        assert_eq!(head.volume(), 0.0);
    }
}
