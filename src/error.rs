use std::path::PathBuf;
use thiserror::Error;

/// Render target acquisition failure. The only fatal error class of the engine.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("render surface has zero size ({width}x{height})")]
    ZeroSized { width: usize, height: usize },
    #[error("render surface unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("read track feed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse track feed {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum WavError {
    #[error("read wav: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav too small")]
    TooSmall,
    #[error("not a RIFF/WAVE file")]
    NotRiff,
    #[error("invalid fmt chunk")]
    BadFormatChunk,
    #[error("missing data chunk")]
    MissingData,
    #[error("invalid channel count")]
    BadChannels,
    #[error("unsupported wav format {format} at {bits} bits (PCM16 and Float32 only)")]
    Unsupported { format: u16, bits: u16 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("invalid hex color '{0}' (expected #rrggbb)")]
    BadHex(String),
    #[error("unknown palette '{0}'")]
    UnknownName(String),
}
