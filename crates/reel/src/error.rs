//! Error types for opening, seeking and decoding.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons `open` can fail. The player is left untouched in every case.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The file locator could not resolve the requested name.
    #[error("could not find file {0}")]
    NotFound(String),

    /// The container could not be parsed or has no usable stream info.
    #[error("could not open container {path}: {reason}")]
    FormatError { path: PathBuf, reason: String },

    /// The container holds no video stream.
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),

    /// No decoder is registered for the stream's codec.
    #[error("unsupported codec {codec} in {path}")]
    UnsupportedCodec { path: PathBuf, codec: String },

    /// A decoder exists but refused to open with the stream parameters.
    #[error("could not open codec {codec}: {reason}")]
    CodecOpenFailed { codec: String, reason: String },

    /// The RGBA converter could not be set up for the stream's pixel format.
    #[error("could not create pixel converter from {pixel_format}: {reason}")]
    ConverterFailed { pixel_format: String, reason: String },
}

/// Seek failures. Position is unchanged unless noted in the variant docs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeekError {
    /// Nothing is open.
    #[error("no active video stream")]
    NoActiveStream,

    /// The container rejected the target, or ran out of packets before a
    /// frame at or past the target was decoded. In the second case the
    /// decoder has already been flushed and the read position moved.
    #[error("seek to {target_secs:.3}s failed: {reason}")]
    SeekFailed { target_secs: f64, reason: String },
}

/// Unrecoverable decoder error. Ends the current playback session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("decoder fault: {0}")]
pub struct DecodeFault(pub String);
