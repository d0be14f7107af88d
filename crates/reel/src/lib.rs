//! Single-stream video playback engine.
//!
//! [`VideoPlayer`] opens a clip through a [`MediaBackend`], picks its video
//! stream, and on every host tick paces out decoded frames as RGBA into a
//! bottom-up [`PixelBuffer`]. Audio and other streams are ignored. Seeking by
//! time or frame index and looping are built in.
//!
//! The libav* backend lives in `media::video` behind the `ffmpeg` feature.

pub mod config;
pub mod error;
pub mod locate;
pub mod media;
pub mod player;
pub mod sink;

#[cfg(test)]
mod testing;

pub use config::PlayerConfig;
pub use error::{DecodeFault, OpenError, SeekError};
pub use locate::{FileLocator, SearchPathLocator};
pub use media::MediaBackend;
pub use media::stream::VideoStream;
pub use player::{FrameStep, PlaybackState, Tickable, VideoPlayer};
pub use sink::{FrameSink, PixelBuffer};
