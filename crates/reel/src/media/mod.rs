pub mod container;
pub mod convert;
pub mod decoder;
pub mod stream;
pub mod types;
#[cfg(feature = "ffmpeg")]
pub mod video;

use std::path::Path;

use crate::error::OpenError;
use container::ContainerReader;
use convert::PixelConverter;
use decoder::VideoDecoder;
use stream::VideoStream;

/// Ties together the container, decoder and converter of one media stack.
///
/// The player only talks to these traits; the ffmpeg stack lives in
/// `video` behind the `ffmpeg` feature.
pub trait MediaBackend {
    type Container: ContainerReader;
    type Decoder: VideoDecoder<Packet = <Self::Container as ContainerReader>::Packet>;
    type Converter: PixelConverter<Frame = <Self::Decoder as VideoDecoder>::Frame>;

    /// Open and probe a container. Fails with `FormatError`.
    fn open_container(&self, path: &Path) -> Result<Self::Container, OpenError>;

    /// Find and open a decoder for the selected stream. Fails with
    /// `UnsupportedCodec` or `CodecOpenFailed`.
    fn open_decoder(
        &self,
        container: &Self::Container,
        stream: &VideoStream,
    ) -> Result<Self::Decoder, OpenError>;

    /// Build the RGBA converter for the stream's native format.
    fn open_converter(&self, stream: &VideoStream) -> Result<Self::Converter, OpenError>;
}
