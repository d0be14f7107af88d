use super::types::ConvertedFrame;

/// Native-format → packed RGBA8 conversion at source resolution.
///
/// Conversion is not a fallible boundary: a backend that cannot convert a
/// frame logs the failure and leaves `into` as it was.
pub trait PixelConverter {
    type Frame;

    fn convert(&mut self, frame: &Self::Frame, into: &mut ConvertedFrame);
}
