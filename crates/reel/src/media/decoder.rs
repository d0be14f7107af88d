use crate::error::DecodeFault;

/// A coded packet read from the container.
///
/// Packets are consumed by value in the fetch loop and dropped as soon as
/// they have been routed, so any backend resources they hold are released
/// per packet.
pub trait CodedPacket {
    /// Index of the stream this packet belongs to.
    fn stream_index(&self) -> usize;
}

/// A frame held in the decoder's output slot.
pub trait DecodedFrame {
    /// Display-order timestamp in stream ticks, compensating for reordering.
    fn best_effort_timestamp(&self) -> Option<i64>;
    /// Decoding timestamp of the packet that completed this frame.
    fn decode_timestamp(&self) -> Option<i64>;
}

/// Result of feeding the decoder.
///
/// `FrameReady` borrows the decoder's frame slot; the borrow has to end
/// (the frame copied out) before the decoder is called again.
pub enum DecodeOutcome<'a, F> {
    FrameReady(&'a F),
    NeedsMorePackets,
}

/// Stateful video decoder bound to the selected stream.
pub trait VideoDecoder {
    type Packet: CodedPacket;
    type Frame: DecodedFrame;

    /// Feed one packet of the selected stream and try to complete a frame.
    fn decode(
        &mut self,
        packet: &Self::Packet,
    ) -> Result<DecodeOutcome<'_, Self::Frame>, DecodeFault>;

    /// Return a frame still pending from earlier input, without new input.
    fn receive(&mut self) -> Result<DecodeOutcome<'_, Self::Frame>, DecodeFault>;

    /// Signal end of input and return frames held back by reordering.
    ///
    /// Only `flush` makes the decoder accept packets again afterwards.
    fn drain(&mut self) -> Result<DecodeOutcome<'_, Self::Frame>, DecodeFault>;

    /// Discard all buffered reference frames. Required after every seek.
    fn flush(&mut self);
}
