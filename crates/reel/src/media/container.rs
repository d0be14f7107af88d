use super::decoder::CodedPacket;
use super::types::{SeekMode, StreamDescriptor};

/// An open container: stream metadata plus a sequential packet source.
///
/// Dropping the reader releases every container-level resource.
pub trait ContainerReader {
    type Packet: CodedPacket;

    /// Container format name (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
    fn format_name(&self) -> &str;

    /// All streams, in container order.
    fn streams(&self) -> &[StreamDescriptor];

    /// Container-wide duration in seconds, if known.
    fn duration_secs(&self) -> Option<f64>;

    /// Next packet in container order. `None` is end-of-stream, not a fault.
    fn read_packet(&mut self) -> Option<Self::Packet>;

    /// Reposition the read cursor near `target` (stream ticks).
    ///
    /// On error the read position is unchanged.
    fn seek(&mut self, stream_index: usize, target: i64, mode: SeekMode) -> Result<(), String>;
}
