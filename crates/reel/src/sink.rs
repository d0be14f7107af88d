//! Frame sink: the pixel surface published frames are written into.
//!
//! Writes follow a scoped discipline: acquire (`map`), write every row,
//! release (`unmap`), then signal `set_dirty`. Consumers must not read
//! between acquire and release.

use crate::media::types::ConvertedFrame;

/// A surface the player publishes RGBA rows into, bottom row first.
pub trait FrameSink {
    /// Bytes per destination row.
    fn pitch(&self) -> usize;
    /// Number of destination rows.
    fn rows(&self) -> usize;
    /// Acquire write access.
    fn map(&mut self) -> &mut [u8];
    /// Release write access.
    fn unmap(&mut self);
    /// Mark the surface as holding a new frame.
    fn set_dirty(&mut self);
}

/// Unmaps the sink on drop.
struct WriteGuard<'a, S: FrameSink + ?Sized> {
    sink: &'a mut S,
}

impl<'a, S: FrameSink + ?Sized> WriteGuard<'a, S> {
    fn acquire(sink: &'a mut S) -> Self {
        Self { sink }
    }

    fn bytes(&mut self) -> &mut [u8] {
        self.sink.map()
    }
}

impl<S: FrameSink + ?Sized> Drop for WriteGuard<'_, S> {
    fn drop(&mut self) {
        self.sink.unmap();
    }
}

/// Copy `frame` into `sink` with rows reversed (source row `y` lands in
/// row `height - 1 - y`), then mark the sink dirty.
pub fn publish_flipped<S: FrameSink + ?Sized>(sink: &mut S, frame: &ConvertedFrame) {
    let pitch = sink.pitch();
    let rows = sink.rows().min(frame.height as usize);
    let row_bytes = pitch.min(frame.pitch());
    {
        let mut guard = WriteGuard::acquire(sink);
        let out = guard.bytes();
        for y in 0..rows {
            let dst = (rows - 1 - y) * pitch;
            out[dst..dst + row_bytes].copy_from_slice(&frame.row(y)[..row_bytes]);
        }
    }
    sink.set_dirty();
}

/// Double-buffered RGBA surface.
///
/// Writes go to the back buffer; `unmap` swaps it to the front, so readers
/// of [`PixelBuffer::pixels`] only ever see complete frames.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    front: Vec<u8>,
    back: Vec<u8>,
    mapped: bool,
    dirty: bool,
    generation: u64,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize) * 4;
        Self {
            width,
            height,
            front: vec![0u8; len],
            back: vec![0u8; len],
            mapped: false,
            dirty: false,
            generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Last published frame, bottom row first.
    pub fn pixels(&self) -> &[u8] {
        &self.front
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let p = self.pitch();
        &self.front[y * p..(y + 1) * p]
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consume the dirty flag (e.g. after a texture upload).
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Number of frames published into this buffer.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl FrameSink for PixelBuffer {
    fn pitch(&self) -> usize {
        self.width as usize * 4
    }

    fn rows(&self) -> usize {
        self.height as usize
    }

    fn map(&mut self) -> &mut [u8] {
        self.mapped = true;
        &mut self.back
    }

    fn unmap(&mut self) {
        if self.mapped {
            self.mapped = false;
            std::mem::swap(&mut self.front, &mut self.back);
        }
    }

    fn set_dirty(&mut self) {
        self.dirty = true;
        self.generation += 1;
    }
}
