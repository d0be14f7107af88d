//! Playback controller: open, pace, fetch-decode-convert-publish, seek, loop.
//!
//! Everything runs synchronously on the thread that calls [`Tickable::update`].
//! The player exclusively owns the container, decoder, converter and both
//! pixel buffers of the open clip.

use std::path::{Path, PathBuf};

use crate::config::PlayerConfig;
use crate::error::{DecodeFault, OpenError, SeekError};
use crate::locate::{FileLocator, SearchPathLocator};
use crate::media::MediaBackend;
use crate::media::container::ContainerReader;
use crate::media::convert::PixelConverter;
use crate::media::decoder::{CodedPacket, DecodeOutcome, DecodedFrame, VideoDecoder};
use crate::media::stream::{VideoStream, select_video_stream};
use crate::media::types::{ConvertedFrame, SeekMode};
use crate::sink::{PixelBuffer, publish_flipped};

/// Host-driven per-tick entry point.
pub trait Tickable {
    /// `now` is the host clock in seconds.
    fn update(&mut self, now: f64);
}

/// Transport state of the player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub playing: bool,
    pub looping: bool,
    /// Host time of the last paced cycle.
    pub last_frame_time: f64,
    /// Timestamp of the last published frame, in seconds.
    pub current_presentation_time: f64,
    /// Seconds per nominal frame (pacing interval).
    pub frame_duration: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            looping: false,
            last_frame_time: 0.0,
            current_presentation_time: 0.0,
            frame_duration: 0.0,
        }
    }
}

/// What one fetch-decode-convert-publish cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// A new frame was published to the pixel buffer.
    Published,
    /// The clip ran out and looping restarted it; the restart frame was published.
    Restarted,
    /// The clip ran out and playback stopped.
    EndOfStream,
    /// The decoder failed; the session is dead until the next `open`.
    Faulted,
    /// Nothing is open, or the session already faulted.
    Idle,
}

/// Converted frame waiting in the session buffer for the next cycle.
#[derive(Debug, Clone, Copy)]
struct Landing {
    ticks: Option<i64>,
    secs: f64,
}

enum Fetched {
    /// A frame was converted into the session buffer (timestamp in ticks).
    Frame(Option<i64>),
    Exhausted,
}

/// One open clip and everything decoded from it.
struct Session<B: MediaBackend> {
    path: PathBuf,
    container: B::Container,
    decoder: B::Decoder,
    converter: B::Converter,
    stream: VideoStream,
    converted: ConvertedFrame,
    pixels: PixelBuffer,
    /// Decode timestamp of the most recent decoded frame.
    last_dts: Option<i64>,
    /// Timestamp of the last published frame, in ticks.
    shown: Option<i64>,
    /// Seek landing frame, converted but not yet published.
    pending: Option<Landing>,
    fault: Option<DecodeFault>,
}

impl<B: MediaBackend> Session<B> {
    fn to_secs(&self, ticks: Option<i64>, fallback: f64) -> f64 {
        ticks.map_or(fallback, |t| self.stream.ticks_to_secs(t))
    }

    fn publish(&mut self, ticks: Option<i64>) {
        publish_flipped(&mut self.pixels, &self.converted);
        self.shown = ticks;
    }

    /// Decode until a frame at or past `target` (any frame when `None`) is
    /// converted, or the container and decoder are both exhausted. Frames
    /// before `target` are decoded and dropped without conversion.
    fn fetch(&mut self, target: Option<i64>) -> Result<Fetched, DecodeFault> {
        let Self {
            container,
            decoder,
            converter,
            stream,
            converted,
            last_dts,
            ..
        } = self;
        let video_index = stream.index();

        // frames still buffered from a packet that produced several
        while let DecodeOutcome::FrameReady(frame) = decoder.receive()? {
            if let Some(found) = land::<B>(frame, target, converter, converted, last_dts) {
                return Ok(found);
            }
        }

        while let Some(packet) = container.read_packet() {
            if packet.stream_index() != video_index {
                continue;
            }
            if let DecodeOutcome::FrameReady(frame) = decoder.decode(&packet)? {
                if let Some(found) = land::<B>(frame, target, converter, converted, last_dts) {
                    return Ok(found);
                }
            }
            while let DecodeOutcome::FrameReady(frame) = decoder.receive()? {
                if let Some(found) = land::<B>(frame, target, converter, converted, last_dts) {
                    return Ok(found);
                }
            }
        }

        while let DecodeOutcome::FrameReady(frame) = decoder.drain()? {
            if let Some(found) = land::<B>(frame, target, converter, converted, last_dts) {
                return Ok(found);
            }
        }
        Ok(Fetched::Exhausted)
    }

    /// Container seek, flush, then decode forward to the first frame at or
    /// past `target`. That frame is held in `pending` for the next cycle.
    ///
    /// If the stream ends before `target` the read position is moved back to
    /// where playback was, so the next cycle continues from there.
    fn seek(&mut self, target_secs: f64, target: i64, mode: SeekMode) -> Result<(), SeekError> {
        let failed = |reason: String| SeekError::SeekFailed {
            target_secs,
            reason,
        };
        if let Some(fault) = &self.fault {
            return Err(failed(fault.to_string()));
        }

        self.container
            .seek(self.stream.index(), target, mode)
            .map_err(failed)?;
        self.decoder.flush();
        let before = self.pending.take();
        log::debug!(
            "Seek {:?} to tick {target} ({target_secs:.3}s) in {}",
            mode,
            self.path.display()
        );

        match self.fetch(Some(target)) {
            Ok(Fetched::Frame(ts)) => {
                self.pending = Some(Landing {
                    ticks: ts,
                    secs: self.to_secs(ts, target_secs),
                });
                Ok(())
            }
            Ok(Fetched::Exhausted) => {
                self.resume(before)?;
                Err(failed("stream ended before target".into()))
            }
            Err(fault) => Err(self.record(fault, target_secs)),
        }
    }

    /// Reposition after a seek ran off the end: back onto the held landing
    /// frame, or onto the frame after the one on screen.
    fn resume(&mut self, before: Option<Landing>) -> Result<(), SeekError> {
        let resume = match before {
            Some(landing) => landing.ticks.unwrap_or(0),
            None => self.shown.map_or(0, |t| t + 1),
        };
        let resume_secs = self.stream.ticks_to_secs(resume);
        if let Err(reason) = self.container.seek(self.stream.index(), resume, SeekMode::Backward) {
            log::warn!("Cannot return to tick {resume} in {}: {reason}", self.path.display());
            return Ok(());
        }
        self.decoder.flush();
        match self.fetch(Some(resume)) {
            Ok(Fetched::Frame(ts)) => {
                self.pending = Some(Landing {
                    ticks: ts,
                    secs: self.to_secs(ts, resume_secs),
                });
                Ok(())
            }
            // the frame on screen was the last one
            Ok(Fetched::Exhausted) => Ok(()),
            Err(fault) => Err(self.record(fault, resume_secs)),
        }
    }

    fn record(&mut self, fault: DecodeFault, target_secs: f64) -> SeekError {
        let reason = fault.to_string();
        self.fault = Some(fault);
        SeekError::SeekFailed {
            target_secs,
            reason,
        }
    }
}

/// Convert `frame` if it reaches `target`; `None` means it was dropped.
fn land<B: MediaBackend>(
    frame: &<B::Decoder as VideoDecoder>::Frame,
    target: Option<i64>,
    converter: &mut B::Converter,
    converted: &mut ConvertedFrame,
    last_dts: &mut Option<i64>,
) -> Option<Fetched> {
    if let Some(dts) = frame.decode_timestamp() {
        *last_dts = Some(dts);
    }
    let ts = frame.best_effort_timestamp();
    if let (Some(target), Some(ts)) = (target, ts) {
        if ts < target {
            return None;
        }
    }
    converter.convert(frame, converted);
    Some(Fetched::Frame(ts))
}

/// Single-stream video player.
pub struct VideoPlayer<B: MediaBackend, L: FileLocator = SearchPathLocator> {
    backend: B,
    locator: L,
    config: PlayerConfig,
    session: Option<Session<B>>,
    state: PlaybackState,
}

impl<B: MediaBackend> VideoPlayer<B, SearchPathLocator> {
    /// Player whose locator searches `config.search_paths`.
    pub fn new(backend: B, config: PlayerConfig) -> Self {
        let locator = SearchPathLocator::new(config.search_paths.clone());
        Self::with_locator(backend, locator, config)
    }
}

impl<B: MediaBackend, L: FileLocator> VideoPlayer<B, L> {
    pub fn with_locator(backend: B, locator: L, config: PlayerConfig) -> Self {
        let state = PlaybackState {
            looping: config.looping,
            ..PlaybackState::default()
        };
        Self {
            backend,
            locator,
            config,
            session: None,
            state,
        }
    }

    /// Open `name` and prepare it for playback.
    ///
    /// On failure the player keeps whatever it had open before. On success
    /// the previous clip is released and the new one starts stopped at 0.
    pub fn open(&mut self, name: &str) -> Result<(), OpenError> {
        match self.open_session(name) {
            Ok(session) => {
                log::info!(
                    "Opened {} ({}): {}x{} {} @ {} fps, {:.2}s",
                    session.path.display(),
                    session.container.format_name(),
                    session.stream.width(),
                    session.stream.height(),
                    session.stream.descriptor.codec,
                    session.stream.frame_rate,
                    session.stream.duration_secs,
                );
                self.state = PlaybackState {
                    looping: self.state.looping,
                    frame_duration: session.stream.frame_duration,
                    ..PlaybackState::default()
                };
                if let Some(old) = self.session.replace(session) {
                    log::debug!("Released {}", old.path.display());
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("[open] {e}");
                Err(e)
            }
        }
    }

    fn open_session(&self, name: &str) -> Result<Session<B>, OpenError> {
        let path = self
            .locator
            .locate(name)
            .ok_or_else(|| OpenError::NotFound(name.to_string()))?;

        let container = self.backend.open_container(&path)?;
        let stream = select_video_stream(container.streams(), container.duration_secs())
            .map_err(|_| OpenError::NoVideoStream(path.clone()))?;
        if stream.width() == 0 || stream.height() == 0 {
            return Err(OpenError::FormatError {
                path,
                reason: format!("video stream {} has no dimensions", stream.index()),
            });
        }

        let decoder = self.backend.open_decoder(&container, &stream)?;
        let converter = self.backend.open_converter(&stream)?;

        Ok(Session {
            converted: ConvertedFrame::new(stream.width(), stream.height()),
            pixels: PixelBuffer::new(stream.width(), stream.height()),
            path,
            container,
            decoder,
            converter,
            stream,
            last_dts: None,
            shown: None,
            pending: None,
            fault: None,
        })
    }

    /// Release the open clip, if any.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!("Closed {}", session.path.display());
        }
        self.state = PlaybackState {
            looping: self.state.looping,
            ..PlaybackState::default()
        };
    }

    pub fn play(&mut self) {
        self.set_playing(true);
    }

    /// Pause or resume. Decoder and container state are left alone.
    pub fn set_playing(&mut self, playing: bool) {
        if playing {
            if let Some(fault) = self.last_fault() {
                log::warn!("[play] refusing to resume after {fault}");
                return;
            }
        }
        self.state.playing = playing;
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.state.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.state.looping
    }

    /// Clip duration in seconds, 0 when nothing is open.
    pub fn duration(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.stream.duration_secs)
    }

    /// Timestamp of the last published frame, in seconds.
    pub fn position(&self) -> f64 {
        self.state.current_presentation_time
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn stream(&self) -> Option<&VideoStream> {
        self.session.as_ref().map(|s| &s.stream)
    }

    pub fn path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Published frames, bottom row first. `None` until a clip is open.
    pub fn pixels(&self) -> Option<&PixelBuffer> {
        self.session.as_ref().map(|s| &s.pixels)
    }

    /// For consumers that clear the dirty flag after an upload.
    pub fn pixels_mut(&mut self) -> Option<&mut PixelBuffer> {
        self.session.as_mut().map(|s| &mut s.pixels)
    }

    pub fn last_fault(&self) -> Option<&DecodeFault> {
        self.session.as_ref().and_then(|s| s.fault.as_ref())
    }

    /// Run one cycle now, ignoring the pacing gate and the play state.
    pub fn load_next_frame(&mut self) -> FrameStep {
        let Some(session) = self.session.as_mut() else {
            return FrameStep::Idle;
        };
        if session.fault.is_some() {
            return FrameStep::Idle;
        }

        if let Some(landing) = session.pending.take() {
            session.publish(landing.ticks);
            self.state.current_presentation_time = landing.secs;
            return FrameStep::Published;
        }

        let fallback = self.state.current_presentation_time + self.state.frame_duration;
        match session.fetch(None) {
            Ok(Fetched::Frame(ts)) => {
                let secs = session.to_secs(ts, fallback);
                session.publish(ts);
                self.state.current_presentation_time = secs;
                FrameStep::Published
            }
            Ok(Fetched::Exhausted) => self.end_of_stream(),
            Err(fault) => self.fail(fault),
        }
    }

    fn end_of_stream(&mut self) -> FrameStep {
        if !self.state.looping {
            log::debug!("End of stream at {:.3}s", self.state.current_presentation_time);
            self.state.playing = false;
            return FrameStep::EndOfStream;
        }

        let duration = self.duration();
        let restart = if self.config.loop_restart_secs < duration {
            self.config.loop_restart_secs.max(0.0)
        } else {
            0.0
        };
        match self.seek_to_time(restart) {
            Ok(()) => {
                log::debug!("Looping back to {restart:.3}s");
                match self.load_next_frame() {
                    FrameStep::Published => FrameStep::Restarted,
                    other => other,
                }
            }
            Err(e) => {
                log::warn!("[loop] restart failed: {e}");
                if self.last_fault().is_some() {
                    return FrameStep::Faulted;
                }
                self.state.playing = false;
                FrameStep::EndOfStream
            }
        }
    }

    fn fail(&mut self, fault: DecodeFault) -> FrameStep {
        log::error!("{fault}; stopping playback");
        self.state.playing = false;
        if let Some(session) = self.session.as_mut() {
            session.fault = Some(fault);
        }
        FrameStep::Faulted
    }

    /// Seek so the next published frame is the first at or after `seconds`.
    pub fn seek_to_time(&mut self, seconds: f64) -> Result<(), SeekError> {
        let session = self.session.as_mut().ok_or(SeekError::NoActiveStream)?;
        let seconds = seconds.max(0.0);
        let target = session.stream.secs_to_ticks(seconds);
        let mode = match session.last_dts {
            Some(dts) if target < dts => SeekMode::Backward,
            _ => SeekMode::Forward,
        };
        let result = session.seek(seconds, target, mode);
        self.after_seek(result)
    }

    /// Seek to frame `index` (`index * frame_duration` seconds), landing on
    /// the nearest keyframe and decoding forward from there.
    pub fn seek_to_frame(&mut self, index: u64) -> Result<(), SeekError> {
        let session = self.session.as_mut().ok_or(SeekError::NoActiveStream)?;
        let seconds = index as f64 * session.stream.frame_duration;
        let target = session.stream.secs_to_ticks(seconds);
        let result = session.seek(seconds, target, SeekMode::Nearest);
        self.after_seek(result)
    }

    fn after_seek(&mut self, result: Result<(), SeekError>) -> Result<(), SeekError> {
        if let Err(e) = &result {
            log::warn!("[seek] {e}");
            if self.last_fault().is_some() {
                self.state.playing = false;
            }
        }
        result
    }
}

impl<B: MediaBackend, L: FileLocator> Tickable for VideoPlayer<B, L> {
    fn update(&mut self, now: f64) {
        if !self.state.playing {
            return;
        }
        if now - self.state.last_frame_time > self.state.frame_duration {
            self.state.last_frame_time = now;
            self.load_next_frame();
        }
    }
}
