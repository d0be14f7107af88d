//! Deterministic in-memory media stack for unit tests.
//!
//! Clips are generated from a [`ClipSpec`]: one video packet per
//! `pack_frames` frames (optionally followed by an audio packet), keyframes
//! every `gop` frames, and a decoder that holds back `reorder_delay` frames
//! before emitting.
//! Converted frames carry the frame number in the first two bytes of every
//! pixel and the source row in the third, so tests can read back exactly
//! which frame was published and in which orientation.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{DecodeFault, OpenError};
use crate::locate::FileLocator;
use crate::media::MediaBackend;
use crate::media::container::ContainerReader;
use crate::media::convert::PixelConverter;
use crate::media::decoder::{CodedPacket, DecodeOutcome, DecodedFrame, VideoDecoder};
use crate::media::stream::VideoStream;
use crate::media::types::{ConvertedFrame, MediaType, Rational, SeekMode, StreamDescriptor};

#[derive(Debug, Clone)]
pub struct ClipSpec {
    pub frames: u32,
    pub frame_rate: Rational,
    pub time_base: Rational,
    pub gop: u32,
    pub width: u32,
    pub height: u32,
    /// Interleave an audio stream (index 0) with the video.
    pub audio: bool,
    /// Add a second, earlier video stream that must not be selected.
    pub decoy_video: bool,
    pub reorder_delay: usize,
    /// Frame number whose decode reports a fault.
    pub fault_at_frame: Option<u32>,
    /// Frames carried by each video packet.
    pub pack_frames: u32,
    /// Seeks past the last frame clamp to it instead of failing.
    pub clamp_seeks: bool,
}

impl ClipSpec {
    /// 10 s at 30 fps, 1/15360 time base, keyframe every second.
    pub fn ten_seconds() -> Self {
        Self {
            frames: 300,
            frame_rate: Rational::new(30, 1),
            time_base: Rational::new(1, 15360),
            gop: 30,
            width: 8,
            height: 4,
            audio: true,
            decoy_video: false,
            reorder_delay: 2,
            fault_at_frame: None,
            pack_frames: 1,
            clamp_seeks: false,
        }
    }

    pub fn seconds(secs: u32) -> Self {
        Self {
            frames: secs * 30,
            ..Self::ten_seconds()
        }
    }

    pub fn ticks_per_frame(&self) -> i64 {
        let tb = self.time_base;
        let fr = self.frame_rate;
        i64::from(tb.den) * i64::from(fr.den) / (i64::from(tb.num) * i64::from(fr.num))
    }

    fn video_index(&self) -> usize {
        usize::from(self.audio) + usize::from(self.decoy_video)
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        let mut streams = Vec::new();
        if self.audio {
            streams.push(StreamDescriptor {
                index: streams.len(),
                media_type: MediaType::Audio,
                codec: "pcm_s16le".into(),
                width: 0,
                height: 0,
                pixel_format: None,
                time_base: Rational::new(1, 48000),
                duration_ticks: None,
                frame_rate: Rational::new(0, 1),
                avg_frame_rate: Rational::new(0, 1),
            });
        }
        let video = |index: usize, width: u32, height: u32| StreamDescriptor {
            index,
            media_type: MediaType::Video,
            codec: "synthetic".into(),
            width,
            height,
            pixel_format: Some("rgba".into()),
            time_base: self.time_base,
            duration_ticks: Some(i64::from(self.frames) * self.ticks_per_frame()),
            frame_rate: self.frame_rate,
            avg_frame_rate: self.frame_rate,
        };
        if self.decoy_video {
            streams.push(video(streams.len(), 2, 2));
        }
        streams.push(video(streams.len(), self.width, self.height));
        streams
    }

    fn packets(&self) -> Vec<SynthPacket> {
        let tpf = self.ticks_per_frame();
        let pack = self.pack_frames.max(1);
        let mut packets = Vec::new();
        for n in (0..self.frames).step_by(pack as usize) {
            let count = pack.min(self.frames - n);
            let ts = i64::from(n) * tpf;
            packets.push(SynthPacket {
                stream: self.video_index(),
                pts: ts,
                key: (n..n + count).any(|f| f % self.gop == 0),
                frame_no: n,
                count,
                ticks_per_frame: tpf,
            });
            if self.audio {
                packets.push(SynthPacket {
                    stream: 0,
                    pts: ts,
                    key: true,
                    frame_no: n,
                    count: 1,
                    ticks_per_frame: tpf,
                });
            }
        }
        packets
    }
}

/// Counters shared between a test and the backend it handed to a player.
#[derive(Debug, Default)]
pub struct BackendLog {
    pub containers_opened: usize,
    pub packets_read: usize,
    pub packets_decoded: usize,
    pub frames_converted: usize,
    pub flushes: usize,
    pub seeks: Vec<(i64, SeekMode)>,
    pub decoded_streams: HashSet<usize>,
}

#[derive(Debug, Clone)]
pub struct SynthPacket {
    stream: usize,
    pts: i64,
    key: bool,
    /// First frame carried.
    frame_no: u32,
    count: u32,
    ticks_per_frame: i64,
}

impl CodedPacket for SynthPacket {
    fn stream_index(&self) -> usize {
        self.stream
    }
}

#[derive(Debug, Clone, Default)]
pub struct SynthFrame {
    pub frame_no: u32,
    pts: i64,
}

impl DecodedFrame for SynthFrame {
    fn best_effort_timestamp(&self) -> Option<i64> {
        Some(self.pts)
    }

    fn decode_timestamp(&self) -> Option<i64> {
        Some(self.pts)
    }
}

pub struct SynthContainer {
    path: PathBuf,
    streams: Vec<StreamDescriptor>,
    packets: Vec<SynthPacket>,
    cursor: usize,
    video_index: usize,
    clamp_seeks: bool,
    log: Rc<RefCell<BackendLog>>,
}

impl ContainerReader for SynthContainer {
    type Packet = SynthPacket;

    fn format_name(&self) -> &str {
        "synthetic"
    }

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn duration_secs(&self) -> Option<f64> {
        None
    }

    fn read_packet(&mut self) -> Option<SynthPacket> {
        let packet = self.packets.get(self.cursor)?.clone();
        self.cursor += 1;
        self.log.borrow_mut().packets_read += 1;
        Some(packet)
    }

    fn seek(&mut self, stream_index: usize, target: i64, mode: SeekMode) -> Result<(), String> {
        self.log.borrow_mut().seeks.push((target, mode));
        if stream_index != self.video_index {
            return Err(format!("stream {stream_index} is not seekable"));
        }
        let keyframes = self
            .packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stream == self.video_index && p.key);
        let last_pts = self
            .packets
            .iter()
            .filter(|p| p.stream == self.video_index)
            .map(|p| p.pts)
            .max()
            .unwrap_or(0);
        let target = if self.clamp_seeks {
            target.clamp(0, last_pts)
        } else {
            target
        };
        if target < 0 || target > last_pts {
            return Err(format!("target {target} outside 0..={last_pts}"));
        }
        let found = match mode {
            SeekMode::Backward | SeekMode::Forward => {
                keyframes.filter(|(_, p)| p.pts <= target).last()
            }
            SeekMode::Nearest => keyframes.min_by_key(|(_, p)| (p.pts - target).abs()),
        };
        let (position, _) = found.ok_or_else(|| "no keyframe".to_string())?;
        self.cursor = position;
        Ok(())
    }
}

pub struct SynthDecoder {
    queue: VecDeque<SynthFrame>,
    slot: SynthFrame,
    delay: usize,
    draining: bool,
    fault_at_frame: Option<u32>,
    log: Rc<RefCell<BackendLog>>,
}

impl SynthDecoder {
    fn emit(&mut self, min_queued: usize) -> DecodeOutcome<'_, SynthFrame> {
        if self.queue.len() > min_queued {
            if let Some(frame) = self.queue.pop_front() {
                self.slot = frame;
                return DecodeOutcome::FrameReady(&self.slot);
            }
        }
        DecodeOutcome::NeedsMorePackets
    }
}

impl VideoDecoder for SynthDecoder {
    type Packet = SynthPacket;
    type Frame = SynthFrame;

    fn decode(&mut self, packet: &SynthPacket) -> Result<DecodeOutcome<'_, SynthFrame>, DecodeFault> {
        {
            let mut log = self.log.borrow_mut();
            log.packets_decoded += 1;
            log.decoded_streams.insert(packet.stream);
        }
        if self.draining {
            return Ok(DecodeOutcome::NeedsMorePackets);
        }
        let frames = packet.frame_no..packet.frame_no + packet.count;
        if let Some(bad) = self.fault_at_frame.filter(|f| frames.contains(f)) {
            return Err(DecodeFault(format!("corrupt frame {bad}")));
        }
        for (i, frame_no) in frames.enumerate() {
            self.queue.push_back(SynthFrame {
                frame_no,
                pts: packet.pts + i as i64 * packet.ticks_per_frame,
            });
        }
        let delay = self.delay;
        Ok(self.emit(delay))
    }

    fn receive(&mut self) -> Result<DecodeOutcome<'_, SynthFrame>, DecodeFault> {
        let min = if self.draining { 0 } else { self.delay };
        Ok(self.emit(min))
    }

    fn drain(&mut self) -> Result<DecodeOutcome<'_, SynthFrame>, DecodeFault> {
        self.draining = true;
        Ok(self.emit(0))
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.draining = false;
        self.log.borrow_mut().flushes += 1;
    }
}

pub struct SynthConverter {
    log: Rc<RefCell<BackendLog>>,
}

impl PixelConverter for SynthConverter {
    type Frame = SynthFrame;

    fn convert(&mut self, frame: &SynthFrame, into: &mut ConvertedFrame) {
        let width = into.width as usize;
        let [lo, hi, ..] = frame.frame_no.to_le_bytes();
        for (i, px) in into.data.chunks_exact_mut(4).enumerate() {
            let y = (i / width) as u8;
            px.copy_from_slice(&[lo, hi, y, 255]);
        }
        self.log.borrow_mut().frames_converted += 1;
    }
}

#[derive(Clone, Default)]
pub struct SyntheticBackend {
    clips: HashMap<PathBuf, ClipSpec>,
    pub log: Rc<RefCell<BackendLog>>,
}

impl SyntheticBackend {
    pub fn with_clip(mut self, name: &str, clip: ClipSpec) -> Self {
        self.clips.insert(PathBuf::from(name), clip);
        self
    }
}

impl MediaBackend for SyntheticBackend {
    type Container = SynthContainer;
    type Decoder = SynthDecoder;
    type Converter = SynthConverter;

    fn open_container(&self, path: &Path) -> Result<SynthContainer, OpenError> {
        let clip = self.clips.get(path).ok_or_else(|| OpenError::FormatError {
            path: path.to_path_buf(),
            reason: "not a synthetic clip".into(),
        })?;
        self.log.borrow_mut().containers_opened += 1;
        Ok(SynthContainer {
            path: path.to_path_buf(),
            streams: clip.streams(),
            packets: clip.packets(),
            cursor: 0,
            video_index: clip.video_index(),
            clamp_seeks: clip.clamp_seeks,
            log: Rc::clone(&self.log),
        })
    }

    fn open_decoder(
        &self,
        container: &SynthContainer,
        _stream: &VideoStream,
    ) -> Result<SynthDecoder, OpenError> {
        let clip = &self.clips[&container.path];
        Ok(SynthDecoder {
            queue: VecDeque::new(),
            slot: SynthFrame::default(),
            delay: clip.reorder_delay,
            draining: false,
            fault_at_frame: clip.fault_at_frame,
            log: Rc::clone(&self.log),
        })
    }

    fn open_converter(&self, _stream: &VideoStream) -> Result<SynthConverter, OpenError> {
        Ok(SynthConverter {
            log: Rc::clone(&self.log),
        })
    }
}

/// Locator that knows a fixed set of names.
pub struct KnownFiles(pub Vec<&'static str>);

impl FileLocator for KnownFiles {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.0.iter().find(|n| **n == name).map(PathBuf::from)
    }
}

/// Frame number carried in a published sink row.
pub fn frame_number(row: &[u8]) -> u32 {
    u32::from(u16::from_le_bytes([row[0], row[1]]))
}
