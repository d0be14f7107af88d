//! libav* media stack via `ffmpeg-next` (feature-gated behind `ffmpeg`).
//!
//! - `format::input` opens and probes the container; dropping it closes it
//! - packets are read one at a time and released when the wrapper drops
//! - `decoder::Video` send/receive, with an explicit end-of-input drain
//! - `software::scaling` converts to RGBA (fast bilinear, no resize)
//! - stream-level seeks go straight to `av_seek_frame` / `avformat_seek_file`

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;

use super::MediaBackend;
use super::container::ContainerReader;
use super::convert::PixelConverter;
use super::decoder::{CodedPacket, DecodeOutcome, DecodedFrame, VideoDecoder};
use super::stream::VideoStream;
use super::types::{ConvertedFrame, MediaType, Rational, SeekMode, StreamDescriptor};
use crate::error::{DecodeFault, OpenError};

/// `AV_TIME_BASE` as a float (container durations are in microseconds).
const AV_TIME_BASE_F64: f64 = 1_000_000.0;

/// Register formats and codecs. Runs once per process.
pub fn init() -> Result<(), String> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| format!("ffmpeg init failed: {e}"))?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Warning);
        log::debug!("ffmpeg initialized");
        Ok(())
    })
    .clone()
}

/// Production backend.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    /// Frame-threading worker count; 0 keeps libavcodec's default.
    pub decoder_threads: usize,
}

impl FfmpegBackend {
    pub fn new(decoder_threads: usize) -> Self {
        Self { decoder_threads }
    }
}

pub struct FfmpegPacket(ffmpeg::Packet);

impl CodedPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.0.stream()
    }
}

pub struct FfmpegFrame(ffmpeg::frame::Video);

impl DecodedFrame for FfmpegFrame {
    fn best_effort_timestamp(&self) -> Option<i64> {
        self.0.timestamp()
    }

    fn decode_timestamp(&self) -> Option<i64> {
        let dts = self.0.packet().dts;
        (dts != ffmpeg::ffi::AV_NOPTS_VALUE).then_some(dts)
    }
}

pub struct FfmpegContainer {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    format_name: String,
    streams: Vec<StreamDescriptor>,
    duration_secs: Option<f64>,
}

fn rational(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

fn describe(stream: &ffmpeg::format::stream::Stream<'_>) -> StreamDescriptor {
    let params = stream.parameters();
    let media_type = match params.medium() {
        ffmpeg::media::Type::Video => MediaType::Video,
        ffmpeg::media::Type::Audio => MediaType::Audio,
        ffmpeg::media::Type::Subtitle => MediaType::Subtitle,
        _ => MediaType::Other,
    };
    let codec = params.id().name().to_string();

    let (width, height, pixel_format) = if media_type == MediaType::Video {
        match ffmpeg::codec::context::Context::from_parameters(params) {
            Ok(ctx) => {
                // SAFETY: `ctx` owns a valid AVCodecContext until it drops at
                // the end of this arm; only plain fields are read.
                let raw = unsafe { &*ctx.as_ptr() };
                let format = Pixel::from(raw.pix_fmt);
                (
                    u32::try_from(raw.width).unwrap_or(0),
                    u32::try_from(raw.height).unwrap_or(0),
                    format.descriptor().map(|d| d.name().to_string()),
                )
            }
            Err(e) => {
                log::warn!("stream {}: unreadable codec parameters: {e}", stream.index());
                (0, 0, None)
            }
        }
    } else {
        (0, 0, None)
    };

    let duration = stream.duration();
    StreamDescriptor {
        index: stream.index(),
        media_type,
        codec,
        width,
        height,
        pixel_format,
        time_base: rational(stream.time_base()),
        duration_ticks: (duration > 0).then_some(duration),
        frame_rate: rational(stream.rate()),
        avg_frame_rate: rational(stream.avg_frame_rate()),
    }
}

impl ContainerReader for FfmpegContainer {
    type Packet = FfmpegPacket;

    fn format_name(&self) -> &str {
        &self.format_name
    }

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    fn read_packet(&mut self) -> Option<FfmpegPacket> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Some(FfmpegPacket(packet)),
            Err(ffmpeg::Error::Eof) => None,
            Err(e) => {
                log::warn!(
                    "Read error in {}: {e}; treating as end of stream",
                    self.path.display()
                );
                None
            }
        }
    }

    fn seek(&mut self, stream_index: usize, target: i64, mode: SeekMode) -> Result<(), String> {
        let stream = i32::try_from(stream_index)
            .map_err(|_| format!("stream index {stream_index} out of range"))?;
        // SAFETY: `input` owns a valid AVFormatContext for as long as `self`
        // lives, and no other pointer into it is held across this call.
        let ret = unsafe {
            let ctx = self.input.as_mut_ptr();
            match mode {
                SeekMode::Backward => ffmpeg::ffi::av_seek_frame(
                    ctx,
                    stream,
                    target,
                    ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
                ),
                SeekMode::Forward => {
                    ffmpeg::ffi::avformat_seek_file(ctx, stream, i64::MIN, target, target, 0)
                }
                SeekMode::Nearest => {
                    ffmpeg::ffi::avformat_seek_file(ctx, stream, i64::MIN, target, i64::MAX, 0)
                }
            }
        };
        if ret < 0 {
            Err(ffmpeg::Error::from(ret).to_string())
        } else {
            Ok(())
        }
    }
}

pub struct FfmpegDecoder {
    codec: String,
    decoder: ffmpeg::decoder::Video,
    frame: FfmpegFrame,
    eof_sent: bool,
}

/// Errors that only mean "no frame right now".
fn is_transient(e: &ffmpeg::Error) -> bool {
    match e {
        ffmpeg::Error::Eof | ffmpeg::Error::InvalidData => true,
        ffmpeg::Error::Other { errno } => *errno == ffmpeg::util::error::EAGAIN,
        _ => false,
    }
}

impl FfmpegDecoder {
    fn fault(&self, e: &ffmpeg::Error) -> DecodeFault {
        DecodeFault(format!("{}: {e}", self.codec))
    }
}

impl VideoDecoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;

    fn decode(&mut self, packet: &FfmpegPacket) -> Result<DecodeOutcome<'_, FfmpegFrame>, DecodeFault> {
        match self.decoder.send_packet(&packet.0) {
            Ok(()) => {}
            Err(ffmpeg::Error::InvalidData) => {
                log::debug!("{}: skipping corrupt packet", self.codec);
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => return Err(self.fault(&e)),
        }
        self.receive()
    }

    fn receive(&mut self) -> Result<DecodeOutcome<'_, FfmpegFrame>, DecodeFault> {
        match self.decoder.receive_frame(&mut self.frame.0) {
            Ok(()) => Ok(DecodeOutcome::FrameReady(&self.frame)),
            Err(e) if is_transient(&e) => Ok(DecodeOutcome::NeedsMorePackets),
            Err(e) => Err(self.fault(&e)),
        }
    }

    fn drain(&mut self) -> Result<DecodeOutcome<'_, FfmpegFrame>, DecodeFault> {
        if !self.eof_sent {
            self.eof_sent = true;
            if let Err(e) = self.decoder.send_eof() {
                if !is_transient(&e) {
                    return Err(self.fault(&e));
                }
            }
        }
        self.receive()
    }

    fn flush(&mut self) {
        self.decoder.flush();
        self.eof_sent = false;
    }
}

/// sws context keyed by the source format and size it was built for.
pub struct FfmpegConverter {
    scaler: Option<(scaling::Context, (Pixel, u32, u32))>,
    rgba: ffmpeg::frame::Video,
}

fn build_scaler(
    format: Pixel,
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
) -> Result<scaling::Context, ffmpeg::Error> {
    scaling::Context::get(
        format,
        width,
        height,
        Pixel::RGBA,
        out_width,
        out_height,
        scaling::Flags::FAST_BILINEAR,
    )
}

impl PixelConverter for FfmpegConverter {
    type Frame = FfmpegFrame;

    fn convert(&mut self, frame: &FfmpegFrame, into: &mut ConvertedFrame) {
        let src = &frame.0;
        let key = (src.format(), src.width(), src.height());
        if self.scaler.as_ref().is_none_or(|(_, built_for)| *built_for != key) {
            // Source format or size changed; output stays at the stream size.
            match build_scaler(key.0, key.1, key.2, into.width, into.height) {
                Ok(ctx) => self.scaler = Some((ctx, key)),
                Err(e) => {
                    log::error!("Cannot convert {:?} {}x{} to RGBA: {e}", key.0, key.1, key.2);
                    return;
                }
            }
        }
        let Some((scaler, _)) = self.scaler.as_mut() else {
            return;
        };
        if let Err(e) = scaler.run(src, &mut self.rgba) {
            log::error!("RGBA conversion failed: {e}");
            return;
        }

        let stride = self.rgba.stride(0);
        let data = self.rgba.data(0);
        let pitch = into.pitch();
        for (y, out) in into.data.chunks_exact_mut(pitch).enumerate() {
            let start = y * stride;
            out.copy_from_slice(&data[start..start + pitch]);
        }
    }
}

impl MediaBackend for FfmpegBackend {
    type Container = FfmpegContainer;
    type Decoder = FfmpegDecoder;
    type Converter = FfmpegConverter;

    fn open_container(&self, path: &Path) -> Result<FfmpegContainer, OpenError> {
        let format_error = |reason: String| OpenError::FormatError {
            path: path.to_path_buf(),
            reason,
        };
        init().map_err(format_error)?;

        // format::input opens the file and reads stream info in one go
        let input = ffmpeg::format::input(&path).map_err(|e| format_error(e.to_string()))?;
        if log::log_enabled!(log::Level::Debug) {
            ffmpeg::format::context::input::dump(&input, 0, path.to_str());
        }

        let streams: Vec<StreamDescriptor> = input.streams().map(|s| describe(&s)).collect();
        let duration = input.duration();
        let duration_secs = (duration > 0).then(|| duration as f64 / AV_TIME_BASE_F64);
        let format_name = input.format().name().to_string();
        log::debug!(
            "{}: {format_name}, {} stream(s)",
            path.display(),
            streams.len()
        );

        Ok(FfmpegContainer {
            path: path.to_path_buf(),
            input,
            format_name,
            streams,
            duration_secs,
        })
    }

    fn open_decoder(
        &self,
        container: &FfmpegContainer,
        stream: &VideoStream,
    ) -> Result<FfmpegDecoder, OpenError> {
        let codec_name = stream.descriptor.codec.clone();
        let open_failed = |e: ffmpeg::Error| OpenError::CodecOpenFailed {
            codec: codec_name.clone(),
            reason: e.to_string(),
        };

        let input_stream = container
            .input
            .stream(stream.index())
            .ok_or_else(|| OpenError::FormatError {
                path: container.path.clone(),
                reason: format!("stream {} vanished", stream.index()),
            })?;
        let codec = ffmpeg::decoder::find(input_stream.parameters().id()).ok_or_else(|| {
            OpenError::UnsupportedCodec {
                path: container.path.clone(),
                codec: codec_name.clone(),
            }
        })?;

        let mut ctx = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(open_failed)?;
        if self.decoder_threads > 0 {
            ctx.set_threading(ffmpeg::threading::Config {
                kind: ffmpeg::threading::Type::Frame,
                count: self.decoder_threads,
                ..Default::default()
            });
        }
        let decoder = ctx
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(open_failed)?;
        log::debug!("Opened {codec_name} decoder for stream {}", stream.index());

        Ok(FfmpegDecoder {
            codec: codec_name,
            decoder,
            frame: FfmpegFrame(ffmpeg::frame::Video::empty()),
            eof_sent: false,
        })
    }

    fn open_converter(&self, stream: &VideoStream) -> Result<FfmpegConverter, OpenError> {
        let name = stream.descriptor.pixel_format.clone().unwrap_or_default();
        let mut converter = FfmpegConverter {
            scaler: None,
            rgba: ffmpeg::frame::Video::empty(),
        };
        // Known formats are checked at open time.
        if let Ok(format) = name.parse::<Pixel>() {
            let (w, h) = (stream.width(), stream.height());
            let ctx = build_scaler(format, w, h, w, h).map_err(|e| OpenError::ConverterFailed {
                pixel_format: name.clone(),
                reason: e.to_string(),
            })?;
            converter.scaler = Some((ctx, (format, w, h)));
        }
        Ok(converter)
    }
}
