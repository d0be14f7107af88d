//! Video stream selection and the timing values derived from it.
//!
//! Everything here is computed once at open time and reused for the lifetime
//! of the stream; playback never re-queries the container.

use thiserror::Error;

use super::types::{Rational, StreamDescriptor};

/// Frame rate assumed when the container reports neither a nominal nor an
/// average rate.
pub const FALLBACK_FRAME_RATE: Rational = Rational::new(30, 1);

/// Snap tolerance (in ticks) when converting seconds to ticks.
const TICK_EPSILON: f64 = 1e-6;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no video stream")]
pub struct NoVideoStream;

/// The selected video stream with cached timing.
#[derive(Debug, Clone)]
pub struct VideoStream {
    pub descriptor: StreamDescriptor,
    /// Seconds per tick.
    pub time_base_secs: f64,
    pub duration_secs: f64,
    /// Rate the pacing gate runs at.
    pub frame_rate: Rational,
    /// Seconds per nominal frame.
    pub frame_duration: f64,
}

impl VideoStream {
    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn time_base(&self) -> Rational {
        self.descriptor.time_base
    }

    /// Stream ticks → seconds. Multiplies before dividing so whole-second
    /// positions on common time bases come out exact.
    pub fn ticks_to_secs(&self, ticks: i64) -> f64 {
        let tb = self.time_base();
        ticks as f64 * f64::from(tb.num) / f64::from(tb.den)
    }

    /// Seconds → stream ticks, rounding up so the tick never precedes `secs`.
    pub fn secs_to_ticks(&self, secs: f64) -> i64 {
        let tb = self.time_base();
        let exact = secs * f64::from(tb.den) / f64::from(tb.num);
        let nearest = exact.round();
        if (exact - nearest).abs() < TICK_EPSILON {
            nearest as i64
        } else {
            exact.ceil() as i64
        }
    }
}

/// Pick the video stream. When several exist the *last* one wins.
///
/// `container_duration_secs` is used when the stream itself does not know
/// its duration.
pub fn select_video_stream(
    descriptors: &[StreamDescriptor],
    container_duration_secs: Option<f64>,
) -> Result<VideoStream, NoVideoStream> {
    let descriptor = descriptors
        .iter()
        .rev()
        .find(|d| d.is_video())
        .ok_or(NoVideoStream)?
        .clone();

    let frame_rate = if descriptor.frame_rate.is_valid() {
        descriptor.frame_rate
    } else if descriptor.avg_frame_rate.is_valid() {
        log::debug!(
            "stream {} has no nominal frame rate, using average {}",
            descriptor.index,
            descriptor.avg_frame_rate
        );
        descriptor.avg_frame_rate
    } else {
        log::warn!(
            "stream {} reports no frame rate, assuming {}",
            descriptor.index,
            FALLBACK_FRAME_RATE
        );
        FALLBACK_FRAME_RATE
    };

    let tb = descriptor.time_base;
    let time_base_secs = tb.as_f64();
    let duration_secs = match descriptor.duration_ticks {
        Some(ticks) if ticks > 0 && tb.is_valid() => {
            ticks as f64 * f64::from(tb.num) / f64::from(tb.den)
        }
        _ => container_duration_secs.unwrap_or(0.0).max(0.0),
    };

    Ok(VideoStream {
        frame_duration: frame_rate.inverse_f64(),
        descriptor,
        time_base_secs,
        duration_secs,
        frame_rate,
    })
}
