use std::fmt;

/// Rational number as stored by containers (time bases, frame rates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// True when both terms are positive.
    pub fn is_valid(self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            f64::from(self.num) / f64::from(self.den)
        }
    }

    /// Reciprocal as a float (`den / num`), 0 when `num` is 0.
    pub fn inverse_f64(self) -> f64 {
        if self.num == 0 {
            0.0
        } else {
            f64::from(self.den) / f64::from(self.num)
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Stream media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Other,
}

/// Per-stream attributes as reported by the container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub media_type: MediaType,
    /// Codec name as reported by the backend (e.g. "h264").
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Native pixel format name, `None` for non-video streams.
    pub pixel_format: Option<String>,
    /// Seconds per tick.
    pub time_base: Rational,
    /// Duration in stream ticks, `None` if the container does not know.
    pub duration_ticks: Option<i64>,
    /// Nominal (`r_frame_rate`-style) frame rate.
    pub frame_rate: Rational,
    /// Average frame rate, used when the nominal rate is missing.
    pub avg_frame_rate: Rational,
}

impl StreamDescriptor {
    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }
}

/// Container-level seek direction preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Land on the keyframe at or before the target, searching backwards.
    Backward,
    /// Land at or before the target without the backward search bias.
    Forward,
    /// Nearest keyframe in either direction.
    Nearest,
}

/// Packed RGBA8 frame at source resolution, rows top to bottom.
///
/// Allocated once per open and refilled in place on every cycle.
pub struct ConvertedFrame {
    pub data: Vec<u8>, // RGBA8
    pub width: u32,
    pub height: u32,
}

impl ConvertedFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; (width as usize) * (height as usize) * 4],
            width,
            height,
        }
    }

    /// Bytes per row.
    pub fn pitch(&self) -> usize {
        self.width as usize * 4
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let p = self.pitch();
        &self.data[y * p..(y + 1) * p]
    }
}
