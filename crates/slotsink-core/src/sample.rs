//! Sample format and sample specification types.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Lowest sample rate accepted for output.
pub const MIN_RATE: u32 = 8_000;

/// Highest sample rate accepted for output.
pub const MAX_RATE: u32 = 192_000;

/// Highest channel count accepted for output.
pub const MAX_CHANNELS: u8 = 2;

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 0x80.
    U8,
    /// Signed 16-bit little-endian.
    #[default]
    S16Le,
    /// Signed 16-bit big-endian.
    S16Be,
    /// Signed 32-bit little-endian.
    S32Le,
    /// 32-bit IEEE float little-endian.
    F32Le,
}

impl SampleFormat {
    /// Canonical name, as accepted by the `format=` module argument.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16Le => "s16le",
            Self::S16Be => "s16be",
            Self::S32Le => "s32le",
            Self::F32Le => "float32le",
        }
    }

    /// Size of one sample of one channel in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16Le | Self::S16Be => 2,
            Self::S32Le | Self::F32Le => 4,
        }
    }

    /// Byte pattern of one sample at the zero level.
    pub const fn silence(self) -> &'static [u8] {
        match self {
            Self::U8 => &[0x80],
            Self::S16Le | Self::S16Be => &[0, 0],
            Self::S32Le | Self::F32Le => &[0, 0, 0, 0],
        }
    }

    /// Whether the output path can hand this format to the device unchanged.
    ///
    /// The buffer queue only accepts 8-bit unsigned and 16-bit little-endian
    /// PCM, and the sink never converts.
    pub const fn is_output_supported(self) -> bool {
        matches!(self, Self::U8 | Self::S16Le)
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(Self::U8),
            "s16le" | "s16ne" | "s16" => Ok(Self::S16Le),
            "s16be" => Ok(Self::S16Be),
            "s32le" | "s32ne" => Ok(Self::S32Le),
            "float32le" | "float32ne" | "f32le" => Ok(Self::F32Le),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format, rate, and channel count of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u8,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            format: SampleFormat::S16Le,
            rate: 44_100,
            channels: 2,
        }
    }
}

impl SampleSpec {
    pub const fn new(format: SampleFormat, rate: u32, channels: u8) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    /// Bytes in one interleaved frame.
    pub const fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Overwrite `buf` with the zero-level pattern, starting on a sample boundary.
    pub fn fill_silence(&self, buf: &mut [u8]) {
        let pattern = self.format.silence();
        for sample in buf.chunks_mut(pattern.len()) {
            sample.copy_from_slice(&pattern[..sample.len()]);
        }
    }

    /// Check that the device can play this spec as-is.
    pub fn validate_for_output(&self) -> Result<()> {
        if !self.format.is_output_supported() {
            return Err(Error::UnsupportedFormat(format!(
                "{} (output supports u8 and s16le)",
                self.format
            )));
        }
        if !(MIN_RATE..=MAX_RATE).contains(&self.rate) {
            return Err(Error::InvalidConfig(format!(
                "sample rate {} Hz outside {MIN_RATE}..={MAX_RATE}",
                self.rate
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "{} channels requested, output supports 1 or 2",
                self.channels
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ch {}Hz", self.format, self.channels, self.rate)
    }
}
