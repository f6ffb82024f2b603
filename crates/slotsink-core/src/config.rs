//! Sink configuration and slot geometry.
//!
//! A [`SinkConfig`] holds what the user asked for; [`SinkConfig::geometry`]
//! turns it into a [`SlotGeometry`] or refuses. Nothing touches hardware until
//! a geometry exists, so every configuration error is reported before any
//! device object is created.

use std::time::Duration;

use tracing::{debug, error};

use crate::{Error, ModArgs, Result, SampleFormat, SampleSpec};

/// Default rendering quantum.
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_millis(10);

/// Longest slot the ring will allocate for.
pub const MAX_SLOT_DURATION: Duration = Duration::from_secs(1);

/// Slot count used when no buffer size is given.
pub const DEFAULT_SLOT_COUNT: usize = 11;

/// Fewest slots a queue may have: one in flight plus one being filled.
pub const MIN_SLOT_COUNT: usize = 2;

/// Most slots the device buffer queue can hold.
pub const MAX_SLOT_COUNT: usize = 64;

/// Keys accepted in a module-argument string.
pub const VALID_ARGS: &[&str] = &[
    "format",
    "rate",
    "channels",
    "buffer",
    "slot_usec",
    "latency_usec",
];

/// User-facing sink configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Output sample specification.
    pub spec: SampleSpec,
    /// Playback time of one slot.
    pub slot_duration: Duration,
    /// Total buffering window in bytes; must be a whole number of slots.
    pub buffer_bytes: Option<usize>,
    /// Latency used while the engine has not requested one.
    pub max_latency: Option<Duration>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            spec: SampleSpec::default(),
            slot_duration: DEFAULT_SLOT_DURATION,
            buffer_bytes: None,
            max_latency: None,
        }
    }
}

impl SinkConfig {
    /// Build a configuration from a module-argument string.
    pub fn from_modargs(input: &str) -> Result<Self> {
        let args = ModArgs::parse(input, VALID_ARGS)?;
        let mut config = Self::default();

        if let Some(format) = args.get("format") {
            config.spec.format = format.parse::<SampleFormat>()?;
        }
        if let Some(rate) = args.get_parsed::<u32>("rate")? {
            config.spec.rate = rate;
        }
        if let Some(channels) = args.get_parsed::<u8>("channels")? {
            config.spec.channels = channels;
        }
        if let Some(usec) = args.get_parsed::<u64>("slot_usec")? {
            config.slot_duration = Duration::from_micros(usec);
        }
        config.buffer_bytes = args.get_parsed::<usize>("buffer")?;
        config.max_latency = args
            .get_parsed::<u64>("latency_usec")?
            .map(Duration::from_micros);

        Ok(config)
    }

    /// Validate and derive the slot layout.
    pub fn geometry(&self) -> Result<SlotGeometry> {
        let spec = self.spec;
        spec.validate_for_output()?;

        let slot_usec = self.slot_duration.as_micros();
        if slot_usec == 0 {
            return Err(Error::InvalidConfig("slot duration must be positive".into()));
        }
        if self.slot_duration > MAX_SLOT_DURATION {
            return Err(Error::InvalidConfig(format!(
                "slot duration {slot_usec}us exceeds {}us",
                MAX_SLOT_DURATION.as_micros()
            )));
        }

        let frame_micros = u128::from(spec.rate) * slot_usec;
        if frame_micros % 1_000_000 != 0 {
            error!(
                "Slot duration {}us is not a whole number of frames at {} Hz",
                slot_usec, spec.rate
            );
            return Err(Error::InvalidConfig(format!(
                "slot duration {slot_usec}us is not a whole number of frames at {} Hz",
                spec.rate
            )));
        }
        let slot_size = usize::try_from(frame_micros / 1_000_000)
            .ok()
            .and_then(|frames| frames.checked_mul(spec.frame_size()))
            .ok_or_else(|| Error::InvalidConfig("slot size overflows".into()))?;

        let buffer_bytes = match self.buffer_bytes {
            Some(bytes) => bytes,
            None => slot_size
                .checked_mul(DEFAULT_SLOT_COUNT)
                .ok_or_else(|| Error::InvalidConfig("buffer size overflows".into()))?,
        };
        if buffer_bytes % slot_size != 0 {
            error!(
                "Buffer of {} bytes is not a multiple of the {}-byte slot",
                buffer_bytes, slot_size
            );
            return Err(Error::InvalidConfig(format!(
                "buffer of {buffer_bytes} bytes is not a multiple of the {slot_size}-byte slot"
            )));
        }

        let slot_count = buffer_bytes / slot_size;
        if !(MIN_SLOT_COUNT..=MAX_SLOT_COUNT).contains(&slot_count) {
            return Err(Error::InvalidConfig(format!(
                "buffer holds {slot_count} slots, device supports {MIN_SLOT_COUNT}..={MAX_SLOT_COUNT}"
            )));
        }

        let max_latency = self
            .max_latency
            .unwrap_or(self.slot_duration * (slot_count as u32 - 1));

        let geometry = SlotGeometry {
            spec,
            slot_size,
            slot_count,
            slot_duration: self.slot_duration,
            max_latency,
        };
        debug!(
            "Slot geometry: {} | {} slots of {} bytes ({:?})",
            spec, slot_count, slot_size, self.slot_duration
        );
        Ok(geometry)
    }
}

/// Validated slot layout shared by the ring, the tracker, and the latency
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGeometry {
    spec: SampleSpec,
    slot_size: usize,
    slot_count: usize,
    slot_duration: Duration,
    max_latency: Duration,
}

impl SlotGeometry {
    pub const fn spec(&self) -> &SampleSpec {
        &self.spec
    }

    /// Bytes in one slot, always a whole number of frames.
    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Hardware queue capacity N.
    pub const fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub const fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    /// Latency used when the engine leaves it unspecified.
    pub const fn max_latency(&self) -> Duration {
        self.max_latency
    }

    /// Largest number of slots the sink keeps in flight (N - 1).
    pub const fn max_buffer_count(&self) -> usize {
        self.slot_count - 1
    }

    /// Size of the whole slot ring in bytes.
    pub const fn buffer_bytes(&self) -> usize {
        self.slot_size * self.slot_count
    }

    /// Playback time of `slots` slots.
    pub fn slots_to_duration(&self, slots: usize) -> Duration {
        self.slot_duration * slots as u32
    }
}
