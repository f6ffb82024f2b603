//! Error types for slotsink.

use thiserror::Error;

/// Result type alias using slotsink's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for calls into the hardware buffer-queue API.
pub type HwResult<T> = std::result::Result<T, HwError>;

/// Main error type for slotsink.
#[derive(Error, Debug)]
pub enum Error {
    // Hardware errors
    #[error("{operation} failed with hardware error {code}")]
    Hardware { operation: &'static str, code: u32 },

    // Configuration errors
    #[error("Invalid module argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    // Render thread errors
    #[error("Render thread error: {0}")]
    Thread(String),

    #[error("Render thread is not running")]
    Disconnected,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a hardware result code with the name of the failing operation.
    pub const fn hardware(operation: &'static str, err: HwError) -> Self {
        Self::Hardware {
            operation,
            code: err.code(),
        }
    }

    /// Returns the numeric hardware code, if this is a hardware error.
    pub const fn hardware_code(&self) -> Option<u32> {
        match self {
            Self::Hardware { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the pipeline cannot continue after this error.
    ///
    /// A full buffer queue is the one hardware result that is not: the slot
    /// is retried once the device has drained.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Hardware { code, .. } => !HwError::from_code(*code).is_resource_exhausted(),
            Self::Thread(_) | Self::Disconnected => true,
            _ => false,
        }
    }
}

/// Result codes reported by the hardware buffer-queue API.
///
/// Numbering follows the OpenSL ES `SLresult` table so codes logged by a
/// device backend can be looked up directly.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwError {
    /// The queue has no free slot right now.
    #[error("buffer queue has no free slot")]
    BufferInsufficient,

    /// Any other failure reported by the device.
    #[error("hardware error code {0}")]
    Code(u32),
}

impl HwError {
    pub const PRECONDITIONS_VIOLATED: u32 = 1;
    pub const PARAMETER_INVALID: u32 = 2;
    pub const MEMORY_FAILURE: u32 = 3;
    pub const RESOURCE_ERROR: u32 = 4;
    pub const RESOURCE_LOST: u32 = 5;
    pub const IO_ERROR: u32 = 6;
    pub const BUFFER_INSUFFICIENT: u32 = 7;
    pub const CONTENT_UNSUPPORTED: u32 = 9;
    pub const FEATURE_UNSUPPORTED: u32 = 12;
    pub const INTERNAL_ERROR: u32 = 13;

    /// Build an error from a raw device code.
    pub const fn from_code(code: u32) -> Self {
        if code == Self::BUFFER_INSUFFICIENT {
            Self::BufferInsufficient
        } else {
            Self::Code(code)
        }
    }

    /// The numeric code as reported by the device.
    pub const fn code(self) -> u32 {
        match self {
            Self::BufferInsufficient => Self::BUFFER_INSUFFICIENT,
            Self::Code(code) => code,
        }
    }

    /// Returns true if the device is only temporarily out of room.
    pub const fn is_resource_exhausted(self) -> bool {
        matches!(self, Self::BufferInsufficient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hw_error_codes() {
        assert_eq!(HwError::from_code(7), HwError::BufferInsufficient);
        assert_eq!(HwError::BufferInsufficient.code(), 7);
        assert_eq!(HwError::from_code(13), HwError::Code(13));
        assert!(HwError::BufferInsufficient.is_resource_exhausted());
        assert!(!HwError::Code(HwError::RESOURCE_LOST).is_resource_exhausted());
    }

    #[test]
    fn test_error_fatal() {
        let err = Error::hardware("enqueue", HwError::Code(13));
        assert!(err.is_fatal());
        assert_eq!(err.hardware_code(), Some(13));
        assert!(!Error::InvalidConfig("test".into()).is_fatal());
        assert!(!Error::hardware("enqueue", HwError::BufferInsufficient).is_fatal());
        assert!(Error::Disconnected.is_fatal());
        assert_eq!(Error::InvalidArgument("x".into()).hardware_code(), None);
    }

    #[test]
    fn test_error_display() {
        let err = Error::hardware("enqueue", HwError::Code(13));
        assert_eq!(err.to_string(), "enqueue failed with hardware error 13");
    }
}
