//! Error types for the interchange layer
//!
//! Inside Rust every fallible operation returns [`AbiResult`]. At the extern
//! boundary errors collapse into a null reference or a status code, and the
//! detail goes to the log.

use crate::envelope::EnvelopeState;
use thiserror::Error;

/// Errors raised while producing, reading or releasing interchange data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// A producer call returned null where a reference was expected
    #[error("`{call}` returned a null reference")]
    NullReference { call: &'static str },

    /// An entry point received a null pointer where a record was required
    #[error("`{call}` received a null argument")]
    NullArgument { call: &'static str },

    /// The allocator refused a request
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },

    /// Text was read as UTF-8 but is not
    #[error("text is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    /// An envelope chain is deeper than the traversal limit
    #[error("envelope nesting exceeds depth limit {limit}")]
    DepthExceeded { limit: usize },

    /// A status probe returned a code outside the documented set
    #[error("unknown status code {0}")]
    UnknownStatus(i8),

    /// An envelope lifecycle move that goes backwards or leaves `Freed`
    #[error("invalid envelope transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: EnvelopeState,
        to: EnvelopeState,
    },

    /// A buffer whose header breaks `len <= cap` or `ptr null <=> cap == 0`
    #[error("invalid buffer header (len={len}, cap={cap}, null={null})")]
    InvalidBuffer { len: usize, cap: usize, null: bool },

    /// A producer body panicked and was stopped at the boundary
    #[error("`{call}` panicked inside the producer")]
    ProducerPanicked { call: &'static str },

    /// Configuration could not be loaded or is out of range
    #[error("configuration error: {0}")]
    Config(String),
}

impl AbiError {
    /// Short stable name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            AbiError::NullReference { .. } => "null_reference",
            AbiError::NullArgument { .. } => "null_argument",
            AbiError::AllocationFailed { .. } => "allocation_failed",
            AbiError::InvalidUtf8 { .. } => "invalid_utf8",
            AbiError::DepthExceeded { .. } => "depth_exceeded",
            AbiError::UnknownStatus(_) => "unknown_status",
            AbiError::InvalidTransition { .. } => "invalid_transition",
            AbiError::InvalidBuffer { .. } => "invalid_buffer",
            AbiError::ProducerPanicked { .. } => "producer_panicked",
            AbiError::Config(_) => "config",
        }
    }
}

impl From<std::str::Utf8Error> for AbiError {
    fn from(err: std::str::Utf8Error) -> Self {
        AbiError::InvalidUtf8 {
            valid_up_to: err.valid_up_to(),
        }
    }
}

impl From<toml::de::Error> for AbiError {
    fn from(err: toml::de::Error) -> Self {
        AbiError::Config(err.to_string())
    }
}

pub type AbiResult<T> = Result<T, AbiError>;
