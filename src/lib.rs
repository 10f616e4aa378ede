//! crossabi - binary interchange contract for dynamic data
//!
//! Two independently built runtimes, each with its own allocator, exchange
//! strings, arrays, ordered maps and recursive response envelopes through
//! plain `extern "C"` calls. The contract fixes three things:
//! - record layouts (`#[repr(C)]`, see [`core`] and [`model`])
//! - who frees what: every allocating call has one paired free call
//!   ([`ownership`], [`envelope`])
//! - two interchangeable producers behind one consumer capability
//!   ([`producer`], [`consumer`])

pub mod config;
pub mod consumer;
pub mod core;
pub mod envelope;
pub mod errors;
pub mod logging;
pub mod model;
pub mod ownership;
pub mod producer;

pub use crate::config::AbiConfig;
pub use crate::consumer::{binding, snapshot, Envelope, OwnedBinding, RawBinding, UserProducer};
pub use crate::core::{ConvRepr, FfiArray, FfiMap, FfiMapEntry, FfiString, OrderedMap};
pub use crate::envelope::{EnvelopeState, MAX_ENVELOPE_DEPTH};
pub use crate::errors::{AbiError, AbiResult};
pub use crate::logging::LogConfig;
pub use crate::model::{
    FfiGetUserRequest, FfiGetUserResponse, FfiUser, GetUserRequest, GetUserResponse, Inner, Pure, User,
};
pub use crate::ownership::{Local, Owned, Release};
pub use crate::producer::{ProducerKind, StatusCode};

/// Version of the record layouts. Bumped on any layout change.
pub const ABI_VERSION: u32 = 1;

/// Layout version this library was built with
#[no_mangle]
pub extern "C" fn crossabi_abi_version() -> u32 {
    ABI_VERSION
}

/// Library initialization: installs logging from `CROSSABI_*` variables
#[no_mangle]
pub extern "C" fn crossabi_init() {
    // Stdout/stderr logging only; file output needs a guard the host keeps.
    let mut config = LogConfig::from_env();
    config.file_output = false;
    let _ = logging::init_with_config(config);
    logging::log_library_init(ABI_VERSION);
}

/// Library cleanup
#[no_mangle]
pub extern "C" fn crossabi_cleanup() {
    logging::log_library_shutdown();
}
