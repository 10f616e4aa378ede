//! Producers - two interchangeable implementations of the same surface
//!
//! Both export the same entry points under different prefixes:
//! - `owned_*` ([`owned`]): builds owned Rust values and lowers them into
//!   Vec/Box storage; takes the request by value and frees by typed pointer
//! - `raw_*` ([`raw`]): writes boundary records directly into exact
//!   `std::alloc` blocks; takes the request by address and frees by integer
//!   address
//!
//! # Shared rules
//!
//! A page holds [`PAGE_SIZE`] users. On page `p`, slot `s`:
//! - `user_id = req.user_id + p * PAGE_SIZE + s` (wrapping)
//! - `user_name = req.user_name` for slot 0, else `"{req.user_name}#{s}"`
//! - `is_male = req.is_male` for even slots, negated for odd slots
//! - `pure = Pure { user_id, is_male, inner: Inner { req.user_id, req.is_male } }`
//! - `extra = [("rank", s), ("page", p)]`, slot 0 also carries `("rank", "lead")`
//!   after them; the last slot has no `extra`
//!
//! `shuffle = true` reverses the users of every page. `resp` and `resp_map`
//! are null unless stated; `req` is always the producer's own deep copy.
//!
//! - `get_user`: page 0
//! - `get_user_pages(pages)`: pages `0..pages` linked through `resp`, with
//!   `pages` clamped to `1..=MAX_ENVELOPE_DEPTH + 1`
//! - `get_default_user`: request `{1, "guest", false}`, page 0 linked to
//!   page 1, plus `resp_map = [("shuffled", get_user(default, true))]`
//! - `probe_status`: see [`StatusCode`]
//! - `probe_pure`: see [`probe_pure_expected`]
//!
//! Request text is copied byte for byte and never decoded; decoding is the
//! reader's business. A request whose text header is broken (`len > cap`, or
//! a pointer that disagrees with `cap`) is refused. On that, on allocation
//! failure, or on a panic, the call returns null and logs the cause.

pub mod owned;
pub mod raw;

use crate::envelope::MAX_ENVELOPE_DEPTH;
use crate::errors::{AbiError, AbiResult};
use crate::logging::{log_ffi_call, log_ffi_error, log_ffi_return};
use crate::model::{Inner, Pure};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::str::FromStr;

/// Users per page
pub const PAGE_SIZE: usize = 3;

pub const DEFAULT_USER_ID: i32 = 1;
pub const DEFAULT_USER_NAME: &str = "guest";
pub const DEFAULT_IS_MALE: bool = false;

/// Key of the keyed sub-envelope in the default envelope
pub const SHUFFLED_KEY: &str = "shuffled";

/// Status codes returned by `probe_status`. No other code is ever produced.
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// `shuffle = false`
    Ordered = 0,
    /// `shuffle = true`
    Shuffled = 1,
}

impl StatusCode {
    pub fn for_shuffle(shuffle: bool) -> Self {
        if shuffle {
            StatusCode::Shuffled
        } else {
            StatusCode::Ordered
        }
    }

    pub fn from_code(code: i8) -> AbiResult<Self> {
        match code {
            0 => Ok(StatusCode::Ordered),
            1 => Ok(StatusCode::Shuffled),
            other => Err(AbiError::UnknownStatus(other)),
        }
    }

    pub fn code(self) -> i8 {
        self as i8
    }
}

/// The aggregate `probe_pure` must return, by value, for `shuffle`
pub fn probe_pure_expected(shuffle: bool) -> Pure {
    let (outer, inner) = if shuffle { (-1, 1) } else { (1, -1) };
    Pure {
        user_id: outer,
        is_male: shuffle,
        inner: Inner {
            user_id: inner,
            is_male: !shuffle,
        },
    }
}

/// Which producer a consumer talks to
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    #[default]
    Owned,
    Raw,
}

impl ProducerKind {
    pub const ALL: [ProducerKind; 2] = [ProducerKind::Owned, ProducerKind::Raw];

    /// Symbol prefix of this producer's entry points
    pub fn prefix(self) -> &'static str {
        match self {
            ProducerKind::Owned => "owned_",
            ProducerKind::Raw => "raw_",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProducerKind::Owned => "owned",
            ProducerKind::Raw => "raw",
        }
    }
}

impl FromStr for ProducerKind {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owned" | "a" => Ok(ProducerKind::Owned),
            "raw" | "b" => Ok(ProducerKind::Raw),
            other => Err(AbiError::Config(format!("unknown producer `{other}`"))),
        }
    }
}

/// Page count a producer will actually build for a request of `pages`
pub fn clamp_pages(pages: u32) -> usize {
    (pages as usize).clamp(1, MAX_ENVELOPE_DEPTH + 1)
}

/// Run a producer body at the extern boundary.
///
/// Errors and panics become a null return; the cause is logged.
pub(crate) fn boundary<T>(
    call: &'static str,
    arg_count: usize,
    body: impl FnOnce() -> AbiResult<*mut T>,
) -> *mut T {
    log_ffi_call(call, arg_count);
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(ptr)) => {
            log_ffi_return(call);
            ptr
        }
        Ok(Err(err)) => {
            log_ffi_error(call, err.kind(), &err.to_string());
            ptr::null_mut()
        }
        Err(_) => {
            let err = AbiError::ProducerPanicked { call };
            log_ffi_error(call, err.kind(), &err.to_string());
            ptr::null_mut()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_fixed() {
        assert_eq!(StatusCode::for_shuffle(false).code(), 0);
        assert_eq!(StatusCode::for_shuffle(true).code(), 1);
        assert_eq!(StatusCode::from_code(1), Ok(StatusCode::Shuffled));
        assert_eq!(StatusCode::from_code(-3), Err(AbiError::UnknownStatus(-3)));
    }

    #[test]
    fn pages_are_clamped() {
        assert_eq!(clamp_pages(0), 1);
        assert_eq!(clamp_pages(4), 4);
        assert_eq!(clamp_pages(u32::MAX), MAX_ENVELOPE_DEPTH + 1);
    }

    #[test]
    fn producer_kind_parses() {
        assert_eq!("RAW".parse::<ProducerKind>(), Ok(ProducerKind::Raw));
        assert_eq!("a".parse::<ProducerKind>(), Ok(ProducerKind::Owned));
        assert!("c".parse::<ProducerKind>().is_err());
        assert_eq!(ProducerKind::Raw.prefix(), "raw_");
    }

    #[test]
    fn boundary_turns_failures_into_null() {
        let failed: *mut u8 = boundary("test_fail", 0, || Err(AbiError::AllocationFailed { bytes: 8 }));
        assert!(failed.is_null());

        let panicked: *mut u8 = boundary("test_panic", 0, || panic!("boom"));
        assert!(panicked.is_null());
    }
}
