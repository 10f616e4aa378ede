//! Core containers - buffers, text, association maps
//!
//! Everything here is layout-stable (`#[repr(C)]`) and allocator-agnostic.
//! Which side owns a container is decided by the allocation strategy that
//! produced it, never by the container itself.

pub mod alloc;
pub mod buffer;
pub mod convert;
pub mod map;
pub mod text;


pub use alloc::{AbiAlloc, LayoutAlloc, Reclaim, VecAlloc};
pub use buffer::FfiArray;
pub use convert::ConvRepr;
pub use map::{FfiMap, FfiMapEntry, OrderedMap};
pub use text::FfiString;
