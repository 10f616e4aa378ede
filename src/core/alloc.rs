//! Allocation strategies and recursive teardown
//!
//! Each producer allocates with exactly one strategy and frees with the same
//! one. Mixing them is undefined behavior.
//! - [`VecAlloc`]: storage comes from `Vec`/`Box`, spare capacity allowed
//! - [`LayoutAlloc`]: exact-size `std::alloc` blocks (`len == cap`), allocator
//!   failure reported as [`AbiError::AllocationFailed`] instead of aborting

use super::buffer::FfiArray;
use super::map::FfiMapEntry;
use crate::errors::{AbiError, AbiResult};
use crate::logging::log_allocation;
use std::alloc::{alloc, dealloc, Layout};
use std::mem;
use std::ptr;

/// Where container storage comes from and how it goes back
pub trait AbiAlloc {
    /// Strategy name for log fields
    const NAME: &'static str;

    /// Move `items` into storage owned by this strategy. On failure the items
    /// are released before the error is returned.
    fn alloc_array<T: Reclaim>(items: Vec<T>) -> AbiResult<FfiArray<T>>;

    /// Move every live element out, hand it to `each`, then free the storage.
    ///
    /// # Safety
    /// `array` must have been produced by this strategy's `alloc_array` and
    /// must not be used again.
    unsafe fn reclaim_array<T>(array: FfiArray<T>, each: impl FnMut(T));

    /// Move `value` behind a fresh pointer. On failure the value is released.
    fn alloc_box<T: Reclaim>(value: T) -> AbiResult<*mut T>;

    /// Move the value out of `ptr` and free the slot.
    ///
    /// # Safety
    /// `ptr` must be non-null, come from this strategy's `alloc_box`, and not
    /// be used again.
    unsafe fn take_box<T>(ptr: *mut T) -> T;
}

/// Release everything reachable from a record.
///
/// Scalars release nothing; buffers release their elements and storage; owned
/// pointers release their target.
pub trait Reclaim: Sized {
    /// # Safety
    /// Every allocation reachable from `self` must belong to strategy `A` and
    /// must not be referenced again.
    unsafe fn reclaim<A: AbiAlloc>(self);
}

macro_rules! reclaim_nothing {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Reclaim for $ty {
                #[inline]
                unsafe fn reclaim<A: AbiAlloc>(self) {}
            }
        )*
    };
}

reclaim_nothing!(bool, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, f32, f64);

impl<T: Reclaim> Reclaim for FfiArray<T> {
    unsafe fn reclaim<A: AbiAlloc>(self) {
        A::reclaim_array(self, |item| item.reclaim::<A>());
    }
}

impl<K: Reclaim, V: Reclaim> Reclaim for FfiMapEntry<K, V> {
    unsafe fn reclaim<A: AbiAlloc>(self) {
        self.key.reclaim::<A>();
        self.value.reclaim::<A>();
    }
}

/// Owned optional pointer. Null releases nothing.
impl<T: Reclaim> Reclaim for *mut T {
    unsafe fn reclaim<A: AbiAlloc>(self) {
        if !self.is_null() {
            A::take_box(self).reclaim::<A>();
        }
    }
}

/// Storage from `Vec` and `Box`
#[derive(Debug, Clone, Copy, Default)]
pub struct VecAlloc;

impl AbiAlloc for VecAlloc {
    const NAME: &'static str = "vec";

    fn alloc_array<T: Reclaim>(items: Vec<T>) -> AbiResult<FfiArray<T>> {
        Ok(FfiArray::from_vec(items))
    }

    unsafe fn reclaim_array<T>(array: FfiArray<T>, each: impl FnMut(T)) {
        array.into_vec().into_iter().for_each(each);
    }

    fn alloc_box<T: Reclaim>(value: T) -> AbiResult<*mut T> {
        Ok(Box::into_raw(Box::new(value)))
    }

    unsafe fn take_box<T>(ptr: *mut T) -> T {
        *Box::from_raw(ptr)
    }
}

/// Exact-size blocks straight from the global allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutAlloc;

impl LayoutAlloc {
    fn array_layout<T>(len: usize) -> AbiResult<Layout> {
        Layout::array::<T>(len).map_err(|_| AbiError::AllocationFailed {
            bytes: len.saturating_mul(mem::size_of::<T>()),
        })
    }
}

impl AbiAlloc for LayoutAlloc {
    const NAME: &'static str = "layout";

    fn alloc_array<T: Reclaim>(items: Vec<T>) -> AbiResult<FfiArray<T>> {
        debug_assert!(mem::size_of::<T>() != 0, "zero-sized elements are not supported");
        let len = items.len();
        if len == 0 {
            return Ok(FfiArray::null());
        }

        let layout = match Self::array_layout::<T>(len) {
            Ok(layout) => layout,
            Err(err) => {
                items.into_iter().for_each(|item| unsafe { item.reclaim::<Self>() });
                return Err(err);
            }
        };

        let block = unsafe { alloc(layout) } as *mut T;
        if block.is_null() {
            items.into_iter().for_each(|item| unsafe { item.reclaim::<Self>() });
            return Err(AbiError::AllocationFailed { bytes: layout.size() });
        }
        log_allocation(Self::NAME, layout.size(), block as *const u8);

        for (slot, item) in items.into_iter().enumerate() {
            unsafe { ptr::write(block.add(slot), item) };
        }

        Ok(FfiArray {
            ptr: block,
            len,
            cap: len,
        })
    }

    unsafe fn reclaim_array<T>(array: FfiArray<T>, mut each: impl FnMut(T)) {
        if array.ptr.is_null() {
            return;
        }
        for slot in 0..array.len {
            each(ptr::read(array.ptr.add(slot)));
        }
        if let Ok(layout) = Layout::array::<T>(array.cap) {
            dealloc(array.ptr as *mut u8, layout);
        }
    }

    fn alloc_box<T: Reclaim>(value: T) -> AbiResult<*mut T> {
        let layout = Layout::new::<T>();
        let slot = unsafe { alloc(layout) } as *mut T;
        if slot.is_null() {
            unsafe { value.reclaim::<Self>() };
            return Err(AbiError::AllocationFailed { bytes: layout.size() });
        }
        log_allocation(Self::NAME, layout.size(), slot as *const u8);
        unsafe { ptr::write(slot, value) };
        Ok(slot)
    }

    unsafe fn take_box<T>(ptr: *mut T) -> T {
        let value = ptr::read(ptr);
        dealloc(ptr as *mut u8, Layout::new::<T>());
        value
    }
}
