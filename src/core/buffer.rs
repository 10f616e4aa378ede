//! Dynamic buffer - the `{ptr, len, cap}` header shared by every container
//!
//! Design: plain `#[repr(C)]` data. The header is `Copy` like its C twin;
//! whoever holds the owning handle is responsible for releasing the storage.
//! Invariants checked by [`FfiArray::is_valid`]:
//! - `len <= cap`
//! - `ptr` is null exactly when `cap == 0`
//! - elements `[0, len)` are initialized

use crate::errors::{AbiError, AbiResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::{self, ManuallyDrop};
use std::ptr;

/// Contiguous run of `T` owned by whichever side allocated it
#[repr(C)]
pub struct FfiArray<T> {
    pub ptr: *mut T,
    pub len: usize,
    pub cap: usize,
}

impl<T> Clone for FfiArray<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FfiArray<T> {}

impl<T> Default for FfiArray<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> FfiArray<T> {
    /// Empty buffer with no storage
    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    /// Leak a `Vec` into a buffer header. Zero capacity becomes the null header.
    pub fn from_vec(items: Vec<T>) -> Self {
        debug_assert!(mem::size_of::<T>() != 0, "zero-sized elements are not supported");
        if items.capacity() == 0 {
            return Self::null();
        }
        let mut items = ManuallyDrop::new(items);
        Self {
            ptr: items.as_mut_ptr(),
            len: items.len(),
            cap: items.capacity(),
        }
    }

    /// Rebuild the `Vec` this buffer was leaked from.
    ///
    /// # Safety
    /// The buffer must come from [`FfiArray::from_vec`] (or the Vec-backed
    /// allocation strategy) and must not be used again afterwards.
    pub unsafe fn into_vec(self) -> Vec<T> {
        if self.ptr.is_null() {
            return Vec::new();
        }
        Vec::from_raw_parts(self.ptr, self.len, self.cap)
    }

    /// Replace `self` with the null header and return the previous one
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Zero live elements. An empty buffer is still a present container.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Check the header invariants without touching the storage
    pub fn is_valid(&self) -> bool {
        self.len <= self.cap && (self.ptr.is_null() == (self.cap == 0))
    }

    /// Like [`FfiArray::is_valid`] but reports the offending header
    pub fn validate(&self) -> AbiResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AbiError::InvalidBuffer {
                len: self.len,
                cap: self.cap,
                null: self.ptr.is_null(),
            })
        }
    }

    /// Borrow the live elements in place.
    ///
    /// # Safety
    /// The header must be valid and its storage must still be allocated.
    #[inline]
    pub unsafe fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() || self.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.ptr, self.len)
        }
    }

    /// Iterate from index 0 each time it is called.
    ///
    /// # Safety
    /// Same as [`FfiArray::as_slice`].
    #[inline]
    pub unsafe fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Default> FfiArray<T> {
    /// Buffer of `len` default elements (`len == cap`)
    pub fn allocate(len: usize) -> Self {
        let mut items = Vec::with_capacity(len);
        items.resize_with(len, T::default);
        Self::from_vec(items)
    }
}

impl<T: Clone> FfiArray<T> {
    /// Copy the live elements into a new buffer
    ///
    /// # Safety
    /// Same as [`FfiArray::as_slice`].
    pub unsafe fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }
}

// Content comparisons. Two headers are equal when their live elements are,
// regardless of where the storage lives or how much spare capacity it has.

impl<T: PartialEq> PartialEq for FfiArray<T> {
    fn eq(&self, other: &Self) -> bool {
        unsafe { self.as_slice() == other.as_slice() }
    }
}

impl<T: Eq> Eq for FfiArray<T> {}

impl<T: PartialOrd> PartialOrd for FfiArray<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        unsafe { self.as_slice().partial_cmp(other.as_slice()) }
    }
}

impl<T: Ord> Ord for FfiArray<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        unsafe { self.as_slice().cmp(other.as_slice()) }
    }
}

impl<T: Hash> Hash for FfiArray<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        unsafe { self.as_slice().hash(state) }
    }
}

impl<T: fmt::Debug> fmt::Debug for FfiArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(unsafe { self.as_slice() }).finish()
    }
}
