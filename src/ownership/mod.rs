//! Ownership transfer - scoped handles for references that cross the boundary
//!
//! A producer that returns a reference hands its release to the consumer.
//! [`Owned`] holds such a reference together with its paired free call and
//! runs that call exactly once, on every exit path. [`Local`] is the mirror
//! image for records the consumer allocates itself, such as requests: the
//! producer only borrows them.

use crate::core::{ConvRepr, Reclaim, VecAlloc};
use crate::envelope::EnvelopeState;
use crate::errors::{AbiError, AbiResult};
use crate::logging::trace;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;

/// Paired free call for one producer entry point
pub enum Release<T> {
    /// Free call that takes the typed pointer back
    Typed(unsafe extern "C" fn(*mut T)),
    /// Free call that takes the address as a plain integer
    Address(unsafe extern "C" fn(usize)),
}

impl<T> Clone for Release<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Release<T> {}

impl<T> fmt::Debug for Release<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Release::Typed(_) => f.write_str("Release::Typed"),
            Release::Address(_) => f.write_str("Release::Address"),
        }
    }
}

impl<T> Release<T> {
    /// Invoke the free call for `ptr`.
    ///
    /// # Safety
    /// `ptr` must be the reference this free call is paired with, and must not
    /// have been released already.
    pub unsafe fn run(self, ptr: *mut T) {
        match self {
            Release::Typed(free) => free(ptr),
            Release::Address(free) => free(ptr as usize),
        }
    }
}

/// A producer-allocated reference plus the duty to release it
pub struct Owned<T> {
    ptr: NonNull<T>,
    release: Release<T>,
    state: EnvelopeState,
    call: &'static str,
}

impl<T> Owned<T> {
    /// Take responsibility for `ptr`, the result of producer entry point `call`.
    ///
    /// Null means the producer could not build a result; nothing is owned and
    /// no free call is due.
    ///
    /// # Safety
    /// `ptr` must be null or a fresh reference from the producer whose paired
    /// free call is `release`.
    pub unsafe fn from_raw(ptr: *mut T, release: Release<T>, call: &'static str) -> AbiResult<Self> {
        let ptr = NonNull::new(ptr).ok_or(AbiError::NullReference { call })?;
        trace!(event = "acquire", function = call, address = ptr.as_ptr() as usize);
        Ok(Self {
            ptr,
            release,
            state: EnvelopeState::Populated,
            call,
        })
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Address as an integer, the form some free calls take
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Producer entry point this reference came from
    pub fn call(&self) -> &'static str {
        self.call
    }

    /// Record that reading is done. Reading stays possible until release.
    pub fn mark_consumed(&mut self) -> AbiResult<()> {
        self.state = self.state.advance(EnvelopeState::Consumed)?;
        Ok(())
    }

    /// Run the paired free call now instead of at end of scope
    pub fn release(mut self) {
        self.release_now();
    }

    /// Give up the handle without freeing. The caller becomes responsible
    /// for invoking the returned free call exactly once.
    pub fn into_raw(self) -> (*mut T, Release<T>) {
        let this = ManuallyDrop::new(self);
        (this.ptr.as_ptr(), this.release)
    }

    fn release_now(&mut self) {
        if self.state == EnvelopeState::Freed {
            return;
        }
        let address = self.address();
        unsafe { self.release.run(self.ptr.as_ptr()) };
        self.state = EnvelopeState::Freed;
        trace!(event = "handle_release", function = self.call, address = address);
    }
}

impl<T> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Populated or Consumed while the handle exists; Freed only in drop.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl<T: fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("call", &self.call)
            .field("state", &self.state)
            .field("value", &**self)
            .finish()
    }
}

/// A consumer-allocated boundary record, freed by the consumer on drop
pub struct Local<T: Reclaim> {
    value: ManuallyDrop<T>,
}

impl<T: Reclaim> Local<T> {
    /// Lower an owned value into a boundary record this handle owns
    pub fn lower<M>(model: M) -> Self
    where
        M: ConvRepr<Repr = T>,
    {
        Self {
            value: ManuallyDrop::new(model.into_repr()),
        }
    }

    pub fn as_ptr(&self) -> *const T {
        &*self.value as *const T
    }
}

impl<T: Reclaim> Deref for Local<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Reclaim> Drop for Local<T> {
    fn drop(&mut self) {
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        unsafe { value.reclaim::<VecAlloc>() };
    }
}

impl<T: Reclaim + fmt::Debug> fmt::Debug for Local<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Local").field(&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AbiAlloc;
    use std::cell::Cell;
    use std::ptr;

    thread_local! {
        static TYPED_FREES: Cell<usize> = const { Cell::new(0) };
        static ADDRESS_FREES: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn free_typed(ptr: *mut u64) {
        TYPED_FREES.with(|c| c.set(c.get() + 1));
        drop(VecAlloc::take_box(ptr));
    }

    unsafe extern "C" fn free_address(address: usize) {
        ADDRESS_FREES.with(|c| c.set(c.get() + 1));
        drop(VecAlloc::take_box(address as *mut u64));
    }

    fn boxed(value: u64) -> *mut u64 {
        VecAlloc::alloc_box(value).unwrap()
    }

    #[test]
    fn null_is_an_error_and_frees_nothing() {
        let before = TYPED_FREES.with(Cell::get);
        let result = unsafe { Owned::from_raw(ptr::null_mut(), Release::Typed(free_typed), "make") };
        assert_eq!(result.err(), Some(AbiError::NullReference { call: "make" }));
        assert_eq!(TYPED_FREES.with(Cell::get), before);
    }

    #[test]
    fn drop_frees_exactly_once() {
        let before = TYPED_FREES.with(Cell::get);
        {
            let owned = unsafe { Owned::from_raw(boxed(5), Release::Typed(free_typed), "make") }.unwrap();
            assert_eq!(*owned, 5);
            assert_eq!(owned.state(), EnvelopeState::Populated);
        }
        assert_eq!(TYPED_FREES.with(Cell::get), before + 1);
    }

    #[test]
    fn address_release_and_explicit_release() {
        let before = ADDRESS_FREES.with(Cell::get);
        let mut owned = unsafe { Owned::from_raw(boxed(9), Release::Address(free_address), "make") }.unwrap();
        owned.mark_consumed().unwrap();
        assert_eq!(owned.state(), EnvelopeState::Consumed);
        assert!(owned.mark_consumed().is_err());
        owned.release();
        assert_eq!(ADDRESS_FREES.with(Cell::get), before + 1);
    }

    #[test]
    fn into_raw_hands_back_the_duty() {
        let before = TYPED_FREES.with(Cell::get);
        let owned = unsafe { Owned::from_raw(boxed(1), Release::Typed(free_typed), "make") }.unwrap();
        let (ptr, release) = owned.into_raw();
        assert_eq!(TYPED_FREES.with(Cell::get), before);
        unsafe { release.run(ptr) };
        assert_eq!(TYPED_FREES.with(Cell::get), before + 1);
    }
}
