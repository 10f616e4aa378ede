//! Lowering and raising between owned Rust values and boundary records
//!
//! Lowering (`into_repr`) moves an owned value into Vec/Box-backed storage,
//! so the result must be released with [`VecAlloc`](super::alloc::VecAlloc).
//! Raising (`from_repr`) copies out of a borrowed record and never frees it.

use super::buffer::FfiArray;
use super::map::{FfiMap, FfiMapEntry, OrderedMap};
use super::text::FfiString;
use crate::errors::AbiResult;
use std::ptr;

pub trait ConvRepr: Sized {
    type Repr;

    /// Move `self` into its boundary form
    fn into_repr(self) -> Self::Repr;

    /// Build an owned copy of a borrowed boundary record.
    ///
    /// # Safety
    /// Every buffer and pointer reachable from `repr` must be valid.
    unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self>;
}

macro_rules! scalar_repr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ConvRepr for $ty {
                type Repr = $ty;

                #[inline]
                fn into_repr(self) -> Self::Repr {
                    self
                }

                #[inline]
                unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self> {
                    Ok(*repr)
                }
            }
        )*
    };
}

scalar_repr!(bool, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, f32, f64);

impl ConvRepr for String {
    type Repr = FfiString;

    fn into_repr(self) -> FfiString {
        FfiString::from_string(self)
    }

    unsafe fn from_repr(repr: &FfiString) -> AbiResult<Self> {
        repr.validate()?;
        Ok(repr.to_str()?.to_owned())
    }
}

impl<T: ConvRepr> ConvRepr for Vec<T> {
    type Repr = FfiArray<T::Repr>;

    fn into_repr(self) -> Self::Repr {
        FfiArray::from_vec(self.into_iter().map(ConvRepr::into_repr).collect())
    }

    unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self> {
        repr.validate()?;
        repr.iter().map(|item| T::from_repr(item)).collect()
    }
}

impl<K: ConvRepr, V: ConvRepr> ConvRepr for OrderedMap<K, V> {
    type Repr = FfiMap<K::Repr, V::Repr>;

    fn into_repr(self) -> Self::Repr {
        FfiMap::from_pairs(
            self.into_iter()
                .map(|(key, value)| (key.into_repr(), value.into_repr())),
        )
    }

    unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self> {
        repr.iter()
            .map(|FfiMapEntry { key, value }| Ok((K::from_repr(key)?, V::from_repr(value)?)))
            .collect()
    }
}

/// Heap indirection on the Rust side only; the boundary form is the same
impl<T: ConvRepr> ConvRepr for Box<T> {
    type Repr = T::Repr;

    fn into_repr(self) -> Self::Repr {
        (*self).into_repr()
    }

    unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self> {
        Ok(Box::new(T::from_repr(repr)?))
    }
}

/// Absence is a null pointer; presence is an owned pointer to the record
impl<T: ConvRepr> ConvRepr for Option<T> {
    type Repr = *mut T::Repr;

    fn into_repr(self) -> Self::Repr {
        match self {
            Some(value) => Box::into_raw(Box::new(value.into_repr())),
            None => ptr::null_mut(),
        }
    }

    unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self> {
        match repr.as_ref() {
            Some(inner) => Ok(Some(T::from_repr(inner)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alloc::{Reclaim, VecAlloc};
    use crate::errors::AbiError;

    #[test]
    fn strings_lower_without_copy_and_raise_by_copy() {
        let repr = "hello".to_string().into_repr();
        let back = unsafe { String::from_repr(&repr) }.unwrap();
        assert_eq!(back, "hello");
        unsafe { repr.reclaim::<VecAlloc>() };
    }

    #[test]
    fn absent_option_is_null() {
        let repr = Option::<OrderedMap<String, String>>::None.into_repr();
        assert!(repr.is_null());
        assert_eq!(unsafe { Option::<OrderedMap<String, String>>::from_repr(&repr) }, Ok(None));
    }

    #[test]
    fn map_keeps_order_and_duplicates() {
        let map: OrderedMap<String, i32> =
            vec![("b".into(), 1), ("a".into(), 2), ("b".into(), 3)].into();
        let repr = Some(map.clone()).into_repr();
        unsafe {
            assert_eq!((*repr).get("b"), Some(&1));
            let back = Option::<OrderedMap<String, i32>>::from_repr(&repr).unwrap();
            assert_eq!(back, Some(map));
            repr.reclaim::<VecAlloc>();
        }
    }

    #[test]
    fn broken_header_fails_before_reading() {
        let mut repr = FfiString::from_vec(Vec::with_capacity(8));
        let cap = repr.cap;
        repr.cap = 0;
        assert!(matches!(
            unsafe { Vec::<u8>::from_repr(&repr) },
            Err(AbiError::InvalidBuffer { .. })
        ));
        assert!(unsafe { String::from_repr(&repr) }.is_err());
        repr.cap = cap;
        unsafe { repr.reclaim::<VecAlloc>() };
    }

    #[test]
    fn raw_bytes_raise_unvalidated() {
        let repr = FfiString::from_bytes(&[b'x', 0xff]);
        assert_eq!(unsafe { Vec::<u8>::from_repr(&repr) }, Ok(vec![b'x', 0xff]));
        unsafe { repr.reclaim::<VecAlloc>() };
    }

    #[test]
    fn invalid_text_fails_to_raise() {
        let repr = FfiString::from_bytes(&[0xff, 0xfe]);
        assert!(unsafe { String::from_repr(&repr) }.is_err());
        unsafe { repr.reclaim::<VecAlloc>() };
    }
}
