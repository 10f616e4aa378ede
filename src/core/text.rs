//! Text value - encoded bytes carried in a byte buffer
//!
//! No terminator, no validation on construction. Readers decide whether to
//! treat the bytes as UTF-8; malformed input is kept verbatim.

use super::buffer::FfiArray;
use crate::errors::AbiResult;
use std::borrow::Cow;

pub type FfiString = FfiArray<u8>;

impl FfiArray<u8> {
    /// Take ownership of a `String`'s bytes without copying
    pub fn from_string(text: String) -> Self {
        Self::from_vec(text.into_bytes())
    }

    /// Copy `bytes` into a new exactly-sized buffer
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// # Safety
    /// The header must be valid and its storage still allocated.
    #[inline]
    pub unsafe fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }

    /// Borrow the bytes as `str`, failing on malformed UTF-8.
    ///
    /// # Safety
    /// Same as [`FfiArray::as_slice`].
    pub unsafe fn to_str(&self) -> AbiResult<&str> {
        Ok(std::str::from_utf8(self.as_bytes())?)
    }

    /// # Safety
    /// Same as [`FfiArray::as_slice`].
    pub unsafe fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl PartialEq<[u8]> for FfiArray<u8> {
    fn eq(&self, other: &[u8]) -> bool {
        unsafe { self.as_bytes() == other }
    }
}

impl PartialEq<str> for FfiArray<u8> {
    fn eq(&self, other: &str) -> bool {
        unsafe { self.as_bytes() == other.as_bytes() }
    }
}

impl PartialEq<&str> for FfiArray<u8> {
    fn eq(&self, other: &&str) -> bool {
        unsafe { self.as_bytes() == other.as_bytes() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AbiError;
    use std::cmp::Ordering;

    #[test]
    fn empty_text_has_zero_length() {
        let text = FfiString::from_string(String::new());
        assert!(text.is_empty());
        assert_eq!(unsafe { text.to_str() }, Ok(""));
    }

    #[test]
    fn compares_byte_wise() {
        let a = FfiString::from_bytes(b"alice");
        let b = FfiString::from_bytes(b"bob");
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert!(a == "alice");
        assert!(b == *b"bob".as_slice());
        unsafe {
            drop(a.into_vec());
            drop(b.into_vec());
        }
    }

    #[test]
    fn malformed_bytes_are_preserved() {
        let raw = [b'h', 0xc3, 0x28, b'i'];
        let text = FfiString::from_bytes(&raw);
        unsafe {
            assert_eq!(text.as_bytes(), &raw);
            assert_eq!(text.to_str(), Err(AbiError::InvalidUtf8 { valid_up_to: 1 }));
            assert_eq!(text.to_string_lossy(), "h\u{fffd}(i");
            drop(text.into_vec());
        }
    }
}
