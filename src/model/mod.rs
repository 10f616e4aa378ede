//! Record model - aggregate records exchanged across the boundary
//!
//! Each record comes in two forms:
//! - owned Rust value (`User`, `GetUserRequest`, `GetUserResponse`) used to
//!   build, compare and print data
//! - `#[repr(C)]` boundary record (`FfiUser`, ...) with a layout both sides
//!   compile against; no runtime negotiation
//!
//! `Inner` and `Pure` hold only scalars and serve as both forms.

use crate::core::{AbiAlloc, ConvRepr, FfiArray, FfiMap, FfiString, OrderedMap, Reclaim, VecAlloc};
use crate::envelope::{self, MAX_ENVELOPE_DEPTH};
use crate::errors::{AbiError, AbiResult};
use crate::ownership::Local;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Innermost scalar pair
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inner {
    pub user_id: i32,
    pub is_male: bool,
}

/// Scalar record nesting an [`Inner`] by value; also returned by value
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pure {
    pub user_id: i32,
    pub is_male: bool,
    pub inner: Inner,
}

macro_rules! identity_repr {
    ($($ty:ty),*) => {
        $(
            impl ConvRepr for $ty {
                type Repr = $ty;

                fn into_repr(self) -> Self::Repr {
                    self
                }

                unsafe fn from_repr(repr: &Self::Repr) -> AbiResult<Self> {
                    Ok(*repr)
                }
            }

            impl Reclaim for $ty {
                unsafe fn reclaim<A: AbiAlloc>(self) {}
            }
        )*
    };
}

identity_repr!(Inner, Pure);

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i32,
    pub user_name: String,
    pub is_male: bool,
    pub pure: Pure,
    /// `None` crosses as a null pointer, distinct from an empty map
    pub extra: Option<OrderedMap<String, String>>,
}

#[repr(C)]
#[derive(Debug)]
pub struct FfiUser {
    pub user_id: i32,
    pub user_name: FfiString,
    pub is_male: bool,
    pub pure: Pure,
    pub extra: *mut FfiMap<FfiString, FfiString>,
}

impl ConvRepr for User {
    type Repr = FfiUser;

    fn into_repr(self) -> FfiUser {
        FfiUser {
            user_id: self.user_id,
            user_name: self.user_name.into_repr(),
            is_male: self.is_male,
            pure: self.pure,
            extra: self.extra.into_repr(),
        }
    }

    unsafe fn from_repr(repr: &FfiUser) -> AbiResult<Self> {
        Ok(User {
            user_id: repr.user_id,
            user_name: String::from_repr(&repr.user_name)?,
            is_male: repr.is_male,
            pure: repr.pure,
            extra: Option::<OrderedMap<String, String>>::from_repr(&repr.extra)?,
        })
    }
}

impl Reclaim for FfiUser {
    unsafe fn reclaim<A: AbiAlloc>(self) {
        self.user_name.reclaim::<A>();
        self.extra.reclaim::<A>();
    }
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetUserRequest {
    pub user_id: i32,
    pub user_name: String,
    pub is_male: bool,
}

impl GetUserRequest {
    pub fn new(user_id: i32, user_name: impl Into<String>, is_male: bool) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            is_male,
        }
    }

    /// Lower into a consumer-owned boundary record that frees itself on drop
    pub fn to_local(&self) -> Local<FfiGetUserRequest> {
        Local::lower(self.clone())
    }
}

/// Request record. Passed by value, so the struct is plain data; the text it
/// points at stays owned by whoever built it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfiGetUserRequest {
    pub user_id: i32,
    pub user_name: FfiString,
    pub is_male: bool,
}

impl ConvRepr for GetUserRequest {
    type Repr = FfiGetUserRequest;

    fn into_repr(self) -> FfiGetUserRequest {
        FfiGetUserRequest {
            user_id: self.user_id,
            user_name: self.user_name.into_repr(),
            is_male: self.is_male,
        }
    }

    unsafe fn from_repr(repr: &FfiGetUserRequest) -> AbiResult<Self> {
        Ok(GetUserRequest {
            user_id: repr.user_id,
            user_name: String::from_repr(&repr.user_name)?,
            is_male: repr.is_male,
        })
    }
}

impl Reclaim for FfiGetUserRequest {
    unsafe fn reclaim<A: AbiAlloc>(self) {
        self.user_name.reclaim::<A>();
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// Owned envelope. `resp` chains to the next page, `resp_map` holds keyed
/// sub-envelopes, `req` is the producer's own copy of the request.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserResponse {
    pub users: Vec<User>,
    pub resp: Option<Box<GetUserResponse>>,
    pub resp_map: Option<OrderedMap<String, GetUserResponse>>,
    pub req: GetUserRequest,
}

#[repr(C)]
#[derive(Debug)]
pub struct FfiGetUserResponse {
    pub users: FfiArray<FfiUser>,
    pub resp: *mut FfiGetUserResponse,
    pub resp_map: *mut FfiMap<FfiString, FfiGetUserResponse>,
    pub req: FfiGetUserRequest,
}

impl GetUserResponse {
    /// Envelopes in this tree, root included
    pub fn envelope_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            if let Some(next) = &node.resp {
                pending.push(next);
            }
            if let Some(map) = &node.resp_map {
                pending.extend(map.iter().map(|(_, sub)| sub));
            }
        }
        count
    }

    /// Raise a borrowed envelope, refusing trees nested deeper than `limit`.
    ///
    /// The root is depth 0; each `resp` or `resp_map` hop adds one.
    ///
    /// # Safety
    /// Every buffer and pointer reachable from `repr` must be valid.
    pub unsafe fn from_repr_limited(repr: &FfiGetUserResponse, limit: usize) -> AbiResult<Self> {
        Self::raise(repr, limit, limit)
    }

    unsafe fn raise(repr: &FfiGetUserResponse, remaining: usize, limit: usize) -> AbiResult<Self> {
        let below = || remaining.checked_sub(1).ok_or(AbiError::DepthExceeded { limit });

        let resp = match repr.resp.as_ref() {
            Some(next) => Some(Box::new(Self::raise(next, below()?, limit)?)),
            None => None,
        };

        let resp_map = match repr.resp_map.as_ref() {
            Some(map) => {
                let remaining = below()?;
                let mut raised = OrderedMap::new();
                for (key, sub) in map.entries() {
                    raised.insert(String::from_repr(key)?, Self::raise(sub, remaining, limit)?);
                }
                Some(raised)
            }
            None => None,
        };

        Ok(GetUserResponse {
            users: Vec::<User>::from_repr(&repr.users)?,
            resp,
            resp_map,
            req: GetUserRequest::from_repr(&repr.req)?,
        })
    }
}

impl ConvRepr for GetUserResponse {
    type Repr = FfiGetUserResponse;

    fn into_repr(self) -> FfiGetUserResponse {
        FfiGetUserResponse {
            users: self.users.into_repr(),
            resp: self.resp.into_repr(),
            resp_map: self.resp_map.into_repr(),
            req: self.req.into_repr(),
        }
    }

    unsafe fn from_repr(repr: &FfiGetUserResponse) -> AbiResult<Self> {
        Self::from_repr_limited(repr, MAX_ENVELOPE_DEPTH)
    }
}

impl Reclaim for FfiGetUserResponse {
    unsafe fn reclaim<A: AbiAlloc>(self) {
        envelope::release_tree::<A>(self);
    }
}

impl FfiGetUserResponse {
    /// Release a tree built by lowering an owned envelope
    ///
    /// # Safety
    /// `self` must come from [`ConvRepr::into_repr`] and not be used again.
    pub unsafe fn release_lowered(self) -> usize {
        envelope::release_tree::<VecAlloc>(self)
    }
}
