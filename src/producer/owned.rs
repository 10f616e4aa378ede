//! Producer A - owned values lowered into Vec/Box storage
//!
//! Envelopes are built as ordinary Rust values first and lowered in one go.
//! Request text stays raw bytes from the moment it is copied in: names and
//! the embedded request carry exactly what the caller sent. Everything
//! returned is released with the `VecAlloc` strategy.

use super::{
    boundary, clamp_pages, probe_pure_expected, StatusCode, DEFAULT_IS_MALE, DEFAULT_USER_ID,
    DEFAULT_USER_NAME, PAGE_SIZE, SHUFFLED_KEY,
};
use crate::core::{AbiAlloc, ConvRepr, FfiArray, FfiMap, FfiString, OrderedMap, VecAlloc};
use crate::envelope::release_boxed;
use crate::errors::AbiResult;
use crate::logging::{log_ffi_call, log_release};
use crate::model::{FfiGetUserRequest, FfiGetUserResponse, FfiUser, GetUserRequest, Inner, Pure};
use std::ptr;

/// Request copied out of its boundary record, text unvalidated
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestBytes {
    pub user_id: i32,
    pub user_name: Vec<u8>,
    pub is_male: bool,
}

impl From<&GetUserRequest> for RequestBytes {
    fn from(req: &GetUserRequest) -> Self {
        Self {
            user_id: req.user_id,
            user_name: req.user_name.as_bytes().to_vec(),
            is_male: req.is_male,
        }
    }
}

impl ConvRepr for RequestBytes {
    type Repr = FfiGetUserRequest;

    fn into_repr(self) -> FfiGetUserRequest {
        FfiGetUserRequest {
            user_id: self.user_id,
            user_name: FfiString::from_vec(self.user_name),
            is_male: self.is_male,
        }
    }

    /// Copies the text bytes as they are; only the buffer header is checked.
    unsafe fn from_repr(repr: &FfiGetUserRequest) -> AbiResult<Self> {
        Ok(Self {
            user_id: repr.user_id,
            user_name: Vec::<u8>::from_repr(&repr.user_name)?,
            is_male: repr.is_male,
        })
    }
}

/// One user of a page before lowering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUser {
    pub user_id: i32,
    pub user_name: Vec<u8>,
    pub is_male: bool,
    pub pure: Pure,
    pub extra: Option<OrderedMap<String, String>>,
}

impl PageUser {
    fn lower(self) -> FfiUser {
        FfiUser {
            user_id: self.user_id,
            user_name: FfiString::from_vec(self.user_name),
            is_male: self.is_male,
            pure: self.pure,
            extra: self.extra.into_repr(),
        }
    }
}

/// One envelope before lowering
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Page {
    pub users: Vec<PageUser>,
    pub next: Option<Box<Page>>,
    pub keyed: Option<OrderedMap<String, Page>>,
    pub req: RequestBytes,
}

impl Page {
    /// Envelopes in this tree, root included
    pub fn envelope_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(page) = pending.pop() {
            count += 1;
            pending.extend(page.next.as_deref());
            if let Some(keyed) = &page.keyed {
                pending.extend(keyed.iter().map(|(_, sub)| sub));
            }
        }
        count
    }

    fn lower(self) -> FfiGetUserResponse {
        let next = match self.next {
            Some(next) => Box::into_raw(Box::new(next.lower())),
            None => ptr::null_mut(),
        };
        let keyed: *mut FfiMap<FfiString, FfiGetUserResponse> = match self.keyed {
            Some(keyed) => Box::into_raw(Box::new(FfiMap::from_pairs(
                keyed.into_iter().map(|(key, page)| (key.into_repr(), page.lower())),
            ))),
            None => ptr::null_mut(),
        };
        FfiGetUserResponse {
            users: FfiArray::from_vec(self.users.into_iter().map(PageUser::lower).collect()),
            resp: next,
            resp_map: keyed,
            req: self.req.into_repr(),
        }
    }
}

/// Business rules over owned values
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnedProducer;

impl OwnedProducer {
    /// Single page for `req`
    pub fn get_user(req: &RequestBytes, shuffle: bool) -> Page {
        Self::page(req, shuffle, 0)
    }

    /// `pages` linked pages, clamped to the depth cap
    pub fn get_user_pages(req: &RequestBytes, shuffle: bool, pages: u32) -> Page {
        let count = clamp_pages(pages);
        let mut head = Self::page(req, shuffle, count - 1);
        for index in (0..count - 1).rev() {
            let mut page = Self::page(req, shuffle, index);
            page.next = Some(Box::new(head));
            head = page;
        }
        head
    }

    pub fn default_request() -> RequestBytes {
        RequestBytes {
            user_id: DEFAULT_USER_ID,
            user_name: DEFAULT_USER_NAME.as_bytes().to_vec(),
            is_male: DEFAULT_IS_MALE,
        }
    }

    /// Two-page envelope with a keyed shuffled copy
    pub fn get_default_user() -> Page {
        let req = Self::default_request();
        let mut root = Self::get_user_pages(&req, false, 2);
        let mut keyed = OrderedMap::new();
        keyed.insert(SHUFFLED_KEY.to_string(), Self::get_user(&req, true));
        root.keyed = Some(keyed);
        root
    }

    pub fn probe_status(shuffle: bool) -> StatusCode {
        StatusCode::for_shuffle(shuffle)
    }

    pub fn probe_pure(shuffle: bool) -> Pure {
        probe_pure_expected(shuffle)
    }

    fn page(req: &RequestBytes, shuffle: bool, index: usize) -> Page {
        let mut users: Vec<PageUser> = (0..PAGE_SIZE).map(|slot| Self::user(req, index, slot)).collect();
        if shuffle {
            users.reverse();
        }
        Page {
            users,
            next: None,
            keyed: None,
            req: req.clone(),
        }
    }

    fn user(req: &RequestBytes, page: usize, slot: usize) -> PageUser {
        let offset = (page * PAGE_SIZE + slot) as i32;
        let user_id = req.user_id.wrapping_add(offset);
        let is_male = if slot % 2 == 0 { req.is_male } else { !req.is_male };

        let mut user_name = req.user_name.clone();
        if slot > 0 {
            user_name.push(b'#');
            user_name.extend_from_slice(slot.to_string().as_bytes());
        }

        let extra = (slot + 1 < PAGE_SIZE).then(|| {
            let mut extra = OrderedMap::new();
            extra.insert("rank".to_string(), slot.to_string());
            extra.insert("page".to_string(), page.to_string());
            if slot == 0 {
                extra.insert("rank".to_string(), "lead".to_string());
            }
            extra
        });

        PageUser {
            user_id,
            user_name,
            is_male,
            pure: Pure {
                user_id,
                is_male,
                inner: Inner {
                    user_id: req.user_id,
                    is_male: req.is_male,
                },
            },
            extra,
        }
    }
}

fn lower(page: Page) -> AbiResult<*mut FfiGetUserResponse> {
    VecAlloc::alloc_box(page.lower())
}

// ============================================================================
// C FFI exports
// ============================================================================

/// Build one page for `req`. The request stays owned by the caller.
///
/// Returns null on failure. Release with [`owned_get_user_free_ret`].
///
/// The text header is checked and its bytes are copied unvalidated.
///
/// # Safety
/// The text in `req` must point at `len` readable bytes for the duration of
/// the call.
#[no_mangle]
pub unsafe extern "C" fn owned_get_user(req: FfiGetUserRequest, shuffle: bool) -> *mut FfiGetUserResponse {
    boundary("owned_get_user", 2, || {
        let req = RequestBytes::from_repr(&req)?;
        lower(OwnedProducer::get_user(&req, shuffle))
    })
}

/// # Safety
/// `ret` must be null or come from [`owned_get_user`], released once.
#[no_mangle]
pub unsafe extern "C" fn owned_get_user_free_ret(ret: *mut FfiGetUserResponse) {
    free_ret("owned_get_user_free_ret", ret);
}

/// Build the default two-page envelope. Release with
/// [`owned_get_default_user_free_ret`].
#[no_mangle]
pub extern "C" fn owned_get_default_user() -> *mut FfiGetUserResponse {
    boundary("owned_get_default_user", 0, || lower(OwnedProducer::get_default_user()))
}

/// # Safety
/// `ret` must be null or come from [`owned_get_default_user`], released once.
#[no_mangle]
pub unsafe extern "C" fn owned_get_default_user_free_ret(ret: *mut FfiGetUserResponse) {
    free_ret("owned_get_default_user_free_ret", ret);
}

/// Build `pages` linked pages for `req`. Release with
/// [`owned_get_user_pages_free_ret`].
///
/// # Safety
/// Same as [`owned_get_user`].
#[no_mangle]
pub unsafe extern "C" fn owned_get_user_pages(
    req: FfiGetUserRequest,
    shuffle: bool,
    pages: u32,
) -> *mut FfiGetUserResponse {
    boundary("owned_get_user_pages", 3, || {
        let req = RequestBytes::from_repr(&req)?;
        lower(OwnedProducer::get_user_pages(&req, shuffle, pages))
    })
}

/// # Safety
/// `ret` must be null or come from [`owned_get_user_pages`], released once.
#[no_mangle]
pub unsafe extern "C" fn owned_get_user_pages_free_ret(ret: *mut FfiGetUserResponse) {
    free_ret("owned_get_user_pages_free_ret", ret);
}

#[no_mangle]
pub extern "C" fn owned_probe_status(shuffle: bool) -> i8 {
    log_ffi_call("owned_probe_status", 1);
    OwnedProducer::probe_status(shuffle).code()
}

#[no_mangle]
pub extern "C" fn owned_probe_pure(shuffle: bool) -> Pure {
    log_ffi_call("owned_probe_pure", 1);
    OwnedProducer::probe_pure(shuffle)
}

unsafe fn free_ret(call: &'static str, ret: *mut FfiGetUserResponse) {
    log_ffi_call(call, 1);
    let address = ret as usize;
    let released = release_boxed::<VecAlloc>(ret);
    log_release(call, address, released);
}
