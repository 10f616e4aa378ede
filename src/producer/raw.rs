//! Producer B - boundary records written straight into exact blocks
//!
//! No owned model in between: every text, user array, map and envelope is a
//! `LayoutAlloc` block sized to its contents (`len == cap`). Allocator failure
//! is reported, not fatal, so every builder releases what it already holds
//! before passing the error up.

use super::{
    boundary, clamp_pages, DEFAULT_IS_MALE, DEFAULT_USER_ID, DEFAULT_USER_NAME, PAGE_SIZE,
    SHUFFLED_KEY,
};
use crate::core::{AbiAlloc, FfiMap, FfiMapEntry, FfiString, LayoutAlloc, Reclaim};
use crate::envelope::release_boxed;
use crate::errors::{AbiError, AbiResult};
use crate::logging::{log_ffi_call, log_release};
use crate::model::{FfiGetUserRequest, FfiGetUserResponse, FfiUser, Inner, Pure};
use std::ptr;

type Raw = LayoutAlloc;

/// Borrowed view of a caller-owned request. The name bytes are never
/// decoded; only the buffer header is checked.
#[derive(Debug, Clone, Copy)]
struct RequestView<'a> {
    user_id: i32,
    name: &'a [u8],
    is_male: bool,
}

impl<'a> RequestView<'a> {
    /// # Safety
    /// `req` must be null or point at a valid request record that outlives `'a`.
    unsafe fn read(call: &'static str, req: *const FfiGetUserRequest) -> AbiResult<Self> {
        let req = req.as_ref().ok_or(AbiError::NullArgument { call })?;
        req.user_name.validate()?;
        Ok(Self {
            user_id: req.user_id,
            name: req.user_name.as_bytes(),
            is_male: req.is_male,
        })
    }

    fn guest() -> RequestView<'static> {
        RequestView {
            user_id: DEFAULT_USER_ID,
            name: DEFAULT_USER_NAME.as_bytes(),
            is_male: DEFAULT_IS_MALE,
        }
    }
}

/// Keep `held` while `next` runs; release it if `next` fails
fn then_alloc<T: Reclaim, U>(held: T, next: impl FnOnce() -> AbiResult<U>) -> AbiResult<(T, U)> {
    match next() {
        Ok(value) => Ok((held, value)),
        Err(err) => {
            unsafe { held.reclaim::<Raw>() };
            Err(err)
        }
    }
}

fn abandon<T: Reclaim>(items: Vec<T>) {
    for item in items {
        unsafe { item.reclaim::<Raw>() };
    }
}

fn text(bytes: &[u8]) -> AbiResult<FfiString> {
    Raw::alloc_array(bytes.to_vec())
}

fn text_entry(key: &[u8], value: &[u8]) -> AbiResult<FfiMapEntry<FfiString, FfiString>> {
    let (key, value) = then_alloc(text(key)?, || text(value))?;
    Ok(FfiMapEntry { key, value })
}

fn extra(page: usize, slot: usize) -> AbiResult<*mut FfiMap<FfiString, FfiString>> {
    let rank = slot.to_string();
    let page = page.to_string();
    let mut pairs: Vec<(&[u8], &[u8])> = vec![
        (&b"rank"[..], rank.as_bytes()),
        (&b"page"[..], page.as_bytes()),
    ];
    if slot == 0 {
        pairs.push((&b"rank"[..], &b"lead"[..]));
    }

    let mut entries = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        match text_entry(key, value) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                abandon(entries);
                return Err(err);
            }
        }
    }
    Raw::alloc_box(Raw::alloc_array(entries)?)
}

fn user(req: &RequestView<'_>, page: usize, slot: usize) -> AbiResult<FfiUser> {
    let user_id = req.user_id.wrapping_add((page * PAGE_SIZE + slot) as i32);
    let is_male = req.is_male ^ (slot % 2 == 1);

    let mut name = req.name.to_vec();
    if slot > 0 {
        name.push(b'#');
        name.extend_from_slice(slot.to_string().as_bytes());
    }

    let (user_name, extra) = then_alloc(text(&name)?, || {
        if slot + 1 < PAGE_SIZE {
            extra(page, slot)
        } else {
            Ok(ptr::null_mut())
        }
    })?;

    Ok(FfiUser {
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
    })
}

fn request_copy(req: &RequestView<'_>) -> AbiResult<FfiGetUserRequest> {
    Ok(FfiGetUserRequest {
        user_id: req.user_id,
        user_name: text(req.name)?,
        is_male: req.is_male,
    })
}

/// One unlinked page, not yet boxed
fn page(req: &RequestView<'_>, shuffle: bool, index: usize) -> AbiResult<FfiGetUserResponse> {
    let mut users = Vec::with_capacity(PAGE_SIZE);
    for n in 0..PAGE_SIZE {
        let slot = if shuffle { PAGE_SIZE - 1 - n } else { n };
        match user(req, index, slot) {
            Ok(built) => users.push(built),
            Err(err) => {
                abandon(users);
                return Err(err);
            }
        }
    }

    let (users, req) = then_alloc(Raw::alloc_array(users)?, || request_copy(req))?;
    Ok(FfiGetUserResponse {
        users,
        resp: ptr::null_mut(),
        resp_map: ptr::null_mut(),
        req,
    })
}

/// Pages linked back to front so every `resp` points at a finished page
fn pages(req: &RequestView<'_>, shuffle: bool, count: usize) -> AbiResult<*mut FfiGetUserResponse> {
    let mut head: *mut FfiGetUserResponse = ptr::null_mut();
    for index in (0..count).rev() {
        match page(req, shuffle, index) {
            Ok(mut built) => {
                built.resp = head;
                // On failure the box releases `built`, and with it the chain.
                head = Raw::alloc_box(built)?;
            }
            Err(err) => {
                unsafe { head.reclaim::<Raw>() };
                return Err(err);
            }
        }
    }
    Ok(head)
}

fn keyed_shuffled(req: &RequestView<'_>) -> AbiResult<*mut FfiMap<FfiString, FfiGetUserResponse>> {
    let (value, key) = then_alloc(page(req, true, 0)?, || text(SHUFFLED_KEY.as_bytes()))?;
    Raw::alloc_box(Raw::alloc_array(vec![FfiMapEntry { key, value }])?)
}

fn default_envelope() -> AbiResult<*mut FfiGetUserResponse> {
    let req = RequestView::guest();
    let root = pages(&req, false, 2)?;
    match keyed_shuffled(&req) {
        Ok(keyed) => {
            unsafe { (*root).resp_map = keyed };
            Ok(root)
        }
        Err(err) => {
            unsafe { root.reclaim::<Raw>() };
            Err(err)
        }
    }
}

unsafe fn free_ret(call: &'static str, address: usize) {
    log_ffi_call(call, 1);
    let root = address as *mut FfiGetUserResponse;
    let released = release_boxed::<Raw>(root);
    log_release(call, address, released);
}

// ============================================================================
// C FFI exports
// ============================================================================

/// Build one page for the request at `req`. The request stays owned by the
/// caller. Returns null on failure.
///
/// # Safety
/// `req` must be null or point at a valid request for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn raw_get_user(req: *const FfiGetUserRequest, shuffle: bool) -> *mut FfiGetUserResponse {
    boundary("raw_get_user", 2, || {
        let req = RequestView::read("raw_get_user", req)?;
        Raw::alloc_box(page(&req, shuffle, 0)?)
    })
}

/// # Safety
/// `address` must be 0 or the address returned by [`raw_get_user`], released once.
#[no_mangle]
pub unsafe extern "C" fn raw_get_user_free_ret(address: usize) {
    free_ret("raw_get_user_free_ret", address);
}

#[no_mangle]
pub extern "C" fn raw_get_default_user() -> *mut FfiGetUserResponse {
    boundary("raw_get_default_user", 0, default_envelope)
}

/// # Safety
/// `address` must be 0 or the address returned by [`raw_get_default_user`], released once.
#[no_mangle]
pub unsafe extern "C" fn raw_get_default_user_free_ret(address: usize) {
    free_ret("raw_get_default_user_free_ret", address);
}

/// # Safety
/// Same as [`raw_get_user`].
#[no_mangle]
pub unsafe extern "C" fn raw_get_user_pages(
    req: *const FfiGetUserRequest,
    shuffle: bool,
    pages: u32,
) -> *mut FfiGetUserResponse {
    boundary("raw_get_user_pages", 3, || {
        let req = RequestView::read("raw_get_user_pages", req)?;
        self::pages(&req, shuffle, clamp_pages(pages))
    })
}

/// # Safety
/// `address` must be 0 or the address returned by [`raw_get_user_pages`], released once.
#[no_mangle]
pub unsafe extern "C" fn raw_get_user_pages_free_ret(address: usize) {
    free_ret("raw_get_user_pages_free_ret", address);
}

#[no_mangle]
pub extern "C" fn raw_probe_status(shuffle: bool) -> i8 {
    log_ffi_call("raw_probe_status", 1);
    shuffle as i8
}

#[no_mangle]
pub extern "C" fn raw_probe_pure(shuffle: bool) -> Pure {
    log_ffi_call("raw_probe_pure", 1);
    let sign = if shuffle { -1 } else { 1 };
    Pure {
        user_id: sign,
        is_male: shuffle,
        inner: Inner {
            user_id: -sign,
            is_male: !shuffle,
        },
    }
}
