//! Record model tests
//!
//! Coverage:
//! - Layout: sizes, alignments and field offsets pinned on 64-bit targets
//! - Lowering and raising of users, requests and envelopes
//! - Absent vs empty containers
//! - Depth-limited raising

use super::*;
use std::mem::{align_of, offset_of, size_of};

fn sample_user(id: i32, extra: Option<OrderedMap<String, String>>) -> User {
    User {
        user_id: id,
        user_name: format!("user{id}"),
        is_male: id % 2 == 0,
        pure: Pure {
            user_id: id,
            is_male: true,
            inner: Inner { user_id: -id, is_male: false },
        },
        extra,
    }
}

fn chain(depth: usize) -> GetUserResponse {
    let mut head = GetUserResponse {
        req: GetUserRequest::new(depth as i32, "tail", false),
        ..Default::default()
    };
    for level in (0..depth).rev() {
        head = GetUserResponse {
            users: vec![sample_user(level as i32, None)],
            resp: Some(Box::new(head)),
            resp_map: None,
            req: GetUserRequest::new(level as i32, "link", true),
        };
    }
    head
}

// ===== Layout =====

#[test]
fn scalar_record_layouts() {
    assert_eq!(size_of::<Inner>(), 8);
    assert_eq!(align_of::<Inner>(), 4);
    assert_eq!(size_of::<Pure>(), 16);
    assert_eq!(offset_of!(Pure, inner), 8);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn pointer_record_layouts() {
    assert_eq!(size_of::<FfiString>(), 24);
    assert_eq!(offset_of!(FfiArray<u8>, len), 8);
    assert_eq!(offset_of!(FfiArray<u8>, cap), 16);

    assert_eq!(size_of::<FfiUser>(), 64);
    assert_eq!(offset_of!(FfiUser, user_name), 8);
    assert_eq!(offset_of!(FfiUser, is_male), 32);
    assert_eq!(offset_of!(FfiUser, pure), 36);
    assert_eq!(offset_of!(FfiUser, extra), 56);

    assert_eq!(size_of::<FfiGetUserRequest>(), 40);
    assert_eq!(offset_of!(FfiGetUserRequest, is_male), 32);

    assert_eq!(size_of::<FfiGetUserResponse>(), 80);
    assert_eq!(offset_of!(FfiGetUserResponse, resp), 24);
    assert_eq!(offset_of!(FfiGetUserResponse, resp_map), 32);
    assert_eq!(offset_of!(FfiGetUserResponse, req), 40);
    assert_eq!(align_of::<FfiGetUserResponse>(), 8);
}

// ===== Lowering and raising =====

#[test]
fn user_round_trips_with_extra() {
    let extra: OrderedMap<String, String> =
        vec![("rank".into(), "0".into()), ("rank".into(), "lead".into())].into();
    let user = sample_user(3, Some(extra));

    let repr = user.clone().into_repr();
    assert!(!repr.extra.is_null());
    unsafe {
        assert_eq!((*repr.extra).get("rank").map(|v| v.as_bytes()), Some(&b"0"[..]));
        assert_eq!(User::from_repr(&repr), Ok(user));
        repr.reclaim::<VecAlloc>();
    }
}

#[test]
fn absent_and_empty_extra_differ() {
    let absent = sample_user(1, None).into_repr();
    let empty = sample_user(1, Some(OrderedMap::new())).into_repr();

    assert!(absent.extra.is_null());
    assert!(!empty.extra.is_null());
    unsafe {
        assert!((*empty.extra).is_empty());
        assert_eq!(User::from_repr(&absent).unwrap().extra, None);
        assert_eq!(User::from_repr(&empty).unwrap().extra, Some(OrderedMap::new()));
        absent.reclaim::<VecAlloc>();
        empty.reclaim::<VecAlloc>();
    }
}

#[test]
fn request_lowering_copies_text_bytes() {
    let req = GetUserRequest::new(7, "", true);
    let local = req.to_local();
    assert_eq!(local.user_id, 7);
    assert!(local.user_name.is_empty());
    assert!(local.is_male);
    assert_eq!(unsafe { GetUserRequest::from_repr(&local) }, Ok(req));
}

#[test]
fn envelope_round_trips() {
    let mut root = chain(2);
    root.resp_map = Some(
        vec![
            ("shuffled".to_string(), chain(0)),
            ("again".to_string(), chain(1)),
        ]
        .into(),
    );
    assert_eq!(root.envelope_count(), 3 + 1 + 2);

    let repr = root.clone().into_repr();
    unsafe {
        assert_eq!(GetUserResponse::from_repr(&repr), Ok(root));
        assert_eq!(repr.release_lowered(), 6);
    }
}

#[test]
fn raising_respects_depth_limit() {
    let repr = chain(5).into_repr();
    unsafe {
        assert!(GetUserResponse::from_repr_limited(&repr, 5).is_ok());
        assert_eq!(
            GetUserResponse::from_repr_limited(&repr, 4),
            Err(AbiError::DepthExceeded { limit: 4 })
        );
        assert_eq!(repr.release_lowered(), 6);
    }
}

#[test]
fn owned_model_serializes() {
    let user = sample_user(2, None);
    let json = serde_json::to_value(&user).unwrap();
    assert_eq!(json["user_name"], "user2");
    assert_eq!(json["pure"]["inner"]["user_id"], -2);
    assert!(json["extra"].is_null());
}
