//! Dual-producer conformance
//!
//! The same suite runs against both bindings; every observable result must
//! match, down to the decoded envelope tree.

use crossabi::consumer::{binding, snapshot, snapshot_default, UserProducer};
use crossabi::envelope::{self, MAX_ENVELOPE_DEPTH};
use crossabi::model::GetUserRequest;
use crossabi::producer::{probe_pure_expected, ProducerKind, StatusCode, SHUFFLED_KEY};
use crossabi::{AbiError, FfiGetUserRequest, FfiString, GetUserResponse};
use proptest::prelude::*;

fn producers() -> Vec<Box<dyn UserProducer>> {
    ProducerKind::ALL.into_iter().map(binding).collect()
}

fn fetch(producer: &dyn UserProducer, req: &GetUserRequest, shuffle: bool, pages: u32) -> GetUserResponse {
    let local = req.to_local();
    let envelope = if pages > 1 {
        producer.get_user_pages(&local, shuffle, pages)
    } else {
        producer.get_user(&local, shuffle)
    }
    .expect("producer returned null");
    snapshot_default(&envelope).expect("envelope decodes")
}

#[test]
fn get_user_matches() {
    let req = GetUserRequest::new(42, "zoë", true);
    for shuffle in [false, true] {
        let results: Vec<_> = producers().iter().map(|p| fetch(p.as_ref(), &req, shuffle, 1)).collect();
        assert_eq!(results[0], results[1], "shuffle={shuffle}");
        assert_eq!(results[0].users.len(), 3);
    }
}

#[test]
fn default_envelope_matches() {
    let results: Vec<GetUserResponse> = producers()
        .iter()
        .map(|p| {
            let envelope = p.get_default_user().unwrap();
            assert_eq!(unsafe { envelope::count(&envelope, MAX_ENVELOPE_DEPTH) }, Ok(3));
            snapshot_default(&envelope).unwrap()
        })
        .collect();

    assert_eq!(results[0], results[1]);
    let root = &results[0];
    assert_eq!(root.req, GetUserRequest::new(1, "guest", false));
    assert!(root.resp.is_some());
    let keyed = root.resp_map.as_ref().unwrap();
    assert_eq!(keyed.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), [SHUFFLED_KEY]);
}

#[test]
fn paged_envelopes_match() {
    let req = GetUserRequest::new(-5, "page", false);
    let results: Vec<_> = producers().iter().map(|p| fetch(p.as_ref(), &req, true, 4)).collect();
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].envelope_count(), 4);
}

#[test]
fn probes_match() {
    for shuffle in [false, true] {
        for producer in producers() {
            assert_eq!(producer.probe_status(shuffle), Ok(StatusCode::for_shuffle(shuffle)));
            assert_eq!(producer.probe_pure(shuffle), probe_pure_expected(shuffle));
        }
    }
}

#[test]
fn both_copy_non_utf8_request_text_verbatim() {
    let bad = FfiGetUserRequest {
        user_id: 1,
        user_name: FfiString::from_bytes(&[b'x', 0xff]),
        is_male: false,
    };
    for producer in producers() {
        let envelope = producer.get_user(&bad, false).unwrap();
        assert_eq!(envelope.req, bad, "{:?}", producer.kind());
        let first = unsafe { &envelope.users.as_slice()[0] };
        assert_eq!(unsafe { first.user_name.as_bytes() }, &[b'x', 0xff]);

        // Decoding is left to the reader.
        assert!(matches!(
            snapshot_default(&envelope),
            Err(AbiError::InvalidUtf8 { valid_up_to: 1 })
        ));
    }
    drop(unsafe { bad.user_name.into_vec() });
}

#[test]
fn both_refuse_broken_request_header() {
    let mut bad = FfiGetUserRequest {
        user_id: 1,
        user_name: FfiString::from_bytes(&[0u8; 8]),
        is_male: false,
    };
    bad.user_name.cap = 4;
    for producer in producers() {
        assert!(producer.get_user(&bad, false).is_err(), "{:?}", producer.kind());
        assert!(producer.get_user_pages(&bad, true, 3).is_err(), "{:?}", producer.kind());
    }
    bad.user_name.cap = 8;
    drop(unsafe { bad.user_name.into_vec() });
}

#[test]
fn traversal_limit_applies_to_both() {
    let local = GetUserRequest::new(0, "deep", false).to_local();
    for producer in producers() {
        let envelope = producer.get_user_pages(&local, false, 10).unwrap();
        assert!(snapshot(&envelope, 8).is_err());
        assert_eq!(snapshot(&envelope, 9).map(|r| r.envelope_count()), Ok(10));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn producers_are_interchangeable(
        user_id in any::<i32>(),
        name in "\\PC{0,12}",
        is_male in any::<bool>(),
        shuffle in any::<bool>(),
        pages in 0u32..6,
    ) {
        let req = GetUserRequest::new(user_id, name, is_male);
        let results: Vec<_> = producers().iter().map(|p| fetch(p.as_ref(), &req, shuffle, pages)).collect();
        prop_assert_eq!(&results[0], &results[1]);
        prop_assert_eq!(&results[0].req, &req);
    }
}
