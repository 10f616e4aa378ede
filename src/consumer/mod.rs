//! Consumer side - one capability, two bindings
//!
//! [`UserProducer`] is what consumer code depends on. Each binding adapts one
//! producer's calling convention (request by value or by address, free by
//! typed pointer or by integer address) and wraps every returned reference in
//! an [`Owned`] handle, so release happens exactly once no matter how the
//! caller leaves scope.

use crate::envelope::{self, MAX_ENVELOPE_DEPTH};
use crate::errors::AbiResult;
use crate::model::{FfiGetUserRequest, FfiGetUserResponse, GetUserResponse, Pure};
use crate::ownership::{Owned, Release};
use crate::producer::owned::{
    owned_get_default_user, owned_get_default_user_free_ret, owned_get_user, owned_get_user_free_ret,
    owned_get_user_pages, owned_get_user_pages_free_ret, owned_probe_pure, owned_probe_status,
};
use crate::producer::raw::{
    raw_get_default_user, raw_get_default_user_free_ret, raw_get_user, raw_get_user_free_ret,
    raw_get_user_pages, raw_get_user_pages_free_ret, raw_probe_pure, raw_probe_status,
};
use crate::producer::{ProducerKind, StatusCode};

pub type Envelope = Owned<FfiGetUserResponse>;

/// Everything a consumer can ask of a producer
pub trait UserProducer {
    fn kind(&self) -> ProducerKind;

    /// One page for `req`; `req` stays owned by the caller
    fn get_user(&self, req: &FfiGetUserRequest, shuffle: bool) -> AbiResult<Envelope>;

    fn get_default_user(&self) -> AbiResult<Envelope>;

    fn get_user_pages(&self, req: &FfiGetUserRequest, shuffle: bool, pages: u32) -> AbiResult<Envelope>;

    /// Decoded status code; codes outside the documented set are errors
    fn probe_status(&self, shuffle: bool) -> AbiResult<StatusCode>;

    fn probe_pure(&self, shuffle: bool) -> Pure;
}

/// Binding for the `owned_` producer
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnedBinding;

impl UserProducer for OwnedBinding {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Owned
    }

    fn get_user(&self, req: &FfiGetUserRequest, shuffle: bool) -> AbiResult<Envelope> {
        unsafe {
            Owned::from_raw(
                owned_get_user(*req, shuffle),
                Release::Typed(owned_get_user_free_ret),
                "owned_get_user",
            )
        }
    }

    fn get_default_user(&self) -> AbiResult<Envelope> {
        unsafe {
            Owned::from_raw(
                owned_get_default_user(),
                Release::Typed(owned_get_default_user_free_ret),
                "owned_get_default_user",
            )
        }
    }

    fn get_user_pages(&self, req: &FfiGetUserRequest, shuffle: bool, pages: u32) -> AbiResult<Envelope> {
        unsafe {
            Owned::from_raw(
                owned_get_user_pages(*req, shuffle, pages),
                Release::Typed(owned_get_user_pages_free_ret),
                "owned_get_user_pages",
            )
        }
    }

    fn probe_status(&self, shuffle: bool) -> AbiResult<StatusCode> {
        StatusCode::from_code(owned_probe_status(shuffle))
    }

    fn probe_pure(&self, shuffle: bool) -> Pure {
        owned_probe_pure(shuffle)
    }
}

/// Binding for the `raw_` producer
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBinding;

impl UserProducer for RawBinding {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Raw
    }

    fn get_user(&self, req: &FfiGetUserRequest, shuffle: bool) -> AbiResult<Envelope> {
        unsafe {
            Owned::from_raw(
                raw_get_user(req, shuffle),
                Release::Address(raw_get_user_free_ret),
                "raw_get_user",
            )
        }
    }

    fn get_default_user(&self) -> AbiResult<Envelope> {
        unsafe {
            Owned::from_raw(
                raw_get_default_user(),
                Release::Address(raw_get_default_user_free_ret),
                "raw_get_default_user",
            )
        }
    }

    fn get_user_pages(&self, req: &FfiGetUserRequest, shuffle: bool, pages: u32) -> AbiResult<Envelope> {
        unsafe {
            Owned::from_raw(
                raw_get_user_pages(req, shuffle, pages),
                Release::Address(raw_get_user_pages_free_ret),
                "raw_get_user_pages",
            )
        }
    }

    fn probe_status(&self, shuffle: bool) -> AbiResult<StatusCode> {
        StatusCode::from_code(raw_probe_status(shuffle))
    }

    fn probe_pure(&self, shuffle: bool) -> Pure {
        raw_probe_pure(shuffle)
    }
}

/// Binding for `kind`
pub fn binding(kind: ProducerKind) -> Box<dyn UserProducer> {
    match kind {
        ProducerKind::Owned => Box::new(OwnedBinding),
        ProducerKind::Raw => Box::new(RawBinding),
    }
}

/// Owned copy of an envelope tree, refusing trees deeper than `limit`
pub fn snapshot(envelope: &Envelope, limit: usize) -> AbiResult<GetUserResponse> {
    unsafe { GetUserResponse::from_repr_limited(envelope, limit) }
}

/// Nesting depth of an envelope tree within `limit`
pub fn depth(envelope: &Envelope, limit: usize) -> AbiResult<usize> {
    unsafe { envelope::depth(envelope, limit) }
}

/// Snapshot with the producer-side cap as the limit
pub fn snapshot_default(envelope: &Envelope) -> AbiResult<GetUserResponse> {
    snapshot(envelope, MAX_ENVELOPE_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GetUserRequest;

    #[test]
    fn both_bindings_report_their_kind() {
        for kind in ProducerKind::ALL {
            assert_eq!(binding(kind).kind(), kind);
        }
    }

    #[test]
    fn envelopes_release_on_drop() {
        let local = GetUserRequest::new(3, "cy", false).to_local();
        for kind in ProducerKind::ALL {
            let producer = binding(kind);
            let mut envelope = producer.get_user(&local, true).unwrap();
            let snap = snapshot_default(&envelope).unwrap();
            assert_eq!(snap.users.len(), 3);
            assert_eq!(snap.users[0].user_id, 5);
            envelope.mark_consumed().unwrap();
        }
    }

    #[test]
    fn snapshot_limit_is_enforced() {
        let local = GetUserRequest::new(0, "d", false).to_local();
        let envelope = RawBinding.get_user_pages(&local, false, 4).unwrap();
        assert_eq!(depth(&envelope, 8), Ok(3));
        assert!(snapshot(&envelope, 2).is_err());
        assert!(snapshot(&envelope, 3).is_ok());
    }
}
