//! Recursive envelope - lifecycle, depth policy and teardown
//!
//! An envelope may point at a next page (`resp`) and at keyed sub-envelopes
//! (`resp_map`). Trees are acyclic because every link is a fresh allocation
//! made while the tree is built.
//!
//! Depth is bounded twice: producers never build past [`MAX_ENVELOPE_DEPTH`],
//! and consumers traverse with an explicit limit. Teardown uses a work list,
//! so release cost never depends on the call stack.

use crate::core::{AbiAlloc, Reclaim};
use crate::errors::{AbiError, AbiResult};
use crate::logging::trace;
use crate::model::FfiGetUserResponse;
use serde::{Deserialize, Serialize};

/// Deepest chain a producer will build (root is depth 0)
pub const MAX_ENVELOPE_DEPTH: usize = 64;

/// Lifecycle of one envelope tree. Only forward moves are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeState {
    /// Allocated by the producer, still being filled
    Unpopulated,
    /// Returned to the consumer, readable
    Populated,
    /// Consumer finished reading, release pending
    Consumed,
    /// Paired free call made; terminal
    Freed,
}

impl EnvelopeState {
    pub fn can_advance(self, to: EnvelopeState) -> bool {
        self != EnvelopeState::Freed && to > self
    }

    /// Move to `to` or report the illegal transition
    pub fn advance(self, to: EnvelopeState) -> AbiResult<EnvelopeState> {
        if self.can_advance(to) {
            Ok(to)
        } else {
            Err(AbiError::InvalidTransition { from: self, to })
        }
    }

    pub fn is_readable(self) -> bool {
        matches!(self, EnvelopeState::Populated | EnvelopeState::Consumed)
    }
}

/// Deepest nesting below `root`, failing once it passes `limit`.
///
/// # Safety
/// Every envelope reachable from `root` must be valid.
pub unsafe fn depth(root: &FfiGetUserResponse, limit: usize) -> AbiResult<usize> {
    let mut deepest = 0;
    let mut pending: Vec<(&FfiGetUserResponse, usize)> = vec![(root, 0)];

    while let Some((node, level)) = pending.pop() {
        if level > limit {
            return Err(AbiError::DepthExceeded { limit });
        }
        deepest = deepest.max(level);

        if let Some(next) = node.resp.as_ref() {
            pending.push((next, level + 1));
        }
        if let Some(map) = node.resp_map.as_ref() {
            pending.extend(map.iter().map(|entry| (&entry.value, level + 1)));
        }
    }
    Ok(deepest)
}

/// Count envelopes in a tree, root included, within `limit`.
///
/// # Safety
/// Same as [`depth`].
pub unsafe fn count(root: &FfiGetUserResponse, limit: usize) -> AbiResult<usize> {
    let mut total = 0;
    let mut pending: Vec<(&FfiGetUserResponse, usize)> = vec![(root, 0)];

    while let Some((node, level)) = pending.pop() {
        if level > limit {
            return Err(AbiError::DepthExceeded { limit });
        }
        total += 1;

        if let Some(next) = node.resp.as_ref() {
            pending.push((next, level + 1));
        }
        if let Some(map) = node.resp_map.as_ref() {
            pending.extend(map.iter().map(|entry| (&entry.value, level + 1)));
        }
    }
    Ok(total)
}

/// Release a whole envelope tree and return how many envelopes it held.
///
/// Users, texts, maps and the embedded request copy are released with each
/// envelope. A chain of depth D releases D + 1 envelopes.
///
/// # Safety
/// Every allocation in the tree must belong to strategy `A` and none of it may
/// be referenced again.
pub unsafe fn release_tree<A: AbiAlloc>(root: FfiGetUserResponse) -> usize {
    let mut released = 0;
    let mut pending = vec![root];

    while let Some(node) = pending.pop() {
        let FfiGetUserResponse {
            users,
            resp,
            resp_map,
            req,
        } = node;

        users.reclaim::<A>();
        req.reclaim::<A>();

        if !resp.is_null() {
            pending.push(A::take_box(resp));
        }
        if !resp_map.is_null() {
            A::reclaim_array(A::take_box(resp_map), |entry| {
                entry.key.reclaim::<A>();
                pending.push(entry.value);
            });
        }
        released += 1;
    }

    trace!(event = "release_tree", strategy = A::NAME, envelopes = released);
    released
}

/// Release a boxed root. Null releases nothing and returns 0.
///
/// # Safety
/// Same as [`release_tree`], and `root` must come from `A::alloc_box`.
pub unsafe fn release_boxed<A: AbiAlloc>(root: *mut FfiGetUserResponse) -> usize {
    if root.is_null() {
        return 0;
    }
    release_tree::<A>(A::take_box(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConvRepr, LayoutAlloc, VecAlloc};
    use crate::model::{GetUserRequest, GetUserResponse};
    use std::ptr;

    fn page(id: i32) -> GetUserResponse {
        GetUserResponse {
            req: GetUserRequest::new(id, "page", false),
            ..Default::default()
        }
    }

    fn linked(depth: usize) -> GetUserResponse {
        (0..depth).fold(page(depth as i32), |next, level| GetUserResponse {
            resp: Some(Box::new(next)),
            ..page(level as i32)
        })
    }

    #[test]
    fn states_only_move_forward() {
        use EnvelopeState::*;
        assert_eq!(Populated.advance(Consumed), Ok(Consumed));
        assert_eq!(Populated.advance(Freed), Ok(Freed));
        assert!(Consumed.advance(Populated).is_err());
        assert!(Freed.advance(Freed).is_err());
        assert_eq!(
            Consumed.advance(Consumed),
            Err(AbiError::InvalidTransition { from: Consumed, to: Consumed })
        );
        assert!(Consumed.is_readable());
        assert!(!Freed.is_readable());
    }

    #[test]
    fn depth_and_count_of_chain() {
        let repr = linked(4).into_repr();
        unsafe {
            assert_eq!(depth(&repr, MAX_ENVELOPE_DEPTH), Ok(4));
            assert_eq!(count(&repr, MAX_ENVELOPE_DEPTH), Ok(5));
            assert_eq!(depth(&repr, 3), Err(AbiError::DepthExceeded { limit: 3 }));
            assert_eq!(release_tree::<VecAlloc>(repr), 5);
        }
    }

    #[test]
    fn keyed_sub_envelopes_count_one_level_down() {
        let mut root = page(0);
        root.resp_map = Some(vec![("a".to_string(), linked(2)), ("b".to_string(), page(9))].into());
        let repr = root.into_repr();
        unsafe {
            assert_eq!(depth(&repr, MAX_ENVELOPE_DEPTH), Ok(3));
            assert_eq!(count(&repr, MAX_ENVELOPE_DEPTH), Ok(5));
            assert_eq!(release_tree::<VecAlloc>(repr), 5);
        }
    }

    #[test]
    fn deep_chain_releases_without_recursion() {
        let depth = 10_000;
        let mut head = LayoutAlloc::alloc_box(FfiGetUserResponse {
            users: Default::default(),
            resp: ptr::null_mut(),
            resp_map: ptr::null_mut(),
            req: GetUserRequest::default().into_repr(),
        })
        .unwrap();
        for _ in 0..depth {
            head = LayoutAlloc::alloc_box(FfiGetUserResponse {
                users: Default::default(),
                resp: head,
                resp_map: ptr::null_mut(),
                req: GetUserRequest::default().into_repr(),
            })
            .unwrap();
        }
        assert_eq!(unsafe { release_boxed::<LayoutAlloc>(head) }, depth + 1);
    }

    #[test]
    fn null_root_releases_nothing() {
        assert_eq!(unsafe { release_boxed::<VecAlloc>(ptr::null_mut()) }, 0);
    }
}
