//! `ForestNodesError`: unified error type for the forest-nodes public APIs.
//!
//! Construction of a node numbering is transactional: every error aborts the
//! whole build and the caller observes either a fully valid `TriangleNodes`
//! or none. Conditions that cannot be reached through the public API are
//! debug assertions instead of variants.

use thiserror::Error;

/// Unified error type for forest-nodes operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForestNodesError {
    /// A leaf or ghost carries a child id outside 0..4.
    #[error("invalid child id {0} (quadtree children are 0..4)")]
    InvalidChildId(u8),
    /// A ghost entry names an owner rank that is local or out of range.
    #[error("ghost {ghost} names invalid owner rank {owner} (communicator size {size})")]
    GhostOwnerInvalid {
        ghost: usize,
        owner: usize,
        size: usize,
    },
    /// An event referenced a local element index beyond the leaf array.
    #[error("local element index {index} out of range (have {count} leaves)")]
    ElementOutOfRange { index: usize, count: usize },
    /// An event referenced a ghost index beyond the ghost layer.
    #[error("ghost index {index} out of range (have {count} ghosts)")]
    GhostOutOfRange { index: usize, count: usize },
    /// The traversal did not visit every local leaf exactly once.
    #[error("traversal visited {got} volumes, expected {expected}")]
    TraversalCountMismatch { expected: usize, got: usize },
    /// Two registrations targeted the same element slot; the topology
    /// stream violated its exactly-once contract or the forest is not
    /// 2:1 balanced.
    #[error("element {element} position {position} registered twice")]
    NodeSlotOccupied { element: usize, position: usize },
    /// A peer queried a position outside our element table.
    #[error("peer {peer} queried position {position} beyond limit {limit}")]
    QueryOutOfRange { peer: usize, position: u32, limit: u32 },
    /// A peer queried a position that no node was registered at.
    #[error("peer {peer} queried unregistered position {position}")]
    QueryNotRegistered { peer: usize, position: u32 },
    /// A reply named an owner-local index outside the owner's owned range.
    #[error("peer {neighbor} replied with index {index} outside owned count {owned}")]
    ReplyOutOfRange {
        neighbor: usize,
        index: u32,
        owned: u32,
    },
    /// A completed message did not carry the expected number of bytes.
    #[error("message from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A post-construction invariant check failed.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
