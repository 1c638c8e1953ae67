//! # forest-nodes
//!
//! forest-nodes computes a globally consistent, distributed node numbering
//! for the conforming triangle mesh induced by splitting every leaf of a
//! 2:1 face-balanced adaptive quadtree forest into triangles. The forest
//! itself (leaf enumeration, ghost layer, topology traversal) is produced
//! by the host mesh library; this crate consumes those inputs and settles
//! the hard part: distributed consensus on the identity and ownership of
//! nodes that live on inter-process boundaries.
//!
//! ## Features
//! - Candidate-node registry collecting (rank, element, position)
//!   contributions per geometric node
//! - Per-element triangulation configuration and hanging-face codes
//! - Ownership election by smallest contributing rank, deterministic
//!   canonical ordering of owned nodes
//! - Two-phase nonblocking query/reply exchange between owner and sharer
//!   ranks, deadlock-free by rank asymmetry
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! forest-nodes = "0.2"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! Build a numbering from a forest view and its topology events:
//!
//! ```rust
//! use forest_nodes::prelude::*;
//!
//! # fn main() -> Result<(), forest_nodes::error::ForestNodesError> {
//! let view = ForestView::serial(vec![Leaf::new(0, 0)]);
//! let events = vec![
//!     TopologyEvent::Volume(VolumeEvent { element: 0 }),
//!     TopologyEvent::Corner(CornerEvent {
//!         sides: vec![CornerSide { elem: ElementRef::Local(0), corner: 0 }],
//!     }),
//!     TopologyEvent::Corner(CornerEvent {
//!         sides: vec![CornerSide { elem: ElementRef::Local(0), corner: 1 }],
//!     }),
//!     TopologyEvent::Corner(CornerEvent {
//!         sides: vec![CornerSide { elem: ElementRef::Local(0), corner: 2 }],
//!     }),
//!     TopologyEvent::Corner(CornerEvent {
//!         sides: vec![CornerSide { elem: ElementRef::Local(0), corner: 3 }],
//!     }),
//! ];
//! let nodes = TriangleNodes::build(
//!     &view,
//!     &events,
//!     &NoComm,
//!     TriangleNodesOptions::default(),
//! )?;
//! assert_eq!(nodes.owned_count, 4);
//! # Ok(())
//! # }
//! ```

pub mod comm;
pub mod error;
pub mod forest;
pub mod nodes;
pub mod wire;

/// A convenient prelude to import the most-used traits & types.
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, NoComm, NodeCommTags, ThreadComm, Wait};
    pub use crate::error::ForestNodesError;
    pub use crate::forest::{
        CornerEvent, CornerSide, ElementRef, FaceEvent, ForestTopology, ForestView, FullSide,
        GhostLayer, GhostLeaf, HangingSide, Leaf, TopologyEvent, VolumeEvent,
    };
    pub use crate::nodes::{SharerRank, TriangleNodes, TriangleNodesOptions};
}
