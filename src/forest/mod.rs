//! Input model: the local view of a distributed, 2:1 face-balanced
//! quadtree forest. Leaf enumeration, ghost layer, and topology events are
//! produced externally; this crate only consumes them.

pub mod ghost;
pub mod leaf;
pub mod topology;

pub use ghost::{GhostLayer, GhostLeaf};
pub use leaf::{Leaf, CORNER_FACES, FACE_CORNERS};
pub use topology::{
    CornerEvent, CornerSide, ElementRef, FaceEvent, ForestTopology, FullSide, HangingSide,
    TopologyEvent, VolumeEvent,
};

use serde::{Deserialize, Serialize};

use crate::error::ForestNodesError;

/// The local partition: owned leaves plus the ghost layer around them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ForestView {
    pub leaves: Vec<Leaf>,
    pub ghost: GhostLayer,
}

impl ForestView {
    pub fn new(leaves: Vec<Leaf>, ghost: GhostLayer) -> Self {
        Self { leaves, ghost }
    }

    /// A serial view with no ghost layer.
    pub fn serial(leaves: Vec<Leaf>) -> Self {
        Self {
            leaves,
            ghost: GhostLayer::empty(),
        }
    }

    pub fn num_local_elements(&self) -> usize {
        self.leaves.len()
    }

    /// Up-front precondition checks for this rank and communicator size.
    pub(crate) fn check(&self, my_rank: usize, size: usize) -> Result<(), ForestNodesError> {
        for leaf in &self.leaves {
            leaf.check()?;
        }
        self.ghost.check(my_rank, size)
    }
}
