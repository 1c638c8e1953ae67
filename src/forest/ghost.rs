//! Ghost layer: remote leaves adjacent to the local partition.

use serde::{Deserialize, Serialize};

use crate::error::ForestNodesError;

/// A remote leaf mirrored into the local ghost layer. The owning rank and
/// the element's index within that rank are piggy-backed by the ghost
/// exchange that produced the layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GhostLeaf {
    /// Rank that owns this leaf.
    pub owner: usize,
    /// The leaf's local element number on the owning rank.
    pub remote_index: u32,
    /// Refinement level.
    pub level: u8,
    /// Child id within the parent, 0..4.
    pub child_id: u8,
}

/// The ordered collection of ghost leaves, indexed by ghost number as
/// referenced from topology events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GhostLayer {
    ghosts: Vec<GhostLeaf>,
}

impl GhostLayer {
    /// An empty layer, for serial runs.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_ghosts(ghosts: Vec<GhostLeaf>) -> Self {
        Self { ghosts }
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&GhostLeaf, ForestNodesError> {
        self.ghosts
            .get(index)
            .ok_or(ForestNodesError::GhostOutOfRange {
                index,
                count: self.ghosts.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &GhostLeaf> {
        self.ghosts.iter()
    }

    /// Check every ghost names a valid remote owner for this communicator.
    pub(crate) fn check(&self, my_rank: usize, size: usize) -> Result<(), ForestNodesError> {
        for (gi, g) in self.ghosts.iter().enumerate() {
            if g.owner == my_rank || g.owner >= size {
                return Err(ForestNodesError::GhostOwnerInvalid {
                    ghost: gi,
                    owner: g.owner,
                    size,
                });
            }
            if g.child_id >= 4 {
                return Err(ForestNodesError::InvalidChildId(g.child_id));
            }
        }
        Ok(())
    }
}
