//! Globally consistent node numbering for the conforming triangle mesh
//! induced by a 2:1 balanced quadtree forest.
//!
//! [`TriangleNodes::build`] runs the full construction on one rank: it
//! consumes the local [`ForestView`](crate::forest::ForestView) and the
//! topology event stream, elects an owner rank for every node on a
//! partition boundary, exchanges node numbers with the peer ranks, and
//! returns the finished lookup structure.

pub mod builder;
pub mod exchange;
pub mod registry;
pub mod schema;

use serde::{Deserialize, Serialize};

use crate::comm::{Communicator, NodeCommTags};
use crate::error::ForestNodesError;
use crate::forest::{ForestTopology, ForestView};
use crate::nodes::builder::NodeBuilder;

/// Construction options.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TriangleNodesOptions {
    /// Subdivide every leaf into a triangle fan about its center instead
    /// of the diagonal half split.
    pub full_style: bool,
    /// Number the triangle-face midpoints as nodes too (25 positions per
    /// element instead of 9).
    pub with_faces: bool,
}

impl TriangleNodesOptions {
    pub fn full_style(mut self, yes: bool) -> Self {
        self.full_style = yes;
        self
    }

    pub fn with_faces(mut self, yes: bool) -> Self {
        self.with_faces = yes;
        self
    }
}

/// The per-rank view of which local node indices are visible to one rank.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SharerRank {
    /// The sharing rank (the local rank for the self record).
    pub rank: usize,
    /// Local node indices shared with this rank, owned nodes first, each
    /// group in canonical order.
    pub shared_nodes: Vec<u32>,
    /// Start of this rank's owned range within our local indexing.
    pub owned_offset: u32,
    /// Number of our local nodes owned by this rank.
    pub owned_count: u32,
    /// Start of the locally-owned entries within `shared_nodes`.
    pub shared_mine_offset: u32,
    /// Number of locally-owned entries within `shared_nodes`.
    pub shared_mine_count: u32,
}

/// Lookup structure defining the node numbering of the triangle mesh.
///
/// Local node indices are `0..num_local_nodes`: owned nodes first in
/// canonical order, then shared-in nodes grouped by owner rank. The node
/// at local index `n >= owned_count` has global id
/// `nonlocal_nodes[n - owned_count]`; owned nodes map to
/// `global_offset + n`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TriangleNodes {
    pub full_style: bool,
    pub with_faces: bool,
    /// Rank this numbering was built on.
    pub rank: usize,
    /// Node positions per element: 9, or 25 with faces.
    pub vnodes: usize,
    pub num_local_elements: usize,
    /// Nodes owned by this rank; they occupy the contiguous global range
    /// starting at `global_offset`.
    pub owned_count: u32,
    /// Owned plus shared-in nodes.
    pub num_local_nodes: u32,
    /// First global id owned by this rank.
    pub global_offset: u64,
    /// `num_local_elements * vnodes` local node indices; unused positions
    /// of an element's configuration hold [`schema::UNSET_NODE`].
    pub element_nodes: Vec<i32>,
    /// Per element: hanging-face descriptor (child id and hanging axes).
    pub face_code: Vec<u8>,
    /// Per element: triangulation configuration byte in {0..16, 32}.
    pub configuration: Vec<u8>,
    /// Global id of each shared-in node, strictly increasing.
    pub nonlocal_nodes: Vec<u64>,
    /// Owned node count of every rank.
    pub global_owned_count: Vec<u32>,
    /// Exclusive scan of `global_owned_count`, length ranks + 1.
    pub global_offsets: Vec<u64>,
    /// One record per peer rank plus the local record; empty when this
    /// rank has no peers.
    pub sharers: Vec<SharerRank>,
}

impl TriangleNodes {
    /// Build the node numbering for this rank's partition.
    pub fn build<C, T>(
        view: &ForestView,
        topology: &T,
        comm: &C,
        options: TriangleNodesOptions,
    ) -> Result<Self, ForestNodesError>
    where
        C: Communicator,
        T: ForestTopology + ?Sized,
    {
        Self::build_with_tags(view, topology, comm, options, NodeCommTags::default())
    }

    /// Build with explicit communication tags, for callers multiplexing
    /// several protocols over one communicator.
    pub fn build_with_tags<C, T>(
        view: &ForestView,
        topology: &T,
        comm: &C,
        options: TriangleNodesOptions,
        tags: NodeCommTags,
    ) -> Result<Self, ForestNodesError>
    where
        C: Communicator,
        T: ForestTopology + ?Sized,
    {
        NodeBuilder::new(view, comm, options, tags).run(topology)
    }

    /// The local node index at an element position, if that position is
    /// populated by the element's configuration.
    pub fn node(&self, element: usize, position: usize) -> Option<u32> {
        let v = *self.element_nodes.get(element * self.vnodes + position)?;
        (v >= 0).then_some(v as u32)
    }

    /// The global id of a local node index.
    pub fn global_id(&self, local: u32) -> Option<u64> {
        if local < self.owned_count {
            Some(self.global_offset + local as u64)
        } else {
            self.nonlocal_nodes
                .get((local - self.owned_count) as usize)
                .copied()
        }
    }

    /// Total number of nodes across all ranks.
    pub fn global_num_nodes(&self) -> u64 {
        self.global_offsets.last().copied().unwrap_or(0)
    }

    /// Validate the structural invariants of the finished numbering.
    ///
    /// Checks everything that is locally checkable: element-slot
    /// population against the configuration tables, sentinel discipline,
    /// offset-scan consistency, monotonicity of the non-local table and
    /// its disjointness from the owned global range, and sharer index
    /// bounds.
    pub fn validate_invariants(&self) -> Result<(), ForestNodesError> {
        fn viol(msg: String) -> Result<(), ForestNodesError> {
            Err(ForestNodesError::InvariantViolation(msg))
        }

        let ne = self.num_local_elements;
        if self.vnodes != schema::vnodes(self.with_faces) {
            return viol(format!("vnodes {} does not match with_faces", self.vnodes));
        }
        if self.element_nodes.len() != ne * self.vnodes {
            return viol(format!(
                "element table has {} entries, expected {}",
                self.element_nodes.len(),
                ne * self.vnodes
            ));
        }
        if self.configuration.len() != ne || self.face_code.len() != ne {
            return viol("configuration/face_code length mismatch".into());
        }
        if self.num_local_nodes != self.owned_count + self.nonlocal_nodes.len() as u32 {
            return viol("num_local_nodes is not owned_count + num_shared".into());
        }

        let nranks = self.global_owned_count.len();
        if self.rank >= nranks || self.global_offsets.len() != nranks + 1 {
            return viol("global offset table sized inconsistently".into());
        }
        if self.global_offsets[0] != 0 {
            return viol("global offsets do not start at zero".into());
        }
        for q in 0..nranks {
            let step = self.global_offsets[q] + self.global_owned_count[q] as u64;
            if self.global_offsets[q + 1] != step {
                return viol(format!("global offsets are not the scan of counts at {q}"));
            }
        }
        if self.global_offset != self.global_offsets[self.rank]
            || self.owned_count != self.global_owned_count[self.rank]
        {
            return viol("own rank's entries disagree with the offset table".into());
        }

        for le in 0..ne {
            let config = self.configuration[le];
            if config > 16 && config != schema::CONFIG_FULL {
                return viol(format!("element {le} has invalid configuration {config}"));
            }
            let cind = schema::config_index(config);
            let mut populated = [false; schema::VNODES_WITH_FACES];
            let ncorner = schema::CONFIG_NODE_COUNT[cind][0] as usize;
            for &pos in &schema::CONFIG_CORNERS[cind][..ncorner] {
                populated[pos as usize] = true;
            }
            if self.with_faces {
                let nface = schema::CONFIG_NODE_COUNT[cind][1] as usize;
                for &pos in &schema::CONFIG_FACES[cind][..nface] {
                    populated[pos as usize] = true;
                }
            }
            for pos in 0..self.vnodes {
                let v = self.element_nodes[le * self.vnodes + pos];
                if populated[pos] {
                    if v < 0 || v as u32 >= self.num_local_nodes {
                        return viol(format!(
                            "element {le} position {pos} holds {v}, outside local nodes"
                        ));
                    }
                } else if v != schema::UNSET_NODE {
                    return viol(format!(
                        "element {le} position {pos} populated outside its configuration"
                    ));
                }
            }
        }

        let total = self.global_num_nodes();
        let own = self.global_offset..self.global_offset + self.owned_count as u64;
        let mut prev: Option<u64> = None;
        for (i, &gni) in self.nonlocal_nodes.iter().enumerate() {
            if gni >= total {
                return viol(format!("nonlocal node {i} beyond global count"));
            }
            if own.contains(&gni) {
                return viol(format!("nonlocal node {i} inside the owned range"));
            }
            if prev.is_some_and(|p| p >= gni) {
                return viol(format!("nonlocal nodes not strictly increasing at {i}"));
            }
            prev = Some(gni);
        }

        for sharer in &self.sharers {
            for &n in &sharer.shared_nodes {
                if n >= self.num_local_nodes {
                    return viol(format!(
                        "sharer {} lists node {n} beyond local nodes",
                        sharer.rank
                    ));
                }
            }
            let mine_end = sharer.shared_mine_offset as usize + sharer.shared_mine_count as usize;
            if mine_end > sharer.shared_nodes.len() {
                return viol(format!("sharer {} shared_mine range overflows", sharer.rank));
            }
            if sharer
                .shared_nodes
                .windows(2)
                .any(|w| w[0] >= w[1])
            {
                return viol(format!(
                    "sharer {} list not strictly increasing",
                    sharer.rank
                ));
            }
        }

        Ok(())
    }
}
