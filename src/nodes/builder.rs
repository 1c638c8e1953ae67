//! Construction of the node numbering: incidence traversal, ownership
//! election, canonical ordering, offset exchange, and finalization.
//!
//! Phases run strictly in order: traverse, elect, allgather offsets, post
//! queries/replies, drain, finalize. Only the two exchange phases involve
//! messages; everything else is rank-local.

use log::debug;

use crate::comm::{Communicator, NodeCommTags};
use crate::error::ForestNodesError;
use crate::forest::{
    CornerEvent, ElementRef, FaceEvent, ForestTopology, ForestView, FullSide, HangingSide,
    TopologyEvent, VolumeEvent, CORNER_FACES, FACE_CORNERS,
};
use crate::nodes::exchange::{self, ExchangeContext, Peer};
use crate::nodes::registry::{Codim, NodeRegistry};
use crate::nodes::schema;
use crate::nodes::{SharerRank, TriangleNodes, TriangleNodesOptions};
use crate::wire::{cast_slice, cast_slice_mut, WireCount};

#[inline]
fn face_index(face: u8) -> usize {
    debug_assert!(face < 4);
    (face & 3) as usize
}

#[inline]
fn corner_index(corner: u8) -> u8 {
    debug_assert!(corner < 4);
    corner & 3
}

/// Per-rank construction state, alive for one `run`.
pub(crate) struct NodeBuilder<'a, C: Communicator> {
    view: &'a ForestView,
    comm: &'a C,
    opts: TriangleNodesOptions,
    tags: NodeCommTags,
    rank: usize,
    size: usize,
    vnodes: usize,
    /// Running local element number during traversal.
    lenum: u32,
    registry: NodeRegistry,
    /// Candidate ids per element slot until finalization rewrites them.
    element_nodes: Vec<i32>,
    face_code: Vec<u8>,
    configuration: Vec<u8>,
    /// Locally owned candidates, canonically sorted after election.
    ownsort: Vec<u32>,
    num_owned: u32,
    /// Nodes we both own and share.
    num_owned_shared: u32,
    /// Nodes we share but do not own.
    num_shared: u32,
    peers: Vec<Peer<C>>,
    /// Rank to peer index plus one; zero means no peer yet.
    proc_peer: Vec<u32>,
    /// Peer indices in ascending rank order.
    sorted_peers: Vec<usize>,
    global_owned_count: Vec<u32>,
    /// Exclusive scan of the owned counts, length size + 1.
    goffset: Vec<u64>,
    nonlocal_nodes: Vec<u64>,
    sharers: Vec<SharerRank>,
    locsharer: Option<usize>,
}

impl<'a, C: Communicator> NodeBuilder<'a, C> {
    pub fn new(
        view: &'a ForestView,
        comm: &'a C,
        opts: TriangleNodesOptions,
        tags: NodeCommTags,
    ) -> Self {
        let vnodes = schema::vnodes(opts.with_faces);
        let ne = view.num_local_elements();
        let size = comm.size();
        Self {
            view,
            comm,
            opts,
            tags,
            rank: comm.rank(),
            size,
            vnodes,
            lenum: 0,
            registry: NodeRegistry::new(),
            element_nodes: vec![schema::UNSET_NODE; ne * vnodes],
            face_code: vec![0; ne],
            configuration: vec![0; ne],
            ownsort: Vec::new(),
            num_owned: 0,
            num_owned_shared: 0,
            num_shared: 0,
            peers: Vec::new(),
            proc_peer: vec![0; size],
            sorted_peers: Vec::new(),
            global_owned_count: Vec::new(),
            goffset: Vec::new(),
            nonlocal_nodes: Vec::new(),
            sharers: Vec::new(),
            locsharer: None,
        }
    }

    pub fn run<T: ForestTopology + ?Sized>(
        mut self,
        topology: &T,
    ) -> Result<TriangleNodes, ForestNodesError> {
        self.view.check(self.rank, self.size)?;
        self.traverse(topology)?;
        self.elect();
        debug!(
            "node construction: owned {} shared {}",
            self.num_owned, self.num_shared
        );
        self.sort_and_gather();
        self.sort_peers();
        exchange::post_query_reply(&mut self.peers, self.comm, self.tags);
        {
            let mut ctx = ExchangeContext {
                my_rank: self.rank,
                vnodes: self.vnodes,
                num_owned: self.num_owned,
                num_local_elements: self.view.num_local_elements(),
                element_nodes: &self.element_nodes,
                registry: &mut self.registry,
                goffset: &self.goffset,
                global_owned_count: &self.global_owned_count,
                nonlocal_nodes: &mut self.nonlocal_nodes,
            };
            exchange::drain(&mut self.peers, self.comm, self.tags, &mut ctx)?;
        }
        self.assign_element_nodes()?;
        self.populate_sharers();
        self.finish()
    }

    // --- traversal ---

    fn traverse<T: ForestTopology + ?Sized>(
        &mut self,
        topology: &T,
    ) -> Result<(), ForestNodesError> {
        topology.for_each_event(&mut |ev| match ev {
            TopologyEvent::Volume(v) => self.volume(v),
            TopologyEvent::Face(f) => self.face(f),
            TopologyEvent::Corner(c) => self.corner(c),
        })?;
        let got = self.lenum as usize;
        let expected = self.view.num_local_elements();
        if got != expected {
            return Err(ForestNodesError::TraversalCountMismatch { expected, got });
        }
        Ok(())
    }

    fn volume(&mut self, v: &VolumeEvent) -> Result<(), ForestNodesError> {
        let le = self.lenum;
        if v.element != le || (le as usize) >= self.view.leaves.len() {
            return Err(ForestNodesError::TraversalCountMismatch {
                expected: self.view.leaves.len(),
                got: v.element as usize + 1,
            });
        }
        self.lenum += 1;
        let lei = le as usize;
        let child_id = self.view.leaves[lei].child_id;
        debug_assert_eq!(self.configuration[lei], 0);
        debug_assert_eq!(self.face_code[lei], 0);

        if self.opts.full_style {
            self.configuration[lei] = schema::CONFIG_FULL;
            self.register_local(&mut None, le, schema::CENTER, Codim::Corner)?;
            if self.opts.with_faces {
                for j in 0..4 {
                    self.register_local(&mut None, le, schema::CENTER_FACE[j], Codim::Face)?;
                }
            }
        } else {
            if child_id == 1 || child_id == 2 {
                self.configuration[lei] = schema::CONFIG_HALF;
            }
            if self.opts.with_faces {
                self.register_local(&mut None, le, schema::CENTER, Codim::Face)?;
            }
        }
        Ok(())
    }

    fn face(&mut self, ev: &FaceEvent) -> Result<(), ForestNodesError> {
        match *ev {
            FaceEvent::Boundary { side } => {
                // A boundary face does not contribute to the configuration.
                if self.opts.with_faces {
                    match side.elem {
                        ElementRef::Local(le) => {
                            self.check_local(le)?;
                            let pos = schema::FACE_MIDPOINT[face_index(side.face)];
                            self.register_local(&mut None, le, pos, Codim::Face)?;
                        }
                        ElementRef::Ghost(_) => {
                            debug_assert!(false, "boundary face with ghost side");
                        }
                    }
                }
                Ok(())
            }
            FaceEvent::Conforming { sides, .. } => {
                // Same-size connection: one midpoint shared by both sides.
                if self.opts.with_faces {
                    let mut lni = None;
                    for s in &sides {
                        let pos = schema::FACE_MIDPOINT[face_index(s.face)];
                        self.register_side(&mut lni, s.elem, pos, Codim::Face)?;
                    }
                }
                Ok(())
            }
            FaceEvent::Hanging {
                full,
                hanging,
                orientation,
            } => self.hanging_face(full, hanging, orientation),
        }
    }

    fn hanging_face(
        &mut self,
        full: FullSide,
        hanging: HangingSide,
        orientation: u8,
    ) -> Result<(), ForestNodesError> {
        let swap = (orientation & 1) as usize;
        let face = face_index(full.face);
        let mut lni: Option<u32> = None;
        let mut lnh: [Option<u32>; 2] = [None, None];

        match full.elem {
            ElementRef::Local(le) => {
                self.check_local(le)?;
                let lei = le as usize;
                if (self.configuration[lei] & !schema::CONFIG_HALF) == 0 {
                    // A half subdivision must be promoted to full.
                    if !self.opts.with_faces {
                        self.register_local(&mut None, le, schema::CENTER, Codim::Corner)?;
                    } else {
                        self.center_to_corner(le)?;
                        for j in 0..4 {
                            self.register_local(
                                &mut None,
                                le,
                                schema::CENTER_FACE[j],
                                Codim::Face,
                            )?;
                        }
                    }
                }
                self.configuration[lei] &= !(schema::CONFIG_HALF | schema::CONFIG_FULL);
                self.configuration[lei] |= 1 << face;
                self.register_local(&mut lni, le, schema::FACE_MIDPOINT[face], Codim::Corner)?;
                if self.opts.with_faces {
                    self.register_local(&mut None, le, schema::SPLIT_FACE[face], Codim::Face)?;
                    for j in 0..2 {
                        self.register_local(
                            &mut lnh[j],
                            le,
                            schema::HALF_FACE[face][j],
                            Codim::Face,
                        )?;
                    }
                }
            }
            ElementRef::Ghost(gi) => {
                self.register_ghost(&mut lni, gi, schema::FACE_MIDPOINT[face], Codim::Corner)?;
                if self.opts.with_faces {
                    for j in 0..2 {
                        self.register_ghost(
                            &mut lnh[j],
                            gi,
                            schema::HALF_FACE[face][j],
                            Codim::Face,
                        )?;
                    }
                }
            }
        }

        // Each small side contributes the shared midpoint corner, its own
        // face midpoint, and its face code.
        let hface = face_index(hanging.face);
        for j in 0..2 {
            let corner_pos = FACE_CORNERS[hface][j ^ 1];
            let paired = j ^ swap;
            match hanging.halves[j] {
                ElementRef::Local(le) => {
                    self.check_local(le)?;
                    self.register_local(&mut lni, le, corner_pos, Codim::Corner)?;
                    if self.opts.with_faces {
                        self.register_local(
                            &mut lnh[paired],
                            le,
                            schema::FACE_MIDPOINT[hface],
                            Codim::Face,
                        )?;
                    }
                    let lei = le as usize;
                    let child_id = self.view.leaves[lei].child_id;
                    debug_assert_eq!(child_id, FACE_CORNERS[hface][j]);
                    debug_assert_eq!(hface as u8, CORNER_FACES[child_id as usize][hface >> 1]);
                    let bit = schema::face_code_hanging_bit(hface as u8);
                    debug_assert_eq!(self.face_code[lei] & bit, 0);
                    self.face_code[lei] |= bit | child_id;
                }
                ElementRef::Ghost(gi) => {
                    self.register_ghost(&mut lni, gi, corner_pos, Codim::Corner)?;
                    if self.opts.with_faces {
                        self.register_ghost(
                            &mut lnh[paired],
                            gi,
                            schema::FACE_MIDPOINT[hface],
                            Codim::Face,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn corner(&mut self, ev: &CornerEvent) -> Result<(), ForestNodesError> {
        let mut lni = None;
        for side in &ev.sides {
            self.register_side(&mut lni, side.elem, corner_index(side.corner), Codim::Corner)?;
        }
        Ok(())
    }

    // --- registration helpers ---

    fn check_local(&self, le: u32) -> Result<(), ForestNodesError> {
        let count = self.view.leaves.len();
        if (le as usize) < count {
            Ok(())
        } else {
            Err(ForestNodesError::ElementOutOfRange {
                index: le as usize,
                count,
            })
        }
    }

    fn register_side(
        &mut self,
        lni: &mut Option<u32>,
        elem: ElementRef,
        pos: u8,
        codim: Codim,
    ) -> Result<(), ForestNodesError> {
        match elem {
            ElementRef::Local(le) => {
                self.check_local(le)?;
                self.register_local(lni, le, pos, codim)
            }
            ElementRef::Ghost(gi) => self.register_ghost(lni, gi, pos, codim),
        }
    }

    fn register_local(
        &mut self,
        lni: &mut Option<u32>,
        le: u32,
        pos: u8,
        codim: Codim,
    ) -> Result<(), ForestNodesError> {
        let id = self.registry.register(lni, self.rank, le, pos, codim);
        let slot = le as usize * self.vnodes + pos as usize;
        if self.element_nodes[slot] != schema::UNSET_NODE {
            return Err(ForestNodesError::NodeSlotOccupied {
                element: le as usize,
                position: pos as usize,
            });
        }
        self.element_nodes[slot] = id as i32;
        Ok(())
    }

    fn register_ghost(
        &mut self,
        lni: &mut Option<u32>,
        gi: u32,
        pos: u8,
        codim: Codim,
    ) -> Result<(), ForestNodesError> {
        debug_assert!(!schema::ALWAYS_OWNED[pos as usize]);
        let g = self.view.ghost.get(gi as usize)?;
        self.registry.register(lni, g.owner, g.remote_index, pos, codim);
        Ok(())
    }

    /// Reclassify the already registered center of `le` as a corner.
    fn center_to_corner(&mut self, le: u32) -> Result<(), ForestNodesError> {
        let slot = le as usize * self.vnodes + schema::CENTER as usize;
        let lni = self.element_nodes[slot];
        if lni < 0 {
            return Err(ForestNodesError::InvariantViolation(format!(
                "element {le} center not registered before promotion"
            )));
        }
        self.registry.retag_corner(lni as u32);
        Ok(())
    }

    // --- ownership election ---

    fn elect(&mut self) {
        debug_assert_eq!(self.num_owned, 0);
        debug_assert_eq!(self.num_shared, 0);
        for zz in 0..self.registry.len() as u32 {
            debug_assert_eq!(self.registry.get(zz).runid(), Some(zz));
            let owner_rank = self.registry.get(zz).owner().rank;
            let contr_ranks: Vec<usize> = self
                .registry
                .get(zz)
                .contributors()
                .iter()
                .map(|c| c.rank)
                .collect();

            if owner_rank == self.rank {
                self.ownsort.push(zz);
                self.num_owned += 1;
                // Post a reply slot for every rank that will query us.
                for &r in &contr_ranks {
                    if r != self.rank {
                        debug_assert!(r > self.rank);
                        self.peer_access(r).add_reply(zz);
                    }
                }
                if contr_ranks.len() > 1 {
                    self.num_owned_shared += 1;
                }
            } else {
                // Weed out remote-only nodes.
                if !contr_ranks.contains(&self.rank) {
                    self.registry.set_runid(zz, None);
                    continue;
                }
                debug_assert!(owner_rank < self.rank);

                // Passively shared nodes owned by a third rank.
                for &r in &contr_ranks {
                    if r != self.rank && r != owner_rank {
                        debug_assert!(r > owner_rank);
                        self.peer_access(r).passive += 1;
                    }
                }

                let owner = *self.registry.get(zz).owner();
                let epos = owner.le * self.vnodes as u32 + owner.pos as u32;
                self.peer_access(owner_rank).add_query(zz, epos);
                self.num_shared += 1;
            }

            // The running id will be replaced by the owner's node number.
            self.registry.set_runid(zz, None);
        }
    }

    fn peer_access(&mut self, q: usize) -> &mut Peer<C> {
        debug_assert!(q != self.rank && q < self.size);
        if self.proc_peer[q] == 0 {
            self.peers.push(Peer::new(q));
            self.proc_peer[q] = self.peers.len() as u32;
        }
        let pi = self.proc_peer[q] as usize - 1;
        debug_assert_eq!(self.peers[pi].rank, q);
        &mut self.peers[pi]
    }

    fn peer_sharer(&self, q: usize) -> usize {
        let pi = self.proc_peer[q] as usize;
        debug_assert!(pi > 0);
        self.peers[pi - 1].sharer.expect("sharer assigned")
    }

    // --- canonical sort and offset exchange ---

    fn sort_and_gather(&mut self) {
        let registry = &self.registry;
        self.ownsort.sort_by_key(|&id| {
            let o = registry.get(id).owner();
            (o.le, o.pos)
        });
        for i in 0..self.ownsort.len() {
            let id = self.ownsort[i];
            self.registry.set_runid(id, Some(i as u32));
        }

        self.nonlocal_nodes = vec![u64::MAX; self.num_shared as usize];
        let send = WireCount::new(self.num_owned as usize);
        let mut counts = vec![WireCount::new(0); self.size];
        self.comm
            .allgather(cast_slice(std::slice::from_ref(&send)), cast_slice_mut(&mut counts));
        self.global_owned_count = counts.iter().map(|c| c.get() as u32).collect();

        self.goffset = Vec::with_capacity(self.size + 1);
        let mut gc = 0u64;
        self.goffset.push(gc);
        for q in 0..self.size {
            gc += self.global_owned_count[q] as u64;
            self.goffset.push(gc);
        }
        debug!("node construction: global owned {gc}");
    }

    /// Order peers by rank, accumulate the shared-node offsets, and create
    /// one sharer record per peer plus the local one.
    fn sort_peers(&mut self) {
        let num_peers = self.peers.len();
        if num_peers == 0 {
            debug_assert_eq!(self.num_shared + self.num_owned_shared, 0);
            return;
        }

        self.sorted_peers = (0..num_peers).collect();
        let peers = &self.peers;
        self.sorted_peers.sort_by_key(|&i| peers[i].rank);

        let mut nonlofs = 0u32;
        for idx in 0..num_peers {
            let pi = self.sorted_peers[idx];
            let peer = &mut self.peers[pi];
            peer.cumulative = nonlofs;
            if peer.rank < self.rank {
                nonlofs += peer.bufcount;
            }
        }
        debug_assert_eq!(nonlofs, self.num_shared);

        let mut idx = 0;
        while idx < num_peers {
            let pi = self.sorted_peers[idx];
            if self.peers[pi].rank > self.rank {
                break;
            }
            self.push_sharer(pi);
            idx += 1;
        }
        self.locsharer = Some(self.push_local_sharer());
        while idx < num_peers {
            let pi = self.sorted_peers[idx];
            debug_assert!(self.peers[pi].rank > self.rank);
            self.push_sharer(pi);
            idx += 1;
        }
        debug_assert_eq!(self.sharers.len(), num_peers + 1);
    }

    fn push_sharer(&mut self, pi: usize) {
        let idx = self.sharers.len();
        self.sharers.push(SharerRank {
            rank: self.peers[pi].rank,
            ..SharerRank::default()
        });
        self.peers[pi].sharer = Some(idx);
    }

    fn push_local_sharer(&mut self) -> usize {
        let idx = self.sharers.len();
        self.sharers.push(SharerRank {
            rank: self.rank,
            ..SharerRank::default()
        });
        idx
    }

    // --- finalization ---

    /// Rewrite every populated element slot from candidate id to the final
    /// local node index, per the element's configuration.
    fn assign_element_nodes(&mut self) -> Result<(), ForestNodesError> {
        let ne = self.view.num_local_elements();
        for le in 0..ne {
            let cind = schema::config_index(self.configuration[le]);
            let ncorner = schema::CONFIG_NODE_COUNT[cind][0] as usize;
            for ci in 0..ncorner {
                let pos = schema::CONFIG_CORNERS[cind][ci] as usize;
                self.set_element_node(le, pos)?;
            }
            if self.opts.with_faces {
                let nface = schema::CONFIG_NODE_COUNT[cind][1] as usize;
                for fi in 0..nface {
                    let pos = schema::CONFIG_FACES[cind][fi] as usize;
                    self.set_element_node(le, pos)?;
                }
            }
        }
        Ok(())
    }

    fn set_element_node(&mut self, le: usize, pos: usize) -> Result<(), ForestNodesError> {
        let slot = le * self.vnodes + pos;
        let lni = self.element_nodes[slot];
        if lni < 0 {
            return Err(ForestNodesError::InvariantViolation(format!(
                "element {le} position {pos} unpopulated for its configuration"
            )));
        }
        let cnode = self.registry.get(lni as u32);
        let runid = cnode.runid().ok_or_else(|| {
            ForestNodesError::InvariantViolation(format!(
                "element {le} position {pos} has no resolved node number"
            ))
        })?;
        debug_assert!(runid < self.num_owned + self.num_shared);
        debug_assert!(
            (runid < self.num_owned && cnode.owner().rank == self.rank)
                || (runid >= self.num_owned && cnode.owner().rank < self.rank)
        );
        self.element_nodes[slot] = runid as i32;
        Ok(())
    }

    /// Fill the sharer records: owned nodes in canonical order first, then
    /// the shared-in nodes, appending each node's local index to every
    /// contributing rank's record.
    fn populate_sharers(&mut self) {
        if self.peers.is_empty() {
            return;
        }
        let locshare = self.locsharer.expect("local sharer created");

        for lcl in 0..self.ownsort.len() {
            let cid = self.ownsort[lcl];
            let cnode = self.registry.get(cid);
            debug_assert_eq!(cnode.owner().rank, self.rank);
            debug_assert_eq!(cnode.runid(), Some(lcl as u32));
            if cnode.contributors().len() == 1 {
                continue;
            }
            for k in 0..cnode.contributors().len() {
                let r = self.registry.get(cid).contributors()[k].rank;
                let si = if r == self.rank {
                    locshare
                } else {
                    self.peer_sharer(r)
                };
                self.sharers[si].shared_nodes.push(lcl as u32);
            }
        }
        debug_assert_eq!(
            self.sharers[locshare].shared_nodes.len(),
            self.num_owned_shared as usize
        );

        {
            let ls = &mut self.sharers[locshare];
            ls.shared_mine_offset = 0;
            ls.owned_offset = 0;
            ls.shared_mine_count = self.num_owned_shared;
            ls.owned_count = self.num_owned;
        }
        for idx in 0..self.sorted_peers.len() {
            let pi = self.sorted_peers[idx];
            let (rank, cumulative, bufcount, passive, si) = {
                let p = &self.peers[pi];
                (
                    p.rank,
                    p.cumulative,
                    p.bufcount,
                    p.passive,
                    p.sharer.expect("sharer assigned"),
                )
            };
            let mine = self.sharers[si].shared_nodes.len() as u32;
            let sharer = &mut self.sharers[si];
            debug_assert_eq!(sharer.rank, rank);
            sharer.shared_mine_offset = 0;
            sharer.shared_mine_count = mine;
            sharer.owned_offset = self.num_owned + cumulative;
            sharer.owned_count = if rank < self.rank {
                debug_assert!(bufcount > 0 || passive > 0);
                bufcount
            } else {
                0
            };
        }

        let mut lni = self.num_owned;
        for idx in 0..self.sorted_peers.len() {
            let pi = self.sorted_peers[idx];
            if self.peers[pi].rank >= self.rank {
                continue;
            }
            for k in 0..self.peers[pi].remote_sorted.len() {
                let cid = self.peers[pi].remote_sorted[k];
                let cnode = self.registry.get(cid);
                debug_assert_eq!(cnode.owner().rank, self.peers[pi].rank);
                debug_assert_eq!(cnode.runid(), Some(lni));
                debug_assert!(cnode.contributors().len() > 1);
                for ci in 0..cnode.contributors().len() {
                    let r = self.registry.get(cid).contributors()[ci].rank;
                    let si = if r == self.rank {
                        locshare
                    } else {
                        self.peer_sharer(r)
                    };
                    self.sharers[si].shared_nodes.push(lni);
                }
                lni += 1;
            }
        }
        debug_assert_eq!(lni, self.num_owned + self.num_shared);
    }

    fn finish(self) -> Result<TriangleNodes, ForestNodesError> {
        #[cfg(debug_assertions)]
        {
            let total = self.goffset[self.size];
            let mut prev: Option<u64> = None;
            for &gni in &self.nonlocal_nodes {
                debug_assert!(gni < total);
                debug_assert!(
                    gni < self.goffset[self.rank] || gni >= self.goffset[self.rank + 1]
                );
                debug_assert!(prev.map_or(true, |p| p < gni));
                prev = Some(gni);
            }
        }

        let tn = TriangleNodes {
            full_style: self.opts.full_style,
            with_faces: self.opts.with_faces,
            rank: self.rank,
            vnodes: self.vnodes,
            num_local_elements: self.view.num_local_elements(),
            owned_count: self.num_owned,
            num_local_nodes: self.num_owned + self.num_shared,
            global_offset: self.goffset[self.rank],
            element_nodes: self.element_nodes,
            face_code: self.face_code,
            configuration: self.configuration,
            nonlocal_nodes: self.nonlocal_nodes,
            global_owned_count: self.global_owned_count,
            global_offsets: self.goffset,
            sharers: self.sharers,
        };
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        tn.validate_invariants()?;
        Ok(tn)
    }
}
