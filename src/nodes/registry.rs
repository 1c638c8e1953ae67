//! Candidate-node registry: a flat, grow-only arena of nodes under
//! construction, each carrying the set of (rank, element, position)
//! contributions that reference the same geometric location.
//!
//! Ownership is decided per candidate by the numerically smallest
//! contributing rank. The owner is stored as an index into the
//! contributor list and recomputed on append, so growth of the list can
//! never invalidate it.

/// Boundary codimension of a node under construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Codim {
    /// The node sits on a triangle face only.
    Face,
    /// The node is a triangle corner.
    Corner,
}

/// A single contributing process to a node under construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Contributor {
    /// The referring process.
    pub rank: usize,
    /// Element number local to that process.
    pub le: u32,
    /// Node position relative to the element.
    pub pos: u8,
}

/// A node under construction. `runid` starts as the candidate's own id,
/// is cleared at ownership election, and ends up as the node's final
/// local index (passing through the owner-local index for shared nodes).
#[derive(Clone, Debug)]
pub struct CandidateNode {
    runid: Option<u32>,
    codim: Codim,
    owner: usize,
    contr: Vec<Contributor>,
}

impl CandidateNode {
    #[inline]
    pub fn codim(&self) -> Codim {
        self.codim
    }

    #[inline]
    pub fn runid(&self) -> Option<u32> {
        self.runid
    }

    #[inline]
    pub fn contributors(&self) -> &[Contributor] {
        &self.contr
    }

    /// The owning contributor: smallest rank, smallest (le, pos) within it.
    #[inline]
    pub fn owner(&self) -> &Contributor {
        &self.contr[self.owner]
    }

    /// Whether `rank` appears in the contributor set.
    pub fn contributed_by(&self, rank: usize) -> bool {
        self.contr.iter().any(|c| c.rank == rank)
    }
}

/// Grow-only candidate arena. Candidates are addressed by their creation
/// index, which element-table slots store until finalization.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    candidates: Vec<CandidateNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[inline]
    pub fn get(&self, id: u32) -> &CandidateNode {
        &self.candidates[id as usize]
    }

    #[inline]
    pub fn set_runid(&mut self, id: u32, runid: Option<u32>) {
        self.candidates[id as usize].runid = runid;
    }

    /// Register a node position relative to an element.
    ///
    /// With `*lni == None` a fresh candidate is created and its id stored
    /// into `lni`; otherwise the contribution joins the existing
    /// candidate. Repeated contributions from the same rank keep only the
    /// smallest (element, position) pair; across ranks the list is
    /// append-unique by rank.
    pub fn register(
        &mut self,
        lni: &mut Option<u32>,
        rank: usize,
        le: u32,
        pos: u8,
        codim: Codim,
    ) -> u32 {
        let id = match *lni {
            None => {
                let id = self.candidates.len() as u32;
                self.candidates.push(CandidateNode {
                    runid: Some(id),
                    codim,
                    owner: 0,
                    contr: Vec::new(),
                });
                *lni = Some(id);
                id
            }
            Some(id) => {
                debug_assert_eq!(self.candidates[id as usize].codim, codim);
                debug_assert!(!self.candidates[id as usize].contr.is_empty());
                id
            }
        };

        let cnode = &mut self.candidates[id as usize];
        for c in cnode.contr.iter_mut() {
            if c.rank == rank {
                if (le, pos) < (c.le, c.pos) {
                    c.le = le;
                    c.pos = pos;
                }
                return id;
            }
        }

        let appended = cnode.contr.len();
        cnode.contr.push(Contributor { rank, le, pos });
        if appended == 0 || rank < cnode.contr[cnode.owner].rank {
            cnode.owner = appended;
        }
        self.debug_check(id);
        id
    }

    /// Reclassify an existing face-codim candidate as a corner, keeping
    /// its contributor list. Used when a half-style element is promoted
    /// to full style and its center becomes a triangle corner.
    pub fn retag_corner(&mut self, id: u32) {
        let cnode = &mut self.candidates[id as usize];
        debug_assert_eq!(cnode.codim, Codim::Face);
        debug_assert_eq!(cnode.contr.len(), 1);
        cnode.codim = Codim::Corner;
    }

    #[inline]
    fn debug_check(&self, id: u32) {
        #[cfg(debug_assertions)]
        {
            let cnode = &self.candidates[id as usize];
            let owner = cnode.owner();
            for (i, c) in cnode.contr.iter().enumerate() {
                assert!(owner.rank <= c.rank);
                if c.rank == owner.rank {
                    assert_eq!(i, cnode.owner);
                }
            }
        }
    }
}
