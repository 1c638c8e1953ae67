//! Two-phase peer exchange: sharers query the owner for node numbers, the
//! owner replies with its owned-local indices.
//!
//! For any peer pair the lower rank is always the responder and the higher
//! rank always the initiator, so the protocol is deadlock-free. Queries
//! carry positions encoded as `owner_le * vnodes + owner_pos`; replies
//! carry the owner's run ids in the same positional order. Each peer holds
//! at most one outstanding request at a time.

use crate::comm::{Communicator, NodeCommTags, PollWait};
use crate::error::ForestNodesError;
use crate::nodes::registry::NodeRegistry;
use crate::wire::{cast_slice, cast_slice_mut, WireIndex};

/// Exchange progress of one peer. The live request handle is carried by
/// the state itself.
pub(crate) enum PeerState<C: Communicator> {
    /// Created; nothing posted yet.
    Idle,
    /// Lower rank side: awaiting the initiator's query.
    WaitQuery(C::RecvHandle),
    /// Lower rank side: reply send in flight.
    SendReply(C::SendHandle),
    /// Higher rank side: query send in flight.
    SendQuery(C::SendHandle),
    /// Higher rank side: awaiting the responder's reply.
    WaitReply(C::RecvHandle),
    /// Exchange finished (or never needed).
    Done,
}

/// One communication partner and/or node sharer.
pub(crate) struct Peer<C: Communicator> {
    /// Rank of the peer process.
    pub rank: usize,
    pub state: PeerState<C>,
    /// Index of the corresponding sharer record.
    pub sharer: Option<usize>,
    /// Number of passively shared nodes (owned by a third rank).
    pub passive: u32,
    /// Most recently added candidate, to keep additions monotonic.
    last_added: Option<u32>,
    /// Number of items in this peer's message buffer.
    pub bufcount: u32,
    /// Number of not-owned-by-us nodes preceding this peer in canonical order.
    pub cumulative: u32,
    /// Encoded owner positions to query, paired with `shared_ids`.
    pub query_pos: Vec<u32>,
    /// Candidate ids in query order.
    pub shared_ids: Vec<u32>,
    /// Candidate ids, re-sorted by the owner's run id once known.
    pub remote_sorted: Vec<u32>,
}

impl<C: Communicator> Peer<C> {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            state: PeerState::Idle,
            sharer: None,
            passive: 0,
            last_added: None,
            bufcount: 0,
            cumulative: 0,
            query_pos: Vec::new(),
            shared_ids: Vec::new(),
            remote_sorted: Vec::new(),
        }
    }

    /// Owner side: this peer will query the given candidate; account for
    /// one reply slot.
    pub fn add_reply(&mut self, lni: u32) {
        debug_assert!(self.last_added.map_or(true, |p| p < lni));
        self.bufcount += 1;
        self.last_added = Some(lni);
    }

    /// Sharer side: queue a query for the owner's node number at `epos`.
    pub fn add_query(&mut self, lni: u32, epos: u32) {
        debug_assert!(self.last_added.map_or(true, |p| p < lni));
        self.bufcount += 1;
        self.query_pos.push(epos);
        self.shared_ids.push(lni);
        self.remote_sorted.push(lni);
        self.last_added = Some(lni);
    }
}

/// Everything the drain loop needs from the surrounding construction.
pub(crate) struct ExchangeContext<'a> {
    pub my_rank: usize,
    pub vnodes: usize,
    pub num_owned: u32,
    pub num_local_elements: usize,
    pub element_nodes: &'a [i32],
    pub registry: &'a mut NodeRegistry,
    pub goffset: &'a [u64],
    pub global_owned_count: &'a [u32],
    pub nonlocal_nodes: &'a mut [u64],
}

/// Post the initial message per peer: a query receive towards higher
/// ranks, a query send towards lower ranks. Purely passive peers exchange
/// nothing and complete immediately.
pub(crate) fn post_query_reply<C: Communicator>(
    peers: &mut [Peer<C>],
    comm: &C,
    tags: NodeCommTags,
) {
    let my_rank = comm.rank();
    for peer in peers.iter_mut() {
        debug_assert!(matches!(peer.state, PeerState::Idle));
        if peer.bufcount == 0 {
            debug_assert!(peer.passive > 0);
            peer.state = PeerState::Done;
        } else if peer.rank > my_rank {
            debug_assert!(peer.query_pos.is_empty());
            let mut template = vec![0u8; peer.bufcount as usize * 4];
            let h = comm.irecv(peer.rank, tags.query.as_u16(), &mut template);
            peer.state = PeerState::WaitQuery(h);
        } else {
            debug_assert_eq!(peer.query_pos.len(), peer.bufcount as usize);
            let wire: Vec<WireIndex> = peer.query_pos.iter().map(|&p| WireIndex::of(p)).collect();
            let h = comm.isend(peer.rank, tags.query.as_u16(), cast_slice(&wire));
            peer.state = PeerState::SendQuery(h);
        }
    }
}

/// Drive all peers to `Done`, polling every outstanding request and
/// advancing whichever subset has completed. Any transport fault aborts
/// the construction.
pub(crate) fn drain<C: Communicator>(
    peers: &mut [Peer<C>],
    comm: &C,
    tags: NodeCommTags,
    ctx: &mut ExchangeContext<'_>,
) -> Result<(), ForestNodesError> {
    let mut remaining = peers
        .iter()
        .filter(|p| !matches!(p.state, PeerState::Done))
        .count();

    while remaining > 0 {
        let mut progressed = false;
        for peer in peers.iter_mut() {
            let state = std::mem::replace(&mut peer.state, PeerState::Idle);
            peer.state = match state {
                PeerState::WaitQuery(mut h) => match h.try_wait() {
                    None => PeerState::WaitQuery(h),
                    Some(bytes) => {
                        progressed = true;
                        let reply = translate_queries(peer.rank, peer.bufcount, &bytes, ctx)?;
                        let h = comm.isend(peer.rank, tags.reply.as_u16(), cast_slice(&reply));
                        PeerState::SendReply(h)
                    }
                },
                PeerState::SendReply(mut h) => match h.try_wait() {
                    None => PeerState::SendReply(h),
                    Some(_) => {
                        progressed = true;
                        remaining -= 1;
                        PeerState::Done
                    }
                },
                PeerState::SendQuery(mut h) => match h.try_wait() {
                    None => PeerState::SendQuery(h),
                    Some(_) => {
                        progressed = true;
                        let mut template = vec![0u8; peer.bufcount as usize * 4];
                        let h = comm.irecv(peer.rank, tags.reply.as_u16(), &mut template);
                        PeerState::WaitReply(h)
                    }
                },
                PeerState::WaitReply(mut h) => match h.try_wait() {
                    None => PeerState::WaitReply(h),
                    Some(bytes) => {
                        progressed = true;
                        apply_replies(peer, &bytes, ctx)?;
                        remaining -= 1;
                        PeerState::Done
                    }
                },
                done @ PeerState::Done => done,
                PeerState::Idle => unreachable!("peer drained before posting"),
            };
        }
        if !progressed {
            std::thread::yield_now();
        }
    }
    Ok(())
}

/// Owner side: translate each queried element position into the run id of
/// the owned node registered there.
fn translate_queries(
    peer_rank: usize,
    bufcount: u32,
    bytes: &[u8],
    ctx: &ExchangeContext<'_>,
) -> Result<Vec<WireIndex>, ForestNodesError> {
    expect_len(peer_rank, bufcount, bytes)?;
    let limit = (ctx.num_local_elements * ctx.vnodes) as u32;
    let mut queries = vec![WireIndex::of(0); bufcount as usize];
    cast_slice_mut(&mut queries).copy_from_slice(bytes);
    let mut reply = Vec::with_capacity(queries.len());
    for q in &queries {
        let epos = q.get();
        if epos >= limit {
            return Err(ForestNodesError::QueryOutOfRange {
                peer: peer_rank,
                position: epos,
                limit,
            });
        }
        let lni = ctx.element_nodes[epos as usize];
        if lni < 0 {
            return Err(ForestNodesError::QueryNotRegistered {
                peer: peer_rank,
                position: epos,
            });
        }
        match ctx.registry.get(lni as u32).runid() {
            Some(runid) if runid < ctx.num_owned => reply.push(WireIndex::of(runid)),
            _ => {
                return Err(ForestNodesError::QueryNotRegistered {
                    peer: peer_rank,
                    position: epos,
                })
            }
        }
    }
    Ok(reply)
}

/// Sharer side: adopt the owner's run ids, order the peer's nodes by
/// them, and assign global ids plus final local indices.
fn apply_replies<C: Communicator>(
    peer: &mut Peer<C>,
    bytes: &[u8],
    ctx: &mut ExchangeContext<'_>,
) -> Result<(), ForestNodesError> {
    expect_len(peer.rank, peer.bufcount, bytes)?;
    let owner_owned = ctx.global_owned_count[peer.rank];
    let mut replies = vec![WireIndex::of(0); peer.bufcount as usize];
    cast_slice_mut(&mut replies).copy_from_slice(bytes);
    for (reply, &lni) in replies.iter().zip(&peer.shared_ids) {
        let oind = reply.get();
        if oind >= owner_owned {
            return Err(ForestNodesError::ReplyOutOfRange {
                neighbor: peer.rank,
                index: oind,
                owned: owner_owned,
            });
        }
        debug_assert_eq!(ctx.registry.get(lni).owner().rank, peer.rank);
        ctx.registry.set_runid(lni, Some(oind));
    }

    let registry = &mut *ctx.registry;
    peer.remote_sorted.sort_by_key(|&id| registry.get(id).runid());

    let base = ctx.goffset[peer.rank];
    for (i, &lni) in peer.remote_sorted.iter().enumerate() {
        let runid = registry.get(lni).runid().expect("run id set by reply pass") as u64;
        let nonloc = peer.cumulative as usize + i;
        let gni = base + runid;
        debug_assert!(gni < ctx.goffset[peer.rank + 1]);
        ctx.nonlocal_nodes[nonloc] = gni;
        // From here on the run id is the node's final local index.
        registry.set_runid(lni, Some(ctx.num_owned + nonloc as u32));
    }
    Ok(())
}

fn expect_len(neighbor: usize, bufcount: u32, bytes: &[u8]) -> Result<(), ForestNodesError> {
    let expected = bufcount as usize * std::mem::size_of::<WireIndex>();
    if bytes.len() != expected {
        return Err(ForestNodesError::BufferSizeMismatch {
            neighbor,
            expected,
            got: bytes.len(),
        });
    }
    Ok(())
}
