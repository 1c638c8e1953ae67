//! Multi-rank constructions on one `ThreadComm` universe, one thread per
//! simulated rank.

mod common;

use std::thread;

use common::*;
use forest_nodes::prelude::*;

fn run_ranks(
    inputs: Vec<(ForestView, Vec<TopologyEvent>)>,
    opts: TriangleNodesOptions,
) -> Vec<TriangleNodes> {
    let comms = ThreadComm::universe(inputs.len());
    let handles: Vec<_> = comms
        .into_iter()
        .zip(inputs)
        .map(|(comm, (view, events))| {
            thread::spawn(move || {
                let nodes = TriangleNodes::build(&view, &events, &comm, opts).unwrap();
                nodes.validate_invariants().unwrap();
                nodes
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Two same-level leaves side by side, one per rank. The two corners on
/// the common face are owned by rank 0 and shared into rank 1.
fn strip_inputs() -> Vec<(ForestView, Vec<TopologyEvent>)> {
    let rank0_view = ForestView::new(
        vec![Leaf::new(0, 0)],
        GhostLayer::from_ghosts(vec![ghost(1, 0, 0, 0)]),
    );
    let rank0_events = vec![
        vol(0),
        conforming((l(0), 1), (g(0), 0)),
        boundary(l(0), 0),
        boundary(l(0), 2),
        boundary(l(0), 3),
        corner(&[(l(0), 1), (g(0), 0)]),
        corner(&[(l(0), 3), (g(0), 2)]),
        corner(&[(l(0), 0)]),
        corner(&[(l(0), 2)]),
    ];

    let rank1_view = ForestView::new(
        vec![Leaf::new(0, 0)],
        GhostLayer::from_ghosts(vec![ghost(0, 0, 0, 0)]),
    );
    let rank1_events = vec![
        vol(0),
        conforming((g(0), 1), (l(0), 0)),
        boundary(l(0), 1),
        boundary(l(0), 2),
        boundary(l(0), 3),
        corner(&[(g(0), 1), (l(0), 0)]),
        corner(&[(g(0), 3), (l(0), 2)]),
        corner(&[(l(0), 1)]),
        corner(&[(l(0), 3)]),
    ];

    vec![(rank0_view, rank0_events), (rank1_view, rank1_events)]
}

#[test]
fn two_rank_strip() {
    let out = run_ranks(strip_inputs(), TriangleNodesOptions::default());
    let (r0, r1) = (&out[0], &out[1]);

    assert_eq!(r0.owned_count, 4);
    assert_eq!(r0.num_local_nodes, 4);
    assert!(r0.nonlocal_nodes.is_empty());
    assert_eq!(r1.owned_count, 2);
    assert_eq!(r1.num_local_nodes, 4);

    for tn in [r0, r1] {
        assert_eq!(tn.global_owned_count, vec![4, 2]);
        assert_eq!(tn.global_offsets, vec![0, 4, 6]);
    }
    assert_eq!(r0.global_offset, 0);
    assert_eq!(r1.global_offset, 4);

    // Rank 0 owns both interface corners; rank 1 sees them as nonlocal.
    assert_eq!(r1.nonlocal_nodes, vec![1, 3]);
    assert_eq!(r1.element_nodes[0..4], [2, 0, 3, 1]);
    assert_eq!(r0.element_nodes[0..4], [0, 1, 2, 3]);

    // Shared global ids agree across ranks.
    assert_eq!(r0.global_id(r0.node(0, 1).unwrap()), Some(1));
    assert_eq!(r1.global_id(r1.node(0, 0).unwrap()), Some(1));
    assert_eq!(r0.global_id(r0.node(0, 3).unwrap()), Some(3));
    assert_eq!(r1.global_id(r1.node(0, 2).unwrap()), Some(3));

    // Sharer records: one peer plus the local record on each rank.
    assert_eq!(r0.sharers.len(), 2);
    assert_eq!(r0.sharers[0].rank, 0);
    assert_eq!(r0.sharers[1].rank, 1);
    assert_eq!(r0.sharers[1].shared_nodes, vec![1, 3]);
    assert_eq!(r0.sharers[0].shared_nodes, vec![1, 3]);
    assert_eq!(r0.sharers[0].shared_mine_count, 2);
    assert_eq!(r0.sharers[0].owned_count, 4);
    assert_eq!(r0.sharers[1].owned_count, 0);
    assert_eq!(r0.sharers[1].owned_offset, 4);

    assert_eq!(r1.sharers.len(), 2);
    assert_eq!(r1.sharers[0].rank, 0);
    assert_eq!(r1.sharers[1].rank, 1);
    assert_eq!(r1.sharers[0].shared_nodes, vec![2, 3]);
    assert_eq!(r1.sharers[1].shared_nodes, vec![2, 3]);
    assert_eq!(r1.sharers[0].owned_offset, 2);
    assert_eq!(r1.sharers[0].owned_count, 2);
    assert_eq!(r1.sharers[0].shared_mine_count, 0);
    assert_eq!(r1.sharers[1].shared_mine_count, 0);
}

#[test]
fn two_rank_strip_is_deterministic() {
    let opts = TriangleNodesOptions::default();
    let a = run_ranks(strip_inputs(), opts);
    let b = run_ranks(strip_inputs(), opts);
    assert_eq!(a, b);
}

/// A coarse leaf on rank 0 meets two finer leaves on rank 1 across one
/// hanging face. The hanging midpoint is owned by rank 0.
#[test]
fn two_rank_hanging_face() {
    let rank0_view = ForestView::new(
        vec![Leaf::new(0, 0)],
        GhostLayer::from_ghosts(vec![ghost(1, 0, 1, 0), ghost(1, 1, 1, 2)]),
    );
    let rank0_events = vec![
        vol(0),
        hanging((l(0), 1), 0, [g(0), g(1)]),
        corner(&[(l(0), 1), (g(0), 0)]),
        corner(&[(l(0), 3), (g(1), 2)]),
        corner(&[(l(0), 0)]),
        corner(&[(l(0), 2)]),
    ];

    let rank1_view = ForestView::new(
        vec![Leaf::new(1, 0), Leaf::new(1, 2)],
        GhostLayer::from_ghosts(vec![ghost(0, 0, 0, 0)]),
    );
    let rank1_events = vec![
        vol(0),
        vol(1),
        hanging((g(0), 1), 0, [l(0), l(1)]),
        conforming((l(0), 3), (l(1), 2)),
        corner(&[(g(0), 1), (l(0), 0)]),
        corner(&[(g(0), 3), (l(1), 2)]),
        corner(&[(l(0), 3), (l(1), 1)]),
        corner(&[(l(0), 1)]),
        corner(&[(l(1), 3)]),
    ];

    let out = run_ranks(
        vec![
            (rank0_view, rank0_events),
            (rank1_view, rank1_events),
        ],
        TriangleNodesOptions::default(),
    );
    let (r0, r1) = (&out[0], &out[1]);

    // The coarse element was promoted: center plus the split-face bit.
    assert_eq!(r0.configuration, vec![2]);
    assert_eq!(r0.owned_count, 6);
    assert!(r0.node(0, 4).is_some());

    // Small-side face codes record the hanging axis and child ids.
    assert_eq!(r1.configuration, vec![0, 16]);
    assert_eq!(r1.face_code, vec![4, 6]);
    assert_eq!(r0.face_code, vec![0]);

    assert_eq!(r1.owned_count, 3);
    assert_eq!(r1.num_local_nodes, 6);
    assert_eq!(r1.nonlocal_nodes, vec![1, 3, 5]);

    // The hanging midpoint is one node: rank 0's face midpoint slot and
    // both small corners on rank 1.
    let mid0 = r0.node(0, 6).unwrap();
    assert_eq!(r0.global_id(mid0), Some(5));
    let mid1 = r1.node(0, 2).unwrap();
    assert_eq!(mid1, r1.node(1, 0).unwrap());
    assert_eq!(r1.global_id(mid1), Some(5));

    // Face-end corners agree as well.
    assert_eq!(r0.global_id(r0.node(0, 1).unwrap()), Some(1));
    assert_eq!(r1.global_id(r1.node(0, 0).unwrap()), Some(1));
    assert_eq!(r0.global_id(r0.node(0, 3).unwrap()), Some(3));
    assert_eq!(r1.global_id(r1.node(1, 2).unwrap()), Some(3));

    assert_eq!(r0.sharers.len(), 2);
    assert_eq!(r0.sharers[1].rank, 1);
    assert_eq!(r0.sharers[1].shared_nodes, vec![1, 3, 5]);
    assert_eq!(r1.sharers[0].rank, 0);
    assert_eq!(r1.sharers[0].shared_nodes, vec![3, 4, 5]);
    assert_eq!(r1.sharers[0].owned_offset, 3);
    assert_eq!(r1.sharers[0].owned_count, 3);
}

/// 2x2 grid split over three ranks: the grid center is contributed by all
/// three, owned by rank 0, and passively shared between ranks 1 and 2.
#[test]
fn three_rank_passive_share() {
    // Rank 0: child 0. Rank 1: child 1. Rank 2: children 2 and 3.
    let rank0_view = ForestView::new(
        vec![Leaf::new(1, 0)],
        GhostLayer::from_ghosts(vec![
            ghost(1, 0, 1, 1),
            ghost(2, 0, 1, 2),
            ghost(2, 1, 1, 3),
        ]),
    );
    let rank0_events = vec![
        vol(0),
        conforming((l(0), 1), (g(0), 0)),
        conforming((l(0), 3), (g(1), 2)),
        corner(&[(l(0), 3), (g(0), 2), (g(1), 1), (g(2), 0)]),
        corner(&[(l(0), 1), (g(0), 0)]),
        corner(&[(l(0), 2), (g(1), 0)]),
        corner(&[(l(0), 0)]),
    ];

    let rank1_view = ForestView::new(
        vec![Leaf::new(1, 1)],
        GhostLayer::from_ghosts(vec![
            ghost(0, 0, 1, 0),
            ghost(2, 0, 1, 2),
            ghost(2, 1, 1, 3),
        ]),
    );
    let rank1_events = vec![
        vol(0),
        conforming((g(0), 1), (l(0), 0)),
        conforming((l(0), 3), (g(2), 2)),
        corner(&[(g(0), 3), (l(0), 2), (g(1), 1), (g(2), 0)]),
        corner(&[(g(0), 1), (l(0), 0)]),
        corner(&[(l(0), 3), (g(2), 1)]),
        corner(&[(l(0), 1)]),
    ];

    let rank2_view = ForestView::new(
        vec![Leaf::new(1, 2), Leaf::new(1, 3)],
        GhostLayer::from_ghosts(vec![ghost(0, 0, 1, 0), ghost(1, 0, 1, 1)]),
    );
    let rank2_events = vec![
        vol(0),
        vol(1),
        conforming((l(0), 1), (l(1), 0)),
        conforming((g(0), 3), (l(0), 2)),
        conforming((g(1), 3), (l(1), 2)),
        corner(&[(g(0), 3), (g(1), 2), (l(0), 1), (l(1), 0)]),
        corner(&[(g(0), 2), (l(0), 0)]),
        corner(&[(g(1), 3), (l(1), 1)]),
        corner(&[(l(0), 3), (l(1), 2)]),
        corner(&[(l(0), 2)]),
        corner(&[(l(1), 3)]),
    ];

    let out = run_ranks(
        vec![
            (rank0_view, rank0_events),
            (rank1_view, rank1_events),
            (rank2_view, rank2_events),
        ],
        TriangleNodesOptions::default(),
    );
    let (r0, r1, r2) = (&out[0], &out[1], &out[2]);

    for tn in [r0, r1, r2] {
        assert_eq!(tn.global_owned_count, vec![4, 2, 3]);
        assert_eq!(tn.global_offsets, vec![0, 4, 6, 9]);
    }
    assert_eq!(r0.owned_count, 4);
    assert_eq!(r1.owned_count, 2);
    assert_eq!(r2.owned_count, 3);

    // The grid center has the same global id everywhere.
    let center0 = r0.global_id(r0.node(0, 3).unwrap());
    let center1 = r1.global_id(r1.node(0, 2).unwrap());
    let center2 = r2.global_id(r2.node(0, 1).unwrap());
    assert_eq!(center0, Some(3));
    assert_eq!(center1, Some(3));
    assert_eq!(center2, Some(3));
    assert_eq!(r2.node(0, 1), r2.node(1, 0));

    // The edge node between ranks 1 and 2 is owned by rank 1.
    let right1 = r1.global_id(r1.node(0, 3).unwrap());
    let right2 = r2.global_id(r2.node(1, 1).unwrap());
    assert_eq!(right1, Some(5));
    assert_eq!(right2, Some(5));

    assert_eq!(r1.nonlocal_nodes, vec![1, 3]);
    assert_eq!(r2.nonlocal_nodes, vec![2, 3, 5]);

    // Rank 0 hosts sharer records for both higher ranks.
    assert_eq!(r0.sharers.len(), 3);
    assert_eq!(r0.sharers[0].rank, 0);
    assert_eq!(r0.sharers[0].shared_nodes, vec![1, 2, 3]);
    assert_eq!(r0.sharers[1].shared_nodes, vec![1, 3]);
    assert_eq!(r0.sharers[2].shared_nodes, vec![2, 3]);

    // Rank 1 passively shares the center with rank 2: the entry appears
    // in each other's sharer record without any message between them.
    assert_eq!(r1.sharers.len(), 3);
    assert_eq!(r1.sharers[0].rank, 0);
    assert_eq!(r1.sharers[1].rank, 1);
    assert_eq!(r1.sharers[2].rank, 2);
    assert_eq!(r1.sharers[0].shared_nodes, vec![2, 3]);
    assert_eq!(r1.sharers[1].shared_nodes, vec![1, 2, 3]);
    assert_eq!(r1.sharers[2].shared_nodes, vec![1, 3]);
    assert_eq!(r1.sharers[2].owned_count, 0);
    assert_eq!(r1.sharers[2].shared_mine_count, 1);

    assert_eq!(r2.sharers.len(), 3);
    assert_eq!(r2.sharers[0].rank, 0);
    assert_eq!(r2.sharers[1].rank, 1);
    assert_eq!(r2.sharers[2].rank, 2);
    assert_eq!(r2.sharers[0].shared_nodes, vec![3, 4]);
    assert_eq!(r2.sharers[1].shared_nodes, vec![4, 5]);
    assert_eq!(r2.sharers[2].shared_nodes, vec![3, 4, 5]);
    assert_eq!(r2.sharers[1].owned_count, 1);
    assert_eq!(r2.sharers[1].owned_offset, 5);
}
