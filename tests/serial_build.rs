//! Single-rank constructions against `NoComm`.

mod common;

use common::*;
use forest_nodes::error::ForestNodesError;
use forest_nodes::nodes::schema::UNSET_NODE;
use forest_nodes::prelude::*;

fn unit_leaf_events() -> Vec<TopologyEvent> {
    vec![
        vol(0),
        boundary(l(0), 0),
        boundary(l(0), 1),
        boundary(l(0), 2),
        boundary(l(0), 3),
        corner(&[(l(0), 0)]),
        corner(&[(l(0), 1)]),
        corner(&[(l(0), 2)]),
        corner(&[(l(0), 3)]),
    ]
}

#[test]
fn unit_element_full_style() {
    let view = ForestView::serial(vec![Leaf::new(0, 0)]);
    let nodes = TriangleNodes::build(
        &view,
        &unit_leaf_events(),
        &NoComm,
        TriangleNodesOptions::default().full_style(true),
    )
    .unwrap();

    assert_eq!(nodes.vnodes, 9);
    assert_eq!(nodes.owned_count, 5);
    assert_eq!(nodes.num_local_nodes, 5);
    assert_eq!(nodes.configuration, vec![32]);
    assert!(nodes.nonlocal_nodes.is_empty());
    assert!(nodes.sharers.is_empty());
    assert_eq!(nodes.global_owned_count, vec![5]);
    assert_eq!(nodes.global_offsets, vec![0, 5]);
    // Corners then center, in position order.
    assert_eq!(&nodes.element_nodes[0..5], &[0, 1, 2, 3, 4]);
    assert_eq!(&nodes.element_nodes[5..9], &[UNSET_NODE; 4]);
    nodes.validate_invariants().unwrap();
}

#[test]
fn unit_element_half_style() {
    let view = ForestView::serial(vec![Leaf::new(0, 0)]);
    let nodes = TriangleNodes::build(
        &view,
        &unit_leaf_events(),
        &NoComm,
        TriangleNodesOptions::default(),
    )
    .unwrap();

    assert_eq!(nodes.owned_count, 4);
    assert_eq!(nodes.configuration, vec![0]);
    assert_eq!(&nodes.element_nodes[0..4], &[0, 1, 2, 3]);
    assert_eq!(&nodes.element_nodes[4..9], &[UNSET_NODE; 5]);
    nodes.validate_invariants().unwrap();
}

#[test]
fn unit_element_full_style_with_faces() {
    let view = ForestView::serial(vec![Leaf::new(0, 0)]);
    let nodes = TriangleNodes::build(
        &view,
        &unit_leaf_events(),
        &NoComm,
        TriangleNodesOptions::default().full_style(true).with_faces(true),
    )
    .unwrap();

    assert_eq!(nodes.vnodes, 25);
    // 4 corners, center, 4 face midpoints, 4 center-to-corner midpoints.
    assert_eq!(nodes.owned_count, 13);
    assert_eq!(nodes.configuration, vec![32]);
    for pos in 0..13 {
        assert_eq!(nodes.node(0, pos), Some(pos as u32));
    }
    for pos in 13..25 {
        assert_eq!(nodes.node(0, pos), None);
    }
    nodes.validate_invariants().unwrap();
}

/// 2x2 uniform refinement of the unit square: the four inner corners
/// collapse into one shared center node.
fn two_by_two() -> (ForestView, Vec<TopologyEvent>) {
    let view = ForestView::serial((0..4).map(|c| Leaf::new(1, c)).collect());
    let events = vec![
        vol(0),
        vol(1),
        vol(2),
        vol(3),
        conforming((l(0), 1), (l(1), 0)),
        conforming((l(2), 1), (l(3), 0)),
        conforming((l(0), 3), (l(2), 2)),
        conforming((l(1), 3), (l(3), 2)),
        boundary(l(0), 0),
        boundary(l(0), 2),
        boundary(l(1), 1),
        boundary(l(1), 2),
        boundary(l(2), 0),
        boundary(l(2), 3),
        boundary(l(3), 1),
        boundary(l(3), 3),
        corner(&[(l(0), 3), (l(1), 2), (l(2), 1), (l(3), 0)]),
        corner(&[(l(0), 1), (l(1), 0)]),
        corner(&[(l(2), 3), (l(3), 2)]),
        corner(&[(l(0), 2), (l(2), 0)]),
        corner(&[(l(1), 3), (l(3), 1)]),
        corner(&[(l(0), 0)]),
        corner(&[(l(1), 1)]),
        corner(&[(l(2), 2)]),
        corner(&[(l(3), 3)]),
    ];
    (view, events)
}

#[test]
fn two_by_two_half_style() {
    let (view, events) = two_by_two();
    let nodes =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap();

    assert_eq!(nodes.owned_count, 9);
    assert_eq!(nodes.num_local_nodes, 9);
    // Child ids 1 and 2 carry the half-style marker.
    assert_eq!(nodes.configuration, vec![0, 16, 16, 0]);
    assert_eq!(nodes.face_code, vec![0, 0, 0, 0]);

    // Canonical order follows each node's smallest (element, position).
    assert_eq!(&nodes.element_nodes[0..4], &[0, 1, 2, 3]);
    assert_eq!(&nodes.element_nodes[9..13], &[1, 4, 3, 5]);
    assert_eq!(&nodes.element_nodes[18..22], &[2, 3, 6, 7]);
    assert_eq!(&nodes.element_nodes[27..31], &[3, 5, 7, 8]);

    // The four inner corners collapsed into local node 3.
    assert_eq!(nodes.node(0, 3), Some(3));
    assert_eq!(nodes.node(1, 2), Some(3));
    assert_eq!(nodes.node(2, 1), Some(3));
    assert_eq!(nodes.node(3, 0), Some(3));
    nodes.validate_invariants().unwrap();
}

#[test]
fn two_by_two_is_deterministic() {
    let (view, events) = two_by_two();
    let opts = TriangleNodesOptions::default();
    let a = TriangleNodes::build(&view, &events, &NoComm, opts).unwrap();
    let b = TriangleNodes::build(&view, &events, &NoComm, opts).unwrap();
    assert_eq!(a, b);
}

#[test]
fn numbering_survives_serde_roundtrip() {
    let (view, events) = two_by_two();
    let nodes =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap();
    let json = serde_json::to_string(&nodes).unwrap();
    let back: TriangleNodes = serde_json::from_str(&json).unwrap();
    assert_eq!(nodes, back);
}

/// One refined quadrant next to three coarse siblings: both coarse
/// elements bordering the fine quadrant get promoted to full style.
#[test]
fn refined_quadrant_promotes_coarse_neighbors() {
    // le 0..2: coarse children 0, 1, 2 of the unit square at level 1;
    // le 3..6: the four level-2 children of quadrant 3.
    let mut leaves = vec![Leaf::new(1, 0), Leaf::new(1, 1), Leaf::new(1, 2)];
    leaves.extend((0..4).map(|c| Leaf::new(2, c)));
    let view = ForestView::serial(leaves);

    let events = vec![
        vol(0),
        vol(1),
        vol(2),
        vol(3),
        vol(4),
        vol(5),
        vol(6),
        // Conforming interior faces.
        conforming((l(0), 1), (l(1), 0)),
        conforming((l(0), 3), (l(2), 2)),
        conforming((l(3), 1), (l(4), 0)),
        conforming((l(3), 3), (l(5), 2)),
        conforming((l(4), 3), (l(6), 2)),
        conforming((l(5), 1), (l(6), 0)),
        // The two hanging faces around the refined quadrant.
        hanging((l(1), 3), 2, [l(3), l(4)]),
        hanging((l(2), 1), 0, [l(3), l(5)]),
        // Corner connections.
        corner(&[(l(0), 3), (l(1), 2), (l(2), 1), (l(3), 0)]),
        corner(&[(l(3), 3), (l(4), 2), (l(5), 1), (l(6), 0)]),
        corner(&[(l(4), 3), (l(6), 1)]),
        corner(&[(l(5), 3), (l(6), 2)]),
        corner(&[(l(0), 1), (l(1), 0)]),
        corner(&[(l(0), 2), (l(2), 0)]),
        corner(&[(l(1), 3), (l(4), 1)]),
        corner(&[(l(2), 3), (l(5), 2)]),
        corner(&[(l(0), 0)]),
        corner(&[(l(1), 1)]),
        corner(&[(l(2), 2)]),
        corner(&[(l(6), 3)]),
    ];

    let nodes =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap();

    // 14 corner connections plus the two promoted centers.
    assert_eq!(nodes.owned_count, 16);
    // Promoted coarse elements carry exactly the split-face bit; their
    // half-style markers are gone.
    assert_eq!(nodes.configuration, vec![0, 8, 2, 0, 16, 16, 0]);
    // Small-side face codes encode the hanging axis and child id.
    assert_eq!(nodes.face_code, vec![0, 0, 0, 12, 9, 6, 0]);

    // Promoted centers are numbered.
    assert!(nodes.node(1, 4).is_some());
    assert!(nodes.node(2, 4).is_some());
    // The hanging midpoints are shared between the large and small sides.
    assert_eq!(nodes.node(1, 8), nodes.node(3, 1));
    assert_eq!(nodes.node(1, 8), nodes.node(4, 0));
    assert_eq!(nodes.node(2, 6), nodes.node(3, 2));
    assert_eq!(nodes.node(2, 6), nodes.node(5, 0));
    nodes.validate_invariants().unwrap();
}

#[test]
fn empty_partition() {
    let view = ForestView::serial(Vec::new());
    let events: Vec<TopologyEvent> = Vec::new();
    let nodes =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap();
    assert_eq!(nodes.owned_count, 0);
    assert_eq!(nodes.num_local_nodes, 0);
    assert!(nodes.element_nodes.is_empty());
    assert!(nodes.sharers.is_empty());
    assert_eq!(nodes.global_owned_count, vec![0]);
    nodes.validate_invariants().unwrap();
}

#[test]
fn missing_volume_event_is_rejected() {
    let view = ForestView::serial(vec![Leaf::new(0, 0)]);
    let events = vec![corner(&[(l(0), 0)])];
    let err =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        ForestNodesError::TraversalCountMismatch { .. }
    ));
}

#[test]
fn duplicate_corner_event_is_rejected() {
    let view = ForestView::serial(vec![Leaf::new(0, 0)]);
    let events = vec![vol(0), corner(&[(l(0), 0)]), corner(&[(l(0), 0)])];
    let err =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap_err();
    assert_eq!(
        err,
        ForestNodesError::NodeSlotOccupied {
            element: 0,
            position: 0
        }
    );
}

#[test]
fn incomplete_corner_coverage_is_rejected() {
    let view = ForestView::serial(vec![Leaf::new(0, 0)]);
    let events = vec![
        vol(0),
        corner(&[(l(0), 0)]),
        corner(&[(l(0), 1)]),
        corner(&[(l(0), 2)]),
    ];
    let err =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap_err();
    assert!(matches!(err, ForestNodesError::InvariantViolation(_)));
}

#[test]
fn invalid_ghost_owner_is_rejected() {
    let view = ForestView::new(
        vec![Leaf::new(0, 0)],
        GhostLayer::from_ghosts(vec![ghost(0, 0, 0, 0)]),
    );
    let events: Vec<TopologyEvent> = Vec::new();
    let err =
        TriangleNodes::build(&view, &events, &NoComm, TriangleNodesOptions::default()).unwrap_err();
    assert!(matches!(err, ForestNodesError::GhostOwnerInvalid { .. }));
}
