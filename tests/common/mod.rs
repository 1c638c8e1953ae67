//! Shared helpers for assembling topology event streams by hand.
#![allow(dead_code)]

use forest_nodes::prelude::*;

pub fn l(i: u32) -> ElementRef {
    ElementRef::Local(i)
}

pub fn g(i: u32) -> ElementRef {
    ElementRef::Ghost(i)
}

pub fn vol(element: u32) -> TopologyEvent {
    TopologyEvent::Volume(VolumeEvent { element })
}

pub fn corner(sides: &[(ElementRef, u8)]) -> TopologyEvent {
    TopologyEvent::Corner(CornerEvent {
        sides: sides
            .iter()
            .map(|&(elem, corner)| CornerSide { elem, corner })
            .collect(),
    })
}

pub fn boundary(elem: ElementRef, face: u8) -> TopologyEvent {
    TopologyEvent::Face(FaceEvent::Boundary {
        side: FullSide { elem, face },
    })
}

pub fn conforming(a: (ElementRef, u8), b: (ElementRef, u8)) -> TopologyEvent {
    TopologyEvent::Face(FaceEvent::Conforming {
        sides: [
            FullSide {
                elem: a.0,
                face: a.1,
            },
            FullSide {
                elem: b.0,
                face: b.1,
            },
        ],
        orientation: 0,
    })
}

pub fn hanging(full: (ElementRef, u8), hface: u8, halves: [ElementRef; 2]) -> TopologyEvent {
    TopologyEvent::Face(FaceEvent::Hanging {
        full: FullSide {
            elem: full.0,
            face: full.1,
        },
        hanging: HangingSide {
            face: hface,
            halves,
        },
        orientation: 0,
    })
}

pub fn ghost(owner: usize, remote_index: u32, level: u8, child_id: u8) -> GhostLeaf {
    GhostLeaf {
        owner,
        remote_index,
        level,
        child_id,
    }
}
