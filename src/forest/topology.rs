//! Topology events: the face-balanced traversal of the forest, one event
//! per volume, face connection, and corner connection.
//!
//! The traversal itself is external to this crate; an adapter translates
//! the host forest's iterator into [`TopologyEvent`] values. Events must
//! satisfy the exactly-once contract: every local leaf appears in exactly
//! one volume event (in ascending element order), and every face/corner
//! connection touching the local partition appears exactly once, with
//! ghost sides marked as such.

use serde::{Deserialize, Serialize};

use crate::error::ForestNodesError;

/// Reference to one element as seen from this rank.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    /// Index into the local leaf array.
    Local(u32),
    /// Index into the ghost layer.
    Ghost(u32),
}

impl ElementRef {
    #[inline]
    pub fn is_ghost(self) -> bool {
        matches!(self, ElementRef::Ghost(_))
    }
}

/// One leaf visited by the traversal. Elements are visited in ascending
/// local order, `element` being the running local element number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VolumeEvent {
    pub element: u32,
}

/// A non-hanging side of a face connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FullSide {
    pub elem: ElementRef,
    /// Face id of this element facing the connection, 0..4.
    pub face: u8,
}

/// The refined side of a nonconforming face connection. `halves[j]` is the
/// half whose child id equals `FACE_CORNERS[face][j]`; its half-face pairs
/// with slot `j ^ orientation` of the full side.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HangingSide {
    /// Face id of the small elements facing the connection, 0..4.
    pub face: u8,
    pub halves: [ElementRef; 2],
}

/// One face connection of the forest.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FaceEvent {
    /// Domain boundary: a single, necessarily local side.
    Boundary { side: FullSide },
    /// Two same-size elements meet.
    Conforming { sides: [FullSide; 2], orientation: u8 },
    /// One coarse element meets two finer ones.
    Hanging {
        full: FullSide,
        hanging: HangingSide,
        orientation: u8,
    },
}

/// One element touching a corner connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CornerSide {
    pub elem: ElementRef,
    /// Corner id of this element at the connection, 0..4.
    pub corner: u8,
}

/// One corner connection of the forest. Hanging corners (a fine corner on
/// a coarse face midpoint) are not corner connections; they are resolved
/// by the hanging face event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CornerEvent {
    pub sides: Vec<CornerSide>,
}

/// A single traversal event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TopologyEvent {
    Volume(VolumeEvent),
    Face(FaceEvent),
    Corner(CornerEvent),
}

/// Seam to the external traversal: anything that can replay its events.
pub trait ForestTopology {
    fn for_each_event(
        &self,
        f: &mut dyn FnMut(&TopologyEvent) -> Result<(), ForestNodesError>,
    ) -> Result<(), ForestNodesError>;
}

impl ForestTopology for [TopologyEvent] {
    fn for_each_event(
        &self,
        f: &mut dyn FnMut(&TopologyEvent) -> Result<(), ForestNodesError>,
    ) -> Result<(), ForestNodesError> {
        for ev in self {
            f(ev)?;
        }
        Ok(())
    }
}

impl ForestTopology for Vec<TopologyEvent> {
    fn for_each_event(
        &self,
        f: &mut dyn FnMut(&TopologyEvent) -> Result<(), ForestNodesError>,
    ) -> Result<(), ForestNodesError> {
        self.as_slice().for_each_event(f)
    }
}
