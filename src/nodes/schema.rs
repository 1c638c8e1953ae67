//! Node position schema and triangulation configuration tables.
//!
//! Each quadrilateral leaf exposes up to 25 node positions:
//!
//! * 0..3   — the four corners, in child-id order;
//! * 4      — the element center;
//! * 5..8   — the element-face midpoints, in face order;
//! * 9..12  — the center-to-corner triangle-face midpoints;
//! * 13..24 — the remaining triangle-face midpoints of split faces:
//!   {13,15}, {16,18}, {19,21}, {23,24} are the half-face midpoints per
//!   face and {14,17,20,22} the split-face center midpoints.
//!
//! The per-element configuration byte encodes which triangulation pattern
//! applies: bits 0..3 mark faces split by a smaller neighbor, bit 4 the
//! half-style center orientation, bit 5 the full-style subdivision. The
//! stored byte is one of {0..16, 32}; the tables below are indexed by the
//! corresponding row 0..17.

/// Center node position.
pub const CENTER: u8 = 4;

/// Element-face midpoint position per face.
pub const FACE_MIDPOINT: [u8; 4] = [5, 6, 7, 8];

/// Center-to-corner triangle-face midpoint per corner.
pub const CENTER_FACE: [u8; 4] = [9, 10, 11, 12];

/// Split-face center midpoint per face.
pub const SPLIT_FACE: [u8; 4] = [14, 17, 20, 22];

/// Half-face midpoints per face, in face-corner order.
pub const HALF_FACE: [[u8; 2]; 4] = [[13, 15], [16, 18], [19, 21], [23, 24]];

/// Node positions per element without triangle-face nodes.
pub const VNODES_BASE: usize = 9;

/// Node positions per element including triangle-face nodes.
pub const VNODES_WITH_FACES: usize = 25;

/// Sentinel for element-table slots not populated by the configuration.
pub const UNSET_NODE: i32 = -1;

/// Configuration byte: half-style center marker (child id 1 or 2).
pub const CONFIG_HALF: u8 = 1 << 4;

/// Configuration byte: full-style subdivision.
pub const CONFIG_FULL: u8 = 1 << 5;

#[inline]
pub fn vnodes(with_faces: bool) -> usize {
    if with_faces {
        VNODES_WITH_FACES
    } else {
        VNODES_BASE
    }
}

/// Map a stored configuration byte ({0..16, 32}) to its table row (0..17).
#[inline]
pub fn config_index(config: u8) -> usize {
    if config <= 16 {
        config as usize
    } else {
        debug_assert_eq!(config, CONFIG_FULL);
        17
    }
}

/// Per configuration: count of corner-codim and face-codim node positions.
pub const CONFIG_NODE_COUNT: [[u8; 2]; 18] = [
    [4, 5],                     // 0, subconfig 0
    [6, 10], [6, 10],           // 1, 2 (rotated: 4, 8)
    [7, 12],                    // 3 (rotated: 12)
    [6, 10],                    // 4 (see 0, 1, 8)
    [7, 12], [7, 12],           // 5, 6 (rotated: 9, 10)
    [8, 14],                    // 7 (rotated: 11, 13, 14)
    [6, 10],                    // 8 (see 1, 2, 4)
    [7, 12], [7, 12],           // 9, 10 (see 5, 6)
    [8, 14],                    // 11 (see: 7, 13, 14)
    [7, 12],                    // 12 (see: 3)
    [8, 14], [8, 14],           // 13, 14 (see: 7, 11)
    [9, 16],                    // 15
    [4, 5],                     // 0, subconfig 1
    [5, 8],                     // 0, subconfig 2
];

/// For each configuration the list of corner nodes padded with -1.
pub const CONFIG_CORNERS: [[i8; 9]; 18] = [
    [0, 1, 2, 3, -1, -1, -1, -1, -1],
    [0, 1, 2, 3, 4, 5, -1, -1, -1],   //  1
    [0, 1, 2, 3, 4, 6, -1, -1, -1],   //  2
    [0, 1, 2, 3, 4, 5, 6, -1, -1],
    [0, 1, 2, 3, 4, 7, -1, -1, -1],   //  4
    [0, 1, 2, 3, 4, 5, 7, -1, -1],
    [0, 1, 2, 3, 4, 6, 7, -1, -1],
    [0, 1, 2, 3, 4, 5, 6, 7, -1],
    [0, 1, 2, 3, 4, 8, -1, -1, -1],   //  8
    [0, 1, 2, 3, 4, 5, 8, -1, -1],
    [0, 1, 2, 3, 4, 6, 8, -1, -1],    // 10
    [0, 1, 2, 3, 4, 5, 6, 8, -1],
    [0, 1, 2, 3, 4, 7, 8, -1, -1],    // 12
    [0, 1, 2, 3, 4, 5, 7, 8, -1],
    [0, 1, 2, 3, 4, 6, 7, 8, -1],
    [0, 1, 2, 3, 4, 5, 6, 7, 8],      // 15
    [0, 1, 2, 3, -1, -1, -1, -1, -1],
    [0, 1, 2, 3, 4, -1, -1, -1, -1],
];

/// For each configuration the list of face nodes padded with -1.
pub const CONFIG_FACES: [[i8; 16]; 18] = [
    [4, 5, 6, 7, 8, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1],
    [6, 7, 8, 9, 10, 11, 12, 13, 14, 15, -1, -1, -1, -1, -1, -1],     //  1
    [5, 7, 8, 9, 10, 11, 12, 16, 17, 18, -1, -1, -1, -1, -1, -1],     //  2
    [7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, -1, -1, -1, -1],
    [5, 6, 8, 9, 10, 11, 12, 19, 20, 21, -1, -1, -1, -1, -1, -1],     //  4
    [6, 8, 9, 10, 11, 12, 13, 14, 15, 19, 20, 21, -1, -1, -1, -1],
    [5, 8, 9, 10, 11, 12, 16, 17, 18, 19, 20, 21, -1, -1, -1, -1],
    [8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, -1, -1],
    [5, 6, 7, 9, 10, 11, 12, 22, 23, 24, -1, -1, -1, -1, -1, -1],     //  8
    [6, 7, 9, 10, 11, 12, 13, 14, 15, 22, 23, 24, -1, -1, -1, -1],
    [5, 7, 9, 10, 11, 12, 16, 17, 18, 22, 23, 24, -1, -1, -1, -1],    // 10
    [7, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 22, 23, 24, -1, -1],
    [5, 6, 9, 10, 11, 12, 19, 20, 21, 22, 23, 24, -1, -1, -1, -1],    // 12
    [6, 9, 10, 11, 12, 13, 14, 15, 19, 20, 21, 22, 23, 24, -1, -1],
    [5, 9, 10, 11, 12, 16, 17, 18, 19, 20, 21, 22, 23, 24, -1, -1],
    [9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24],  // 15
    [4, 5, 6, 7, 8, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1],
    [5, 6, 7, 8, 9, 10, 11, 12, -1, -1, -1, -1, -1, -1, -1, -1],
];

/// Positions that can only ever be contributed by the element's owner;
/// ghost registrations must never name one of these.
pub const ALWAYS_OWNED: [bool; 25] = [
    false, false, false, false, true, false, false, false, false, true, true, true, true,
    false, true, false, false, true, false, false, true, false, true, false, false,
];

/// Face-code bit marking the axis of `face` as hanging.
#[inline]
pub fn face_code_hanging_bit(face: u8) -> u8 {
    1 << (2 + (face >> 1))
}

/// Decode a face code into (child id, hanging flag per axis), or `None`
/// for an element with no hanging faces.
#[inline]
pub fn decode_face_code(code: u8) -> Option<(u8, [bool; 2])> {
    if code == 0 {
        None
    } else {
        Some((code & 3, [code & 0b0100 != 0, code & 0b1000 != 0]))
    }
}
