//! Identifier and index types shared across the component store, topology
//! builder, and math-state cache.
//!
//! Mirrors `power_grid_model::ID`/`Idx`/`Idx2D`/`Idx2DBranch3` from the
//! original C++ implementation: caller-assigned 32-bit IDs are globally
//! unique, while `Idx`/`Idx2D` are internal 64-bit positions with `-1` as the
//! "not assigned" sentinel.

use serde::{Deserialize, Serialize};

/// Caller-assigned identifier, unique across every component in a model.
pub type ID = i32;

/// Internal 64-bit position/size/coordinate. `-1` means "not assigned".
pub type Idx = i64;

/// Sentinel for "not assigned / isolated".
pub const NONE_IDX: Idx = -1;

/// (group, pos) coordinate into a math topology or a component-store group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Idx2D {
    pub group: Idx,
    pub pos: Idx,
}

impl Idx2D {
    pub const NONE: Idx2D = Idx2D {
        group: NONE_IDX,
        pos: NONE_IDX,
    };

    pub fn new(group: Idx, pos: Idx) -> Self {
        Self { group, pos }
    }

    pub fn is_none(&self) -> bool {
        self.group == NONE_IDX || self.pos == NONE_IDX
    }
}

/// Coordinate for a three-terminal branch: one island, three branch
/// positions within it (one per terminal pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Idx2DBranch3 {
    pub group: Idx,
    pub pos: [Idx; 3],
}

impl Idx2DBranch3 {
    pub const NONE: Idx2DBranch3 = Idx2DBranch3 {
        group: NONE_IDX,
        pos: [NONE_IDX, NONE_IDX, NONE_IDX],
    };

    pub fn is_none(&self) -> bool {
        self.group == NONE_IDX
    }
}

impl Default for Idx2DBranch3 {
    fn default() -> Self {
        Self::NONE
    }
}
