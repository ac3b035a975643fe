//! Launch geometry: a 3-D grid of threads partitioned into thread-groups.

use serde::{Deserialize, Serialize};

/// Grid and thread-group extents for one dispatch.
///
/// `grid` counts *threads* per axis, not workgroups; the backend rounds the
/// workgroup count up when the grid is not a multiple of the thread-group
/// extent, so over-provisioned threads do run and boundary guards belong in
/// the kernel body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchGeometry {
    pub grid: (u32, u32, u32),
    pub threadgroup: (u32, u32, u32),
}

impl LaunchGeometry {
    /// Geometry with one thread per group, the puzzle default.
    pub fn new(grid: (u32, u32, u32)) -> Self {
        Self {
            grid,
            threadgroup: (1, 1, 1),
        }
    }

    pub fn with_threadgroup(mut self, threadgroup: (u32, u32, u32)) -> Self {
        self.threadgroup = threadgroup;
        self
    }

    /// Workgroups per axis, rounding up.
    pub fn workgroup_count(&self) -> (u32, u32, u32) {
        (
            self.grid.0.div_ceil(self.threadgroup.0.max(1)),
            self.grid.1.div_ceil(self.threadgroup.1.max(1)),
            self.grid.2.div_ceil(self.threadgroup.2.max(1)),
        )
    }

    pub fn total_threads(&self) -> u64 {
        u64::from(self.grid.0) * u64::from(self.grid.1) * u64::from(self.grid.2)
    }

    pub fn group_invocations(&self) -> u32 {
        self.threadgroup
            .0
            .saturating_mul(self.threadgroup.1)
            .saturating_mul(self.threadgroup.2)
    }

    pub fn has_positive_extents(&self) -> bool {
        let (gx, gy, gz) = self.grid;
        let (tx, ty, tz) = self.threadgroup;
        gx > 0 && gy > 0 && gz > 0 && tx > 0 && ty > 0 && tz > 0
    }
}
