//! Human-readable views of an assembled kernel and its launch.

use puzzleforge_kernel::{AssembledKernel, LaunchGeometry};
use std::fmt::Write;

const THREAD_MAP_CAP: usize = 64;

/// The assembled WGSL with 1-based line numbers, matching the line numbers
/// compile diagnostics refer to.
pub fn render_source(kernel: &AssembledKernel) -> String {
    let mut out = String::new();
    for (index, line) in kernel.source.lines().enumerate() {
        let _ = writeln!(out, "{:>4} | {line}", index + 1);
    }
    out
}

/// Lists the global thread positions a launch covers, grouped by workgroup,
/// capped at [`THREAD_MAP_CAP`] entries so large launches stay readable.
pub fn thread_map(geometry: &LaunchGeometry) -> String {
    let (gx, gy, gz) = geometry.workgroup_count();
    let (tx, ty, tz) = geometry.threadgroup;
    // Launched threads, not the requested grid: partial workgroups round
    // up and their extra threads execute too.
    let total = u64::from(gx) * u64::from(gy) * u64::from(gz) * u64::from(tx) * u64::from(ty) * u64::from(tz);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{total} thread(s) in {} workgroup(s) of ({tx}, {ty}, {tz})",
        u64::from(gx) * u64::from(gy) * u64::from(gz)
    );

    let mut listed = 0usize;
    'outer: for wz in 0..gz {
        for wy in 0..gy {
            for wx in 0..gx {
                for lz in 0..tz {
                    for ly in 0..ty {
                        for lx in 0..tx {
                            if listed == THREAD_MAP_CAP {
                                let _ = writeln!(
                                    out,
                                    "  ... {} more",
                                    total - THREAD_MAP_CAP as u64
                                );
                                break 'outer;
                            }
                            let _ = writeln!(
                                out,
                                "  global ({}, {}, {})  group ({wx}, {wy}, {wz})  local ({lx}, {ly}, {lz})",
                                wx * tx + lx,
                                wy * ty + ly,
                                wz * tz + lz,
                            );
                            listed += 1;
                        }
                    }
                }
            }
        }
    }
    out
}
