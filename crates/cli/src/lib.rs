//! `puzzleforge` binary: runs the puzzle catalog against the local GPU and
//! reports per-problem verification results.

pub mod cli;
pub mod puzzles;

pub use cli::{run_cli, Cli};
