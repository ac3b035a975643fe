use crate::puzzles::{catalog, Puzzle};
use anyhow::{bail, Context, Result};
use clap::Parser;
use puzzleforge_backend_gpu::WgpuRuntime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "puzzleforge",
    about = "Run GPU puzzle kernels and verify them against host references"
)]
pub struct Cli {
    /// Puzzle number to run; pass 0 to run the whole catalog
    pub puzzle: u32,

    /// Print each assembled kernel and its thread map instead of running
    #[arg(long)]
    pub show: bool,

    /// Emit one JSON report line per passing problem
    #[arg(long)]
    pub json: bool,

    /// Suppress kernel listings and per-problem pass output
    #[arg(long)]
    pub quiet: bool,
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let catalog = catalog();
    let selected: Vec<&Puzzle> = if cli.puzzle == 0 {
        catalog.iter().collect()
    } else {
        let found = catalog
            .iter()
            .find(|puzzle| puzzle.number == cli.puzzle)
            .with_context(|| {
                format!("no puzzle {} (catalog has 1..={})", cli.puzzle, catalog.len())
            })?;
        vec![found]
    };

    if cli.show {
        for puzzle in &selected {
            for problem in (puzzle.build)() {
                println!("{}", problem.show()?);
            }
        }
        return Ok(());
    }

    let mut runtime = WgpuRuntime::new().context("no usable GPU runtime")?;
    if !cli.quiet {
        let info = runtime.device_info();
        println!("device: {} ({})", info.name, info.backend);
    }

    let mut failures = 0usize;
    for puzzle in &selected {
        for problem in (puzzle.build)() {
            if !cli.quiet && !cli.json {
                println!("{}", problem.show()?);
            }
            match problem.check(&mut runtime) {
                Ok(report) => {
                    if cli.json {
                        println!("{}", serde_json::to_string(&report)?);
                    } else if !cli.quiet {
                        println!(
                            "ok   puzzle {:>2} {:<28} {} element(s), max abs err {:.2e}",
                            puzzle.number, problem.name(), report.elements, report.max_abs_error
                        );
                    }
                }
                Err(err) => {
                    failures += 1;
                    eprintln!("FAIL puzzle {:>2} {}: {err}", puzzle.number, problem.name());
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} problem(s) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_puzzle_number_is_a_usage_error() {
        let err = Cli::try_parse_from(["puzzleforge"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn zero_is_the_run_all_sentinel_only_when_explicit() {
        let cli = Cli::try_parse_from(["puzzleforge", "0"]).unwrap();
        assert_eq!(cli.puzzle, 0);

        let cli = Cli::try_parse_from(["puzzleforge", "10", "--json"]).unwrap();
        assert_eq!(cli.puzzle, 10);
        assert!(cli.json);
    }
}
