use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dircmp_common::{
    AvoidList, CompareOptions, DirCmpError, DivergenceStat, StaleEntry, SyncReport,
};
use dircmp_core::Comparator;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code when a sync finished but some sources vanished mid-run
const EXIT_PARTIAL: i32 = 2;

#[derive(Parser)]
#[command(name = "dircmp")]
#[command(author = "dircmp Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Compare two directory trees and copy what is missing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two directories and report divergent files
    Compare {
        /// Left directory path
        left: PathBuf,

        /// Right directory path
        right: PathBuf,

        /// Follow symbolic links to directories
        #[arg(short = 'L', long)]
        follow_symlinks: bool,

        /// Maximum concurrent file comparisons (0 = one per CPU)
        #[arg(short, long, default_value_t = 0)]
        workers: usize,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy entries that exist on only one side into the other
    Sync {
        /// Left directory path
        left: PathBuf,

        /// Right directory path
        right: PathBuf,

        /// Which root receives the missing entries
        #[arg(short, long, value_enum, default_value_t = Direction::Both)]
        direction: Direction,

        /// Relative file path to skip (can be specified multiple times)
        #[arg(long = "avoid-file")]
        avoid_files: Vec<PathBuf>,

        /// Relative directory to skip, including everything under it (can be specified multiple times)
        #[arg(long = "avoid-dir")]
        avoid_dirs: Vec<PathBuf>,

        /// Log what would be copied without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Follow symbolic links to directories
        #[arg(short = 'L', long)]
        follow_symlinks: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Direction {
    /// Copy right-only entries into the left root
    Left,
    /// Copy left-only entries into the right root
    Right,
    /// Left first, then right
    Both,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compare {
            left,
            right,
            follow_symlinks,
            workers,
            json,
        } => {
            let options = CompareOptions::new()
                .with_follow_symlinks(follow_symlinks)
                .with_workers(workers);
            run_compare(Comparator::with_options(left, right, options), json)
        }
        Commands::Sync {
            left,
            right,
            direction,
            avoid_files,
            avoid_dirs,
            dry_run,
            follow_symlinks,
            json,
        } => {
            let options = CompareOptions::new()
                .with_follow_symlinks(follow_symlinks)
                .with_dry_run(dry_run);
            let avoid = AvoidList::new(avoid_files, avoid_dirs);
            run_sync(Comparator::with_options(left, right, options), direction, &avoid, json)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_compare(cmp: Comparator, json: bool) -> anyhow::Result<i32> {
    info!("Comparing:");
    info!("  Left:  {}", cmp.left_root().display());
    info!("  Right: {}", cmp.right_root().display());

    let sets = cmp.differences().context("Listing failed")?;
    let report = cmp.divergence_report().context("Comparison failed")?;

    if json {
        let output = JsonCompareReport {
            left: path_string(cmp.left_root()),
            right: path_string(cmp.right_root()),
            only_left_files: path_strings(&sets.only_left_files),
            only_left_dirs: path_strings(&sets.only_left_dirs),
            only_right_files: path_strings(&sets.only_right_files),
            only_right_dirs: path_strings(&sets.only_right_dirs),
            common_files: sets.common_files.len(),
            common_dirs: sets.common_dirs.len(),
            divergent: report.stats.iter().map(json_divergent).collect(),
            stale: report.stale.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(0);
    }

    print_section("Only in left", sets.only_left_dirs.iter().chain(&sets.only_left_files));
    print_section("Only in right", sets.only_right_dirs.iter().chain(&sets.only_right_files));
    print_section("Different", report.stats.iter().map(|s| &s.relative_path));

    if !report.text.is_empty() {
        println!("\n{}", "=".repeat(80));
        print!("{}", report.text);
    }

    println!("{}", "=".repeat(80));
    println!("Summary:");
    println!("  Common files:    {}", sets.common_files.len());
    println!("  Different:       {}", report.stats.len());
    println!("  Left only:       {}", sets.only_left_files.len() + sets.only_left_dirs.len());
    println!("  Right only:      {}", sets.only_right_files.len() + sets.only_right_dirs.len());
    println!("  Not inspected:   {}", report.stale.len());
    println!("{}", "=".repeat(80));

    Ok(0)
}

fn run_sync(
    cmp: Comparator,
    direction: Direction,
    avoid: &AvoidList,
    json: bool,
) -> anyhow::Result<i32> {
    let (reports, stale) = match direction {
        Direction::Left => split_partial(cmp.sync_left(avoid).map(|r| vec![r]))?,
        Direction::Right => split_partial(cmp.sync_right(avoid).map(|r| vec![r]))?,
        Direction::Both => split_partial(
            cmp.sync(avoid)
                .map(|outcome| vec![outcome.into_left, outcome.into_right]),
        )?,
    };

    if json {
        let output = JsonSyncReport {
            passes: reports,
            stale: stale.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for report in &reports {
            print_sync_report(report);
        }
        if !stale.is_empty() {
            println!("Vanished before they could be copied:");
            for entry in &stale {
                println!("  {}", entry);
            }
        }
    }

    if stale.is_empty() {
        Ok(0)
    } else {
        warn!("{} entries vanished during sync", stale.len());
        Ok(EXIT_PARTIAL)
    }
}

/// Unpack stale-entry aggregates into reports plus stale list; other errors stay fatal
fn split_partial(
    result: Result<Vec<SyncReport>, DirCmpError>,
) -> anyhow::Result<(Vec<SyncReport>, Vec<StaleEntry>)> {
    match result {
        Ok(reports) => Ok((reports, Vec::new())),
        Err(DirCmpError::PartialSync { report, stale }) => Ok((vec![*report], stale)),
        Err(DirCmpError::PartialBidirectionalSync { outcome, stale }) => {
            let outcome = *outcome;
            Ok((vec![outcome.into_left, outcome.into_right], stale))
        }
        Err(e) => Err(anyhow::Error::new(e).context("Sync failed")),
    }
}

fn print_section<'a>(title: &str, paths: impl Iterator<Item = &'a PathBuf>) {
    let paths: Vec<&PathBuf> = paths.collect();
    println!("{} ({}):", title, paths.len());
    for path in paths {
        println!("  {}", path.display());
    }
}

fn print_sync_report(report: &SyncReport) {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    println!(
        "{}{} <- {}",
        prefix,
        report.destination.display(),
        report.source.display()
    );
    for dir in &report.created_dirs {
        println!("  + {}/", dir.display());
    }
    for file in &report.copied_files {
        println!("  + {}", file.display());
    }
    for skipped in &report.skipped {
        println!("  - {} (avoided)", skipped.display());
    }
}

#[derive(Serialize)]
struct JsonCompareReport {
    left: String,
    right: String,
    only_left_files: Vec<String>,
    only_left_dirs: Vec<String>,
    only_right_files: Vec<String>,
    only_right_dirs: Vec<String>,
    common_files: usize,
    common_dirs: usize,
    divergent: Vec<JsonDivergent>,
    stale: Vec<StaleEntry>,
}

#[derive(Serialize)]
struct JsonDivergent {
    path: String,
    size: &'static str,
    recency: &'static str,
    left: JsonFileSide,
    right: JsonFileSide,
}

#[derive(Serialize)]
struct JsonFileSide {
    size: u64,
    modified_unix: Option<u64>,
    mode: u32,
}

#[derive(Serialize)]
struct JsonSyncReport {
    passes: Vec<SyncReport>,
    stale: Vec<StaleEntry>,
}

fn json_divergent(stat: &DivergenceStat) -> JsonDivergent {
    JsonDivergent {
        path: path_string(&stat.relative_path),
        size: stat.size.label(),
        recency: stat.recency.label(),
        left: JsonFileSide {
            size: stat.left.size_bytes,
            modified_unix: system_time_to_unix(stat.left.modified),
            mode: stat.left.mode,
        },
        right: JsonFileSide {
            size: stat.right.size_bytes,
            modified_unix: system_time_to_unix(stat.right.modified),
            mode: stat.right.mode,
        },
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn path_strings<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<String> {
    paths.into_iter().map(|p| path_string(p)).collect()
}

fn system_time_to_unix(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}
