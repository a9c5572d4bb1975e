use chrono::{DateTime, Local};
use dircmp_common::{
    DirCmpError, DivergenceReport, DivergenceStat, DivergentPair, FileStat, Recency,
    SizeComparison, StaleEntry,
};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Stat both sides of every divergent pair and render the report text
///
/// Entries whose file vanished since the comparison are listed as stale in
/// the returned report; any other I/O error aborts.
pub fn build_divergence_report(
    pairs: &[DivergentPair],
    left_root: &Path,
    right_root: &Path,
) -> Result<DivergenceReport, DirCmpError> {
    let mut stats = Vec::with_capacity(pairs.len());
    let mut stale = Vec::new();

    for pair in pairs {
        let left = match stat(left_root, &pair.relative_path, &pair.left)? {
            Some(stat) => stat,
            None => {
                stale.push(StaleEntry::new(left_root, &pair.relative_path));
                continue;
            }
        };
        let right = match stat(right_root, &pair.relative_path, &pair.right)? {
            Some(stat) => stat,
            None => {
                stale.push(StaleEntry::new(right_root, &pair.relative_path));
                continue;
            }
        };

        stats.push(DivergenceStat {
            relative_path: pair.relative_path.clone(),
            size: SizeComparison::of(left.size_bytes, right.size_bytes),
            recency: Recency::of(left.modified, right.modified),
            left,
            right,
        });
    }

    for entry in &stale {
        warn!("Could not inspect {}", entry);
    }

    let text = render_report(&stats, &stale, left_root, right_root);
    debug!("Built divergence report for {} files", stats.len());

    Ok(DivergenceReport { stats, text, stale })
}

fn stat(root: &Path, relative: &Path, path: &Path) -> Result<Option<FileStat>, DirCmpError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DirCmpError::filesystem(root, relative, e)),
    };
    FileStat::from_metadata(metadata)
        .map(Some)
        .map_err(|e| DirCmpError::filesystem(root, relative, e))
}

/// Render one block per divergent file, then the stale section if any
pub fn render_report(
    stats: &[DivergenceStat],
    stale: &[StaleEntry],
    left_root: &Path,
    right_root: &Path,
) -> String {
    let mut report = String::new();

    for stat in stats {
        let _ = write!(
            report,
            "File {}:\n\tFrom {}: ({}) ({})\n\t\tSize: {:.2} MB\n\t\tLast modified on {}",
            stat.relative_path.display(),
            left_root.display(),
            stat.size.label(),
            stat.recency.label(),
            stat.left.size_mib(),
            format_local_time(stat.left.modified),
        );
        let _ = write!(
            report,
            "\n\tFrom {}:\n\t\tSize: {:.2} MB\n\t\tLast modified on {}\n\n\n",
            right_root.display(),
            stat.right.size_mib(),
            format_local_time(stat.right.modified),
        );
    }

    if !stale.is_empty() {
        report.push_str("Could not inspect:\n");
        for entry in stale {
            let _ = writeln!(report, "\t{}", entry);
        }
    }

    report
}

/// Local civil time with the UTC offset, e.g. `Tue Nov 14 22:13:20 2023, GMT+0000`
pub fn format_local_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%c, GMT%z")
        .to_string()
}
