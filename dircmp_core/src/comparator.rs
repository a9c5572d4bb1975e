use crate::classifier::{classify, find_divergent};
use crate::lister::Lister;
use crate::report::{build_divergence_report, render_report};
use crate::synchronizer::Synchronizer;
use dircmp_common::{
    AvoidList, BidirectionalSync, CompareOptions, DifferenceSets, DirCmpError, Divergence,
    DivergenceReport, DivergenceStat, DivergentPair, Listing, SyncReport,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::info;

/// Compares two directory trees and syncs the entries missing on either side
///
/// Every accessor computes its value on first use and caches it for the
/// lifetime of the comparator. Listings are never refreshed, not even after
/// a sync: build a new `Comparator` to observe filesystem changes.
///
/// ```no_run
/// use dircmp_core::Comparator;
///
/// let cmp = Comparator::new("backup/photos", "laptop/photos");
/// for path in cmp.only_right_files()? {
///     println!("missing from backup: {}", path.display());
/// }
/// print!("{}", cmp.divergence_report()?.text);
/// # Ok::<(), dircmp_common::DirCmpError>(())
/// ```
pub struct Comparator {
    left: PathBuf,
    right: PathBuf,
    options: CompareOptions,
    left_listing: OnceLock<Listing>,
    right_listing: OnceLock<Listing>,
    differences: OnceLock<DifferenceSets>,
    divergence: OnceLock<Divergence>,
    report: OnceLock<DivergenceReport>,
    // Serializes first computation so each field is built at most once
    init: Mutex<()>,
}

impl Comparator {
    pub fn new(left: impl Into<PathBuf>, right: impl Into<PathBuf>) -> Self {
        Self::with_options(left, right, CompareOptions::default())
    }

    pub fn with_options(
        left: impl Into<PathBuf>,
        right: impl Into<PathBuf>,
        options: CompareOptions,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            options,
            left_listing: OnceLock::new(),
            right_listing: OnceLock::new(),
            differences: OnceLock::new(),
            divergence: OnceLock::new(),
            report: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn left_root(&self) -> &Path {
        &self.left
    }

    pub fn right_root(&self) -> &Path {
        &self.right
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    /// Return the cached value, or compute it under the init lock.
    /// `compute` must not call back into another accessor.
    fn memoize<'a, T>(
        &self,
        cell: &'a OnceLock<T>,
        compute: impl FnOnce() -> Result<T, DirCmpError>,
    ) -> Result<&'a T, DirCmpError> {
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let value = compute()?;
        Ok(cell.get_or_init(|| value))
    }

    pub fn left_listing(&self) -> Result<&Listing, DirCmpError> {
        let lister = Lister::from_options(&self.options);
        self.memoize(&self.left_listing, || lister.list(&self.left))
    }

    pub fn right_listing(&self) -> Result<&Listing, DirCmpError> {
        let lister = Lister::from_options(&self.options);
        self.memoize(&self.right_listing, || lister.list(&self.right))
    }

    pub fn left_files(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.left_listing()?.files)
    }

    pub fn left_dirs(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.left_listing()?.dirs)
    }

    pub fn right_files(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.right_listing()?.files)
    }

    pub fn right_dirs(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.right_listing()?.dirs)
    }

    pub fn differences(&self) -> Result<&DifferenceSets, DirCmpError> {
        let left = self.left_listing()?;
        let right = self.right_listing()?;
        self.memoize(&self.differences, || Ok(classify(left, right)))
    }

    pub fn only_left_files(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.differences()?.only_left_files)
    }

    pub fn only_left_dirs(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.differences()?.only_left_dirs)
    }

    pub fn only_right_files(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.differences()?.only_right_files)
    }

    pub fn only_right_dirs(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.differences()?.only_right_dirs)
    }

    pub fn common_files(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.differences()?.common_files)
    }

    pub fn common_dirs(&self) -> Result<&BTreeSet<PathBuf>, DirCmpError> {
        Ok(&self.differences()?.common_dirs)
    }

    /// Deep comparison of the common files, with any stale entries it hit
    pub fn divergence(&self) -> Result<&Divergence, DirCmpError> {
        let common = self.common_files()?;
        self.memoize(&self.divergence, || {
            find_divergent(common, &self.left, &self.right, self.options.workers)
        })
    }

    pub fn divergent_pairs(&self) -> Result<&[DivergentPair], DirCmpError> {
        Ok(&self.divergence()?.pairs)
    }

    /// Divergence report; stale entries from both the comparison and the stat pass are included
    pub fn divergence_report(&self) -> Result<&DivergenceReport, DirCmpError> {
        let divergence = self.divergence()?;
        self.memoize(&self.report, || {
            let mut report = build_divergence_report(&divergence.pairs, &self.left, &self.right)?;
            if !divergence.stale.is_empty() {
                let mut stale = divergence.stale.clone();
                stale.append(&mut report.stale);
                stale.sort();
                stale.dedup();
                report.text = render_report(&report.stats, &stale, &self.left, &self.right);
                report.stale = stale;
            }
            Ok(report)
        })
    }

    pub fn divergence_stats(&self) -> Result<&[DivergenceStat], DirCmpError> {
        Ok(&self.divergence_report()?.stats)
    }

    /// Copy the only-right entries into the left root
    pub fn sync_left(&self, avoid: &AvoidList) -> Result<SyncReport, DirCmpError> {
        let sets = self.differences()?;
        let report = Synchronizer::new(self.options.dry_run).sync_into(
            &self.right,
            &sets.only_right_files,
            &sets.only_right_dirs,
            &self.left,
            avoid,
        )?;
        info!("Synced {} with {}", self.left.display(), self.right.display());
        Ok(report)
    }

    /// Copy the only-left entries into the right root
    pub fn sync_right(&self, avoid: &AvoidList) -> Result<SyncReport, DirCmpError> {
        let sets = self.differences()?;
        let report = Synchronizer::new(self.options.dry_run).sync_into(
            &self.left,
            &sets.only_left_files,
            &sets.only_left_dirs,
            &self.right,
            avoid,
        )?;
        info!("Synced {} with {}", self.right.display(), self.left.display());
        Ok(report)
    }

    /// `sync_left`, then `sync_right`
    ///
    /// Not atomic: a fatal error during the right pass leaves the left pass
    /// applied. Stale entries from the left pass do not stop the right pass;
    /// both passes' stale entries are returned together at the end.
    pub fn sync(&self, avoid: &AvoidList) -> Result<BidirectionalSync, DirCmpError> {
        let mut stale = Vec::new();

        let into_left = match self.sync_left(avoid) {
            Ok(report) => report,
            Err(DirCmpError::PartialSync { report, stale: mut left_stale }) => {
                stale.append(&mut left_stale);
                *report
            }
            Err(e) => return Err(e),
        };

        let into_right = match self.sync_right(avoid) {
            Ok(report) => report,
            Err(DirCmpError::PartialSync { report, stale: mut right_stale }) => {
                stale.append(&mut right_stale);
                *report
            }
            Err(e) => return Err(e),
        };

        let outcome = BidirectionalSync {
            into_left,
            into_right,
        };

        if stale.is_empty() {
            Ok(outcome)
        } else {
            Err(DirCmpError::PartialBidirectionalSync {
                outcome: Box::new(outcome),
                stale,
            })
        }
    }
}
