use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Relative file and directory paths found under one root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub files: BTreeSet<PathBuf>,
    pub dirs: BTreeSet<PathBuf>,
}

/// Set algebra between the left and right listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferenceSets {
    pub only_left_files: BTreeSet<PathBuf>,
    pub only_left_dirs: BTreeSet<PathBuf>,
    pub only_right_files: BTreeSet<PathBuf>,
    pub only_right_dirs: BTreeSet<PathBuf>,
    pub common_files: BTreeSet<PathBuf>,
    pub common_dirs: BTreeSet<PathBuf>,
}

/// A path that was listed but vanished before it could be compared or copied
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaleEntry {
    pub root: PathBuf,
    pub path: PathBuf,
}

impl StaleEntry {
    pub fn new(root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for StaleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (vanished from {})",
            self.path.display(),
            self.root.display()
        )
    }
}

/// A common file whose content or permissions differ between the roots
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DivergentPair {
    pub relative_path: PathBuf,
    pub left: PathBuf,
    pub right: PathBuf,
}

/// Result of the deep comparison over all common files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub pairs: Vec<DivergentPair>,
    pub stale: Vec<StaleEntry>,
}

/// Size and timestamp of one side of a divergent file
#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    pub size_bytes: u64,
    pub modified: SystemTime,
    /// Permission bits (`st_mode & 0o7777` on Unix)
    pub mode: u32,
    #[serde(skip)]
    pub raw: Metadata,
}

impl FileStat {
    /// Fails where the platform does not record modification times
    pub fn from_metadata(metadata: Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size_bytes: metadata.len(),
            modified: metadata.modified()?,
            mode: permission_bits(&metadata),
            raw: metadata,
        })
    }

    pub fn size_mib(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Permission bits used when deciding whether two files diverge.
#[cfg(unix)]
pub fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Permission bits used when deciding whether two files diverge.
#[cfg(not(unix))]
pub fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Size of the left file relative to the right one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeComparison {
    Larger,
    Smaller,
    SameSize,
}

impl SizeComparison {
    pub fn of(left: u64, right: u64) -> Self {
        match left.cmp(&right) {
            std::cmp::Ordering::Greater => Self::Larger,
            std::cmp::Ordering::Less => Self::Smaller,
            std::cmp::Ordering::Equal => Self::SameSize,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Larger => "Larger",
            Self::Smaller => "Smaller",
            Self::SameSize => "Same size",
        }
    }
}

/// Modification time of the left file relative to the right one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recency {
    Newer,
    Older,
    SameTime,
}

impl Recency {
    pub fn of(left: SystemTime, right: SystemTime) -> Self {
        match left.cmp(&right) {
            std::cmp::Ordering::Greater => Self::Newer,
            std::cmp::Ordering::Less => Self::Older,
            std::cmp::Ordering::Equal => Self::SameTime,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Newer => "Newer",
            Self::Older => "Older",
            Self::SameTime => "Same time",
        }
    }
}

/// Stats for one divergent path, both roots
#[derive(Debug, Clone, Serialize)]
pub struct DivergenceStat {
    pub relative_path: PathBuf,
    pub left: FileStat,
    pub right: FileStat,
    pub size: SizeComparison,
    pub recency: Recency,
}

/// Structured stats, rendered text and uninspectable entries for the divergent set
#[derive(Debug, Clone, Default, Serialize)]
pub struct DivergenceReport {
    pub stats: Vec<DivergenceStat>,
    pub text: String,
    pub stale: Vec<StaleEntry>,
}

/// Relative paths excluded from a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvoidList {
    pub files: BTreeSet<PathBuf>,
    pub dirs: BTreeSet<PathBuf>,
}

impl AvoidList {
    pub fn new<F, D>(files: F, dirs: D) -> Self
    where
        F: IntoIterator,
        F::Item: Into<PathBuf>,
        D: IntoIterator,
        D::Item: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// A directory is avoided if it or any of its ancestors is listed
    pub fn avoids_dir(&self, dir: &Path) -> bool {
        dir.ancestors()
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .any(|ancestor| self.dirs.contains(ancestor))
    }

    /// A file is avoided if it is listed or lives under an avoided directory
    pub fn avoids_file(&self, file: &Path) -> bool {
        if self.files.contains(file) {
            return true;
        }
        file.parent().map_or(false, |parent| self.avoids_dir(parent))
    }
}

/// Outcome of one sync pass into a destination root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub created_dirs: Vec<PathBuf>,
    pub copied_files: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub dry_run: bool,
}

/// Outcome of `sync`: the pass into the left root, then the pass into the right root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidirectionalSync {
    pub into_left: SyncReport,
    pub into_right: SyncReport,
}
