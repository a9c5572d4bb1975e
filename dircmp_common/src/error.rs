use crate::{BidirectionalSync, StaleEntry, SyncReport};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirCmpError {
    /// Root missing or unreadable, directory creation or copy failure.
    #[error("Filesystem error at {} (root {}): {source}", .path.display(), .root.display())]
    Filesystem {
        root: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sync pass finished but some sources vanished before they could be copied.
    #[error("Sync incomplete: {} stale entries", .stale.len())]
    PartialSync {
        report: Box<SyncReport>,
        stale: Vec<StaleEntry>,
    },

    /// Both passes of a bidirectional sync finished, with stale entries from either pass.
    #[error("Bidirectional sync incomplete: {} stale entries", .stale.len())]
    PartialBidirectionalSync {
        outcome: Box<BidirectionalSync>,
        stale: Vec<StaleEntry>,
    },

    #[error("Invariant violated at {} (root {}): {message}", .path.display(), .root.display())]
    InvariantViolation {
        root: PathBuf,
        path: PathBuf,
        message: String,
    },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

pub type Result<T> = std::result::Result<T, DirCmpError>;

impl DirCmpError {
    pub fn filesystem(
        root: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            root: root.into(),
            path: path.into(),
            source,
        }
    }

    pub fn invariant(
        root: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvariantViolation {
            root: root.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stale entries carried by a sync aggregate
    pub fn stale_entries(&self) -> &[StaleEntry] {
        match self {
            Self::PartialSync { stale, .. } | Self::PartialBidirectionalSync { stale, .. } => stale,
            _ => &[],
        }
    }

    /// True for errors caused by an external race rather than a fatal condition.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Self::PartialSync { .. } | Self::PartialBidirectionalSync { .. }
        )
    }
}
