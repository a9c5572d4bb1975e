use dircmp_common::{
    permission_bits, DifferenceSets, DirCmpError, Divergence, DivergentPair, Listing, StaleEntry,
};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Paths in `a` that are not in `b`, in lexicographic order
pub fn difference(a: &BTreeSet<PathBuf>, b: &BTreeSet<PathBuf>) -> BTreeSet<PathBuf> {
    a.difference(b).cloned().collect()
}

/// Paths present in both sets
pub fn intersection(a: &BTreeSet<PathBuf>, b: &BTreeSet<PathBuf>) -> BTreeSet<PathBuf> {
    a.intersection(b).cloned().collect()
}

/// Partition two listings into only-left, only-right and common sets
pub fn classify(left: &Listing, right: &Listing) -> DifferenceSets {
    let sets = DifferenceSets {
        only_left_files: difference(&left.files, &right.files),
        only_left_dirs: difference(&left.dirs, &right.dirs),
        only_right_files: difference(&right.files, &left.files),
        only_right_dirs: difference(&right.dirs, &left.dirs),
        common_files: intersection(&left.files, &right.files),
        common_dirs: intersection(&left.dirs, &right.dirs),
    };

    debug!(
        "Classified {} only-left, {} only-right, {} common files",
        sets.only_left_files.len(),
        sets.only_right_files.len(),
        sets.common_files.len()
    );
    sets
}

enum Outcome {
    Same,
    Divergent(DivergentPair),
    Stale(StaleEntry),
}

/// Deep-compare every common file and collect the divergent ones
///
/// Runs on a pool of at most `workers` threads (0 = one per CPU). Files that
/// vanished since listing are returned as stale entries; any other I/O error
/// fails the whole scan once every comparison has finished.
pub fn find_divergent(
    common_files: &BTreeSet<PathBuf>,
    left_root: &Path,
    right_root: &Path,
    workers: usize,
) -> Result<Divergence, DirCmpError> {
    info!("Deep-comparing {} common files", common_files.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| DirCmpError::WorkerPool(e.to_string()))?;

    let paths: Vec<&PathBuf> = common_files.iter().collect();
    let outcomes: Vec<Result<Outcome, DirCmpError>> = pool.install(|| {
        paths
            .par_iter()
            .map(|relative| compare_common_file(left_root, right_root, relative))
            .collect()
    });

    let mut divergence = Divergence::default();
    let mut first_error = None;

    for outcome in outcomes {
        match outcome {
            Ok(Outcome::Same) => {}
            Ok(Outcome::Divergent(pair)) => divergence.pairs.push(pair),
            Ok(Outcome::Stale(entry)) => {
                warn!("Stale entry during comparison: {}", entry);
                divergence.stale.push(entry);
            }
            Err(e) => {
                warn!("Comparison failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    divergence.pairs.sort();
    divergence.stale.sort();

    debug!(
        "Found {} divergent files, {} stale entries",
        divergence.pairs.len(),
        divergence.stale.len()
    );
    Ok(divergence)
}

/// Compare one common file: permission bits first, then content in chunks.
/// Modification time is deliberately ignored.
fn compare_common_file(
    left_root: &Path,
    right_root: &Path,
    relative: &Path,
) -> Result<Outcome, DirCmpError> {
    let left = left_root.join(relative);
    let right = right_root.join(relative);

    let left_meta = match fs::metadata(&left) {
        Ok(meta) => meta,
        Err(e) => return io_outcome(left_root, relative, e),
    };
    let right_meta = match fs::metadata(&right) {
        Ok(meta) => meta,
        Err(e) => return io_outcome(right_root, relative, e),
    };

    let pair = || {
        Outcome::Divergent(DivergentPair {
            relative_path: relative.to_path_buf(),
            left: left.clone(),
            right: right.clone(),
        })
    };

    // Symlinked directories listed as files on both sides
    if left_meta.is_dir() || right_meta.is_dir() {
        return Ok(if left_meta.is_dir() && right_meta.is_dir() {
            Outcome::Same
        } else {
            pair()
        });
    }

    if !metadata_matches(&left_meta, &right_meta) {
        debug!("Metadata differs for {:?}", relative);
        return Ok(pair());
    }

    let left_file = match File::open(&left) {
        Ok(file) => file,
        Err(e) => return io_outcome(left_root, relative, e),
    };
    let right_file = match File::open(&right) {
        Ok(file) => file,
        Err(e) => return io_outcome(right_root, relative, e),
    };

    let mut left_reader = BufReader::with_capacity(CHUNK_SIZE, left_file);
    let mut right_reader = BufReader::with_capacity(CHUNK_SIZE, right_file);
    let mut left_buf = vec![0u8; CHUNK_SIZE];
    let mut right_buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n_left = match read_chunk(&mut left_reader, &mut left_buf) {
            Ok(n) => n,
            Err(e) => return io_outcome(left_root, relative, e),
        };
        let n_right = match read_chunk(&mut right_reader, &mut right_buf) {
            Ok(n) => n,
            Err(e) => return io_outcome(right_root, relative, e),
        };

        if n_left != n_right || left_buf[..n_left] != right_buf[..n_right] {
            debug!("Content differs for {:?}", relative);
            return Ok(pair());
        }
        if n_left == 0 {
            return Ok(Outcome::Same);
        }
    }
}

/// Length and permission bits; a length mismatch already proves the bytes differ
fn metadata_matches(left: &Metadata, right: &Metadata) -> bool {
    left.len() == right.len() && permission_bits(left) == permission_bits(right)
}

/// Fill `buf` completely, or as far as the end of the file allows
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn io_outcome(root: &Path, relative: &Path, err: io::Error) -> Result<Outcome, DirCmpError> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(Outcome::Stale(StaleEntry::new(root, relative)))
    } else {
        Err(DirCmpError::filesystem(root, relative, err))
    }
}
