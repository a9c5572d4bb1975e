use dircmp_common::{AvoidList, DirCmpError, StaleEntry, SyncReport};
use filetime::FileTime;
use std::collections::BTreeSet;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Replays missing entries from one root into another
///
/// Directories are created first (parents before children), then files are
/// copied. Divergent files are never passed in by the comparator; callers
/// who want to resolve them choose the paths themselves.
pub struct Synchronizer {
    dry_run: bool,
}

impl Synchronizer {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Materialize `dirs` and `files` (relative to `source_root`) under `dest_root`
    ///
    /// Fatal errors abort immediately. Sources that vanished are collected and
    /// returned as `DirCmpError::PartialSync` once every other entry is done.
    pub fn sync_into(
        &self,
        source_root: &Path,
        files: &BTreeSet<PathBuf>,
        dirs: &BTreeSet<PathBuf>,
        dest_root: &Path,
        avoid: &AvoidList,
    ) -> Result<SyncReport, DirCmpError> {
        let mut report = SyncReport {
            source: source_root.to_path_buf(),
            destination: dest_root.to_path_buf(),
            dry_run: self.dry_run,
            ..SyncReport::default()
        };
        let mut stale = Vec::new();

        let mut ordered_dirs: Vec<&PathBuf> = dirs.iter().collect();
        ordered_dirs.sort_by(|a, b| {
            a.components()
                .count()
                .cmp(&b.components().count())
                .then_with(|| a.cmp(b))
        });

        for dir in ordered_dirs {
            if avoid.avoids_dir(dir) {
                debug!("Skipping avoided directory {:?}", dir);
                report.skipped.push(dir.clone());
                continue;
            }

            if self.dry_run {
                info!("DRY RUN: Would create directory {:?} in {:?}", dir, dest_root);
                report.created_dirs.push(dir.clone());
                continue;
            }

            if self.create_dir(dest_root, dir)? {
                report.created_dirs.push(dir.clone());
            }
        }

        for file in files {
            if avoid.avoids_file(file) {
                debug!("Skipping avoided file {:?}", file);
                report.skipped.push(file.clone());
                continue;
            }

            if self.dry_run {
                info!("DRY RUN: Would copy {:?} from {:?} to {:?}", file, source_root, dest_root);
                report.copied_files.push(file.clone());
                continue;
            }

            match self.copy_entry(source_root, dest_root, file)? {
                Some(Copied::File(bytes)) => {
                    info!("Copied {:?} into {:?} ({} bytes)", file, dest_root, bytes);
                    report.copied_files.push(file.clone());
                }
                Some(Copied::Symlink(target)) => {
                    info!("Recreated symlink {:?} -> {:?} in {:?}", file, target, dest_root);
                    report.copied_files.push(file.clone());
                }
                None => {
                    let entry = StaleEntry::new(source_root, file);
                    warn!("Source vanished before copy: {}", entry);
                    stale.push(entry);
                }
            }
        }

        info!(
            "Synced {:?} from {:?}: {} dirs, {} files, {} skipped",
            dest_root,
            source_root,
            report.created_dirs.len(),
            report.copied_files.len(),
            report.skipped.len()
        );

        if stale.is_empty() {
            Ok(report)
        } else {
            Err(DirCmpError::PartialSync {
                report: Box::new(report),
                stale,
            })
        }
    }

    /// Create one directory; returns false if it already existed
    fn create_dir(&self, dest_root: &Path, relative: &Path) -> Result<bool, DirCmpError> {
        let target = dest_root.join(relative);
        match fs::create_dir(&target) {
            Ok(()) => {
                info!("Created directory {:?} in {:?}", relative, dest_root);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && target.is_dir() => {
                debug!("Directory {:?} already exists in {:?}", relative, dest_root);
                Ok(false)
            }
            Err(e) => Err(DirCmpError::filesystem(dest_root, relative, e)),
        }
    }

    /// Copy one entry, recreating symlinks as links rather than following them
    ///
    /// Returns `None` if the source vanished.
    fn copy_entry(
        &self,
        source_root: &Path,
        dest_root: &Path,
        relative: &Path,
    ) -> Result<Option<Copied>, DirCmpError> {
        let source = source_root.join(relative);
        let dest = dest_root.join(relative);

        let parent = match dest.parent() {
            Some(parent) if parent.is_dir() => parent,
            _ => {
                return Err(DirCmpError::invariant(
                    dest_root,
                    relative,
                    "destination parent directory missing before file copy",
                ))
            }
        };

        let metadata = match fs::symlink_metadata(&source) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DirCmpError::filesystem(source_root, relative, e)),
        };

        if metadata.file_type().is_symlink() {
            let target = self.copy_symlink(source_root, dest_root, relative, &metadata)?;
            Ok(target.map(Copied::Symlink))
        } else {
            let bytes = self.copy_file(source_root, dest_root, relative, parent)?;
            Ok(bytes.map(Copied::File))
        }
    }

    /// Copy one regular file through a temp file in the destination directory
    ///
    /// Permission bits and access/modification times follow the source. The
    /// temp file is renamed into place without replacing an existing entry,
    /// and is removed on any failure.
    fn copy_file(
        &self,
        source_root: &Path,
        dest_root: &Path,
        relative: &Path,
        parent: &Path,
    ) -> Result<Option<u64>, DirCmpError> {
        let source = source_root.join(relative);
        let dest = dest_root.join(relative);

        let mut source_file = match File::open(&source) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DirCmpError::filesystem(source_root, relative, e)),
        };
        let source_err = |e: io::Error| DirCmpError::filesystem(source_root, relative, e);
        let dest_err = |e: io::Error| DirCmpError::filesystem(dest_root, relative, e);

        let metadata = source_file.metadata().map_err(source_err)?;

        debug!("Copying {:?} to {:?}", source, dest);
        let mut temp = NamedTempFile::new_in(parent).map_err(dest_err)?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut bytes = 0u64;
        loop {
            let n = match source_file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(source_err(e)),
            };
            temp.as_file_mut().write_all(&buf[..n]).map_err(dest_err)?;
            bytes += n as u64;
        }

        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(dest_err)?;
        filetime::set_file_handle_times(
            temp.as_file(),
            Some(FileTime::from_last_access_time(&metadata)),
            Some(FileTime::from_last_modification_time(&metadata)),
        )
        .map_err(dest_err)?;

        temp.persist_noclobber(&dest)
            .map_err(|e| dest_err(e.error))?;

        Ok(Some(bytes))
    }

    /// Recreate a symlink with the same target; the link's own times follow the source
    fn copy_symlink(
        &self,
        source_root: &Path,
        dest_root: &Path,
        relative: &Path,
        metadata: &Metadata,
    ) -> Result<Option<PathBuf>, DirCmpError> {
        let source = source_root.join(relative);
        let dest = dest_root.join(relative);

        let target = match fs::read_link(&source) {
            Ok(target) => target,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DirCmpError::filesystem(source_root, relative, e)),
        };
        let dest_err = |e: io::Error| DirCmpError::filesystem(dest_root, relative, e);

        // Link creation fails on an existing entry, so nothing is replaced
        create_symlink(&source, &target, &dest).map_err(dest_err)?;
        filetime::set_symlink_file_times(
            &dest,
            FileTime::from_last_access_time(metadata),
            FileTime::from_last_modification_time(metadata),
        )
        .map_err(dest_err)?;

        Ok(Some(target))
    }
}

enum Copied {
    File(u64),
    Symlink(PathBuf),
}

#[cfg(unix)]
fn create_symlink(_source: &Path, target: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(windows)]
fn create_symlink(source: &Path, target: &Path, dest: &Path) -> io::Result<()> {
    if fs::metadata(source).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, dest)
    } else {
        std::os::windows::fs::symlink_file(target, dest)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_source: &Path, _target: &Path, _dest: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
