use dircmp_common::{CompareOptions, DirCmpError, Listing};
use jwalk::WalkDir;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory lister using jwalk
///
/// Symlinks are listed as opaque files unless `follow_symlinks` is set, in
/// which case the walker descends into linked directories and reports link
/// cycles as walk errors.
pub struct Lister {
    follow_symlinks: bool,
}

impl Lister {
    pub fn new(follow_symlinks: bool) -> Self {
        Self { follow_symlinks }
    }

    pub fn from_options(options: &CompareOptions) -> Self {
        Self::new(options.follow_symlinks)
    }

    /// List every file and subdirectory under `root`, relative to `root`
    pub fn list(&self, root: &Path) -> Result<Listing, DirCmpError> {
        // Surfaces missing, unreadable and non-directory roots before walking
        fs::read_dir(root).map_err(|e| DirCmpError::filesystem(root, ".", e))?;

        let mut listing = Listing::default();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .skip_hidden(false)
            .sort(true);

        for entry in walker {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) => match dangling_link(root, &e) {
                    Some(relative_path) => {
                        debug!("Listing dangling symlink {:?} as a file", relative_path);
                        listing.files.insert(relative_path);
                        continue;
                    }
                    None => return Err(walk_error(root, e)),
                },
            };

            // jwalk keeps the entry of a directory it could not read
            if let Some(e) = entry.read_children_error.take() {
                return Err(walk_error(root, e));
            }

            let path = entry.path();
            let relative_path = path
                .strip_prefix(root)
                .map_err(|e| {
                    DirCmpError::filesystem(root, &path, io::Error::other(e.to_string()))
                })?
                .to_path_buf();

            // Skip the synthetic root entry (empty path)
            if relative_path.as_os_str().is_empty() {
                continue;
            }

            if entry.file_type().is_dir() {
                listing.dirs.insert(relative_path);
            } else {
                listing.files.insert(relative_path);
            }
        }

        debug!(
            "Listed {} files and {} dirs under {:?}",
            listing.files.len(),
            listing.dirs.len(),
            root
        );
        Ok(listing)
    }
}

fn relative_to_root(root: &Path, err: &jwalk::Error) -> Option<PathBuf> {
    err.path()
        .and_then(|path| path.strip_prefix(root).ok())
        .filter(|path| !path.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// A followed link whose target is missing; listed like an unfollowed link
fn dangling_link(root: &Path, err: &jwalk::Error) -> Option<PathBuf> {
    let not_found = err
        .io_error()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound);
    if !not_found {
        return None;
    }
    let path = err.path()?;
    let is_link = fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false);
    if is_link {
        relative_to_root(root, err)
    } else {
        None
    }
}

/// Map a walk error onto the entry it concerns, keeping the io error kind
fn walk_error(root: &Path, err: jwalk::Error) -> DirCmpError {
    let relative = relative_to_root(root, &err).unwrap_or_else(|| PathBuf::from("."));
    let kind = err
        .io_error()
        .map_or(io::ErrorKind::Other, |io_err| io_err.kind());

    DirCmpError::filesystem(root, relative, io::Error::new(kind, format!("Walk error: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lister_basic() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file1.txt"), b"test").unwrap();
        fs::write(temp.path().join("file2.txt"), b"test").unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();
        fs::write(temp.path().join("subdir/file3.txt"), b"test").unwrap();

        let listing = Lister::new(false).list(temp.path()).unwrap();

        let files: Vec<PathBuf> = listing.files.into_iter().collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("file1.txt"),
                PathBuf::from("file2.txt"),
                PathBuf::from("subdir").join("file3.txt"),
            ]
        );
        assert_eq!(listing.dirs.len(), 1);
        assert!(listing.dirs.contains(Path::new("subdir")));
    }

    #[test]
    fn test_lister_no_root_entry() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("test.txt"), b"content").unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();

        let listing = Lister::new(false).list(temp.path()).unwrap();

        for path in listing.files.iter().chain(listing.dirs.iter()) {
            assert!(
                !path.as_os_str().is_empty(),
                "Lister included root directory entry with empty path"
            );
        }
        assert_eq!(listing.files.len() + listing.dirs.len(), 2);
    }

    #[test]
    fn test_lister_empty_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b/c")).unwrap();

        let listing = Lister::new(false).list(temp.path()).unwrap();

        assert!(listing.files.is_empty());
        assert_eq!(listing.dirs.len(), 3);
        assert!(listing.dirs.contains(&PathBuf::from("a").join("b").join("c")));
    }

    #[test]
    fn test_lister_missing_root_is_filesystem_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist");

        let err = Lister::new(false).list(&missing).unwrap_err();
        match err {
            DirCmpError::Filesystem { root, source, .. } => {
                assert_eq!(root, missing);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lister_file_root_is_filesystem_error() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        let err = Lister::new(false).list(&file).unwrap_err();
        assert!(matches!(err, DirCmpError::Filesystem { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_lister_symlinked_dir_is_opaque_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/inner.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();
        // A cycle back to the root must not hang the default walk
        std::os::unix::fs::symlink(temp.path(), temp.path().join("real/loop")).unwrap();

        let listing = Lister::new(false).list(temp.path()).unwrap();

        assert!(listing.files.contains(Path::new("link")));
        assert!(!listing.dirs.contains(Path::new("link")));
        assert!(listing.files.contains(&PathBuf::from("real").join("loop")));
        assert!(!listing.files.contains(&PathBuf::from("link").join("inner.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_lister_follow_symlinks_descends_into_linked_dir() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/inner.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let listing = Lister::new(true).list(temp.path()).unwrap();

        assert!(listing.dirs.contains(Path::new("link")));
        assert!(!listing.files.contains(Path::new("link")));
        assert!(listing.files.contains(&PathBuf::from("link").join("inner.txt")));
        assert!(listing.files.contains(&PathBuf::from("real").join("inner.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_lister_follow_symlinks_cycle_names_offending_link() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        std::os::unix::fs::symlink(temp.path(), temp.path().join("a/loop")).unwrap();

        let err = Lister::new(true).list(temp.path()).unwrap_err();

        match err {
            DirCmpError::Filesystem { root, path, .. } => {
                assert_eq!(root, temp.path());
                assert_eq!(path, PathBuf::from("a").join("loop"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_lister_follow_symlinks_keeps_dangling_link_as_file() {
        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone"), temp.path().join("broken")).unwrap();

        let listing = Lister::new(true).list(temp.path()).unwrap();

        assert!(listing.files.contains(Path::new("broken")));
    }

    #[cfg(unix)]
    #[test]
    fn test_lister_unreadable_subdir_is_permission_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden.txt"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read it anyway
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = Lister::new(false).list(temp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        match result.unwrap_err() {
            DirCmpError::Filesystem { path, source, .. } => {
                assert_eq!(path, PathBuf::from("locked"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
