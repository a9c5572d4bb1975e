/// Options for one comparison session
///
/// There is no configuration file; callers (and the CLI) set these directly.
#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Descend into symlinked directories instead of listing them as files
    pub follow_symlinks: bool,

    /// Upper bound on concurrent file comparisons (0 = one per CPU)
    pub workers: usize,

    /// Log sync actions without touching the destination
    pub dry_run: bool,
}

impl CompareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow_symlinks(mut self, enabled: bool) -> Self {
        self.follow_symlinks = enabled;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }
}
