//! Output reconciliation: prune a generated tree down to what the current
//! pass produced.
//!
//! # Two phases
//!
//! 1. [`plan`] walks `root` read-only and collects every entry that is
//!    neither kept nor under an ignored root. When a doomed entry is a
//!    directory the walk does not descend into it: removing the directory
//!    removes its contents.
//! 2. [`Plan::apply`] deletes the collected entries.
//!
//! Keeping the walk pure makes dry runs trivial (the `plan` CLI command
//! prints a [`Plan`] without applying it) and avoids mutating the tree
//! while iterating over it.
//!
//! # Ignored roots
//!
//! Entries at or below an ignored root are never reached for deletion,
//! even when they are absent from the keep sets. Those subtrees belong to a
//! separate sync step (images, uploaded files, theme assets, favicon).
//! Matching is per path component, so ignoring `img` does not protect
//! `img-old`.
//!
//! # Idempotence
//!
//! With unchanged keep sets, a second run finds nothing to delete: every
//! entry left by the first run is either kept or ignored.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("removing {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Files a pass produced under `root`, plus every directory containing them.
///
/// Recording `root/a/b/c.html` keeps `root/a/b/c.html`, `root/a/b` and
/// `root/a`. The root itself is never part of the set; reconciliation
/// never deletes it anyway.
#[derive(Debug, Clone)]
pub struct OutputSet {
    root: PathBuf,
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

impl OutputSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashSet::new(),
            dirs: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record a written file. Paths outside `root` are ignored.
    pub fn record_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !path.starts_with(&self.root) || path == self.root {
            return;
        }
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            // ancestors above an already-recorded dir are recorded too
            if !self.dirs.insert(d.to_path_buf()) {
                break;
            }
            dir = d.parent();
        }
        self.files.insert(path);
    }

    /// Record a file by its path relative to `root`.
    pub fn record_relative(&mut self, rel: impl AsRef<Path>) -> PathBuf {
        let path = self.root.join(rel);
        self.record_file(path.clone());
        path
    }

    pub fn files(&self) -> &HashSet<PathBuf> {
        &self.files
    }

    pub fn dirs(&self) -> &HashSet<PathBuf> {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Entries a reconciliation would delete, in walk order.
#[derive(Debug, Default)]
pub struct Plan {
    pub doomed: Vec<PathBuf>,
    /// Entries the walk could not read. They are left alone.
    pub walk_errors: Vec<ReconcileError>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.doomed.is_empty()
    }

    /// Delete every doomed entry, continuing past failures.
    ///
    /// An entry that is already gone counts as removed.
    pub fn apply(self) -> Report {
        let mut report = Report {
            removed: Vec::with_capacity(self.doomed.len()),
            errors: self.walk_errors,
        };
        for path in self.doomed {
            tracing::info!(path = %path.display(), "deleting");
            match remove_entry(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.removed.push(path),
                Err(source) => report.errors.push(ReconcileError::Remove { path, source }),
            }
        }
        report
    }
}

/// What [`Plan::apply`] did.
#[derive(Debug, Default)]
pub struct Report {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<ReconcileError>,
}

/// Walk `root` and collect entries to delete.
///
/// An entry is doomed when it is not under any of `ignore_roots` and it is
/// a directory missing from `keep_dirs` or a non-directory missing from
/// `keep_files`. A directory holding an ignored root is never doomed
/// itself; the walk descends into it instead. Symlinks are not followed
/// and are judged as files.
/// A missing `root` yields an empty plan.
pub fn plan(
    root: &Path,
    keep_files: &HashSet<PathBuf>,
    keep_dirs: &HashSet<PathBuf>,
    ignore_roots: &[PathBuf],
) -> Plan {
    let mut plan = Plan::default();
    if std::fs::symlink_metadata(root).is_err() {
        return plan;
    }

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(source) => {
                let path = source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                plan.walk_errors.push(ReconcileError::Walk { path, source });
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().is_dir();

        if is_ignored(path, ignore_roots) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let keep = if is_dir {
            keep_dirs.contains(path)
        } else {
            keep_files.contains(path)
        };
        if !keep && is_dir && holds_ignored(path, ignore_roots) {
            // only the unignored children go
            continue;
        }
        if !keep {
            plan.doomed.push(path.to_path_buf());
            if is_dir {
                walker.skip_current_dir();
            }
        }
    }
    plan
}

/// Plan and apply in one go.
pub fn reconcile(
    root: &Path,
    keep_files: &HashSet<PathBuf>,
    keep_dirs: &HashSet<PathBuf>,
    ignore_roots: &[PathBuf],
) -> Report {
    plan(root, keep_files, keep_dirs, ignore_roots).apply()
}

/// Reconcile `output.root()` against what was recorded in `output`.
pub fn reconcile_output(output: &OutputSet, ignore_roots: &[PathBuf]) -> Report {
    reconcile(output.root(), output.files(), output.dirs(), ignore_roots)
}

fn is_ignored(path: &Path, ignore_roots: &[PathBuf]) -> bool {
    ignore_roots.iter().any(|root| path.starts_with(root))
}

/// True when some ignored root lies strictly below `dir`.
fn holds_ignored(dir: &Path, ignore_roots: &[PathBuf]) -> bool {
    ignore_roots
        .iter()
        .any(|root| root != dir && root.starts_with(dir))
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
