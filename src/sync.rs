//! Bounded syncs of generated-artifact directories.
//!
//! Images, uploaded files and theme assets are not rendered from nodes;
//! they are copied from their sources. Each has its own small
//! reconciliation, independent from the node tree:
//!
//! - [`sync_flat`] copies a list of source files into one directory and
//!   removes any destination entry whose name is not a current source.
//! - [`mirror_tree`] mirrors a whole source tree, pruning the destination
//!   with the node reconciler. Paths the caller generates into the same
//!   tree are kept.
//!
//! Copies are skipped when the destination already holds identical bytes
//! (same length and SHA-256), so an unchanged site rewrites nothing.

use crate::reconcile::{self, OutputSet, ReconcileError};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("creating {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("copying {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error(transparent)]
    Prune(#[from] ReconcileError),
}

/// Counters for one sync.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub copied: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Copy `sources` into `dest` (flat) and prune stale entries.
///
/// Sources are deduplicated by file name, first one wins. Failures are
/// collected; one failed copy does not stop the others.
pub fn sync_flat(dest: &Path, sources: &[PathBuf]) -> (SyncStats, Vec<SyncError>) {
    let mut stats = SyncStats::default();
    let mut errors = Vec::new();

    if let Err(source) = fs::create_dir_all(dest) {
        errors.push(SyncError::CreateDir {
            path: dest.to_path_buf(),
            source,
        });
        return (stats, errors);
    }

    let mut names = HashSet::new();
    for src in sources {
        let Some(name) = src.file_name() else {
            continue;
        };
        if !names.insert(name.to_os_string()) {
            continue;
        }
        match copy_if_changed(src, &dest.join(name)) {
            Ok(true) => stats.copied += 1,
            Ok(false) => stats.unchanged += 1,
            Err(e) => errors.push(e),
        }
    }

    let entries = match fs::read_dir(dest) {
        Ok(entries) => entries,
        Err(source) => {
            errors.push(SyncError::Read {
                path: dest.to_path_buf(),
                source,
            });
            return (stats, errors);
        }
    };
    let listing = entries.map(|entry| entry.map(|e| (e.file_name(), e.path())));
    let stale = stale_entries(dest, listing, &names, &mut errors);

    let doomed = reconcile::Plan {
        doomed: stale,
        walk_errors: Vec::new(),
    };
    let report = doomed.apply();
    stats.removed = report.removed.len();
    errors.extend(report.errors.into_iter().map(SyncError::from));

    (stats, errors)
}

/// Entries of a flat listing whose name is not in `keep`, sorted. Entries
/// that cannot be read are reported and left alone.
fn stale_entries(
    dir: &Path,
    listing: impl Iterator<Item = io::Result<(OsString, PathBuf)>>,
    keep: &HashSet<OsString>,
    errors: &mut Vec<SyncError>,
) -> Vec<PathBuf> {
    let mut stale = Vec::new();
    for entry in listing {
        match entry {
            Ok((name, path)) if !keep.contains(&name) => stale.push(path),
            Ok(_) => {}
            Err(source) => errors.push(SyncError::Read {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }
    stale.sort();
    stale
}

/// Mirror the tree under `src` into `dest`.
///
/// `generated` lists paths relative to `dest` that another step writes
/// (compiled stylesheets); they survive the prune. A missing `src` mirrors
/// as an empty tree.
pub fn mirror_tree(src: &Path, dest: &Path, generated: &[PathBuf]) -> (SyncStats, Vec<SyncError>) {
    let mut stats = SyncStats::default();
    let mut errors = Vec::new();
    let mut output = OutputSet::new(dest);
    for rel in generated {
        output.record_relative(rel);
    }

    if let Err(source) = fs::create_dir_all(dest) {
        errors.push(SyncError::CreateDir {
            path: dest.to_path_buf(),
            source,
        });
        return (stats, errors);
    }

    if src.is_dir() {
        for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| src.to_path_buf());
                    errors.push(SyncError::Walk { path, source });
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(src) else {
                continue;
            };
            let target = output.record_relative(rel);
            if let Some(parent) = target.parent() {
                if let Err(source) = fs::create_dir_all(parent) {
                    errors.push(SyncError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    });
                    continue;
                }
            }
            match copy_if_changed(entry.path(), &target) {
                Ok(true) => stats.copied += 1,
                Ok(false) => stats.unchanged += 1,
                Err(e) => errors.push(e),
            }
        }
    }

    let report = reconcile::reconcile_output(&output, &[]);
    stats.removed = report.removed.len();
    errors.extend(report.errors.into_iter().map(SyncError::from));

    (stats, errors)
}

/// Copy `from` to `to` unless `to` already has the same content.
///
/// Returns whether a copy happened.
pub fn copy_if_changed(from: &Path, to: &Path) -> Result<bool, SyncError> {
    let copy_err = |source| SyncError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if same_content(from, to).map_err(copy_err)? {
        return Ok(false);
    }
    // a directory squatting on the target name would make the copy fail
    if to.is_dir() {
        fs::remove_dir_all(to).map_err(copy_err)?;
    }
    fs::copy(from, to).map_err(copy_err)?;
    Ok(true)
}

fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_b = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let meta_a = fs::metadata(a)?;
    if !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(hash_file(a)? == hash_file(b)?)
}

/// SHA-256 of a file's contents, hex-encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
