//! The storage engine: sandboxed resolution and serialized mutation.

use std::fs::{self, Metadata, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entry::{DirectoryEntry, FileEntry, Listing};
use super::path::{basename, sanitize_name, RelativePath, STAGING_PREFIX};
use super::{ConflictPolicy, StorageRoot};
use crate::{BucketError, Result};

/// Filesystem-backed object store confined to a single root directory.
///
/// All methods are synchronous and may block on I/O. Every mutating method
/// holds one process-wide lock for its whole duration, so no two mutations
/// ever run concurrently regardless of the paths they touch. Listing and
/// serving take no lock.
#[derive(Debug)]
pub struct StorageEngine {
    root: StorageRoot,
    mutation_lock: Mutex<()>,
}

impl StorageEngine {
    /// Create an engine over an opened storage root.
    pub fn new(root: StorageRoot) -> Self {
        Self {
            root,
            mutation_lock: Mutex::new(()),
        }
    }

    /// The storage root this engine is confined to.
    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Resolve an untrusted relative path to an absolute path inside the root.
    ///
    /// The target does not need to exist.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let relative = self.parse(raw)?;
        self.resolve_relative(&relative)
    }

    /// List the immediate children of a folder.
    pub fn list(&self, raw: &str) -> Result<Listing> {
        let relative = self.parse(raw)?;
        let absolute = self.resolve_relative(&relative)?;
        self.require_dir(&relative, &absolute)?;

        let mut directories = Vec::new();
        let mut files = Vec::new();

        for entry in fs::read_dir(&absolute)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(parent = %relative, "Skipping entry with non UTF-8 name");
                continue;
            };
            if name.starts_with(STAGING_PREFIX) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(e.into()),
            };
            if file_type.is_symlink() && !self.root.follow_symlinks() {
                continue;
            }

            // Follows links, so a linked entry is classified by its target.
            let metadata = match fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            let child = relative.join(&name);
            if metadata.is_dir() {
                directories.push(DirectoryEntry::new(child, &metadata));
            } else if metadata.is_file() {
                files.push(FileEntry::new(child, &metadata));
            }
        }

        directories.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            path = %relative,
            directories = directories.len(),
            files = files.len(),
            "Listed folder"
        );

        Ok(Listing {
            path: relative,
            directories,
            files,
        })
    }

    /// Create `name` under `parent`, creating missing ancestors.
    pub fn create_folder(&self, parent: &str, name: &str) -> Result<DirectoryEntry> {
        let name = sanitize_name(name)?;
        let parent = self.parse(parent)?;
        let target = parent.join(name);

        let _guard = self.lock();

        let parent_abs = self.resolve_relative(&parent)?;
        let target_abs = self.resolve_relative(&target)?;

        if exists(&target_abs)? {
            return Err(BucketError::AlreadyExists(target.into_string()));
        }
        ensure_dir(&parent, &parent_abs)?;

        match fs::create_dir(&target_abs) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(BucketError::AlreadyExists(target.into_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let metadata = fs::metadata(&target_abs)?;
        info!(path = %target, "Folder created");
        Ok(DirectoryEntry::new(target, &metadata))
    }

    /// Recursively delete a folder. The root cannot be deleted.
    pub fn delete_folder(&self, raw: &str) -> Result<RelativePath> {
        let relative = self.parse(raw)?;
        if relative.is_root() {
            return Err(BucketError::RootOperationForbidden);
        }

        let _guard = self.lock();

        let absolute = self.resolve_relative(&relative)?;
        let link = fs::symlink_metadata(&absolute)
            .map_err(|e| not_found_or_io(e, &relative))?;
        self.require_dir(&relative, &absolute)?;

        if link.file_type().is_symlink() {
            // Only the link goes away, never the tree it points to.
            fs::remove_file(&absolute)?;
        } else {
            fs::remove_dir_all(&absolute)?;
        }

        info!(path = %relative, "Folder deleted");
        Ok(relative)
    }

    /// Rename a folder within its parent. The root cannot be renamed.
    pub fn rename_folder(&self, raw: &str, new_name: &str) -> Result<DirectoryEntry> {
        let relative = self.parse(raw)?;
        if relative.is_root() {
            return Err(BucketError::RootOperationForbidden);
        }
        let new_name = sanitize_name(new_name)?;
        let destination = relative.parent().unwrap_or_default().join(new_name);

        let _guard = self.lock();

        let source_abs = self.resolve_relative(&relative)?;
        let destination_abs = self.resolve_relative(&destination)?;
        self.require_dir(&relative, &source_abs)?;

        if exists(&destination_abs)? {
            return Err(BucketError::AlreadyExists(destination.into_string()));
        }

        fs::rename(&source_abs, &destination_abs)?;

        let metadata = fs::metadata(&destination_abs)?;
        info!(from = %relative, to = %destination, "Folder renamed");
        Ok(DirectoryEntry::new(destination, &metadata))
    }

    /// Store the contents of `source` as a file under `parent`.
    ///
    /// Only the last segment of `suggested_name` is used. Missing parent
    /// folders are created. The bytes are staged in a hidden file next to
    /// the target and renamed into place, so readers see either the old file
    /// or the complete new one.
    pub fn upload_file<R: Read + ?Sized>(
        &self,
        parent: &str,
        source: &mut R,
        suggested_name: &str,
        policy: ConflictPolicy,
    ) -> Result<FileEntry> {
        let name = sanitize_name(basename(suggested_name))?;
        let parent = self.parse(parent)?;

        let _guard = self.lock();

        let parent_abs = self.resolve_relative(&parent)?;
        ensure_dir(&parent, &parent_abs)?;

        let (target, target_abs) = self.upload_target(&parent, name, policy)?;

        let staging = parent_abs.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        let written = match write_new(&staging, source) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&staging);
                return Err(e.into());
            }
        };
        if let Err(e) = fs::rename(&staging, &target_abs) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        let metadata = fs::metadata(&target_abs)?;
        info!(path = %target, size = written, "File uploaded");
        Ok(FileEntry::new(target, &metadata))
    }

    /// Delete a single regular file.
    pub fn delete_file(&self, parent: &str, filename: &str) -> Result<RelativePath> {
        let name = sanitize_name(basename(filename))?;
        let parent = self.parse(parent)?;
        let target = parent.join(name);

        let _guard = self.lock();

        let parent_abs = self.resolve_relative(&parent)?;
        self.require_dir(&parent, &parent_abs)?;
        let target_abs = self.resolve_relative(&target)?;

        match fs::metadata(&target_abs) {
            Ok(m) if m.is_file() => {}
            Ok(_) => return Err(BucketError::NotFound(format!("file {target}"))),
            Err(e) => return Err(not_found_or_io(e, &target)),
        }

        fs::remove_file(&target_abs)?;
        info!(path = %target, "File deleted");
        Ok(target)
    }

    /// Delete every file below `raw` last modified strictly before `threshold`.
    ///
    /// Folders are never removed. The scan and all deletions run under the
    /// mutation lock as one operation.
    pub fn prune_older_than(
        &self,
        raw: &str,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<RelativePath>> {
        let relative = self.parse(raw)?;

        let _guard = self.lock();

        let absolute = self.resolve_relative(&relative)?;
        self.require_dir(&relative, &absolute)?;

        let mut deleted = Vec::new();
        self.prune_dir(&relative, &absolute, threshold.into(), &mut deleted)?;

        info!(
            path = %relative,
            threshold = %threshold.to_rfc3339(),
            deleted_count = deleted.len(),
            "Pruned old files"
        );
        Ok(deleted)
    }

    /// Compose the shareable relative locator of `filename` inside `raw`.
    ///
    /// Pure string work: nothing is checked against the filesystem.
    pub fn public_path(&self, raw: &str, filename: &str) -> Result<String> {
        compose_public_path(raw, filename)
    }

    /// Resolve a path that must name an existing regular file.
    pub fn resolve_for_serving(&self, raw: &str) -> Result<PathBuf> {
        let relative = self.parse(raw)?;
        let absolute = self.resolve_relative(&relative)?;

        match fs::metadata(&absolute) {
            Ok(m) if m.is_file() => Ok(absolute),
            Ok(_) => Err(BucketError::NotFound(format!("file {relative}"))),
            Err(e) => Err(not_found_or_io(e, &relative)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // Guards no data, so poisoning carries no meaning.
        self.mutation_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn parse(&self, raw: &str) -> Result<RelativePath> {
        RelativePath::parse(raw).inspect_err(|e| {
            warn!(path = %raw.escape_debug(), error = %e, "Rejected path");
        })
    }

    fn resolve_relative(&self, relative: &RelativePath) -> Result<PathBuf> {
        let root = self.root.path();
        let mut absolute = root.to_path_buf();
        for segment in relative.segments() {
            absolute.push(segment);
        }

        // `Path::starts_with` compares whole components, so `/data2` is
        // never accepted for a root of `/data`.
        if !absolute.starts_with(root) {
            warn!(path = %relative, "Resolved path escapes the storage root");
            return Err(BucketError::InvalidPath(relative.to_string()));
        }

        if !self.root.follow_symlinks() {
            self.reject_symlinks(relative)?;
        }
        Ok(absolute)
    }

    /// Walk from the root down to `relative` and fail on the first link.
    ///
    /// Components that do not exist yet cannot be links, so the walk stops at
    /// the first one that cannot be stat'd.
    fn reject_symlinks(&self, relative: &RelativePath) -> Result<()> {
        let mut current = self.root.path().to_path_buf();
        let mut walked = RelativePath::root();

        for segment in relative.segments() {
            current.push(segment);
            walked = walked.join(segment);

            match fs::symlink_metadata(&current) {
                Ok(m) if m.file_type().is_symlink() => {
                    warn!(path = %relative, link = %walked, "Rejected symlink in path");
                    return Err(BucketError::SymlinkRejected(walked.into_string()));
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn require_dir(&self, relative: &RelativePath, absolute: &Path) -> Result<Metadata> {
        match fs::metadata(absolute) {
            Ok(m) if m.is_dir() => Ok(m),
            Ok(_) => Err(BucketError::NotFound(format!("folder {relative}"))),
            Err(e) => Err(not_found_or_io(e, relative)),
        }
    }

    fn upload_target(
        &self,
        parent: &RelativePath,
        name: &str,
        policy: ConflictPolicy,
    ) -> Result<(RelativePath, PathBuf)> {
        let target = parent.join(name);
        let target_abs = self.resolve_relative(&target)?;

        let existing = match fs::symlink_metadata(&target_abs) {
            Ok(_) => fs::metadata(&target_abs).ok(),
            Err(e) if is_missing(&e) => return Ok((target, target_abs)),
            Err(e) => return Err(e.into()),
        };

        match policy {
            ConflictPolicy::Overwrite => match existing {
                Some(m) if m.is_dir() => Err(BucketError::AlreadyExists(target.into_string())),
                _ => Ok((target, target_abs)),
            },
            ConflictPolicy::Reject => Err(BucketError::AlreadyExists(target.into_string())),
            ConflictPolicy::Version => {
                for n in 1u32.. {
                    let candidate = parent.join(&versioned_name(name, n));
                    let candidate_abs = self.resolve_relative(&candidate)?;
                    if !exists(&candidate_abs)? {
                        return Ok((candidate, candidate_abs));
                    }
                }
                Err(BucketError::AlreadyExists(target.into_string()))
            }
        }
    }

    fn prune_dir(
        &self,
        relative: &RelativePath,
        absolute: &Path,
        threshold: SystemTime,
        deleted: &mut Vec<RelativePath>,
    ) -> Result<()> {
        let mut entries = fs::read_dir(absolute)?.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            // Non UTF-8 names are reported lossily but still pruned through
            // their real filesystem path.
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type()?;

            if name.starts_with(STAGING_PREFIX) {
                // The lock is held, so no upload owns this file.
                if file_type.is_file() && entry.metadata()?.modified()? < threshold {
                    fs::remove_file(entry.path())?;
                    debug!(parent = %relative, staging = %name, "Removed orphaned staging file");
                }
                continue;
            }
            let child = relative.join(&name);

            let metadata = if file_type.is_symlink() {
                if !self.root.follow_symlinks() {
                    continue;
                }
                // Linked folders are not descended into, which also rules
                // out cycles.
                match fs::metadata(entry.path()) {
                    Ok(m) if m.is_file() => m,
                    _ => continue,
                }
            } else if file_type.is_dir() {
                self.prune_dir(&child, &entry.path(), threshold, deleted)?;
                continue;
            } else if file_type.is_file() {
                entry.metadata()?
            } else {
                continue;
            };

            if metadata.modified()? < threshold {
                fs::remove_file(entry.path())?;
                debug!(path = %child, "Pruned file");
                deleted.push(child);
            }
        }
        Ok(())
    }
}

/// Join a sanitized filename onto a normalized folder path.
fn compose_public_path(raw: &str, filename: &str) -> Result<String> {
    let name = sanitize_name(filename)?;
    let folder = RelativePath::parse(raw)?;
    Ok(folder.join(name).into_string())
}

/// `report.pdf` becomes `report-1.pdf`; `README` becomes `README-1`.
fn versioned_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
        _ => format!("{name}-{n}"),
    }
}

fn write_new<R: Read + ?Sized>(path: &Path, source: &mut R) -> io::Result<u64> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    io::copy(source, &mut file)
}

fn ensure_dir(relative: &RelativePath, absolute: &Path) -> Result<()> {
    match fs::create_dir_all(absolute) {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory
            ) =>
        {
            Err(BucketError::InvalidPath(format!("{relative} is not a folder")))
        }
        Err(e) => Err(e.into()),
    }
}

fn exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if is_missing(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn not_found_or_io(e: io::Error, relative: &RelativePath) -> BucketError {
    if is_missing(&e) {
        BucketError::NotFound(relative.to_string())
    } else {
        e.into()
    }
}
