//! Output-directory sandbox.
//!
//! Every tool-visible path is relative to a single configured root. This
//! module is the only place that turns caller-supplied strings into absolute
//! filesystem paths:
//!
//! - Leading separators are stripped, so `/etc/passwd` means `<root>/etc/passwd`.
//! - `.` and `..` are resolved lexically; a result outside the root is refused.
//! - Symbolic links are refused at the target and at every existing ancestor
//!   between the root and the target.

use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors raised by the sandbox.
///
/// Messages never include the offending path, so callers cannot use them to
/// learn about the filesystem outside the root.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The resolved path is not inside the root.
    #[error("path escapes the output directory")]
    PathEscape,

    /// The path (or one of its ancestors) is a symbolic link.
    #[error("refusing to access a symlink under the output directory")]
    SymlinkRefused,

    /// The link-aware status lookup failed.
    #[error("failed to inspect path: {0}")]
    Io(#[from] io::Error),
}

/// The configured root directory, canonicalized once at startup.
#[derive(Debug, Clone)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    /// Creates the directory if absent and canonicalizes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or resolved.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let root = path.canonicalize()?;
        Ok(Self { root })
    }

    /// The absolute root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` against the root.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::PathEscape`] if the result would not be the
    /// root itself or a descendant of it.
    pub fn resolve(&self, relative: &str) -> Result<SandboxPath, SandboxError> {
        Ok(SandboxPath {
            absolute: resolve(&self.root, relative)?,
        })
    }

    /// Path of `absolute` relative to the root, with `/` separators.
    ///
    /// Returns `None` if `absolute` is not under the root.
    #[must_use]
    pub fn relative_display(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// A path that has passed the sandbox check.
///
/// Only constructed by [`OutputRoot::resolve`]; the absolute form is always
/// the root or a descendant of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPath {
    absolute: PathBuf,
}

impl SandboxPath {
    /// The resolved absolute path.
    #[must_use]
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Refuses if the target or any existing ancestor below `root` is a
    /// symlink. Missing components are allowed (the path may be about to be
    /// created).
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::SymlinkRefused`] on a symlink, or
    /// [`SandboxError::Io`] if a status lookup fails for another reason.
    pub fn ensure_no_symlinks(&self, root: &OutputRoot) -> Result<(), SandboxError> {
        let Ok(rel) = self.absolute.strip_prefix(root.path()) else {
            return Err(SandboxError::PathEscape);
        };

        let mut current = root.path().to_path_buf();
        for component in rel.components() {
            current.push(component);
            match assert_not_symlink(&current) {
                Ok(_) => {}
                Err(SandboxError::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Resolves `relative` against `root` without touching the filesystem.
///
/// # Errors
///
/// Returns [`SandboxError::PathEscape`] if the result leaves `root`.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let cleaned = relative.trim_start_matches(['/', '\\']);

    let mut resolved = root.to_path_buf();
    for component in Path::new(cleaned).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(SandboxError::PathEscape);
                }
            }
            Component::Normal(part) => resolved.push(part),
            // A drive prefix or root that survived stripping (e.g. `C:\`)
            Component::Prefix(_) | Component::RootDir => return Err(SandboxError::PathEscape),
        }
    }

    // Component-wise, so `/data2` is not inside `/data`.
    if resolved == root || resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(SandboxError::PathEscape)
    }
}

/// Inspects the link-aware status of `path` and refuses symbolic links.
///
/// # Errors
///
/// Returns [`SandboxError::SymlinkRefused`] if `path` is a symlink, or
/// [`SandboxError::Io`] if the status lookup fails.
pub fn assert_not_symlink(path: &Path) -> Result<Metadata, SandboxError> {
    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Err(SandboxError::SymlinkRefused);
    }
    Ok(metadata)
}
