//! Listing of files stored under the output root.
//!
//! The walk is stateless per call: it resolves the prefix through the
//! sandbox, never follows or reports symbolic links, and silently skips
//! entries whose status cannot be read (for example files removed while the
//! walk is in progress).

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::image::is_image_extension;
use crate::sandbox::{assert_not_symlink, OutputRoot, SandboxError};

/// Default number of records returned.
pub const DEFAULT_LIMIT: i64 = 200;
/// Lower bound of the limit.
pub const MIN_LIMIT: i64 = 1;
/// Upper bound of the limit.
pub const MAX_LIMIT: i64 = 1000;

/// Errors that abort a listing.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The prefix failed the sandbox check.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The prefix directory could not be created or read.
    #[error("failed to list {prefix}: {source}")]
    Io {
        /// Caller-relative prefix.
        prefix: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// Newest first.
    MtimeDesc,
    /// Oldest first.
    MtimeAsc,
    /// Largest first.
    SizeDesc,
    /// Smallest first.
    SizeAsc,
    /// Path, lexicographic.
    NameAsc,
    /// Path, reverse lexicographic.
    NameDesc,
}

impl SortMode {
    /// Accepted names, in declaration order.
    pub const NAMES: [&'static str; 6] = [
        "mtime_desc",
        "mtime_asc",
        "size_desc",
        "size_asc",
        "name_asc",
        "name_desc",
    ];

    /// Parses a sort mode name. Unknown names yield `None`, which leaves
    /// records in traversal order.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "mtime_desc" => Some(Self::MtimeDesc),
            "mtime_asc" => Some(Self::MtimeAsc),
            "size_desc" => Some(Self::SizeDesc),
            "size_asc" => Some(Self::SizeAsc),
            "name_asc" => Some(Self::NameAsc),
            "name_desc" => Some(Self::NameDesc),
            _ => None,
        }
    }

    fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            Self::MtimeDesc => b.modified_at_epoch_ms.cmp(&a.modified_at_epoch_ms),
            Self::MtimeAsc => a.modified_at_epoch_ms.cmp(&b.modified_at_epoch_ms),
            Self::SizeDesc => b.size_bytes.cmp(&a.size_bytes),
            Self::SizeAsc => a.size_bytes.cmp(&b.size_bytes),
            Self::NameAsc => a.relative_path.cmp(&b.relative_path),
            Self::NameDesc => b.relative_path.cmp(&a.relative_path),
        }
    }
}

/// Options for [`list`].
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Subdirectory under the root to list.
    pub prefix: String,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Maximum number of records; clamped to `[MIN_LIMIT, MAX_LIMIT]`.
    pub limit: i64,
    /// Include files without an image extension.
    pub include_non_images: bool,
    /// Ordering; `None` keeps traversal order.
    pub sort: Option<SortMode>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            recursive: true,
            limit: DEFAULT_LIMIT,
            include_non_images: false,
            sort: Some(SortMode::MtimeDesc),
        }
    }
}

/// One listed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the root, `/`-separated.
    pub relative_path: String,
    /// File size.
    pub size_bytes: u64,
    /// Last modification, milliseconds since the Unix epoch.
    pub modified_at_epoch_ms: i64,
}

/// Outcome of a listing.
#[derive(Debug, Clone)]
pub struct Listing {
    /// Records after sorting and truncation.
    pub records: Vec<FileRecord>,
    /// Number of matching files before truncation.
    pub total: usize,
    /// The effective (clamped) limit.
    pub limit: usize,
}

impl Listing {
    /// Whether records were dropped by the limit.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.total > self.records.len()
    }

    /// Human-readable summary with a markdown table.
    #[must_use]
    pub fn render(&self, base: &Path) -> String {
        let mut out = String::from("# Output images\n\n");
        let _ = writeln!(out, "base: {}", base.display());
        let _ = write!(out, "count: {}", self.records.len());
        if self.truncated() {
            let _ = write!(
                out,
                " (showing first {} of {})",
                self.records.len(),
                self.total
            );
        }
        out.push_str("\n\n| path | bytes | modified |\n|---|---:|---|\n");
        for record in &self.records {
            let modified = DateTime::<Utc>::from_timestamp_millis(record.modified_at_epoch_ms)
                .map_or_else(
                    || "-".to_string(),
                    |t| t.to_rfc3339_opts(SecondsFormat::Millis, true),
                );
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                record.relative_path, record.size_bytes, modified
            );
        }
        out
    }
}

/// Clamps a requested limit to `[MIN_LIMIT, MAX_LIMIT]`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to 1..=1000
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(MIN_LIMIT, MAX_LIMIT) as usize
}

/// Lists files under `root` according to `options`.
///
/// The prefix directory is created if it does not exist.
///
/// # Errors
///
/// Returns an error if the prefix escapes the root, is a symlink, or cannot
/// be created or read.
pub fn list(root: &OutputRoot, options: &ListOptions) -> Result<Listing, IndexError> {
    let base = root.resolve(&options.prefix)?;
    base.ensure_no_symlinks(root)?;
    std::fs::create_dir_all(base.absolute()).map_err(|source| IndexError::Io {
        prefix: options.prefix.clone(),
        source,
    })?;
    // Re-checked: a link may have appeared while the directories were created.
    base.ensure_no_symlinks(root)?;
    assert_not_symlink(base.absolute())?;

    let entries = std::fs::read_dir(base.absolute()).map_err(|source| IndexError::Io {
        prefix: options.prefix.clone(),
        source,
    })?;

    let mut records = Vec::new();
    walk(root, entries, options, &mut records);

    if let Some(mode) = options.sort {
        records.sort_by(|a, b| mode.compare(a, b));
    }

    let total = records.len();
    let limit = clamp_limit(options.limit);
    records.truncate(limit);

    tracing::debug!(
        prefix = %options.prefix,
        total,
        returned = records.len(),
        "Listed output directory"
    );

    Ok(Listing {
        records,
        total,
        limit,
    })
}

fn walk(
    root: &OutputRoot,
    entries: std::fs::ReadDir,
    options: &ListOptions,
    records: &mut Vec<FileRecord>,
) {
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();

        // Symlinks and vanished entries are skipped, not reported.
        let Ok(metadata) = assert_not_symlink(&path) else {
            continue;
        };

        if metadata.is_dir() {
            if options.recursive {
                match std::fs::read_dir(&path) {
                    Ok(children) => walk(root, children, options, records),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable directory");
                    }
                }
            }
            continue;
        }

        if !metadata.is_file() {
            continue;
        }

        if !options.include_non_images && !has_image_extension(&path) {
            continue;
        }

        let Some(relative_path) = root.relative_display(&path) else {
            continue;
        };

        records.push(FileRecord {
            relative_path,
            size_bytes: metadata.len(),
            modified_at_epoch_ms: modified_ms(&metadata),
        });
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| is_image_extension(&format!(".{e}")))
}

#[allow(clippy::cast_possible_truncation)] // millisecond timestamps fit in i64
fn modified_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64)
}
