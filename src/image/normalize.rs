//! Reconciles a requested output filename with the detected image type.

use super::kind::{is_image_extension, ImageKind};

/// Result of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    /// The path to write to.
    pub path: String,
    /// Whether `path` differs from the request.
    pub changed: bool,
}

impl NormalizedPath {
    fn unchanged(path: &str) -> Self {
        Self {
            path: path.to_string(),
            changed: false,
        }
    }

    fn changed(path: String) -> Self {
        Self {
            path,
            changed: true,
        }
    }
}

/// Returns the byte offset where the extension of the final path segment
/// starts (at the dot), or `None` if it has no extension.
///
/// A leading dot (`.hidden`) is not an extension.
fn extension_start(path: &str) -> Option<usize> {
    let base_start = path.rfind('/').map_or(0, |i| i + 1);
    let base = &path[base_start..];
    match base.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(base_start + dot),
    }
}

/// Reconciles `requested` with `detected`.
///
/// First match wins:
/// 1. unknown kind: unchanged
/// 2. no extension: primary extension appended
/// 3. extension already accepted for the kind: unchanged
/// 4. a different image extension: replaced by the primary extension
/// 5. any other extension (`.txt`, `.bin`, ...): unchanged
#[must_use]
pub fn normalize(requested: &str, detected: Option<ImageKind>) -> NormalizedPath {
    let Some(kind) = detected else {
        return NormalizedPath::unchanged(requested);
    };

    let Some(dot) = extension_start(requested) else {
        return NormalizedPath::changed(format!("{requested}{}", kind.primary_extension()));
    };

    let ext = &requested[dot..];
    if kind
        .extensions()
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(ext))
    {
        return NormalizedPath::unchanged(requested);
    }

    if is_image_extension(ext) {
        return NormalizedPath::changed(format!(
            "{}{}",
            &requested[..dot],
            kind.primary_extension()
        ));
    }

    NormalizedPath::unchanged(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_leaves_path() {
        assert_eq!(normalize("out.jpg", None), NormalizedPath::unchanged("out.jpg"));
    }

    #[test]
    fn appends_when_missing() {
        let n = normalize("assets/banner", Some(ImageKind::Webp));
        assert_eq!(n.path, "assets/banner.webp");
        assert!(n.changed);
    }

    #[test]
    fn accepted_extension_is_kept() {
        let n = normalize("photo.JPEG", Some(ImageKind::Jpeg));
        assert_eq!(n.path, "photo.JPEG");
        assert!(!n.changed);
    }

    #[test]
    fn mismatched_image_extension_is_replaced() {
        let n = normalize("out.jpg", Some(ImageKind::Png));
        assert_eq!(n.path, "out.png");
        assert!(n.changed);

        let n = normalize("dir.v2/out.GIF", Some(ImageKind::Jpeg));
        assert_eq!(n.path, "dir.v2/out.jpg");
    }

    #[test]
    fn non_image_extension_is_untouched() {
        for path in ["notes.txt", "blob.bin", "archive.tar"] {
            let n = normalize(path, Some(ImageKind::Png));
            assert_eq!(n.path, path);
            assert!(!n.changed);
        }
    }

    #[test]
    fn dotfile_has_no_extension() {
        let n = normalize("dir/.hidden", Some(ImageKind::Png));
        assert_eq!(n.path, "dir/.hidden.png");
    }

    #[test]
    fn dots_in_directories_are_ignored() {
        let n = normalize("v1.2/banner", Some(ImageKind::Gif));
        assert_eq!(n.path, "v1.2/banner.gif");
    }

    #[test]
    fn idempotent_for_every_kind() {
        let inputs = ["a", "a.png", "a.jpg", "a.jpeg", "a.gif", "a.webp", "a.txt", "x/.y", "b."];
        for kind in ImageKind::ALL.into_iter().map(Some).chain([None]) {
            for input in inputs {
                let once = normalize(input, kind);
                let twice = normalize(&once.path, kind);
                assert_eq!(once.path, twice.path, "{input} {kind:?}");
                assert!(!twice.changed, "{input} {kind:?}");
            }
        }
    }
}
