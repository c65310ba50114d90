// SPDX-License-Identifier: LGPL-3.0-only
//! MIME type detection with override table for edge cases.

use std::fs::Metadata;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// Fallback for anything that cannot be classified.
pub const MIME_TYPE_UNKNOWN: &str = "application/octet-stream";
/// Directories.
pub const MIME_TYPE_DIRECTORY: &str = "inode/directory";
/// Symlinks whose target cannot be resolved.
pub const MIME_TYPE_SYMLINK: &str = "inode/symlink";
/// Empty regular files with no recognised name.
pub const MIME_TYPE_ZEROSIZE: &str = "application/x-zerosize";
/// Freedesktop desktop entries.
pub const MIME_TYPE_DESKTOP: &str = "application/x-desktop";

/// MIME type detector: name first (override table, then mime_guess2), then content.
pub struct MimeDetector;

impl MimeDetector {
    /// Small override table for file types that mime_guess2 doesn't handle well.
    const MIME_OVERRIDES: &'static [(&'static str, &'static str)] = &[
        ("toml", "text/x-toml"),
        ("rs", "text/x-rust"),
        ("desktop", MIME_TYPE_DESKTOP),
    ];

    /// Resolve the MIME type of `path`.
    ///
    /// `stat` may carry an already fetched `symlink_metadata` result and
    /// `base_name` a name to match instead of the path's file name. Never
    /// fails: anything unresolvable is [`MIME_TYPE_UNKNOWN`].
    pub fn detect(path: &Path, stat: Option<&Metadata>, base_name: Option<&str>) -> String {
        let fetched;
        let meta = match stat {
            Some(meta) => meta,
            None => match std::fs::symlink_metadata(path) {
                Ok(meta) => {
                    fetched = meta;
                    &fetched
                },
                Err(e) => {
                    log::debug!("MimeDetector: cannot stat {:?}: {}", path, e);
                    return MIME_TYPE_UNKNOWN.to_string();
                },
            },
        };

        let file_type = meta.file_type();
        if file_type.is_symlink() {
            return match std::fs::metadata(path) {
                Ok(target) => Self::detect(path, Some(&target), base_name),
                Err(_) => MIME_TYPE_SYMLINK.to_string(),
            };
        }
        if file_type.is_dir() {
            return MIME_TYPE_DIRECTORY.to_string();
        }
        if file_type.is_block_device() {
            return "inode/blockdevice".to_string();
        }
        if file_type.is_char_device() {
            return "inode/chardevice".to_string();
        }
        if file_type.is_fifo() {
            return "inode/fifo".to_string();
        }
        if file_type.is_socket() {
            return "inode/socket".to_string();
        }

        let name = base_name
            .map(str::to_string)
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        if let Some(mime) = Self::detect_mime_type_from_name(&name) {
            return mime;
        }

        if meta.len() == 0 {
            return MIME_TYPE_ZEROSIZE.to_string();
        }

        match tree_magic_mini::from_filepath(path) {
            Some(mime) if mime != MIME_TYPE_UNKNOWN => {
                log::trace!("MimeDetector: sniffed '{}' for {:?}", mime, path);
                mime.to_string()
            },
            _ => MIME_TYPE_UNKNOWN.to_string(),
        }
    }

    /// Detect MIME type from a file name only.
    ///
    /// Returns None when the name says nothing more specific than octet-stream.
    pub fn detect_mime_type_from_name(name: &str) -> Option<String> {
        let ext = Path::new(name).extension()?.to_str()?;
        Self::detect_mime_type_from_ext(ext)
    }

    /// Detect MIME type from a file extension.
    pub fn detect_mime_type_from_ext(ext: &str) -> Option<String> {
        let ext_lower = ext.to_lowercase();

        for (override_ext, mime_type) in Self::MIME_OVERRIDES {
            if ext_lower == *override_ext {
                log::trace!("MimeDetector: Using override for extension '{}': {}", ext, mime_type);
                return Some(mime_type.to_string());
            }
        }

        let mime = mime_guess2::from_ext(&ext_lower).first_or_octet_stream();
        let mime_str = mime.to_string();

        // Too generic to be useful; let content sniffing have a go.
        if mime_str == MIME_TYPE_UNKNOWN {
            None
        } else {
            Some(mime_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        assert_eq!(MimeDetector::detect_mime_type_from_ext("RS").as_deref(), Some("text/x-rust"));
        assert_eq!(
            MimeDetector::detect_mime_type_from_name("foo.desktop").as_deref(),
            Some(MIME_TYPE_DESKTOP)
        );
    }

    #[test]
    fn test_name_without_extension() {
        assert_eq!(MimeDetector::detect_mime_type_from_name("Makefile"), None);
    }

    #[test]
    fn test_detect_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        let empty = dir.path().join("empty");
        std::fs::write(&text, "hello").unwrap();
        std::fs::write(&empty, "").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        assert_eq!(MimeDetector::detect(dir.path(), None, None), MIME_TYPE_DIRECTORY);
        assert_eq!(MimeDetector::detect(&text, None, None), "text/plain");
        assert_eq!(MimeDetector::detect(&empty, None, None), MIME_TYPE_ZEROSIZE);
        assert_eq!(MimeDetector::detect(&dir.path().join("dangling"), None, None), MIME_TYPE_SYMLINK);
        assert_eq!(MimeDetector::detect(&dir.path().join("missing"), None, None), MIME_TYPE_UNKNOWN);
    }

    #[test]
    fn test_base_name_overrides_path_name() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("blob");
        std::fs::write(&blob, "x").unwrap();
        assert_eq!(MimeDetector::detect(&blob, None, Some("page.html")), "text/html");
    }
}
