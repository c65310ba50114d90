// SPDX-License-Identifier: LGPL-3.0-only
//! Mount classification for the avoid-changes flag.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Predicate: does `path` live on a filesystem whose change events are
/// unreliable or expensive?
pub type ChangeProne = Arc<dyn Fn(&Path) -> bool + Send + Sync + 'static>;

/// One line of `/proc/self/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Parse the mount table format shared by `/proc/self/mounts` and `/etc/mtab`.
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                mount_point: PathBuf::from(unescape_octal(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Mount points escape space, tab, newline and backslash as `\ooo`.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) {
            let digit = |b: u8| u32::from(b - b'0');
            let value = digit(bytes[i + 1]) * 64 + digit(bytes[i + 2]) * 8 + digit(bytes[i + 3]);
            match u8::try_from(value) {
                Ok(byte) => out.push(byte),
                // Not a byte; keep the sequence as written.
                Err(_) => out.extend_from_slice(&bytes[i..i + 4]),
            }
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// The mount with the longest mount point containing `path`.
pub fn find_mount<'a>(mounts: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount_point))
        .max_by_key(|m| m.mount_point.as_os_str().len())
}

/// Default predicate: test the filesystem type of the mount holding the
/// path against `fs_types`. The mount table is reread on every call.
pub fn mount_table_predicate(fs_types: Vec<String>) -> ChangeProne {
    Arc::new(move |path: &Path| {
        let content = match std::fs::read_to_string("/proc/self/mounts") {
            Ok(content) => content,
            Err(e) => {
                log::debug!("Cannot read mount table: {}", e);
                return false;
            },
        };
        let mounts = parse_mounts(&content);
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        find_mount(&mounts, &path).is_some_and(|m| fs_types.iter().any(|t| *t == m.fs_type))
    })
}

/// Predicate that never avoids changes.
pub fn never_change_prone() -> ChangeProne {
    Arc::new(|_| false)
}
