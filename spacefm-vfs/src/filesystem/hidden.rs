// SPDX-License-Identifier: LGPL-3.0-only
//! Per-directory `.hidden` lists.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;

/// File name of the per-directory hide list.
pub const HIDDEN_FILE_NAME: &str = ".hidden";

/// Names listed in `dir/.hidden`, or `None` when there is no readable list.
///
/// One literal name per line. Blank lines are skipped; absolute paths are
/// rejected with a warning.
pub fn get_hidden_files(dir: &Path) -> Option<Vec<OsString>> {
    let hidden_path = dir.join(HIDDEN_FILE_NAME);
    if !hidden_path.is_file() {
        return None;
    }

    let content = match std::fs::read(&hidden_path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read {:?}: {}", hidden_path, e);
            return None;
        },
    };

    Some(parse_hidden(&content, &hidden_path))
}

fn parse_hidden(content: &[u8], source: &Path) -> Vec<OsString> {
    use std::os::unix::ffi::OsStrExt;

    content
        .split(|b| *b == b'\n')
        .map(|line| line.trim_ascii())
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let name = std::ffi::OsStr::from_bytes(line);
            if Path::new(name).is_absolute() {
                log::warn!("Absolute path ignored in {:?}", source);
                None
            } else {
                Some(name.to_os_string())
            }
        })
        .collect()
}

/// Append `name` to `dir/.hidden`, creating the file if needed.
pub fn add_hidden(dir: &Path, name: &std::ffi::OsStr) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(HIDDEN_FILE_NAME))?;
    file.write_all(name.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
