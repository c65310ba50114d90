// SPDX-License-Identifier: LGPL-3.0-only
//! File entry and metadata types.

use parking_lot::RwLock;
use std::ffi::{OsStr, OsString};
use std::fs::Metadata;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::mime::{MimeType, MimeTypeCache};
use crate::thumbnail::Thumbnail;

/// Type of filesystem entry, from `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device.
    BlockDevice,
    /// Character device.
    CharDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
    /// Anything else.
    Other,
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_dir() {
            FileType::Directory
        } else if ft.is_file() {
            FileType::File
        } else if ft.is_block_device() {
            FileType::BlockDevice
        } else if ft.is_char_device() {
            FileType::CharDevice
        } else if ft.is_fifo() {
            FileType::Fifo
        } else if ft.is_socket() {
            FileType::Socket
        } else {
            FileType::Other
        }
    }
}

/// Snapshot of `lstat` for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_type: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    /// Full `st_mode`, type bits included.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub dev: u64,
    pub ino: u64,
    pub nlink: u64,
    pub accessed: SystemTime,
    pub modified: SystemTime,
    /// Last status change.
    pub changed: SystemTime,
    /// Birth time, where the filesystem records one.
    pub created: Option<SystemTime>,
}

impl FileMetadata {
    fn from_std(meta: &Metadata) -> Self {
        Self {
            file_type: meta.file_type().into(),
            size: meta.len(),
            blocks: meta.blocks(),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            dev: meta.dev(),
            ino: meta.ino(),
            nlink: meta.nlink(),
            accessed: unix_time(meta.atime(), meta.atime_nsec()),
            modified: unix_time(meta.mtime(), meta.mtime_nsec()),
            changed: unix_time(meta.ctime(), meta.ctime_nsec()),
            created: meta.created().ok(),
        }
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nsecs = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::new(0, nsecs)
    }
}

/// `Name=` and `Icon=` of a desktop entry file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopInfo {
    pub name: Option<String>,
    pub icon: Option<String>,
}

impl DesktopInfo {
    /// Parse the untranslated keys of the `[Desktop Entry]` group.
    pub fn parse(content: &str) -> Self {
        let mut info = Self::default();
        let mut in_group = false;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('[') {
                in_group = line == "[Desktop Entry]";
                continue;
            }
            if !in_group || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "Name" if info.name.is_none() => info.name = Some(value.to_string()),
                "Icon" if info.icon.is_none() => info.icon = Some(value.to_string()),
                _ => {},
            }
        }
        info
    }
}

struct FileState {
    metadata: FileMetadata,
    mime_type: Arc<MimeType>,
    display_name: String,
    desktop: Option<DesktopInfo>,
    small_thumbnail: Option<Thumbnail>,
    big_thumbnail: Option<Thumbnail>,
}

/// Cached metadata for one directory entry.
///
/// The metadata is a snapshot taken at creation; it only changes when
/// [`FileEntry::update`] is called, which the owning directory does when the
/// kernel reports a change.
pub struct FileEntry {
    path: PathBuf,
    name: OsString,
    state: RwLock<FileState>,
}

impl FileEntry {
    /// `lstat` and classify `path`.
    ///
    /// Fails only if the path cannot be stat'd; MIME resolution never fails.
    pub fn create(path: &Path, mime_cache: &MimeTypeCache) -> std::io::Result<Arc<Self>> {
        let meta = std::fs::symlink_metadata(path)?;
        let name = path
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| path.as_os_str().to_os_string());

        let state = Self::resolve(path, &name, &meta, mime_cache);
        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            name,
            state: RwLock::new(state),
        }))
    }

    fn resolve(path: &Path, name: &OsStr, meta: &Metadata, mime_cache: &MimeTypeCache) -> FileState {
        let metadata = FileMetadata::from_std(meta);
        let mime_type = mime_cache.get_from_file(path, Some(meta), None);
        let desktop = load_desktop_info(path, &metadata, &mime_type);
        let display_name = desktop
            .as_ref()
            .and_then(|d| d.name.clone())
            .unwrap_or_else(|| name.to_string_lossy().into_owned());

        FileState {
            metadata,
            mime_type,
            display_name,
            desktop,
            small_thumbnail: None,
            big_thumbnail: None,
        }
    }

    /// Re-stat the entry. Returns false if the path is gone; the old
    /// snapshot is kept in that case.
    pub fn update(&self, mime_cache: &MimeTypeCache) -> bool {
        let meta = match std::fs::symlink_metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) => {
                log::trace!("FileEntry: re-stat of {:?} failed: {}", self.path, e);
                return false;
            },
        };

        let mut fresh = Self::resolve(&self.path, &self.name, &meta, mime_cache);
        let mut state = self.state.write();
        if state.metadata.modified == fresh.metadata.modified && state.metadata.size == fresh.metadata.size {
            fresh.small_thumbnail = state.small_thumbnail.take();
            fresh.big_thumbnail = state.big_thumbnail.take();
        }
        *state = fresh;
        true
    }

    /// Resolve the MIME type again against the current cache.
    pub fn reload_mime_type(&self, mime_cache: &MimeTypeCache) {
        let meta = std::fs::symlink_metadata(&self.path).ok();
        let mime_type = mime_cache.get_from_file(&self.path, meta.as_ref(), None);
        self.state.write().mime_type = mime_type;
    }

    /// Absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw name on disk.
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// UTF-8 name for display; the `Name=` key for desktop entries.
    pub fn display_name(&self) -> String {
        self.state.read().display_name.clone()
    }

    /// Override the display name, e.g. after a rename in the UI layer.
    pub fn update_display_name(&self, display_name: &str) {
        self.state.write().display_name = display_name.to_string();
    }

    /// `file://` URI of the path.
    pub fn uri(&self) -> String {
        path_to_uri(&self.path)
    }

    pub fn metadata(&self) -> FileMetadata {
        self.state.read().metadata.clone()
    }

    pub fn file_type(&self) -> FileType {
        self.state.read().metadata.file_type
    }

    pub fn size(&self) -> u64 {
        self.state.read().metadata.size
    }

    pub fn blocks(&self) -> u64 {
        self.state.read().metadata.blocks
    }

    /// Bytes actually allocated.
    pub fn size_on_disk(&self) -> u64 {
        self.blocks() * 512
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u32 {
        self.state.read().metadata.mode & 0o7777
    }

    pub fn modified(&self) -> SystemTime {
        self.state.read().metadata.modified
    }

    pub fn display_size(&self) -> String {
        format_size(self.size())
    }

    pub fn display_size_in_bytes(&self) -> String {
        format!("{} bytes", self.size())
    }

    pub fn display_size_on_disk(&self) -> String {
        format_size(self.size_on_disk())
    }

    /// `ls -l` style permission string.
    pub fn display_permissions(&self) -> String {
        let state = self.state.read();
        format_permissions(state.metadata.file_type, state.metadata.mode)
    }

    pub fn mime_type(&self) -> Arc<MimeType> {
        self.state.read().mime_type.clone()
    }

    /// Icon name: the desktop entry's `Icon=`, else the MIME type's icon.
    pub fn icon_name(&self) -> String {
        let state = self.state.read();
        if let Some(icon) = state.desktop.as_ref().and_then(|d| d.icon.clone()) {
            return icon;
        }
        state.mime_type.icon_name()
    }

    pub fn desktop_info(&self) -> Option<DesktopInfo> {
        self.state.read().desktop.clone()
    }

    pub fn is_directory(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type() == FileType::File
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == FileType::Symlink
    }

    pub fn is_socket(&self) -> bool {
        self.file_type() == FileType::Socket
    }

    pub fn is_fifo(&self) -> bool {
        self.file_type() == FileType::Fifo
    }

    pub fn is_block_file(&self) -> bool {
        self.file_type() == FileType::BlockDevice
    }

    pub fn is_character_file(&self) -> bool {
        self.file_type() == FileType::CharDevice
    }

    /// Dotfile.
    pub fn is_hidden(&self) -> bool {
        self.name.as_bytes().first() == Some(&b'.')
    }

    pub fn is_image(&self) -> bool {
        self.mime_type().is_image()
    }

    pub fn is_video(&self) -> bool {
        self.mime_type().is_video()
    }

    pub fn is_archive(&self) -> bool {
        self.mime_type().is_archive()
    }

    pub fn is_text(&self) -> bool {
        self.mime_type().is_text()
    }

    pub fn is_desktop_entry(&self) -> bool {
        self.state.read().desktop.is_some()
    }

    pub fn is_unknown_type(&self) -> bool {
        self.mime_type().is_unknown()
    }

    /// Regular file with an execute bit and an executable MIME type.
    pub fn is_executable(&self) -> bool {
        let state = self.state.read();
        state.metadata.file_type == FileType::File
            && state.metadata.mode & 0o111 != 0
            && state.mime_type.is_executable()
    }

    pub fn thumbnail(&self, big: bool) -> Option<Thumbnail> {
        let state = self.state.read();
        if big {
            state.big_thumbnail.clone()
        } else {
            state.small_thumbnail.clone()
        }
    }

    pub fn is_thumbnail_loaded(&self, big: bool) -> bool {
        self.thumbnail(big).is_some()
    }

    pub fn set_thumbnail(&self, big: bool, thumbnail: Thumbnail) {
        let mut state = self.state.write();
        if big {
            state.big_thumbnail = Some(thumbnail);
        } else {
            state.small_thumbnail = Some(thumbnail);
        }
    }

    pub fn unload_thumbnail(&self, big: bool) {
        let mut state = self.state.write();
        if big {
            state.big_thumbnail = None;
        } else {
            state.small_thumbnail = None;
        }
    }
}

impl std::fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntry")
            .field("path", &self.path)
            .field("type", &self.file_type())
            .field("mime", &self.mime_type().type_name())
            .finish()
    }
}

fn load_desktop_info(path: &Path, meta: &FileMetadata, mime: &MimeType) -> Option<DesktopInfo> {
    if meta.file_type != FileType::File || !mime.is_desktop_entry() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Some(DesktopInfo::parse(&content)),
        Err(e) => {
            log::debug!("FileEntry: unreadable desktop entry {:?}: {}", path, e);
            Some(DesktopInfo::default())
        },
    }
}

/// Percent-encoded `file://` URI, separators kept.
pub(crate) fn path_to_uri(path: &Path) -> String {
    let mut uri = String::from("file://");
    for component in path.components() {
        match component {
            std::path::Component::RootDir => {},
            other => {
                uri.push('/');
                uri.push_str(&urlencoding::encode_binary(other.as_os_str().as_bytes()));
            },
        }
    }
    if uri.len() == "file://".len() {
        uri.push('/');
    }
    uri
}

/// Human-readable size with binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// `drwxr-xr-x` form, including setuid/setgid/sticky.
pub fn format_permissions(file_type: FileType, mode: u32) -> String {
    let kind = match file_type {
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::BlockDevice => 'b',
        FileType::CharDevice => 'c',
        FileType::Fifo => 'p',
        FileType::Socket => 's',
        FileType::File | FileType::Other => '-',
    };

    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    let special = |exec: u32, special: u32, set: char, unset: char| match (mode & exec != 0, mode & special != 0) {
        (true, true) => set,
        (false, true) => unset,
        (true, false) => 'x',
        (false, false) => '-',
    };

    [
        kind,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        special(0o100, 0o4000, 's', 'S'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        special(0o010, 0o2000, 's', 'S'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        special(0o001, 0o1000, 't', 'T'),
    ]
    .iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::MimeDatabase;

    fn mime_cache() -> MimeTypeCache {
        MimeTypeCache::with_source(|| MimeDatabase::new(Vec::new(), Vec::new()))
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_format_permissions() {
        assert_eq!(format_permissions(FileType::Directory, 0o755), "drwxr-xr-x");
        assert_eq!(format_permissions(FileType::File, 0o4755), "-rwsr-xr-x");
        assert_eq!(format_permissions(FileType::Directory, 0o1777), "drwxrwxrwt");
        assert_eq!(format_permissions(FileType::File, 0o2640), "-rw-r-S---");
    }

    #[test]
    fn test_uri_keeps_separators() {
        assert_eq!(path_to_uri(Path::new("/tmp/a b/c#d")), "file:///tmp/a%20b/c%23d");
        assert_eq!(path_to_uri(Path::new("/")), "file:///");
    }

    #[test]
    fn test_create_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let cache = mime_cache();
        let entry = FileEntry::create(&path, &cache).unwrap();
        assert_eq!(entry.name(), "notes.txt");
        assert_eq!(entry.size(), 5);
        assert!(entry.is_regular_file());
        assert!(entry.is_text());
        assert!(!entry.is_hidden());

        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(entry.size(), 5);
        assert!(entry.update(&cache));
        assert_eq!(entry.size(), 11);

        std::fs::remove_file(&path).unwrap();
        assert!(!entry.update(&cache));
        assert_eq!(entry.size(), 11);
    }

    #[test]
    fn test_desktop_entry_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.desktop");
        std::fs::write(
            &path,
            "[Desktop Entry]\nName[de]=Editor DE\nName=Text Editor\nIcon=accessories-text-editor\n\n[Desktop Action new]\nName=New Window\n",
        )
        .unwrap();

        let entry = FileEntry::create(&path, &mime_cache()).unwrap();
        assert!(entry.is_desktop_entry());
        assert_eq!(entry.display_name(), "Text Editor");
        assert_eq!(entry.icon_name(), "accessories-text-editor");
    }

    #[test]
    fn test_thumbnail_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"not really").unwrap();

        let entry = FileEntry::create(&path, &mime_cache()).unwrap();
        entry.set_thumbnail(true, Thumbnail::new(dir.path().join("t.png"), 256));
        assert!(entry.is_thumbnail_loaded(true));
        assert!(!entry.is_thumbnail_loaded(false));
        entry.unload_thumbnail(true);
        assert!(!entry.is_thumbnail_loaded(true));
    }
}
