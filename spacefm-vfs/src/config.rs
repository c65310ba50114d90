// SPDX-License-Identifier: LGPL-3.0-only
//! Tunables for the VFS layer, read from `vfs.toml`.

use anyhow::Result;
use serde::Deserialize;
use smol::fs;
use std::path::Path;
use std::time::Duration;
use xdg::BaseDirectories;

/// Configuration file name inside the `spacefm` XDG directories.
pub const CONFIG_FILE_NAME: &str = "vfs.toml";

/// Filesystem types whose change events are avoided by default.
pub const DEFAULT_CHANGE_PRONE_FILESYSTEMS: &[&str] =
    &["cifs", "curlftpfs", "ftpfs", "fuse.sshfs", "nfs", "nfs4", "smbfs", "sshfs"];

/// Effective configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsConfig {
    /// Coalescing window for directory and MIME database events.
    pub debounce_ms: u64,
    pub change_prone_filesystems: Vec<String>,
    /// Reload MIME descriptors when the shared-mime-info database changes.
    pub watch_mime_database: bool,
    pub small_thumbnail_size: u32,
    pub big_thumbnail_size: u32,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            change_prone_filesystems: DEFAULT_CHANGE_PRONE_FILESYSTEMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            watch_mime_database: true,
            small_thumbnail_size: 128,
            big_thumbnail_size: 256,
        }
    }
}

/// One config file as written; absent keys leave earlier layers alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct VfsConfigFile {
    debounce_ms: Option<u64>,
    change_prone_filesystems: Option<Vec<String>>,
    watch_mime_database: Option<bool>,
    thumbnails: ThumbnailSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ThumbnailSettings {
    small_size: Option<u32>,
    big_size: Option<u32>,
}

impl VfsConfig {
    /// Load from standard locations in precedence order.
    ///
    /// Order (later overrides earlier):
    /// 1. System Data: /usr/share/spacefm/vfs.toml (and XDG_DATA_DIRS)
    /// 2. System Config: /etc/xdg/spacefm/vfs.toml (and XDG_CONFIG_DIRS)
    /// 3. User Config: ~/.config/spacefm/vfs.toml (XDG_CONFIG_HOME)
    pub async fn load() -> Result<Self> {
        let xdg_dirs = BaseDirectories::with_prefix("spacefm")?;
        let mut config = Self::default();

        for path in xdg_dirs.find_data_files(CONFIG_FILE_NAME).rev() {
            config.load_file(&path).await;
        }
        for path in xdg_dirs.find_config_files(CONFIG_FILE_NAME).rev() {
            config.load_file(&path).await;
        }

        Ok(config)
    }

    /// Parse one file's contents over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge(toml::from_str(content)?);
        Ok(config)
    }

    async fn load_file(&mut self, path: &Path) {
        log::info!("Loading VFS config from: {:?}", path);
        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str::<VfsConfigFile>(&content) {
                Ok(layer) => self.merge(layer),
                Err(e) => log::error!("Failed to parse config file {:?}: {}", path, e),
            },
            Err(e) => log::warn!("Failed to read config file {:?}: {}", path, e),
        }
    }

    fn merge(&mut self, layer: VfsConfigFile) {
        if let Some(debounce) = layer.debounce_ms {
            self.debounce_ms = debounce;
        }
        if let Some(filesystems) = layer.change_prone_filesystems {
            self.change_prone_filesystems = filesystems;
        }
        if let Some(watch) = layer.watch_mime_database {
            self.watch_mime_database = watch;
        }
        if let Some(size) = layer.thumbnails.small_size {
            self.small_thumbnail_size = size;
        }
        if let Some(size) = layer.thumbnails.big_size {
            self.big_thumbnail_size = size;
        }
    }

    /// Coalescing window; never zero.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }
}
