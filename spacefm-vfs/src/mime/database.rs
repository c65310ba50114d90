// SPDX-License-Identifier: LGPL-3.0-only
//! Read-only view of the freedesktop shared-mime-info database.

use std::path::{Path, PathBuf};

use crate::mime::actions::MimeActions;

/// What the database knows about one MIME type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeInfo {
    /// Untranslated `<comment>`.
    pub description: Option<String>,
    /// `<icon name=...>`.
    pub icon: Option<String>,
    /// `<generic-icon name=...>`.
    pub generic_icon: Option<String>,
}

/// Locations of MIME definitions and application associations.
#[derive(Debug, Clone)]
pub struct MimeDatabase {
    data_dirs: Vec<PathBuf>,
    actions: MimeActions,
}

impl MimeDatabase {
    /// Build from explicit directories, highest precedence first.
    pub fn new(data_dirs: Vec<PathBuf>, config_dirs: Vec<PathBuf>) -> Self {
        let actions = MimeActions::load(&config_dirs, &data_dirs);
        Self { data_dirs, actions }
    }

    /// Build from the XDG base directories of the current user.
    pub fn load_default() -> Self {
        match xdg::BaseDirectories::new() {
            Ok(xdg_dirs) => {
                let mut data_dirs = vec![xdg_dirs.get_data_home()];
                data_dirs.extend(xdg_dirs.get_data_dirs());
                let mut config_dirs = vec![xdg_dirs.get_config_home()];
                config_dirs.extend(xdg_dirs.get_config_dirs());
                Self::new(data_dirs, config_dirs)
            },
            Err(e) => {
                log::warn!("MimeDatabase: XDG directories unavailable ({}), using system defaults", e);
                Self::new(
                    vec![PathBuf::from("/usr/local/share"), PathBuf::from("/usr/share")],
                    vec![PathBuf::from("/etc/xdg")],
                )
            },
        }
    }

    /// Data directories, highest precedence first.
    pub fn data_dirs(&self) -> &[PathBuf] {
        &self.data_dirs
    }

    /// Application associations.
    pub fn actions(&self) -> &MimeActions {
        &self.actions
    }

    /// Existing `<data dir>/mime` directories; these are watched for changes.
    pub fn mime_dirs(&self) -> Vec<PathBuf> {
        self.data_dirs
            .iter()
            .map(|d| d.join("mime"))
            .filter(|d| d.is_dir())
            .collect()
    }

    /// Look up the XML definition of `mime_type`, first match wins.
    pub fn lookup(&self, mime_type: &str) -> MimeInfo {
        let Some((media, subtype)) = mime_type.split_once('/') else {
            return MimeInfo::default();
        };

        for dir in &self.data_dirs {
            let xml = dir.join("mime").join(media).join(format!("{}.xml", subtype));
            match std::fs::read_to_string(&xml) {
                Ok(content) => return parse_mime_xml(&content),
                Err(_) => continue,
            }
        }
        MimeInfo::default()
    }
}

/// Extract the untranslated comment and icon names from a `<mime-type>` document.
pub(crate) fn parse_mime_xml(content: &str) -> MimeInfo {
    let mut info = MimeInfo::default();
    let mut rest = content;

    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('>') else {
            break;
        };
        let tag = &rest[..end];
        rest = &rest[end + 1..];

        let tag_name = tag.split_whitespace().next().unwrap_or("");
        match tag_name.trim_end_matches('/') {
            "comment" if info.description.is_none() && !tag.contains("xml:lang") => {
                if let Some(close) = rest.find("</comment>") {
                    let text = unescape(rest[..close].trim());
                    if !text.is_empty() {
                        info.description = Some(text);
                    }
                }
            },
            "icon" if info.icon.is_none() => info.icon = attribute(tag, "name"),
            "generic-icon" if info.generic_icon.is_none() => {
                info.generic_icon = attribute(tag, "name")
            },
            _ => {},
        }
    }

    info
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let key = format!("{}=", name);
    let at = tag.find(&key)? + key.len();
    let value = &tag[at..];
    let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &value[1..];
    let end = value.find(quote)?;
    Some(unescape(&value[..end]))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Whether `path` looks like a file the shared-mime-info tools rewrite on update.
pub(crate) fn is_database_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == "mime.cache" || n == "globs2" || n == "magic" || n == "packages")
}
