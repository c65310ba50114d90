// SPDX-License-Identifier: LGPL-3.0-only
//! Default and associated applications per MIME type.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

type Associations = HashMap<String, Vec<String>>;

/// Layered `mimeapps.list` and `mimeinfo.cache` associations.
///
/// Precedence: user config > system config > user data > system data, as in
/// the freedesktop mime-apps rules.
#[derive(Debug, Clone, Default)]
pub struct MimeActions {
    defaults: Associations,
    added: Associations,
    removed: Associations,
    cached: Associations,
}

impl MimeActions {
    /// Load from config and data directories, each list highest precedence first.
    pub fn load(config_dirs: &[PathBuf], data_dirs: &[PathBuf]) -> Self {
        let mut actions = Self::default();

        let lists = config_dirs
            .iter()
            .map(|d| d.join("mimeapps.list"))
            .chain(data_dirs.iter().map(|d| d.join("applications").join("mimeapps.list")));
        for path in lists {
            if let Ok(content) = std::fs::read_to_string(&path) {
                log::trace!("MimeActions: loading {:?}", path);
                actions.merge_mimeapps(&content);
            }
        }

        for dir in data_dirs {
            let path = dir.join("applications").join("mimeinfo.cache");
            if let Ok(content) = std::fs::read_to_string(&path) {
                for (section, mime, apps) in parse_sections(&content) {
                    if section == "MIME Cache" {
                        append(&mut actions.cached, mime, apps);
                    }
                }
            }
        }

        actions
    }

    fn merge_mimeapps(&mut self, content: &str) {
        for (section, mime, apps) in parse_sections(content) {
            match section {
                "Default Applications" => append(&mut self.defaults, mime, apps),
                "Added Associations" => append(&mut self.added, mime, apps),
                "Removed Associations" => append(&mut self.removed, mime, apps),
                _ => {},
            }
        }
    }

    /// Default desktop id for `mime`, falling back to the first associated app.
    pub fn default_action(&self, mime: &str) -> Option<String> {
        self.defaults
            .get(mime)
            .and_then(|apps| apps.iter().find(|a| !self.is_removed(mime, a)).cloned())
            .or_else(|| self.actions(mime).into_iter().next())
    }

    /// Every desktop id that can open `mime`, defaults first, without duplicates.
    pub fn actions(&self, mime: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        for table in [&self.defaults, &self.added, &self.cached] {
            for app in table.get(mime).into_iter().flatten() {
                if !self.is_removed(mime, app) && seen.insert(app.as_str()) {
                    out.push(app.clone());
                }
            }
        }
        out
    }

    fn is_removed(&self, mime: &str, app: &str) -> bool {
        self.removed
            .get(mime)
            .is_some_and(|apps| apps.iter().any(|a| a == app))
    }
}

fn append(table: &mut Associations, mime: &str, apps: Vec<String>) {
    table.entry(mime.to_string()).or_default().extend(apps);
}

/// Iterate `(section, key, values)` over an ini-style association file.
fn parse_sections(content: &str) -> Vec<(&str, &str, Vec<String>)> {
    let mut section = "";
    let mut out = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name;
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let apps = value
                .split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            out.push((section, key.trim(), apps));
        }
    }
    out
}
