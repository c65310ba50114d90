// SPDX-License-Identifier: LGPL-3.0-only
use spacefm_vfs::mime::MimeDatabase;
use spacefm_vfs::{EventLoop, MimeTypeCache};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn write_definition(data: &Path, comment: &str) {
    let dir = data.join("mime").join("text");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("plain.xml"),
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<mime-type xmlns="http://www.freedesktop.org/standards/shared-mime-info" type="text/plain">
  <comment>{comment}</comment>
  <comment xml:lang="de">Einfaches Textdokument</comment>
  <generic-icon name="text-x-generic"/>
</mime-type>
"#
        ),
    )
    .unwrap();
}

fn cache_over(data: &Path, config: &Path) -> MimeTypeCache {
    let data = data.to_path_buf();
    let config = config.to_path_buf();
    MimeTypeCache::with_source(move || MimeDatabase::new(vec![data.clone()], vec![config.clone()]))
}

#[test]
fn test_description_and_actions_from_database() {
    let data = tempfile::tempdir().unwrap();
    let config = tempfile::tempdir().unwrap();
    write_definition(data.path(), "plain text document");
    fs::write(
        config.path().join("mimeapps.list"),
        "[Default Applications]\ntext/plain=editor.desktop;\n\n[Added Associations]\ntext/plain=viewer.desktop;editor.desktop;\n",
    )
    .unwrap();

    let cache = cache_over(data.path(), config.path());
    let plain = cache.get_from_file_name("notes.txt");
    assert_eq!(plain.type_name(), "text/plain");
    assert_eq!(plain.description(), "plain text document");
    assert_eq!(plain.icon_names(), vec!["text-plain", "text-x-generic", "unknown"]);
    assert_eq!(plain.default_action().as_deref(), Some("editor.desktop"));
    assert_eq!(plain.actions(), vec!["editor.desktop", "viewer.desktop"]);
    assert!(plain.is_text());
}

#[test]
fn test_database_rewrite_is_picked_up() {
    let _ = env_logger::builder().is_test(true).try_init();

    let data = tempfile::tempdir().unwrap();
    let config = tempfile::tempdir().unwrap();
    write_definition(data.path(), "plain text document");

    let cache = cache_over(data.path(), config.path());
    let event_loop = EventLoop::new();
    assert_eq!(
        cache
            .watch_database(&event_loop.handle(), Duration::from_millis(30))
            .unwrap(),
        1
    );

    let old = cache.get_from_type("text/plain");
    assert_eq!(old.description(), "plain text document");

    let reloads = Arc::new(AtomicU64::new(0));
    let counter = reloads.clone();
    cache.add_reload_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    write_definition(data.path(), "text file");
    fs::write(data.path().join("mime").join("mime.cache"), b"rebuilt").unwrap();
    assert!(event_loop.run_until(Duration::from_secs(5), || reloads.load(Ordering::SeqCst) > 0));
    event_loop.run_for(Duration::from_millis(150));
    assert_eq!(reloads.load(Ordering::SeqCst), 1);

    let new = cache.get_from_type("text/plain");
    assert!(!Arc::ptr_eq(&old, &new));
    assert_eq!(new.description(), "text file");
    assert_eq!(old.description(), "plain text document");

    cache.unwatch_database();
    assert_eq!(cache.watch_count(), 0);
}
