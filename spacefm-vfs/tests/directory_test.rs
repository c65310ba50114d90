// SPDX-License-Identifier: LGPL-3.0-only
mod common;

use common::{names, visible_names, Harness, Recorder, Seen};
use std::ffi::OsStr;
use std::fs;
use std::sync::Arc;

#[test]
fn test_listing_then_external_create() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), b"a").unwrap();
    fs::write(tmp.path().join("b.txt"), b"b").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(!dir.is_file_listed());

    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    assert!(dir.is_file_listed());
    assert!(dir.is_load_complete());
    assert_eq!(visible_names(&dir), names(["a.txt", "b.txt"]));

    fs::write(tmp.path().join("c.txt"), b"c").unwrap();
    assert!(h.wait_for(&recorder, Seen::Created("c.txt".into())));
    h.settle();

    assert_eq!(recorder.count(&Seen::Created("c.txt".into())), 1);
    assert_eq!(visible_names(&dir), names(["a.txt", "b.txt", "c.txt"]));
    let c = dir.find_file(OsStr::new("c.txt")).unwrap();
    assert_eq!(c.size(), 1);
    assert_eq!(c.mime_type().type_name(), "text/plain");
}

#[test]
fn test_equivalent_paths_share_one_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let real = tmp.path().join("real");
    fs::create_dir(&real).unwrap();
    std::os::unix::fs::symlink(&real, tmp.path().join("link")).unwrap();

    let h = Harness::new();
    let cache = h.context.directories();
    let first = cache.get_or_create(&real).unwrap();
    let dotted = cache.get_or_create(&real.join(".")).unwrap();
    let parent = cache.get_or_create(&real.join("..").join("real")).unwrap();
    let linked = cache.get_or_create(&tmp.path().join("link")).unwrap();

    assert!(Arc::ptr_eq(&first, &dotted));
    assert!(Arc::ptr_eq(&first, &parent));
    assert!(Arc::ptr_eq(&first, &linked));
    assert_eq!(cache.scans_started(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.get_soft(&tmp.path().join("link")).is_some());

    drop((first, dotted, parent, linked));
    assert!(cache.get_soft(&real).is_none());
    assert!(cache.is_empty());

    let _again = cache.get_or_create(&real).unwrap();
    assert_eq!(cache.scans_started(), 2);
}

#[test]
fn test_open_rejects_files_and_missing_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("plain");
    fs::write(&file, b"x").unwrap();

    let h = Harness::new();
    assert!(matches!(
        h.context.open_directory(&file),
        Err(spacefm_vfs::VfsError::NotADirectory(_))
    ));
    assert!(matches!(
        h.context.open_directory(&tmp.path().join("missing")),
        Err(spacefm_vfs::VfsError::InvalidPath(_))
    ));
    assert_eq!(h.context.directories().scans_started(), 0);
}

#[test]
fn test_hidden_list_excludes_entries() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        fs::write(tmp.path().join(name), name).unwrap();
    }
    fs::write(tmp.path().join(".hidden"), "b\n/abs/ignored\n").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));

    assert_eq!(visible_names(&dir), names(["a", "c"]));
    assert!(dir.find_file(OsStr::new("b")).is_none());
    assert_eq!(dir.hidden_count(), 1);
}

#[test]
fn test_add_hidden_applies_to_next_scan() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("secret"), b"s").unwrap();
    fs::write(tmp.path().join("public"), b"p").unwrap();

    let h = Harness::new();
    {
        let dir = h.context.open_directory(tmp.path()).unwrap();
        let recorder = Recorder::attach(&dir);
        assert!(h.wait_for(&recorder, Seen::Listed(false)));
        let secret = dir.find_file(OsStr::new("secret")).unwrap();
        dir.add_hidden(&secret).unwrap();
    }
    h.settle();

    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    assert_eq!(visible_names(&dir), names(["public"]));
    assert_eq!(dir.hidden_count(), 1);
}

#[test]
fn test_burst_of_changes_is_one_notification() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("f.txt"), b"f").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    recorder.clear();

    for _ in 0..10 {
        dir.emit_file_changed(OsStr::new("f.txt"), None, false);
    }
    assert!(recorder.events().is_empty());
    h.settle();

    assert_eq!(recorder.events(), vec![Seen::Changed(Some("f.txt".into()))]);
}

#[test]
fn test_create_then_delete_in_one_window_is_silent() {
    let tmp = tempfile::tempdir().unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    recorder.clear();

    // The loop is not pumped in between, so both events land in one window.
    let x = tmp.path().join("x");
    fs::write(&x, b"x").unwrap();
    fs::remove_file(&x).unwrap();
    dir.emit_file_created(OsStr::new("ghost"), false);
    h.settle();

    assert!(recorder.events().is_empty(), "{:?}", recorder.events());
    assert!(dir.is_directory_empty());
}

#[test]
fn test_failed_restat_reports_deletion_once() {
    let tmp = tempfile::tempdir().unwrap();
    let f = tmp.path().join("f");
    fs::write(&f, b"f").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    let entry = dir.find_file(OsStr::new("f")).unwrap();

    fs::remove_file(&f).unwrap();
    dir.emit_file_changed(OsStr::new("f"), Some(&entry), true);
    assert!(h.wait_for(&recorder, Seen::Deleted(Some("f".into()))));
    h.settle();

    assert_eq!(recorder.count(&Seen::Deleted(Some("f".into()))), 1);
    assert_eq!(recorder.count(&Seen::Changed(Some("f".into()))), 0);
    assert!(dir.find_file(OsStr::new("f")).is_none());
}

#[test]
fn test_avoid_changes_only_suppresses_unforced_changes() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("f"), b"f").unwrap();

    let h = Harness::with_change_prone(true);
    let dir = h.context.open_directory(tmp.path()).unwrap();
    assert!(dir.avoid_changes());
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    recorder.clear();

    dir.emit_file_changed(OsStr::new("f"), None, false);
    h.settle();
    assert!(recorder.events().is_empty());

    dir.emit_file_changed(OsStr::new("f"), None, true);
    assert!(h.wait_for(&recorder, Seen::Changed(Some("f".into()))));

    fs::write(tmp.path().join("g"), b"g").unwrap();
    assert!(h.wait_for(&recorder, Seen::Created("g".into())));

    fs::remove_file(tmp.path().join("f")).unwrap();
    assert!(h.wait_for(&recorder, Seen::Deleted(Some("f".into()))));
}

#[test]
fn test_directory_itself_deleted() {
    let tmp = tempfile::tempdir().unwrap();
    let sub = tmp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("inner"), b"i").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(&sub).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    assert!(!dir.is_directory_empty());

    fs::remove_dir_all(&sub).unwrap();
    assert!(h.wait_for(&recorder, Seen::Deleted(None)));
    assert!(dir.is_directory_empty());
}

#[test]
fn test_drop_mid_scan_tears_down() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..2000 {
        fs::write(tmp.path().join(format!("file-{i:04}")), b"").unwrap();
    }

    let h = Harness::new();
    let cache = h.context.directories();
    let dir = cache.get_or_create(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    drop(dir);

    assert!(cache.is_empty());
    assert!(cache.get_soft(tmp.path()).is_none());
    h.settle();
    assert!(recorder.events().is_empty());

    let dir = cache.get_or_create(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    assert_eq!(dir.files().len(), 2000);
    assert_eq!(cache.scans_started(), 2);
}

#[test]
fn test_cancel_load_still_lists() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..500 {
        fs::write(tmp.path().join(format!("{i}")), b"").unwrap();
    }

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    dir.cancel_load();

    assert!(h
        .event_loop
        .run_until(common::WAIT, || dir.is_file_listed()));
    let listed: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, Seen::Listed(_)))
        .collect();
    assert_eq!(listed.len(), 1);
    assert!(dir.files().len() <= 500);
}

#[test]
fn test_thumbnail_loaded_notification() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("pic.png"), b"png").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));

    let pic = dir.find_file(OsStr::new("pic.png")).unwrap();
    dir.load_thumbnail(&pic, false).unwrap();
    assert!(h.wait_for(&recorder, Seen::Thumbnail("pic.png".into())));
    assert_eq!(pic.thumbnail(false).map(|t| t.size), Some(128));
    assert!(!pic.is_thumbnail_loaded(true));

    dir.unload_thumbnails(false);
    assert!(!pic.is_thumbnail_loaded(false));
    dir.cancel_all_thumbnail_requests();
}

#[test]
fn test_mime_reload_reports_every_entry() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), b"a").unwrap();
    fs::write(tmp.path().join("b.rs"), b"fn main() {}").unwrap();

    let h = Harness::new();
    h.context.init().unwrap();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    recorder.clear();

    h.context.mime_cache().reload();
    assert!(h.wait_for(&recorder, Seen::Changed(Some("b.rs".into()))));
    assert!(recorder.contains(&Seen::Changed(Some("a.txt".into()))));
    assert_eq!(dir.find_file(OsStr::new("a.txt")).unwrap().mime_type().type_name(), "text/plain");

    h.context.shutdown();
    recorder.clear();
    h.context.mime_cache().reload();
    h.settle();
    assert!(recorder.events().is_empty());
}

#[test]
fn test_subscribers_in_order_and_unsubscribe() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("f"), b"f").unwrap();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let ids: Vec<_> = (0..3)
        .map(|i| {
            let order = order.clone();
            dir.subscribe(move |event| {
                if matches!(event, spacefm_vfs::DirectoryEvent::FileChanged(_)) {
                    order.lock().push(i);
                }
            })
        })
        .collect();
    assert!(h.event_loop.run_until(common::WAIT, || dir.is_file_listed()));

    dir.emit_file_changed(OsStr::new("f"), None, false);
    h.settle();
    assert_eq!(*order.lock(), vec![0, 1, 2]);

    assert!(dir.unsubscribe(ids[1]));
    assert!(!dir.unsubscribe(ids[1]));
    order.lock().clear();
    dir.emit_file_changed(OsStr::new("f"), None, false);
    h.settle();
    assert_eq!(*order.lock(), vec![0, 2]);
}

#[test]
fn test_deletions_during_scan_leave_no_stale_entries() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..20_000 {
        fs::write(tmp.path().join(format!("n{i:05}")), b"").unwrap();
    }
    let read_order: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();

    let h = Harness::new();
    let dir = h.context.open_directory(tmp.path()).unwrap();
    let recorder = Recorder::attach(&dir);
    for path in read_order.iter().take(100) {
        fs::remove_file(path).unwrap();
    }

    assert!(h.wait_for(&recorder, Seen::Listed(false)));
    h.settle();
    h.settle();

    let stale: Vec<_> = dir.files().into_iter().filter(|f| !f.path().exists()).collect();
    assert!(stale.is_empty(), "{} listed entries no longer exist", stale.len());
    assert_eq!(dir.files().len(), 20_000 - 100);
}
