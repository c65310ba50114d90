// SPDX-License-Identifier: LGPL-3.0-only
//! Print a directory listing, then follow changes until interrupted.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p spacefm-vfs --example watch -- /tmp
//! ```

use spacefm_vfs::{DirectoryEvent, EventLoop, VfsConfig, VfsContext};
use std::path::PathBuf;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = smol::block_on(VfsConfig::load()).unwrap_or_else(|e| {
        log::warn!("Using default config: {}", e);
        VfsConfig::default()
    });

    let event_loop = EventLoop::new();
    let context = VfsContext::new(event_loop.handle(), config);
    context.init()?;

    let dir = context.open_directory(&path)?;
    let weak = std::sync::Arc::downgrade(&dir);
    dir.subscribe(move |event| match event {
        DirectoryEvent::FileListed { cancelled } => {
            let Some(listed_dir) = weak.upgrade() else {
                return;
            };
            let mut files = listed_dir.files();
            files.sort_by(|a, b| a.name().cmp(b.name()));
            for file in files {
                println!(
                    "{} {:>10} {:<28} {}",
                    file.display_permissions(),
                    file.display_size(),
                    file.mime_type().type_name(),
                    file.display_name()
                );
            }
            println!(
                "-- {} entries, {} hidden{}",
                listed_dir.files().len(),
                listed_dir.hidden_count(),
                if *cancelled { " (cancelled)" } else { "" }
            );
        },
        DirectoryEvent::FileCreated(file) => println!("+ {}", file.display_name()),
        DirectoryEvent::FileChanged(Some(file)) => println!("~ {} ({})", file.display_name(), file.display_size()),
        DirectoryEvent::FileChanged(None) => println!("~ ."),
        DirectoryEvent::FileDeleted(Some(file)) => println!("- {}", file.display_name()),
        DirectoryEvent::FileDeleted(None) => println!("- . (directory removed)"),
        DirectoryEvent::ThumbnailLoaded(_) => {},
    });

    loop {
        event_loop.iterate(Duration::from_secs(1));
    }
}
