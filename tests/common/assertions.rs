//! Assertion helpers for artifacts and events

use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use weeb_dl::Event;

/// Entry names of a CBZ archive, in archive order
pub fn cbz_entries(path: &Path) -> Vec<String> {
    let file = File::open(path).expect("archive should exist");
    let mut archive = zip::ZipArchive::new(file).expect("archive should be a valid zip");
    (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect()
}

/// Sorted file names directly inside `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("directory should exist")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Assert no temp files from an atomic write were left behind under `dir`
pub fn assert_no_partial_files(dir: &Path) {
    if !dir.exists() {
        return;
    }
    for entry in std::fs::read_dir(dir).expect("directory should exist") {
        let entry = entry.expect("dir entry");
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(
            !name.ends_with(".part"),
            "leftover partial file {name} in {}",
            dir.display()
        );
        if entry.path().is_dir() {
            assert_no_partial_files(&entry.path());
        }
    }
}

/// Wait for the first event matching `predicate`, failing after `wait`
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    wait: Duration,
    predicate: impl Fn(&Event) -> bool,
) -> Event {
    timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Every event already queued on `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
