//! File watching for content reloads.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Quiet period after the last change before a reload is signalled.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// What kind of content changed during a burst of file events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A Markdown post was added, changed or removed
    Posts(Vec<PathBuf>),

    /// Only stylesheets, templates or assets changed
    Assets(Vec<PathBuf>),
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively; paths that do not exist are skipped.
    ///
    /// Bursts of events are collapsed: one [`WatchEvent`] is sent once no change
    /// has arrived for the debounce period.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(16);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            }
        }

        std::thread::spawn(move || {
            while let Ok(first) = sync_rx.recv() {
                let mut changed = relevant_paths(&first);

                // Keep collecting until the burst goes quiet
                loop {
                    match sync_rx.recv_timeout(DEBOUNCE) {
                        Ok(event) => changed.extend(relevant_paths(&event)),
                        Err(mpsc::RecvTimeoutError::Timeout) => break,
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    }
                }

                changed.sort();
                changed.dedup();
                if let Some(event) = classify(changed) {
                    if async_tx.blocking_send(event).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Paths touched by a create, modify or remove event.
fn relevant_paths(event: &notify::Event) -> Vec<PathBuf> {
    use notify::EventKind;

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            event.paths.iter().filter(|p| !is_hidden(p)).cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Editor swap and backup files.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') || n.ends_with('~') || n.ends_with(".swp"))
        .unwrap_or(false)
}

fn classify(paths: Vec<PathBuf>) -> Option<WatchEvent> {
    if paths.is_empty() {
        return None;
    }

    let touches_posts = paths
        .iter()
        .any(|p| p.extension().and_then(|e| e.to_str()) == Some("md"));

    Some(if touches_posts {
        WatchEvent::Posts(paths)
    } else {
        WatchEvent::Assets(paths)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn classifies_bursts() {
        assert_eq!(classify(Vec::new()), None);
        assert_eq!(
            classify(vec![PathBuf::from("style.css"), PathBuf::from("posts/a.md")]),
            Some(WatchEvent::Posts(vec![
                PathBuf::from("style.css"),
                PathBuf::from("posts/a.md")
            ]))
        );
        assert_eq!(
            classify(vec![PathBuf::from("posts/assets/a.png")]),
            Some(WatchEvent::Assets(vec![PathBuf::from("posts/assets/a.png")]))
        );
        assert!(is_hidden(Path::new("posts/.a.md.swp")));
        assert!(!is_hidden(Path::new("posts/a.md")));
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let post = temp.path().join("hello.md");

        // Create the watcher first (so it catches file creation)
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&post, "# Created").unwrap();
        fs::write(&post, "# Edited").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        // Keep watcher alive until we're done
        drop(watcher);

        let event = event
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert!(matches!(event, WatchEvent::Posts(_)));
    }
}
