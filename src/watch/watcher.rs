//! Watcher thread: notify + debounce, send changes to main.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};

use super::FsChange;

/// Translate a notify event into changes. Renames that carry both paths pass
/// through as one `Renamed`; everything else becomes per-path `Touched`.
pub(crate) fn changes_from_event(event: notify::Event) -> Vec<FsChange> {
    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FsChange::Renamed { from, to }],
                _ => Vec::new(),
            }
        }
        _ => event.paths.into_iter().map(FsChange::Touched).collect(),
    }
}

/// Run the watcher: watch `root` recursively and send debounced changes over
/// `tx`. A path is sent once it has been quiet for `debounce_ms`; renames are
/// sent immediately so the graph never sees the old and new path out of order.
/// Returns when `tx` is disconnected or the watcher fails.
pub fn run_watcher_thread(
    root: &Path,
    debounce_ms: u64,
    tx: mpsc::Sender<FsChange>,
) -> crate::error::Result<()> {
    let root = root.to_path_buf();
    let debounce = Duration::from_millis(debounce_ms);

    let (event_tx, event_rx) = mpsc::channel::<notify::Event>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(ev) => {
            let _ = event_tx.send(ev);
        }
        Err(e) => log::warn!("watch: notify error: {}", e),
    })?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    log::info!("watch: watching {}", root.display());

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match event_rx.recv_timeout(debounce) {
            Ok(event) => {
                let now = Instant::now();
                for change in changes_from_event(event) {
                    match change {
                        FsChange::Touched(p) => {
                            pending.insert(p, now);
                        }
                        FsChange::Renamed { from, to } => {
                            pending.remove(&from);
                            if tx.send(FsChange::Renamed { from, to }).is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let mut ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, t)| now.duration_since(**t) >= debounce)
                    .map(|(p, _)| p.clone())
                    .collect();
                ready.sort();
                for p in &ready {
                    pending.remove(p);
                }
                for p in ready {
                    if tx.send(FsChange::Touched(p)).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
