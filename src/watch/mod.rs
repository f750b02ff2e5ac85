//! File watcher: keep the vault's edge graph current while documents change.
//!
//! Uses the notify crate to watch the vault root, debounces events, applies
//! each change to the [`Vault`] and reparses whatever became stale.

mod watcher;

pub use watcher::run_watcher_thread;

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{RelgraphError, Result};
use crate::vault::{TouchOutcome, Vault};

/// A filesystem change under the vault root, with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// Created, modified or removed.
    Touched(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

/// Apply one change and bring the graph up to date. Returns the outcome and
/// the number of documents reparsed.
pub fn handle_change(vault: &mut Vault, change: &FsChange) -> Result<(TouchOutcome, usize)> {
    let start = std::time::Instant::now();
    let outcome = vault.apply_change(change)?;
    if matches!(outcome, TouchOutcome::Ignored | TouchOutcome::Unchanged) {
        return Ok((outcome, 0));
    }

    let reparsed = vault.ensure_fresh()?;
    log::info!(
        "watch: {:?} {:?} ({} reparsed, {} edges) in {:?}",
        change,
        outcome,
        reparsed,
        vault.store().materialize().len(),
        start.elapsed()
    );
    Ok((outcome, reparsed))
}

/// Run the file watcher: spawn the watcher thread, then an async loop that
/// receives changes and calls [`handle_change`]. Runs until the watcher thread
/// exits or Ctrl-C.
pub async fn run_watcher(mut vault: Vault, debounce_ms: u64) -> Result<()> {
    let root = vault.root().to_path_buf();
    let (tx, rx) = mpsc::channel();
    let rx = Arc::new(Mutex::new(rx));

    std::thread::spawn(move || {
        if let Err(e) = run_watcher_thread(&root, debounce_ms, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });

    let reparsed = vault.ensure_fresh()?;
    log::info!(
        "watch: {} documents, {} parsed, {} edges",
        vault.document_count(),
        reparsed,
        vault.store().materialize().len()
    );

    loop {
        let rx_clone = rx.clone();
        let recv = tokio::task::spawn_blocking(move || {
            rx_clone.lock().unwrap_or_else(PoisonError::into_inner).recv()
        });

        let change = tokio::select! {
            joined = recv => joined
                .map_err(|e| RelgraphError::Watch(format!("watcher task join: {}", e)))?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("watch: interrupted, stopping");
                break;
            }
        };

        let change = match change {
            Ok(c) => c,
            Err(_) => break,
        };

        if let Err(e) = handle_change(&mut vault, &change) {
            log::error!("watch handle_change {:?}: {}", change, e);
        }
    }
    Ok(())
}
