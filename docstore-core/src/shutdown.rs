// src/shutdown.rs
//! SIGTERM/SIGINT handling: on either signal, flush every dirty collection
//! once and mark the process as shutting down. Re-entrant-safe — a second
//! signal while a flush is already underway is a no-op.

use crate::cache::CollectionCache;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registers SIGTERM/SIGINT handlers that flip a shared flag; `poll` (called
/// from the autosave tick, or any other steady heartbeat) checks the flag
/// and runs the actual flush exactly once.
pub struct ShutdownCoordinator {
    requested: Arc<AtomicBool>,
    handled: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn register() -> std::io::Result<Self> {
        let requested = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&requested))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&requested))?;
        Ok(ShutdownCoordinator {
            requested,
            handled: AtomicBool::new(false),
        })
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Flush once if a signal has arrived and this coordinator hasn't
    /// already handled one. Safe to call repeatedly from a polling loop.
    pub fn poll(&self, cache: &Arc<CollectionCache>) {
        if !self.requested() {
            return;
        }
        if self
            .handled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            crate::log_info!("shutdown signal received, flushing collections");
            cache.flush_all();
        }
    }
}
