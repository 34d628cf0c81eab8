// src/config.rs
//! Construction-time options bag. Plain data, `Default` impl, passed once
//! when a database handle is built — no environment-variable layer.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Options {
    pub storage_path: PathBuf,
    /// Autosave tick, in milliseconds. `0` disables the background timer.
    pub auto_save_interval_ms: u64,
    pub debug: bool,
    pub remote: Option<RemoteOptions>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            storage_path: PathBuf::from("./storage"),
            auto_save_interval_ms: 5_000,
            debug: false,
            remote: None,
        }
    }
}

/// Options specific to the remote-access mode (§6): the adapter on the
/// other end exposes the identical operation set over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub database_url: String,
    pub token: Option<String>,
    pub pool_size: usize,
    pub max_retries: u32,
    pub timeout_ms: u64,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        RemoteOptions {
            database_url: String::new(),
            token: None,
            pool_size: 4,
            max_retries: 3,
            timeout_ms: 10_000,
        }
    }
}
