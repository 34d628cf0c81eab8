// docstore-core/src/lib.rs
// Pure Rust embedded document store - no FFI layer here.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::only_used_in_recursion)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::ptr_arg)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::nonminimal_bool)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::redundant_comparisons)]
#![allow(clippy::suspicious_open_options)]
#![allow(clippy::doc_lazy_continuation)]
#![allow(clippy::result_large_err)]
#![allow(clippy::single_match)]
#![allow(clippy::unnecessary_cast)]
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

pub mod adapter;
pub mod cache;
pub mod codec;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod find_options;
pub mod logging;
pub mod path;
pub mod query;
pub mod remote;
pub mod shutdown;
pub mod update;
pub mod validate;
pub mod value_utils;

pub use adapter::Verb;
pub use cache::{CollectionCache, CollectionState};
pub use config::{Options, RemoteOptions};
pub use database::Database;
pub use document::Document;
pub use error::{DocStoreError, Result};
pub use find_options::{Projection, Sort};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use query::matches_filter;
pub use remote::RemoteAdapter;
pub use shutdown::ShutdownCoordinator;
pub use update::{apply_update, normalize_update};
