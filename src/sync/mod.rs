//! Catalog synchronization
//!
//! # Components
//!
//! - [`cache`]: refreshes raw catalogs from upstream with a staleness threshold
//! - [`publisher`]: temp-file-then-rename writes so readers never see partial files
//! - [`pipeline`]: one full run, from refresh to published filtered catalogs and indexes
//!
//! # Example
//!
//! ```ignore
//! use conda_firewall::config::Config;
//! use conda_firewall::sync;
//!
//! let config = Config::from_file("config.yaml")?;
//! let report = sync::run(&config, false).await?;
//! println!("{} package files admitted", report.index.filenames.len());
//! ```

pub mod cache;
pub mod pipeline;
pub mod publisher;

// Re-export main types for convenience
pub use cache::{is_fresh, is_fresh_at, CacheUpdater, RefreshReport};
pub use pipeline::{run, RunIndex, SyncReport};
pub use publisher::{publish, AtomicWriter};
