//! Allowlist filtering of conda catalogs
//!
//! - `allowlist`: reading package allowlist files
//! - `deps`: by-name dependency graph and transitive closure
//! - `engine`: record validation and projection onto an allowlist

pub mod allowlist;
pub mod deps;
pub mod engine;

pub use allowlist::{load_list, parse_list};
pub use deps::{dependency_name, DependencyGraph};
pub use engine::{filename_is_valid, filter_repodata, FilterOutcome};
