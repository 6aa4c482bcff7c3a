//! conda-firewall - allowlist-filtering mirror and gatekeeper proxy for conda channels
//!
//! A sync run downloads `repodata.json` for every configured channel subdir,
//! filters it against a per-channel package allowlist (optionally widened to
//! every transitive dependency) and publishes the result. The server then
//! serves the filtered catalogs and forwards only the package files they
//! list.

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod server;
pub mod sync;
