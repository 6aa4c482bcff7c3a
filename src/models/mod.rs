//! Data models for conda-firewall
//!
//! This module contains the data structures shared by the sync pipeline and
//! the proxy server.

pub mod name_set;
pub mod repodata;

pub use name_set::NameSet;
pub use repodata::{
    encode_json, ArchiveFormat, Repodata, RepodataInfo, RepodataRecord,
    CURRENT_REPODATA_FILENAME, REPODATA_FILENAME,
};
