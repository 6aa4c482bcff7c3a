//! Record validation and allowlist projection
//!
//! [`filter_repodata`] is pure: it takes a raw catalog and returns the
//! filtered catalog together with the names it admitted. Callers merge the
//! admitted names into their own run-wide index.

use tracing::warn;

use crate::models::{ArchiveFormat, NameSet, Repodata, RepodataRecord};

/// Result of filtering one channel subdir
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// Catalog holding only admitted records
    pub repodata: Repodata,
    /// Admitted `channel/subdir/filename` entries
    pub filenames: NameSet,
    /// Admitted package names
    pub packages: NameSet,
    /// Records dropped because their filename or subdir did not match
    pub rejected: usize,
}

/// Check a record against its filename and the catalog subdir
///
/// The subdir is checked first; a record filed under the wrong platform is
/// invalid regardless of its filename.
pub fn filename_is_valid(
    catalog_subdir: &str,
    filename: &str,
    record: &RepodataRecord,
    format: ArchiveFormat,
) -> bool {
    record.subdir == catalog_subdir && filename == record.expected_filename(format)
}

/// Filter `repodata` for `channel`
///
/// Invalid records are logged and dropped. With an allowlist, only records
/// whose name is listed are admitted; without one every valid record is.
pub fn filter_repodata(
    channel: &str,
    repodata: &Repodata,
    allowlist: Option<&NameSet>,
) -> FilterOutcome {
    let subdir = repodata.info.subdir.as_str();
    let mut outcome = FilterOutcome {
        repodata: repodata.empty_like(),
        ..Default::default()
    };

    for (format, filename, record) in repodata.iter_records() {
        if !filename_is_valid(subdir, filename, record, format) {
            warn!(
                channel = %channel,
                subdir = %subdir,
                filename = %filename,
                record_subdir = %record.subdir,
                expected = %record.expected_filename(format),
                "Dropping record with mismatched filename or subdir"
            );
            outcome.rejected += 1;
            continue;
        }

        if allowlist.is_some_and(|allowed| !allowed.contains(&record.name)) {
            continue;
        }

        outcome
            .repodata
            .records_mut(format)
            .insert(filename.clone(), record.clone());
        outcome
            .filenames
            .insert(format!("{}/{}/{}", channel, subdir, filename));
        outcome.packages.insert(record.name.as_str());
    }

    outcome
}
