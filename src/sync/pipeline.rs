//! One synchronization run
//!
//! Refreshes the raw cache, filters every configured channel subdir against
//! its allowlist, publishes the filtered catalogs and finally the two index
//! files consumed by the proxy.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::{ChannelConfig, Config};
use crate::error::{BatchError, SyncError};
use crate::filter::{filter_repodata, load_list, DependencyGraph, FilterOutcome};
use crate::models::{encode_json, NameSet, Repodata};

use super::cache::{CacheUpdater, RefreshReport};
use super::publisher::publish;

/// Indent used for published filtered catalogs
const FILTERED_INDENT: &str = " ";

/// Names admitted during one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunIndex {
    /// `channel/subdir/filename` of every admitted package file
    pub filenames: NameSet,
    /// Every admitted package name
    pub packages: NameSet,
}

impl RunIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the names admitted for one subdir
    pub fn merge(&mut self, outcome: &FilterOutcome) {
        self.filenames.union_with(&outcome.filenames);
        self.packages.union_with(&outcome.packages);
    }

    /// Write both index files, replacing the previous run's
    pub async fn publish(&self, config: &Config) -> Result<(), SyncError> {
        publish(
            &config.filenames_index_path(),
            self.filenames.to_sorted_lines().as_bytes(),
        )
        .await?;
        publish(
            &config.package_names_index_path(),
            self.packages.to_sorted_lines().as_bytes(),
        )
        .await?;
        Ok(())
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub refresh: RefreshReport,
    /// Download failures that fell back to the cached copy
    pub download_errors: Vec<SyncError>,
    /// Filtered catalogs published
    pub subdirs_published: usize,
    /// Records dropped for a mismatched filename or subdir
    pub records_rejected: usize,
    pub index: RunIndex,
}

impl SyncReport {
    /// `Err` carrying every download failure, even though the run published
    /// from cached copies
    pub fn download_result(&self) -> Result<(), BatchError> {
        BatchError {
            errors: self.download_errors.clone(),
        }
        .into_result()
    }
}

/// Run a full synchronization pass
///
/// Download failures are logged and the cached copy is filtered instead.
/// Any other failure is collected, the remaining channels are still
/// processed, and the index files are only written if nothing failed.
pub async fn run(config: &Config, force: bool) -> Result<SyncReport, BatchError> {
    let updater = CacheUpdater::new(config)?;
    let mut report = SyncReport::default();

    match updater.refresh_all(config, force).await {
        Ok(refresh) => report.refresh = refresh,
        Err(e) => {
            for error in &e.errors {
                warn!(error = %error, "Using cached catalog after download failure");
            }
            report.download_errors = e.errors;
        }
    }

    let mut errors = BatchError::new();
    for (channel, channel_config) in &config.channels {
        if let Err(e) = sync_channel(config, channel, channel_config, &mut report).await {
            errors.merge(e);
        }
    }

    if !errors.is_empty() {
        warn!(
            failures = errors.len(),
            "Sync finished with errors, index files not updated"
        );
        return Err(errors);
    }

    report.index.publish(config).await?;
    info!(
        subdirs = report.subdirs_published,
        filenames = report.index.filenames.len(),
        packages = report.index.packages.len(),
        rejected = report.records_rejected,
        "Sync completed"
    );
    Ok(report)
}

async fn sync_channel(
    config: &Config,
    channel: &str,
    channel_config: &ChannelConfig,
    report: &mut SyncReport,
) -> Result<(), BatchError> {
    let mut allowlist = match &channel_config.allowlist_file {
        Some(path) => {
            let names = load_list(path).await?;
            info!(channel = %channel, allowed = names.len(), "Loaded allowlist");
            Some(names)
        }
        None => None,
    };

    let mut errors = BatchError::new();
    let mut catalogs: BTreeMap<&str, Repodata> = BTreeMap::new();
    for subdir in &channel_config.subdirs {
        let path = config.raw_repodata_path(channel, subdir);
        match Repodata::load(&path).await {
            Ok(repodata) => {
                catalogs.insert(subdir.as_str(), repodata);
            }
            Err(e) => {
                warn!(channel = %channel, subdir = %subdir, error = %e, "Failed to load raw catalog");
                errors.push(e);
            }
        }
    }

    if channel_config.recurse_dependencies {
        if let Some(seed) = allowlist.as_ref() {
            // The closure must see every subdir or it would be incomplete
            if !errors.is_empty() {
                return Err(errors);
            }
            let graph = DependencyGraph::from_repodata(catalogs.values());
            let expanded = graph.closure(seed);
            info!(
                channel = %channel,
                allowed = seed.len(),
                expanded = expanded.len(),
                "Expanded allowlist with dependencies"
            );
            allowlist = Some(expanded);
        }
    }

    for (subdir, repodata) in &catalogs {
        let outcome = filter_repodata(channel, repodata, allowlist.as_ref());
        let dest = config.filtered_repodata_path(channel, subdir);

        let bytes = match encode_json(&outcome.repodata, FILTERED_INDENT) {
            Ok(bytes) => bytes,
            Err(e) => {
                errors.push(SyncError::Encode {
                    path: dest.display().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        if let Err(e) = publish(&dest, &bytes).await {
            warn!(channel = %channel, subdir = %subdir, error = %e, "Failed to publish catalog");
            errors.push(e);
            continue;
        }

        info!(
            channel = %channel,
            subdir = %subdir,
            total = repodata.record_count(),
            admitted = outcome.repodata.record_count(),
            rejected = outcome.rejected,
            "Published filtered catalog"
        );
        report.subdirs_published += 1;
        report.records_rejected += outcome.rejected;
        report.index.merge(&outcome);
    }

    errors.into_result()
}
