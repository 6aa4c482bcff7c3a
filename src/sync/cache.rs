//! Raw catalog cache
//!
//! Downloads `repodata.json` for each configured channel subdir into the raw
//! cache directory. A cached copy younger than the staleness threshold is
//! reused without contacting upstream. A downloaded body that does not parse
//! as a catalog is discarded and the previous cached copy is kept.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{repodata_path, Config};
use crate::error::{BatchError, CatalogError, SyncError};
use crate::models::{Repodata, REPODATA_FILENAME};

use super::publisher::AtomicWriter;

/// What a refresh did for each subdir
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// `channel/subdir` entries downloaded from upstream
    pub downloaded: Vec<String>,
    /// `channel/subdir` entries whose cached copy was still fresh
    pub cached: Vec<String>,
}

impl RefreshReport {
    pub fn merge(&mut self, other: RefreshReport) {
        self.downloaded.extend(other.downloaded);
        self.cached.extend(other.cached);
    }
}

/// True if `modified` is less than `max_age_minutes` whole minutes before `now`
///
/// A threshold of zero is never fresh. A modification time in the future
/// counts as zero elapsed minutes.
pub fn is_fresh_at(modified: SystemTime, now: SystemTime, max_age_minutes: u64) -> bool {
    if max_age_minutes == 0 {
        return false;
    }
    let elapsed_minutes = now
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        / 60;
    elapsed_minutes < max_age_minutes
}

/// True if the file at `path` exists and is fresh under `max_age_minutes`
pub async fn is_fresh(path: &Path, max_age_minutes: u64) -> bool {
    if max_age_minutes == 0 {
        return false;
    }
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => is_fresh_at(modified, SystemTime::now(), max_age_minutes),
        Err(_) => false,
    }
}

/// Refreshes raw catalogs from the upstream host
#[derive(Debug, Clone)]
pub struct CacheUpdater {
    client: Client,
    host: String,
    raw_dir: PathBuf,
}

impl CacheUpdater {
    /// Create an updater from configuration
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream.download_timeout_secs))
            .user_agent(concat!("conda-firewall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network {
                url: config.upstream_host().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::with_client(
            client,
            config.upstream_host(),
            config.raw_dir.clone(),
        ))
    }

    /// Create an updater with a custom reqwest Client
    pub fn with_client(client: Client, host: &str, raw_dir: PathBuf) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            raw_dir,
        }
    }

    /// Upstream URL of a channel subdir catalog
    pub fn upstream_url(&self, channel: &str, subdir: &str) -> String {
        format!("{}/{}/{}/{}", self.host, channel, subdir, REPODATA_FILENAME)
    }

    /// Local path of a channel subdir catalog
    pub fn destination(&self, channel: &str, subdir: &str) -> PathBuf {
        repodata_path(&self.raw_dir, channel, subdir)
    }

    /// Refresh every subdir of one channel
    ///
    /// A failing subdir does not stop its siblings. Every failure is
    /// returned together once all subdirs have been attempted.
    pub async fn refresh(
        &self,
        channel: &str,
        subdirs: &[String],
        max_age_minutes: u64,
    ) -> Result<RefreshReport, BatchError> {
        let mut report = RefreshReport::default();
        let mut errors = BatchError::new();

        for subdir in subdirs {
            let key = format!("{}/{}", channel, subdir);
            let dest = self.destination(channel, subdir);

            if is_fresh(&dest, max_age_minutes).await {
                debug!(channel = %channel, subdir = %subdir, "Cached catalog is fresh");
                report.cached.push(key);
                continue;
            }

            let url = self.upstream_url(channel, subdir);
            match self.download(&url, &dest).await {
                Ok(bytes) => {
                    info!(
                        channel = %channel,
                        subdir = %subdir,
                        bytes = bytes,
                        "Downloaded catalog"
                    );
                    report.downloaded.push(key);
                }
                Err(e) => {
                    warn!(channel = %channel, subdir = %subdir, error = %e, "Catalog download failed");
                    errors.push(e);
                }
            }
        }

        errors.into_result().map(|()| report)
    }

    /// Refresh every configured channel; `force` ignores cache freshness
    pub async fn refresh_all(
        &self,
        config: &Config,
        force: bool,
    ) -> Result<RefreshReport, BatchError> {
        let max_age = if force { 0 } else { config.max_age_minutes };
        let mut report = RefreshReport::default();
        let mut errors = BatchError::new();

        for (channel, channel_config) in &config.channels {
            match self.refresh(channel, &channel_config.subdirs, max_age).await {
                Ok(r) => report.merge(r),
                Err(e) => errors.merge(e),
            }
        }

        errors.into_result().map(|()| report)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SyncError> {
        debug!(url = %url, "Sending HTTP GET request");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut writer = AtomicWriter::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SyncError::from_reqwest(url, e))?
        {
            writer.write_chunk(&chunk).await?;
        }

        // Dropping the writer on a parse failure removes the temporary file
        writer.flush().await?;
        if let Err(e) = Repodata::load(writer.temp_path()).await {
            let message = match e {
                CatalogError::Read { message, .. } | CatalogError::Parse { message, .. } => message,
            };
            return Err(CatalogError::Parse {
                path: url.to_string(),
                message,
            }
            .into());
        }

        Ok(writer.commit().await?)
    }
}
