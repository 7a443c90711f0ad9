//! Change detection for repository indexes

use crate::catalog::Catalog;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// SHA-256 of a raw repository index, lowercase hex.
///
/// ```rust
/// use chart_repo::checksum::RepoChecksum;
///
/// let checksum = RepoChecksum::compute(b"");
/// assert_eq!(
///     checksum.as_str(),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoChecksum(String);

impl RepoChecksum {
    pub fn compute(raw_index: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(raw_index)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whether a repository index was already fully processed.
///
/// A checkpoint is only recorded after a successful run, so an interrupted
/// run is always retried.
#[derive(Clone)]
pub struct ChecksumGate {
    catalog: Catalog,
}

impl ChecksumGate {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// True when the stored checksum of `repo_name` equals the checksum of
    /// `raw_index`. A repository without checkpoint is never skipped.
    pub async fn should_skip(&self, repo_name: &str, raw_index: &[u8]) -> Result<bool> {
        let checksum = RepoChecksum::compute(raw_index);
        let skip = self
            .catalog
            .find_repo_check(repo_name)
            .await?
            .is_some_and(|check| check.checksum == checksum.as_str());
        debug!(repo = repo_name, checksum = %checksum, skip, "Checked repository checksum");
        Ok(skip)
    }

    /// Upserts the checkpoint of `repo_name`.
    pub async fn record_success(
        &self,
        repo_name: &str,
        checksum: &RepoChecksum,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.catalog
            .update_last_check(repo_name, checksum.as_str(), now)
            .await
    }
}
