//! CDN cache invalidation: the purge client contract and the fan-out helper
//! that issues one purge per record.

use crate::handle::ResultHandle;
use crate::task::ArgContributor;
use clap::{ArgMatches, Args, Command, FromArgMatches};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A record whose published content lives under a CDN path.
pub trait CdnRecord {
    /// Path of the record relative to the CDN root. Empty means the record
    /// is not published and has nothing to flush.
    fn relative_url(&self) -> &str;

    /// Sub-paths under [`CdnRecord::relative_url`] whose content changes on
    /// every publish and must be flushed.
    fn mutable_urls(&self) -> &[String];
}

/// Acknowledgement returned by the CDN for a purge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReceipt {
    pub purge_id: String,
    pub estimated_seconds: u64,
}

/// Client able to invalidate cached content by URL.
///
/// Implementations must be safe to call concurrently; the fan-out helper
/// issues every request without waiting for earlier ones.
pub trait PurgeClient: Send + Sync {
    /// Root URL that record paths are appended to.
    fn root_url(&self) -> &str;

    /// Requests invalidation of `urls`.
    fn purge_by_url(&self, urls: Vec<String>) -> ResultHandle<PurgeReceipt>;
}

/// Joins URL parts with exactly one `/` between each of them. Empty parts
/// are ignored.
///
/// ```
/// use steptask::cdn::join_url;
///
/// assert_eq!(
///     join_url(&["https://cdn.example.com/", "/content/dist", "repodata/repomd.xml"]),
///     "https://cdn.example.com/content/dist/repodata/repomd.xml"
/// );
/// ```
pub fn join_url(parts: &[&str]) -> String {
    let mut url = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if url.is_empty() {
            url.push_str(part);
            continue;
        }
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(part.trim_start_matches('/'));
    }
    url
}

/// Flushes CDN caches for published records.
///
/// Without a client the helper is disabled and every flush is a no-op.
#[derive(Clone, Default)]
pub struct CdnCache {
    client: Option<Arc<dyn PurgeClient>>,
}

impl fmt::Debug for CdnCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnCache")
            .field("root_url", &self.client.as_ref().map(|c| c.root_url()))
            .finish()
    }
}

impl CdnCache {
    pub fn new(client: Option<Arc<dyn PurgeClient>>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Issues one purge per record that has a relative URL.
    ///
    /// Each returned handle resolves to the record it was issued for, so
    /// callers can tell which purges completed without tracking order.
    /// Handles come back in the same order as the eligible records. Records
    /// with an empty relative URL are left out.
    pub fn flush<R>(&self, records: &[R]) -> Vec<ResultHandle<R>>
    where
        R: CdnRecord + Clone + Send + Sync + 'static,
    {
        let Some(client) = &self.client else {
            info!("CDN cache flush is not enabled.");
            return Vec::new();
        };

        records
            .iter()
            .filter(|record| !record.relative_url().is_empty())
            .map(|record| purge_record(client.as_ref(), record))
            .collect()
    }
}

fn purge_record<R>(client: &dyn PurgeClient, record: &R) -> ResultHandle<R>
where
    R: CdnRecord + Clone + Send + Sync + 'static,
{
    let urls: Vec<String> = record
        .mutable_urls()
        .iter()
        .map(|path| join_url(&[client.root_url(), record.relative_url(), path.as_str()]))
        .collect();

    debug!("Flush: {:?}", urls);
    let record = record.clone();
    client.purge_by_url(urls).map(move |_receipt| record)
}

/// Options configuring CDN purges.
#[derive(Debug, Clone, Default, Args)]
pub struct FastPurgeArgs {
    /// Root URL of CDN for all paths to be flushed
    #[arg(long = "fastpurge-root-url", env = "FASTPURGE_ROOT_URL", value_name = "URL")]
    pub fastpurge_root_url: Option<String>,
}

impl ArgContributor for FastPurgeArgs {
    fn add_args(&self, command: Command) -> Command {
        <Self as Args>::augment_args(command)
    }
}

/// CDN purge settings read from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPurgeSettings {
    pub root_url: String,
}

impl FastPurgeSettings {
    /// Returns `None` when no root URL was configured, which disables
    /// CDN flushing.
    pub fn from_matches(matches: &ArgMatches) -> Option<Self> {
        let args = FastPurgeArgs::from_arg_matches(matches).ok()?;
        args.fastpurge_root_url
            .as_deref()
            .map(str::trim)
            .filter(|root| !root.is_empty())
            .map(|root| Self {
                root_url: root.to_string(),
            })
    }
}

/// Purge client that only logs what it would invalidate.
///
/// Every request resolves immediately with a synthetic receipt.
#[derive(Debug, Clone)]
pub struct DryRunPurgeClient {
    root_url: String,
    issued: Arc<AtomicU64>,
}

impl DryRunPurgeClient {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of purge requests issued so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl PurgeClient for DryRunPurgeClient {
    fn root_url(&self) -> &str {
        &self.root_url
    }

    fn purge_by_url(&self, urls: Vec<String>) -> ResultHandle<PurgeReceipt> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        info!(urls = urls.len(), "Would purge: {}", urls.join(", "));
        ResultHandle::ready(Ok(PurgeReceipt {
            purge_id: format!("dry-run-{}", n),
            estimated_seconds: 0,
        }))
    }
}
