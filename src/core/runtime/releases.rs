use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::sort_newest_first;

use super::model::{ReleaseDescriptor, RuntimeChannel, VENDOR_TAG_PREFIX};

const GITHUB_API_BASE: &str = "https://api.github.com";
const VENDOR_REPOSITORY: &str = "GloriousEggroll/proton-ge-custom";
const OFFICIAL_REPOSITORY: &str = "ValveSoftware/Proton";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A release as published upstream, before channel filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelease {
    pub tag: String,
    pub assets: Vec<RemoteAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub name: String,
    pub download_url: String,
}

/// Backend that lists the releases of a repository (`owner/name`).
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_releases(&self, repository: &str) -> LauncherResult<Vec<RemoteRelease>>;
}

// ── GitHub ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

/// `GET /repos/{owner}/{repo}/releases` on the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubReleaseSource {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl GithubReleaseSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn fetch_releases(&self, repository: &str) -> LauncherResult<Vec<RemoteRelease>> {
        let url = format!("{}/repos/{}/releases", self.api_base, repository);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    LauncherError::NetworkUnavailable(url.clone())
                } else {
                    err.into()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let releases: Vec<GithubRelease> = response.json().await?;
        Ok(releases
            .into_iter()
            .map(|release| RemoteRelease {
                tag: release.tag_name,
                assets: release
                    .assets
                    .into_iter()
                    .map(|asset| RemoteAsset {
                        name: asset.name,
                        download_url: asset.browser_download_url,
                    })
                    .collect(),
            })
            .collect())
    }
}

// ── Resolver ────────────────────────────────────────────

/// How often and how patiently a listing is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    releases: Arc<Vec<ReleaseDescriptor>>,
}

/// Lists remote releases per channel behind a time-boxed cache.
///
/// Only successful listings are cached. A listing that keeps failing comes
/// back empty and is retried on the next call; network trouble never
/// surfaces as an error here.
pub struct ReleaseResolver {
    source: Arc<dyn ReleaseSource>,
    ttl: Duration,
    retry: RetryPolicy,
    cache: RwLock<HashMap<RuntimeChannel, CacheEntry>>,
}

impl ReleaseResolver {
    pub fn new(source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            source,
            ttl: DEFAULT_CACHE_TTL,
            retry: RetryPolicy::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Releases of `channel`, newest first.
    #[instrument(skip(self))]
    pub async fn list_available(&self, channel: RuntimeChannel) -> Arc<Vec<ReleaseDescriptor>> {
        if let Some(cached) = self.cached(channel).await {
            debug!("Release cache hit for {}", channel);
            return cached;
        }

        let Some(releases) = self.fetch_channel(channel).await else {
            return Arc::new(Vec::new());
        };

        let releases = Arc::new(releases);
        self.cache.write().await.insert(
            channel,
            CacheEntry {
                fetched_at: Instant::now(),
                releases: releases.clone(),
            },
        );
        releases
    }

    /// Descriptor for one tag of a channel.
    pub async fn find_release(
        &self,
        channel: RuntimeChannel,
        tag: &str,
    ) -> LauncherResult<ReleaseDescriptor> {
        self.list_available(channel)
            .await
            .iter()
            .find(|release| release.tag == tag)
            .cloned()
            .ok_or_else(|| LauncherError::ReleaseNotFound {
                tag: tag.to_string(),
            })
    }

    /// Drop every cached listing.
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }

    async fn cached(&self, channel: RuntimeChannel) -> Option<Arc<Vec<ReleaseDescriptor>>> {
        let cache = self.cache.read().await;
        let entry = cache.get(&channel)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.releases.clone())
        } else {
            None
        }
    }

    /// `None` when every attempt failed.
    async fn fetch_channel(&self, channel: RuntimeChannel) -> Option<Vec<ReleaseDescriptor>> {
        let Some(repository) = repository_for(channel) else {
            return Some(Vec::new());
        };

        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.source.fetch_releases(repository).await {
                Ok(releases) => {
                    let mut descriptors = filter_channel(channel, releases);
                    sort_newest_first(&mut descriptors, |d| d.tag.as_str());
                    info!("Fetched {} {} releases", descriptors.len(), channel);
                    return Some(descriptors);
                }
                Err(err) => {
                    warn!(
                        "Fetching {} releases failed (attempt {}/{}): {}",
                        channel, attempt, attempts, err
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        warn!("Failed to fetch {} releases after retries, returning empty list", channel);
        None
    }
}

fn repository_for(channel: RuntimeChannel) -> Option<&'static str> {
    match channel {
        RuntimeChannel::VendorCurated => Some(VENDOR_REPOSITORY),
        RuntimeChannel::OfficialStable | RuntimeChannel::OfficialExperimental => {
            Some(OFFICIAL_REPOSITORY)
        }
        RuntimeChannel::Custom => None,
    }
}

fn is_experimental_tag(tag: &str) -> bool {
    let lower = tag.to_lowercase();
    lower.contains("experimental") || lower.contains("hotfix")
}

/// Keep the releases belonging to `channel` that ship an installable tarball.
fn filter_channel(channel: RuntimeChannel, releases: Vec<RemoteRelease>) -> Vec<ReleaseDescriptor> {
    releases
        .into_iter()
        .filter(|release| match channel {
            RuntimeChannel::VendorCurated => release.tag.starts_with(VENDOR_TAG_PREFIX),
            RuntimeChannel::OfficialStable => !is_experimental_tag(&release.tag),
            RuntimeChannel::OfficialExperimental => is_experimental_tag(&release.tag),
            RuntimeChannel::Custom => false,
        })
        .filter_map(|release| {
            let tarball = release
                .assets
                .iter()
                .find(|asset| asset.name.ends_with(".tar.gz"))?;
            let checksum = release
                .assets
                .iter()
                .find(|asset| asset.name.ends_with(".sha512sum"));
            Some(ReleaseDescriptor {
                tag: release.tag.clone(),
                channel,
                download_url: tarball.download_url.clone(),
                checksum_url: checksum.map(|asset| asset.download_url.clone()),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that counts calls and fails its first
    /// `failures_left` calls.
    pub(crate) struct FakeSource {
        pub calls: AtomicUsize,
        pub failures_left: AtomicUsize,
        pub releases: HashMap<&'static str, Vec<RemoteRelease>>,
    }

    impl FakeSource {
        pub(crate) fn with_releases(releases: HashMap<&'static str, Vec<RemoteRelease>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                releases,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(usize::MAX),
                releases: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSource {
        async fn fetch_releases(&self, repository: &str) -> LauncherResult<Vec<RemoteRelease>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(LauncherError::NetworkUnavailable(repository.to_string()));
            }
            Ok(self.releases.get(repository).cloned().unwrap_or_default())
        }
    }

    pub(crate) fn release(tag: &str) -> RemoteRelease {
        RemoteRelease {
            tag: tag.to_string(),
            assets: vec![
                RemoteAsset {
                    name: format!("{tag}.tar.gz"),
                    download_url: format!("https://example.invalid/{tag}.tar.gz"),
                },
                RemoteAsset {
                    name: format!("{tag}.sha512sum"),
                    download_url: format!("https://example.invalid/{tag}.sha512sum"),
                },
            ],
        }
    }

    pub(crate) fn ge_source(tags: &[&str]) -> FakeSource {
        let mut releases = HashMap::new();
        releases.insert(
            VENDOR_REPOSITORY,
            tags.iter().map(|tag| release(tag)).collect(),
        );
        FakeSource::with_releases(releases)
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn lists_vendor_releases_newest_first() {
        let source = Arc::new(ge_source(&["GE-Proton9-7", "GE-Proton9-10", "GE-Proton8-32"]));
        let resolver = ReleaseResolver::new(source).with_retry(quick_retry());

        let tags: Vec<String> = resolver
            .list_available(RuntimeChannel::VendorCurated)
            .await
            .iter()
            .map(|d| d.tag.clone())
            .collect();
        assert_eq!(tags, vec!["GE-Proton9-10", "GE-Proton9-7", "GE-Proton8-32"]);
    }

    #[tokio::test]
    async fn cache_hit_avoids_refetch() {
        let source = Arc::new(ge_source(&["GE-Proton9-7"]));
        let resolver = ReleaseResolver::new(source.clone()).with_retry(quick_retry());

        resolver.list_available(RuntimeChannel::VendorCurated).await;
        resolver.list_available(RuntimeChannel::VendorCurated).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_cache_refetches() {
        let source = Arc::new(ge_source(&["GE-Proton9-7"]));
        let resolver = ReleaseResolver::new(source.clone())
            .with_retry(quick_retry())
            .with_ttl(Duration::ZERO);

        resolver.list_available(RuntimeChannel::VendorCurated).await;
        resolver.list_available(RuntimeChannel::VendorCurated).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_bounded_and_not_cached() {
        let source = Arc::new(FakeSource::failing());
        let resolver = ReleaseResolver::new(source.clone()).with_retry(quick_retry());

        let first = resolver.list_available(RuntimeChannel::OfficialStable).await;
        assert!(first.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        let second = resolver.list_available(RuntimeChannel::OfficialStable).await;
        assert!(second.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn recovered_network_is_seen_on_next_call() {
        let source = Arc::new(ge_source(&["GE-Proton9-7"]));
        source.failures_left.store(3, Ordering::SeqCst);
        let resolver = ReleaseResolver::new(source.clone()).with_retry(quick_retry());

        let offline = resolver.list_available(RuntimeChannel::VendorCurated).await;
        assert!(offline.is_empty());

        let after = resolver.list_available(RuntimeChannel::VendorCurated).await;
        assert_eq!(after.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);

        resolver.list_available(RuntimeChannel::VendorCurated).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn official_releases_split_by_tag() {
        let mut releases = HashMap::new();
        releases.insert(
            OFFICIAL_REPOSITORY,
            vec![
                release("proton-9.0-4"),
                release("experimental-9.0-20240601"),
                release("proton-8.0-5-hotfix"),
                RemoteRelease {
                    tag: "proton-9.0-3".into(),
                    assets: Vec::new(),
                },
            ],
        );
        let resolver = ReleaseResolver::new(Arc::new(FakeSource::with_releases(releases)))
            .with_retry(quick_retry());

        let stable = resolver.list_available(RuntimeChannel::OfficialStable).await;
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].tag, "proton-9.0-4");
        assert!(stable[0].checksum_url.is_some());

        let experimental = resolver
            .list_available(RuntimeChannel::OfficialExperimental)
            .await;
        let tags: Vec<&str> = experimental.iter().map(|d| d.tag.as_str()).collect();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&"experimental-9.0-20240601"));
        assert!(tags.contains(&"proton-8.0-5-hotfix"));
    }

    #[tokio::test]
    async fn custom_channel_has_no_remote() {
        let source = Arc::new(ge_source(&["GE-Proton9-7"]));
        let resolver = ReleaseResolver::new(source.clone());

        assert!(resolver.list_available(RuntimeChannel::Custom).await.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn find_release_and_invalidate() {
        let source = Arc::new(ge_source(&["GE-Proton9-7"]));
        let resolver = ReleaseResolver::new(source.clone()).with_retry(quick_retry());

        let found = resolver
            .find_release(RuntimeChannel::VendorCurated, "GE-Proton9-7")
            .await
            .unwrap();
        assert!(found.download_url.ends_with("GE-Proton9-7.tar.gz"));
        assert!(matches!(
            resolver
                .find_release(RuntimeChannel::VendorCurated, "GE-Proton1-1")
                .await,
            Err(LauncherError::ReleaseNotFound { .. })
        ));

        resolver.invalidate().await;
        resolver.list_available(RuntimeChannel::VendorCurated).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parses_github_payload() {
        let payload = r#"[{"tag_name":"GE-Proton9-7","assets":[
            {"name":"GE-Proton9-7.tar.gz","browser_download_url":"https://github.com/x/GE-Proton9-7.tar.gz","size":1}
        ]}]"#;
        let parsed: Vec<GithubRelease> = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed[0].tag_name, "GE-Proton9-7");
        assert_eq!(parsed[0].assets[0].name, "GE-Proton9-7.tar.gz");
    }
}
