use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::model::RuntimeChannel;
use super::releases::ReleaseResolver;

/// A newer head release for an installed runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableUpdate {
    pub channel: RuntimeChannel,
    pub version: String,
}

/// Compares installed runtimes against the resolver's cached head release.
#[derive(Clone)]
pub struct UpdateChecker {
    resolver: Arc<ReleaseResolver>,
}

impl UpdateChecker {
    pub fn new(resolver: Arc<ReleaseResolver>) -> Self {
        Self { resolver }
    }

    /// The channel's head tag, when it differs from `installed_version`.
    ///
    /// Any difference counts, including a head that sorts older than the
    /// installed build.
    pub async fn check_update(
        &self,
        installed_version: &str,
        channel: RuntimeChannel,
    ) -> Option<AvailableUpdate> {
        let releases = self.resolver.list_available(channel).await;
        let head = releases.first()?;
        if head.tag == installed_version {
            return None;
        }

        info!("Update available for {}: {}", installed_version, head.tag);
        Some(AvailableUpdate {
            channel,
            version: head.tag.clone(),
        })
    }
}
