use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use sha2::{Digest, Sha512};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::model::{InstallPhase, InstallProgress, ProgressFn};

const DOWNLOAD_RETRIES: u32 = 3;

/// Streaming downloader for runtime archives and their checksum files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Stream `url` into `output_path`, reporting bytes as they arrive.
    /// Returns the lowercase hex SHA-512 of what was written.
    pub async fn download(
        &self,
        url: &str,
        output_path: &Path,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> LauncherResult<String> {
        let response = get_with_retry(&self.client, url, DOWNLOAD_RETRIES).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(output_path)
            .await
            .map_err(|source| LauncherError::io(output_path, source))?;

        let mut hasher = Sha512::new();
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;

            file.write_all(&chunk)
                .await
                .map_err(|source| LauncherError::io(output_path, source))?;
            hasher.update(&chunk);

            downloaded = downloaded.saturating_add(chunk.len() as u64);
            progress(InstallProgress {
                phase: InstallPhase::Downloading,
                done_bytes: downloaded,
                total_bytes: total.max(downloaded),
            });
        }

        file.flush()
            .await
            .map_err(|source| LauncherError::io(output_path, source))?;

        info!("Downloaded {} bytes from {}", downloaded, url);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Fetch a small text resource such as a `.sha512sum` file.
    pub async fn fetch_text(&self, url: &str) -> LauncherResult<String> {
        let response = get_with_retry(&self.client, url, DOWNLOAD_RETRIES).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Pull the digest out of a `sha512sum`-style file (`<hex>  <name>`).
/// With several lines, the one naming `file_name` wins.
pub fn parse_checksum(body: &str, file_name: &str) -> Option<String> {
    let mut fallback = None;
    for line in body.lines() {
        let mut parts = line.split_whitespace();
        let Some(digest) = parts.next() else {
            continue;
        };
        if digest.len() != 128 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            continue;
        }
        let named = parts
            .next()
            .map(|name| name.trim_start_matches('*'))
            .map(|name| name.rsplit('/').next().unwrap_or(name));
        if named == Some(file_name) {
            return Some(digest.to_ascii_lowercase());
        }
        fallback.get_or_insert_with(|| digest.to_ascii_lowercase());
    }
    fallback
}

pub fn verify_digest(path: &Path, expected: &str, actual: &str) -> LauncherResult<()> {
    if expected.eq_ignore_ascii_case(actual) {
        debug!("SHA-512 verified for {:?}", path);
        return Ok(());
    }
    Err(LauncherError::ChecksumMismatch {
        path: path.to_path_buf(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
    retries: u32,
) -> LauncherResult<reqwest::Response> {
    let mut last_error: Option<reqwest::Error> = None;
    for attempt in 0..=retries {
        match client.get(url).send().await {
            Ok(response) => return Ok(response),
            Err(err) => {
                warn!("Request to {} failed (attempt {}): {}", url, attempt + 1, err);
                last_error = Some(err);
                if attempt < retries {
                    let backoff_ms = 2_u64.pow(attempt + 1) * 250;
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    match last_error {
        Some(err) if err.is_connect() || err.is_timeout() => {
            Err(LauncherError::NetworkUnavailable(url.to_string()))
        }
        Some(err) => Err(err.into()),
        None => Err(LauncherError::Other(format!("failed request to {url}"))),
    }
}
