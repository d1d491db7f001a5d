use std::path::{Path, PathBuf};

use scewin_consts::consts;
use scewin_utils::{FetchError, Fetcher};
use thiserror::Error;

use crate::extract::{self, ExtractError};

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("failed to download the unpack tool")]
    Fetch(#[from] FetchError),

    #[error("release metadata from {url} could not be decoded")]
    Metadata {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("the latest release has no asset matching `*{suffix}`")]
    AssetNotFound { suffix: &'static str },

    #[error("failed to unpack the tool archive")]
    Extract(#[from] ExtractError),
}

/// Response from the Github API when fetching the latest release.
// https://docs.github.com/en/rest/releases/releases?apiVersion=2022-11-28#get-the-latest-release
#[derive(Debug, serde::Deserialize)]
struct ReleaseResponse {
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, serde::Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

fn platform_asset_suffix() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows.zip"
    } else {
        "linux.zip"
    }
}

fn tool_binary_name() -> String {
    format!("{}{}", consts::UNPACK_TOOL, std::env::consts::EXE_SUFFIX)
}

/// Make sure `innoextract` is runnable, downloading the latest release into
/// `output_dir` when it is not already on `PATH`. Returns the path to invoke.
pub async fn ensure_available(
    fetcher: &Fetcher,
    output_dir: &Path,
) -> Result<PathBuf, AcquireError> {
    if let Ok(tool) = which::which(consts::UNPACK_TOOL) {
        tracing::debug!("found {} at {}", consts::UNPACK_TOOL, tool.display());
        return Ok(tool);
    }

    download_unpack_tool(fetcher, output_dir).await
}

async fn download_unpack_tool(
    fetcher: &Fetcher,
    output_dir: &Path,
) -> Result<PathBuf, AcquireError> {
    tracing::info!(
        "{} not found on PATH, fetching the latest release",
        consts::UNPACK_TOOL
    );

    let metadata = fetcher.fetch(consts::UNPACK_TOOL_RELEASES_URL).await?;
    let release: ReleaseResponse =
        serde_json::from_slice(&metadata).map_err(|source| AcquireError::Metadata {
            url: consts::UNPACK_TOOL_RELEASES_URL.to_string(),
            source,
        })?;

    let suffix = platform_asset_suffix();
    let asset = select_asset(&release, suffix).ok_or(AcquireError::AssetNotFound { suffix })?;

    let archive_path = std::env::temp_dir().join(&asset.name);
    fetcher
        .fetch_and_save(&asset.browser_download_url, &archive_path)
        .await?;

    let member = tool_binary_name();
    let tool = extract::extract_zip_member(&archive_path, &member, output_dir)?;
    tracing::info!("installed {} to {}", member, output_dir.display());

    Ok(tool)
}

fn select_asset<'a>(release: &'a ReleaseResponse, suffix: &str) -> Option<&'a ReleaseAsset> {
    release
        .assets
        .iter()
        .find(|asset| asset.name.ends_with(suffix))
}
