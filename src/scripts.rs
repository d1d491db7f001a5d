use std::path::Path;

use scewin_consts::consts;
use scewin_utils::{FetchError, Fetcher};
use url::Url;

/// File name a script URL is saved under.
fn script_file_name(url: &Url) -> &str {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .expect("script url has no file name")
}

/// Download the export/import automation scripts into `dest_dir`. Each
/// script is retried independently; scripts already persisted are kept even
/// when a later one fails for good.
pub async fn download_scripts(fetcher: &Fetcher, dest_dir: &Path) -> Result<(), FetchError> {
    for url in consts::SCRIPT_URLS.iter() {
        let dest = dest_dir.join(script_file_name(url));
        fetcher.fetch_and_save(url.as_str(), &dest).await?;
    }

    Ok(())
}
