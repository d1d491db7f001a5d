use std::path::Path;

/// Build a [`tempfile::NamedTempFile`] in the same directory as `path`, using
/// the original filename as the prefix so the temp file is easily identifiable
/// (e.g. `.MSI-Center.zip.XXXXXX`).
fn temp_file_for(path: &Path) -> std::io::Result<tempfile::NamedTempFile> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let prefix = format!(
        ".{}.",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp")
    );

    tempfile::Builder::new().prefix(&prefix).tempfile_in(dir)
}

/// Atomically write contents to a file by first writing to a temporary file in
/// the same directory and then renaming it to the target path.
///
/// The target path never holds a partially-written body: a failed write
/// leaves only the temp file, which is cleaned up on drop.
pub async fn atomic_write(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    // Create a temp file in the same directory to ensure it's on the same
    // filesystem, which is required for atomic rename.
    let temp_file = temp_file_for(path)?;
    let temp_path = temp_file.into_temp_path();

    tokio::fs::write(&temp_path, contents).await?;

    temp_path.persist(path).map_err(|e| e.error)?;

    Ok(())
}
