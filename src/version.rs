use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("could not determine a version from installer name `{file_name}`")]
    NotFound { file_name: String },
}

/// Extract the version embedded in an installer file name: the dot-and-digit
/// run between the last underscore and the `.exe` extension
/// (`MSI Center_2.0.14.exe` -> `2.0.14`).
pub fn resolve(file_name: &str) -> Result<String, VersionError> {
    let pattern = regex::Regex::new(r"_([\d.]+)\.exe$").expect("invalid version pattern");

    pattern
        .captures(file_name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| VersionError::NotFound {
            file_name: file_name.to_string(),
        })
}
