use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
};

use fs_err as fs;
use thiserror::Error;
use wax::Glob;
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive {archive} does not contain member `{member}`")]
    MemberNotFound { archive: PathBuf, member: String },

    #[error("archive {archive} could not be read")]
    ArchiveCorrupt {
        archive: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("failed to write extracted data under {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Extract exactly one named member from a zip archive into `dest_dir`,
/// preserving the member's path. Returns the path the member was written to.
pub fn extract_zip_member(
    archive: &Path,
    member: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ExtractError> {
    let file = fs::File::open(archive).map_err(|source| ExtractError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut container =
        zip::ZipArchive::new(file).map_err(|source| ExtractError::ArchiveCorrupt {
            archive: archive.to_path_buf(),
            source,
        })?;

    let mut entry = match container.by_name(member) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(ExtractError::MemberNotFound {
                archive: archive.to_path_buf(),
                member: member.to_string(),
            });
        }
        Err(source) => {
            return Err(ExtractError::ArchiveCorrupt {
                archive: archive.to_path_buf(),
                source,
            });
        }
    };

    let dest = dest_dir.join(member);
    let io_err = |source| ExtractError::Io {
        path: dest_dir.join(member),
        source,
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut out = fs::File::create(&dest).map_err(io_err)?;
    std::io::copy(&mut entry, &mut out).map_err(io_err)?;

    Ok(dest)
}

/// Extract every member of a zip archive into `dest_dir`.
pub fn extract_zip_all(archive: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = fs::File::open(archive).map_err(|source| ExtractError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut container =
        zip::ZipArchive::new(file).map_err(|source| ExtractError::ArchiveCorrupt {
            archive: archive.to_path_buf(),
            source,
        })?;

    container.extract(dest_dir).map_err(|err| match err {
        ZipError::Io(source) => ExtractError::Io {
            path: dest_dir.to_path_buf(),
            source,
        },
        source => ExtractError::ArchiveCorrupt {
            archive: archive.to_path_buf(),
            source,
        },
    })
}

/// Run the external unpack tool on an installer.
///
/// The tool reports warnings through its exit code even when it produced a
/// usable layout, so a non-zero status is only logged; the caller's
/// existence check on the expected output is the authoritative signal.
pub fn run_unpack_tool(tool: &Path, input: &Path, dest_dir: &Path) -> std::io::Result<ExitStatus> {
    tracing::info!("unpacking {} with {}", input.display(), tool.display());

    let status = std::process::Command::new(tool)
        .arg(input)
        .arg("--output-dir")
        .arg(dest_dir)
        .status()?;

    if !status.success() {
        tracing::warn!(
            "{} exited with {status} for {}",
            tool.display(),
            input.display()
        );
    }

    Ok(status)
}

/// Find the files directly under `dir` matching a glob pattern. Multiple
/// matches are resolved deterministically by taking the lexicographically
/// first; a missing or unreadable directory yields no matches, like an
/// empty glob expansion.
pub fn find_first_match(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let glob = Glob::new(pattern).expect("invalid glob pattern");

    let mut matches: Vec<PathBuf> = glob
        .walk(dir)
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();

    matches.into_iter().next()
}

/// The lexicographically first direct subdirectory of `dir`, if any.
pub fn first_subdirectory(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    dirs.into_iter().next()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;

    pub(crate) fn write_test_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);

        for (name, data) in members {
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_named_member() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_test_zip(&archive, &[("MSI%20Center_2.0.0_x64.appx", b"appx")]);

        let dest =
            extract_zip_member(&archive, "MSI%20Center_2.0.0_x64.appx", dir.path()).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"appx");
    }

    #[test]
    fn extracts_nested_member_at_its_member_path() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.appx");
        write_test_zip(&archive, &[("DCv2/Package/MSI%20Center%20SDK.exe", b"sdk")]);

        let dest = extract_zip_member(
            &archive,
            "DCv2/Package/MSI%20Center%20SDK.exe",
            dir.path(),
        )
        .unwrap();

        assert!(dest.ends_with("DCv2/Package/MSI%20Center%20SDK.exe"));
        assert_eq!(fs::read(&dest).unwrap(), b"sdk");
    }

    #[test]
    fn missing_member_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_test_zip(&archive, &[("present.txt", b"x")]);

        let err = extract_zip_member(&archive, "absent.txt", dir.path()).unwrap_err();

        assert!(matches!(err, ExtractError::MemberNotFound { .. }));
    }

    #[test]
    fn garbage_container_is_reported_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = extract_zip_member(&archive, "anything", dir.path()).unwrap_err();

        assert!(matches!(err, ExtractError::ArchiveCorrupt { .. }));
    }

    #[test]
    fn extracts_all_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("MSI-Center.zip");
        write_test_zip(
            &archive,
            &[("MSI Center_2.0.0.exe", b"installer"), ("readme.txt", b"hi")],
        );
        let dest = dir.path().join("MSI-Center");
        fs::create_dir_all(&dest).unwrap();

        extract_zip_all(&archive, &dest).unwrap();

        assert!(dest.join("MSI Center_2.0.0.exe").exists());
        assert!(dest.join("readme.txt").exists());
    }

    #[test]
    fn glob_picks_lexicographically_first_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("MSI Center_2.0.1.exe"), b"").unwrap();
        fs::write(dir.path().join("MSI Center_2.0.0.exe"), b"").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"").unwrap();

        let found = find_first_match(dir.path(), "MSI Center_*.exe").unwrap();

        assert!(found.ends_with("MSI Center_2.0.0.exe"));
    }

    #[test]
    fn glob_with_no_match_is_none() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(find_first_match(dir.path(), "Engine Lib_*.exe"), None);
        assert_eq!(
            find_first_match(&dir.path().join("no-such-dir"), "*.appxbundle"),
            None
        );
    }

    #[test]
    fn first_subdirectory_ignores_files_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("5.05.01.0004")).unwrap();
        fs::create_dir_all(dir.path().join("5.05.01.0002")).unwrap();
        fs::write(dir.path().join("5.00-notes.txt"), b"").unwrap();

        let found = first_subdirectory(dir.path()).unwrap();

        assert!(found.ends_with("5.05.01.0002"));
        assert_eq!(first_subdirectory(&dir.path().join("missing")), None);
    }
}
