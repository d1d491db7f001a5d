use std::path::{Path, PathBuf};

use fs_err as fs;
use indexmap::IndexMap;
use scewin_consts::consts;
use scewin_utils::{FetchError, Fetcher};
use thiserror::Error;

use crate::{
    acquire::{self, AcquireError},
    extract::{self, ExtractError},
    scripts,
    version::{self, VersionError},
};

/// The strictly ordered pipeline stages. Stages never retry and never
/// resume; the run aborts on the first failure, naming the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    EnsureTool,
    FetchPackage,
    ExtractInstaller,
    ResolveVersion,
    UnpackInstaller,
    ExtractBundleMember,
    ExtractSdkMember,
    UnpackSdk,
    LocateEngineInstaller,
    UnpackEngine,
    LocateFinalUtility,
    CleanResiduals,
    FetchAuxiliaryScripts,
    RelocateIfAbsent,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage}: no artifact matching `{pattern}` under {}", dir.display())]
    ArtifactNotFound {
        stage: Stage,
        pattern: String,
        dir: PathBuf,
    },

    #[error("stage {stage}: expected input {} is missing", path.display())]
    MissingInput { stage: Stage, path: PathBuf },

    #[error("stage {stage}: the package version has not been resolved")]
    VersionUnresolved { stage: Stage },

    #[error("stage {stage}: download failed")]
    Fetch {
        stage: Stage,
        #[source]
        source: FetchError,
    },

    #[error("stage {stage}: extraction failed")]
    Extract {
        stage: Stage,
        #[source]
        source: ExtractError,
    },

    #[error("stage {stage}: {source}")]
    Version {
        stage: Stage,
        #[source]
        source: VersionError,
    },

    #[error("stage ensure-tool: the unpack tool is unavailable")]
    Acquire(#[from] AcquireError),

    #[error("stage {stage}: io failure on {}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stage relocate-if-absent: failed to move {} into {}", from.display(), to.display())]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: fs_extra::error::Error,
    },
}

/// Working state threaded through the pipeline. Mutated additively by each
/// successful stage; never rolled back, since any failure aborts the run.
pub struct PipelineContext {
    pub temp_root: PathBuf,
    pub extract_root: PathBuf,
    pub version: Option<String>,
    resolved: IndexMap<Stage, PathBuf>,
}

impl PipelineContext {
    pub fn new(temp_root: PathBuf) -> Self {
        let extract_root = temp_root.join(consts::EXTRACT_DIR_NAME);
        Self {
            temp_root,
            extract_root,
            version: None,
            resolved: IndexMap::new(),
        }
    }

    fn record(&mut self, stage: Stage, path: PathBuf) {
        tracing::debug!("stage {stage}: resolved {}", path.display());
        self.resolved.insert(stage, path);
    }

    /// The artifact a prior stage resolved. A stage must not start until its
    /// inputs are recorded and still present on disk; leftovers from a prior
    /// run under the shared temp dir are never trusted without this check.
    fn require(&self, stage: Stage) -> Result<PathBuf, PipelineError> {
        match self.resolved.get(&stage) {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(PipelineError::MissingInput {
                stage,
                path: path.clone(),
            }),
            None => Err(PipelineError::MissingInput {
                stage,
                path: self.temp_root.clone(),
            }),
        }
    }

    fn require_version(&self, stage: Stage) -> Result<&str, PipelineError> {
        self.version
            .as_deref()
            .ok_or(PipelineError::VersionUnresolved { stage })
    }
}

/// Run the full fetch-and-unpack pipeline, leaving the utility directory
/// in `work_dir` and returning its path.
pub async fn run(fetcher: &Fetcher, work_dir: &Path) -> Result<PathBuf, PipelineError> {
    let mut ctx = PipelineContext::new(std::env::temp_dir());

    let tool = acquire::ensure_available(fetcher, work_dir).await?;
    ctx.record(Stage::EnsureTool, tool);

    fetch_package(fetcher, &mut ctx).await?;
    extract_installer(&mut ctx)?;
    resolve_version(&mut ctx)?;
    run_tool_stage(&ctx, Stage::UnpackInstaller, Stage::ExtractInstaller)?;
    extract_bundle_member(&mut ctx)?;
    extract_sdk_member(&mut ctx)?;
    run_tool_stage(&ctx, Stage::UnpackSdk, Stage::ExtractSdkMember)?;
    locate_engine_installer(&mut ctx)?;
    run_tool_stage(&ctx, Stage::UnpackEngine, Stage::LocateEngineInstaller)?;
    let utility_dir = locate_final_utility(&mut ctx)?;

    clean_residuals(&utility_dir)?;

    scripts::download_scripts(fetcher, &utility_dir)
        .await
        .map_err(|source| PipelineError::Fetch {
            stage: Stage::FetchAuxiliaryScripts,
            source,
        })?;

    relocate_if_absent(&utility_lib_root(&ctx), work_dir)
}

async fn fetch_package(fetcher: &Fetcher, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    let stage = Stage::FetchPackage;
    let dest = ctx.temp_root.join(consts::PACKAGE_ARCHIVE_NAME);

    fetcher
        .fetch_and_save(consts::PACKAGE_URL, &dest)
        .await
        .map_err(|source| PipelineError::Fetch { stage, source })?;

    ctx.record(stage, dest);
    Ok(())
}

fn extract_installer(ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    let stage = Stage::ExtractInstaller;
    let package = ctx.require(Stage::FetchPackage)?;

    fs::create_dir_all(&ctx.extract_root).map_err(|source| PipelineError::Io {
        stage,
        path: ctx.extract_root.clone(),
        source,
    })?;
    extract::extract_zip_all(&package, &ctx.extract_root)
        .map_err(|source| PipelineError::Extract { stage, source })?;

    let installer = find_artifact(stage, &ctx.extract_root, consts::INSTALLER_GLOB)?;
    ctx.record(stage, installer);
    Ok(())
}

fn resolve_version(ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    let stage = Stage::ResolveVersion;
    let installer = ctx.require(Stage::ExtractInstaller)?;

    let file_name = installer
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let version =
        version::resolve(&file_name).map_err(|source| PipelineError::Version { stage, source })?;

    tracing::info!("resolved MSI Center version {version}");
    ctx.version = Some(version);
    Ok(())
}

/// Invoke the unpack tool on the artifact `input_stage` resolved. The exit
/// status is advisory; the next stage's lookup decides whether the unpack
/// actually worked.
fn run_tool_stage(
    ctx: &PipelineContext,
    stage: Stage,
    input_stage: Stage,
) -> Result<(), PipelineError> {
    let tool = ctx.require(Stage::EnsureTool)?;
    let input = ctx.require(input_stage)?;

    extract::run_unpack_tool(&tool, &input, &ctx.extract_root).map_err(|source| {
        PipelineError::Io {
            stage,
            path: input.clone(),
            source,
        }
    })?;
    Ok(())
}

fn extract_bundle_member(ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    let stage = Stage::ExtractBundleMember;
    let bundle_dir = ctx.extract_root.join(consts::BUNDLE_DIR);
    let bundle = find_artifact(stage, &bundle_dir, consts::BUNDLE_GLOB)?;
    let member = consts::appx_member_name(ctx.require_version(stage)?);

    let appx = extract::extract_zip_member(&bundle, &member, &ctx.extract_root)
        .map_err(|source| PipelineError::Extract { stage, source })?;

    ctx.record(stage, appx);
    Ok(())
}

fn extract_sdk_member(ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    let stage = Stage::ExtractSdkMember;
    let appx = ctx.require(Stage::ExtractBundleMember)?;

    let sdk = extract::extract_zip_member(&appx, consts::SDK_MEMBER_PATH, &ctx.extract_root)
        .map_err(|source| PipelineError::Extract { stage, source })?;

    ctx.record(stage, sdk);
    Ok(())
}

fn locate_engine_installer(ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    let stage = Stage::LocateEngineInstaller;
    let prepackage = consts::PREPACKAGE_DIR
        .iter()
        .fold(ctx.extract_root.clone(), |path, segment| path.join(segment));

    let engine = find_artifact(stage, &prepackage, consts::ENGINE_INSTALLER_GLOB)?;
    ctx.record(stage, engine);
    Ok(())
}

fn locate_final_utility(ctx: &mut PipelineContext) -> Result<PathBuf, PipelineError> {
    let stage = Stage::LocateFinalUtility;
    let lib_root = utility_lib_root(ctx);

    let version_dir =
        extract::first_subdirectory(&lib_root).ok_or_else(|| PipelineError::ArtifactNotFound {
            stage,
            pattern: "*/".to_string(),
            dir: lib_root.clone(),
        })?;

    ctx.record(stage, version_dir.clone());
    Ok(version_dir)
}

fn utility_lib_root(ctx: &PipelineContext) -> PathBuf {
    consts::UTILITY_LIB_PATH
        .iter()
        .fold(ctx.extract_root.clone(), |path, segment| path.join(segment))
}

/// Remove known vendor leftovers from the utility directory. Absence of any
/// individual file is expected, not an error.
fn clean_residuals(dir: &Path) -> Result<(), PipelineError> {
    for name in consts::RESIDUAL_FILES {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => tracing::debug!("removed residual {name}"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PipelineError::Io {
                    stage: Stage::CleanResiduals,
                    path: dir.join(name),
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Move the unpacked utility tree into `work_dir` unless a utility directory
/// already exists there. First run wins; an existing directory is never
/// overwritten, so manual customizations survive re-runs.
fn relocate_if_absent(utility_root: &Path, work_dir: &Path) -> Result<PathBuf, PipelineError> {
    let dest = work_dir.join(consts::UTILITY_DIR_NAME);

    if dest.exists() {
        tracing::info!(
            "{} already exists, keeping the existing installation",
            dest.display()
        );
        return Ok(dest);
    }

    let options = fs_extra::dir::CopyOptions::new();
    fs_extra::dir::move_dir(utility_root, work_dir, &options).map_err(|source| {
        PipelineError::Relocate {
            from: utility_root.to_path_buf(),
            to: dest.clone(),
            source,
        }
    })?;

    Ok(dest)
}

fn find_artifact(stage: Stage, dir: &Path, pattern: &str) -> Result<PathBuf, PipelineError> {
    extract::find_first_match(dir, pattern).ok_or_else(|| PipelineError::ArtifactNotFound {
        stage,
        pattern: pattern.to_string(),
        dir: dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::extract::tests::write_test_zip;

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Stage::EnsureTool.to_string(), "ensure-tool");
        assert_eq!(Stage::RelocateIfAbsent.to_string(), "relocate-if-absent");
    }

    #[test]
    fn stages_require_inputs_present_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let mut ctx = PipelineContext::new(temp.path().to_path_buf());

        assert!(matches!(
            ctx.require(Stage::FetchPackage),
            Err(PipelineError::MissingInput { .. })
        ));

        let stale = temp.path().join("gone.zip");
        ctx.record(Stage::FetchPackage, stale);
        assert!(matches!(
            ctx.require(Stage::FetchPackage),
            Err(PipelineError::MissingInput { .. })
        ));

        let real = temp.path().join("MSI-Center.zip");
        fs::write(&real, b"zip").unwrap();
        ctx.record(Stage::FetchPackage, real.clone());
        assert_eq!(ctx.require(Stage::FetchPackage).unwrap(), real);
    }

    #[rstest]
    #[case::none(&[])]
    #[case::one(&["BIOSData.db"])]
    #[case::two(&["BIOSData.txt", "SCEWIN.bat"])]
    #[case::all(&["BIOSData.db", "BIOSData.txt", "SCEWIN.bat"])]
    fn residual_cleanup_tolerates_missing_files(#[case] present: &[&str]) {
        let dir = tempfile::tempdir().unwrap();
        for name in present {
            fs::write(dir.path().join(name), b"residual").unwrap();
        }
        fs::write(dir.path().join("SCEWIN64.exe"), b"keep").unwrap();

        clean_residuals(dir.path()).unwrap();

        for name in consts::RESIDUAL_FILES {
            assert!(!dir.path().join(name).exists());
        }
        assert!(dir.path().join("SCEWIN64.exe").exists());
    }

    #[test]
    fn relocation_moves_the_tree_on_first_run() {
        let temp = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let src = temp.path().join("SCEWIN");
        fs::create_dir_all(src.join("5.05.01.0002")).unwrap();
        fs::write(src.join("5.05.01.0002").join("SCEWIN64.exe"), b"tool").unwrap();

        let dest = relocate_if_absent(&src, work.path()).unwrap();

        assert_eq!(dest, work.path().join("SCEWIN"));
        assert!(dest.join("5.05.01.0002").join("SCEWIN64.exe").exists());
        assert!(!src.exists());
    }

    #[test]
    fn relocation_never_overwrites_an_existing_installation() {
        let temp = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let src = temp.path().join("SCEWIN");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("fresh.txt"), b"fresh").unwrap();

        let dest = work.path().join("SCEWIN");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("custom.txt"), b"mine").unwrap();

        // Running twice with the destination present must be a no-op both
        // times.
        for _ in 0..2 {
            let kept = relocate_if_absent(&src, work.path()).unwrap();
            assert_eq!(kept, dest);
            assert_eq!(fs::read(dest.join("custom.txt")).unwrap(), b"mine");
            assert!(!dest.join("fresh.txt").exists());
            assert!(src.exists());
        }
    }

    #[test]
    fn version_flows_from_package_archive_to_member_name() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("MSI-Center.zip");
        write_test_zip(&archive, &[("MSI Center_2.0.0.exe", b"installer")]);
        let extract_root = dir.path().join("MSI-Center");
        fs::create_dir_all(&extract_root).unwrap();

        extract::extract_zip_all(&archive, &extract_root).unwrap();
        let installer = extract::find_first_match(&extract_root, consts::INSTALLER_GLOB).unwrap();
        let version = version::resolve(&installer.file_name().unwrap().to_string_lossy()).unwrap();

        assert_eq!(version, "2.0.0");
        assert_eq!(
            consts::appx_member_name(&version),
            "MSI%20Center_2.0.0_x64.appx"
        );
    }

    #[test]
    fn missing_artifact_names_stage_and_pattern() {
        let dir = tempfile::tempdir().unwrap();

        let err = find_artifact(Stage::LocateEngineInstaller, dir.path(), "Engine Lib_*.exe")
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("locate-engine-installer"));
        assert!(message.contains("Engine Lib_*.exe"));
    }
}
