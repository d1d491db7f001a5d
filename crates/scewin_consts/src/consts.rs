use lazy_static::lazy_static;
use url::Url;

pub const SCEWIN_DL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The vendor package everything else is dug out of.
pub const PACKAGE_URL: &str = "https://download.msi.com/uti_exe/desktop/MSI-Center.zip";
pub const PACKAGE_ARCHIVE_NAME: &str = "MSI-Center.zip";
pub const EXTRACT_DIR_NAME: &str = "MSI-Center";

pub const INSTALLER_GLOB: &str = "MSI Center_*.exe";
pub const BUNDLE_DIR: &str = "app";
pub const BUNDLE_GLOB: &str = "*.appxbundle";

/// The `%20` is a literal part of the zip member name, not an encoding
/// applied by us.
pub const APPX_MEMBER_TEMPLATE: &str = "MSI%20Center_{version}_x64.appx";
pub const SDK_MEMBER_PATH: &str = "DCv2/Package/MSI%20Center%20SDK.exe";

pub const PREPACKAGE_DIR: &[&str] = &["tmp", "PrePackage"];
pub const ENGINE_INSTALLER_GLOB: &str = "Engine Lib_*.exe";

pub const UTILITY_LIB_PATH: &[&str] = &["app", "Lib", "SCEWIN"];
pub const UTILITY_DIR_NAME: &str = "SCEWIN";

/// Leftovers from the vendor packaging, removed best-effort.
pub const RESIDUAL_FILES: &[&str] = &["BIOSData.db", "BIOSData.txt", "SCEWIN.bat"];

pub const UNPACK_TOOL: &str = "innoextract";
pub const UNPACK_TOOL_RELEASES_URL: &str =
    "https://api.github.com/repos/dscharrer/innoextract/releases/latest";

lazy_static! {
    pub static ref SCRIPT_URLS: [Url; 2] = [
        Url::parse("https://raw.githubusercontent.com/ab3lkaizen/SCEHUB/main/Export.bat")
            .expect("invalid script url"),
        Url::parse("https://raw.githubusercontent.com/ab3lkaizen/SCEHUB/main/Import.bat")
            .expect("invalid script url"),
    ];
}

/// Member name of the x64 appx inside the appxbundle for a given
/// MSI Center version.
pub fn appx_member_name(version: &str) -> String {
    APPX_MEMBER_TEMPLATE.replace("{version}", version)
}
