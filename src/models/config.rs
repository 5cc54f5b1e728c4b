use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// User settings persisted as `settings.yaml`.
///
/// Every field has a default so partially written or older files still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub last_username: String,

    /// Steamworks SDK root; takes priority over `steamcmd_path` when both are set.
    pub sdk_folder: String,

    /// Direct path to `steamcmd.sh` or a packaged `steamcmd`.
    pub steamcmd_path: String,

    pub default_content_path: String,
    pub last_app_id: String,

    #[serde(default = "default_branch")]
    pub last_branch: String,

    pub set_live_after_upload: bool,

    #[serde(default = "default_log_max_lines")]
    pub log_max_lines: u32,

    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_username: String::new(),
            sdk_folder: String::new(),
            steamcmd_path: String::new(),
            default_content_path: String::new(),
            last_app_id: String::new(),
            last_branch: default_branch(),
            set_live_after_upload: false,
            log_max_lines: default_log_max_lines(),
            debug_mode: false,
        }
    }
}

fn default_branch() -> String {
    "default".to_string()
}

fn default_log_max_lines() -> u32 {
    500
}

/// Where the uploader executable should come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    SdkFolder(Utf8PathBuf),
    DirectPath(Utf8PathBuf),
    /// Nothing configured, search the conventional install layouts.
    Auto,
}

impl Settings {
    pub fn tool_source(&self) -> ToolSource {
        let sdk_folder = self.sdk_folder.trim();
        let steamcmd_path = self.steamcmd_path.trim();

        if !sdk_folder.is_empty() {
            ToolSource::SdkFolder(Utf8PathBuf::from(sdk_folder))
        } else if !steamcmd_path.is_empty() {
            ToolSource::DirectPath(Utf8PathBuf::from(steamcmd_path))
        } else {
            ToolSource::Auto
        }
    }
}
