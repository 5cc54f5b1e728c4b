//! Discovery of the `steamcmd` uploader executable.
//!
//! The search is a best-effort walk over the conventional Steamworks SDK layouts:
//!
//! 1. Static candidates next to (and above) the application directory, under the
//!    user's home directory, and the distribution package paths
//! 2. `steamworks_sdk*` directories at the base directory and up to three
//!    ancestors, newest version first
//! 3. A `PATH` lookup of the bare `steamcmd` name
//!
//! The first existing regular file wins. Nothing here creates or modifies files;
//! a layout that matches none of the conventions simply yields `None`.

use camino::{Utf8Path, Utf8PathBuf};
use std::ffi::OsString;
use std::fs;

/// Tool location relative to an SDK root.
const CONTENT_BUILDER_SUBPATH: [&str; 4] = ["tools", "ContentBuilder", "builder_linux", "steamcmd.sh"];

/// Script name inside `builder_linux`.
const SCRIPT_NAME: &str = "steamcmd.sh";

/// Executable name used for the `PATH` lookup.
const EXECUTABLE_NAME: &str = "steamcmd";

/// Directory name pattern of unpacked SDK archives (`steamworks_sdk_161`, ...).
const SDK_DIR_PATTERN: &str = "steamworks_sdk*";

/// SDK folder names commonly used under the home directory.
const HOME_SDK_DIRS: [&str; 3] = ["sdk", "SteamworksSDK", "steamworks_sdk"];

/// Distribution package locations.
const SYSTEM_PATHS: [&str; 2] = ["/usr/bin/steamcmd", "/usr/games/steamcmd"];

/// Ancestor levels searched for `steamworks_sdk*` directories.
const GLOB_ANCESTOR_LEVELS: usize = 3;

fn sdk_tool_path(sdk_root: &Utf8Path) -> Utf8PathBuf {
    let mut path = sdk_root.to_path_buf();
    path.extend(CONTENT_BUILDER_SUBPATH);
    path
}

/// True when `path` exists and is a regular file (symlinks are followed).
pub fn is_regular_file(path: &Utf8Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Heuristic search for the uploader executable.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    home: Option<Utf8PathBuf>,
    system_paths: Vec<Utf8PathBuf>,
    search_path: Option<OsString>,
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolLocator {
    /// Locator using the real home directory, the distribution package paths
    /// and the `PATH` environment variable.
    pub fn new() -> Self {
        let home = dirs::home_dir().and_then(|p| Utf8PathBuf::try_from(p).ok());

        Self {
            home,
            system_paths: SYSTEM_PATHS.iter().map(Utf8PathBuf::from).collect(),
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_home(mut self, home: Option<Utf8PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn with_system_paths(mut self, paths: Vec<Utf8PathBuf>) -> Self {
        self.system_paths = paths;
        self
    }

    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    fn static_candidates(&self, base: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut candidates = vec![base.join("builder_linux").join(SCRIPT_NAME)];

        if let Some(parent) = base.parent() {
            candidates.push(parent.join("builder_linux").join(SCRIPT_NAME));
        }

        // <base>/sdk, <base>/../sdk, <base>/../../sdk
        for root in base.ancestors().take(3) {
            candidates.push(sdk_tool_path(&root.join("sdk")));
        }

        if let Some(home) = &self.home {
            for dir in HOME_SDK_DIRS {
                candidates.push(sdk_tool_path(&home.join(dir)));
            }
        }

        candidates.extend(self.system_paths.iter().cloned());
        candidates
    }

    fn glob_candidates(&self, base: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut candidates = Vec::new();

        for root in base.ancestors().take(GLOB_ANCESTOR_LEVELS + 1) {
            if !root.is_dir() {
                continue;
            }

            let pattern = format!("{}/{}", glob::Pattern::escape(root.as_str()), SDK_DIR_PATTERN);
            let entries = match glob::glob(&pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Invalid SDK search pattern {}: {}", pattern, e);
                    continue;
                }
            };

            let mut sdk_dirs: Vec<Utf8PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_dir())
                .filter_map(|path| Utf8PathBuf::try_from(path).ok())
                .collect();

            // newest version first; names without a numeric suffix go last
            sdk_dirs.sort_by(|a, b| sdk_version(b).cmp(&sdk_version(a)).then_with(|| b.cmp(a)));

            candidates.extend(sdk_dirs.iter().map(|dir| sdk_tool_path(&dir.join("sdk"))));
        }

        candidates
    }

    /// Static and glob candidates for `base`, in priority order.
    pub fn candidates(&self, base: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut candidates = self.static_candidates(base);
        candidates.extend(self.glob_candidates(base));
        candidates
    }

    /// Find the uploader starting from the application directory `base`.
    ///
    /// # Returns
    ///
    /// The first candidate that is a regular file, then the `PATH` match, else `None`
    pub fn locate(&self, base: &Utf8Path) -> Option<Utf8PathBuf> {
        if let Some(found) = self.candidates(base).into_iter().find(|p| is_regular_file(p)) {
            tracing::debug!("Found steamcmd candidate: {}", found);
            return Some(found);
        }

        let search_path = self.search_path.as_ref()?;
        match which::which_in(EXECUTABLE_NAME, Some(search_path), base.as_std_path()) {
            Ok(path) => match Utf8PathBuf::try_from(path) {
                Ok(path) => {
                    tracing::debug!("Found steamcmd on PATH: {}", path);
                    Some(path)
                }
                Err(e) => {
                    tracing::warn!("Ignoring non UTF-8 steamcmd path: {}", e);
                    None
                }
            },
            Err(_) => {
                tracing::debug!("steamcmd not found under {} or on PATH", base);
                None
            }
        }
    }

    /// Resolve the tool inside a user-supplied SDK folder.
    ///
    /// Accepts the SDK root itself, its `tools/ContentBuilder` directory, or the
    /// `builder_linux` directory.
    pub fn resolve_from_sdk_folder(&self, sdk_folder: &Utf8Path) -> Option<Utf8PathBuf> {
        let candidates = [
            sdk_tool_path(sdk_folder),
            sdk_folder.join("builder_linux").join(SCRIPT_NAME),
            sdk_folder.join(SCRIPT_NAME),
        ];

        candidates.into_iter().find(|p| is_regular_file(p))
    }

    /// Accept `path` if it is an existing regular file.
    pub fn resolve_from_direct_path(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        is_regular_file(path).then(|| path.to_path_buf())
    }
}

/// Layout expected under an SDK folder, for error messages.
pub fn expected_sdk_layout() -> String {
    CONTENT_BUILDER_SUBPATH.join("/")
}

/// Numeric suffix of an SDK directory name (`steamworks_sdk_161` -> 161).
fn sdk_version(dir: &Utf8Path) -> Option<u32> {
    dir.file_name()?.rsplit('_').next()?.parse().ok()
}
