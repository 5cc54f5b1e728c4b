use crate::services::manifest::ManifestError;
use serde::{Deserialize, Serialize};

/// One content mapping inside an app build.
///
/// `source_content_path` is the directory the files are taken from,
/// `include_pattern` selects files below it and `destination_path` is where they
/// land inside the depot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotSpec {
    pub id: String,
    pub source_content_path: String,
    pub include_pattern: String,
    pub destination_path: String,
    pub recursive: bool,
    pub exclude_pattern: String,
}

impl Default for DepotSpec {
    fn default() -> Self {
        Self {
            id: String::new(),
            source_content_path: String::new(),
            include_pattern: "*".to_string(),
            destination_path: ".".to_string(),
            recursive: true,
            exclude_pattern: String::new(),
        }
    }
}

impl DepotSpec {
    /// Depot that maps everything under `source_content_path` to the depot root.
    pub fn new(id: impl Into<String>, source_content_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_content_path: source_content_path.into(),
            ..Self::default()
        }
    }

    pub fn with_exclusion(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_pattern = pattern.into();
        self
    }
}

/// Everything needed to generate an app build manifest.
///
/// An empty `branch` means the build is uploaded but not set live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSpec {
    pub app_id: String,
    pub description: String,
    pub content_root: String,
    pub branch: String,
    pub preview: bool,
    pub depots: Vec<DepotSpec>,
}

impl BuildSpec {
    /// Single-depot build for `app_id`, using the platform convention that the
    /// first depot of an app is `app_id + 1`.
    pub fn simple(
        app_id: impl Into<String>,
        content_path: impl Into<String>,
        description: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        let app_id = app_id.into();
        let content_path = content_path.into();
        let depot = DepotSpec::new(default_depot_id(&app_id), content_path.clone());

        Self {
            app_id,
            description: description.into(),
            content_root: content_path,
            branch: branch.into(),
            preview: false,
            depots: vec![depot],
        }
    }

    /// Check the fields the uploader cannot do without.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.app_id.trim().is_empty() {
            return Err(ManifestError::Validation("AppID is required".to_string()));
        }
        if self.depots.is_empty() {
            return Err(ManifestError::Validation(
                "At least one depot is required".to_string(),
            ));
        }
        if let Some(depot) = self.depots.iter().find(|d| d.id.trim().is_empty()) {
            return Err(ManifestError::Validation(format!(
                "Depot mapping '{}' has no depot ID",
                depot.source_content_path
            )));
        }
        Ok(())
    }
}

/// Derive the default depot id for an app.
///
/// Returns `"0"` when `app_id` is not a number; callers should treat that as a
/// configuration mistake rather than a usable depot.
pub fn default_depot_id(app_id: &str) -> String {
    match app_id.trim().parse::<u64>() {
        Ok(id) => match id.checked_add(1) {
            Some(depot) => depot.to_string(),
            None => {
                tracing::warn!("App ID {} is too large to derive a depot ID", app_id);
                "0".to_string()
            }
        },
        Err(_) => {
            tracing::warn!(
                "App ID '{}' is not numeric, default depot ID falls back to 0",
                app_id
            );
            "0".to_string()
        }
    }
}
