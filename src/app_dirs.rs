use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "scantap").map(|pd| pd.config_dir().join("config.json"))
    }

    /// Default location for history exports; `$HOME/.local/state/scantap` when HOME is set.
    pub fn export_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("scantap"),
            )
        } else {
            ProjectDirs::from("", "", "scantap").map(|pd| pd.data_local_dir().to_path_buf())
        }
    }
}
