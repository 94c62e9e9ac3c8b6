// src/infra/paths.rs — Config and data path resolution
//
// PLANCRAFT_HOME, when set, holds both config and data. Otherwise config lives
// in ~/.plancraft/ and data under the platform data dir.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn plancraft_home() -> Option<PathBuf> {
    std::env::var_os("PLANCRAFT_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $PLANCRAFT_HOME/ or ~/.plancraft/
pub fn config_dir() -> PathBuf {
    if let Some(home) = plancraft_home() {
        return home;
    }
    dirs_home().join(".plancraft")
}

/// Data directory: $PLANCRAFT_HOME/data/ or the platform-local data dir.
pub fn data_dir() -> PathBuf {
    if let Some(home) = plancraft_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "plancraft")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

pub fn db_path() -> PathBuf {
    data_dir().join("plancraft.db")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
