//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::ShipyardError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Where shipyard keeps its own state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Applications, deployments, registrations and transcripts
    pub fn store_file(&self) -> File {
        File::new(self.base_dir.join("store.json"))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    pub async fn setup(&self) -> Result<(), ShipyardError> {
        Dir::new(&self.base_dir).create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(home.join(".shipyard"))
    }
}
