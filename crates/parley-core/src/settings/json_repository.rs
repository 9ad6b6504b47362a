use std::path::PathBuf;

use thiserror::Error;

use super::model::SettingsModel;
use crate::services::backend::BoxFuture;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cannot determine config directory")]
    NoConfigDir,
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub trait SettingsRepository: Send + Sync + 'static {
    /// Load settings from storage; a missing file yields defaults.
    fn load(&self) -> BoxFuture<'static, SettingsResult<SettingsModel>>;

    /// Save settings to storage.
    fn save(&self, settings: SettingsModel) -> BoxFuture<'static, SettingsResult<()>>;
}

pub struct JsonSettingsRepository {
    file_path: PathBuf,
}

impl JsonSettingsRepository {
    /// Create repository with XDG-compliant path
    pub fn new() -> SettingsResult<Self> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        let file_path = config_dir.join("parley").join("settings.json");
        Ok(Self { file_path })
    }

    /// Create repository with custom path (for testing)
    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn storage_path(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

impl SettingsRepository for JsonSettingsRepository {
    fn load(&self) -> BoxFuture<'static, SettingsResult<SettingsModel>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            // If file doesn't exist, return defaults (first run)
            if !path.exists() {
                return Ok(SettingsModel::default());
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let settings: SettingsModel = serde_json::from_str(&contents)?;
            Ok(settings)
        })
    }

    fn save(&self, settings: SettingsModel) -> BoxFuture<'static, SettingsResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let json = serde_json::to_string_pretty(&settings)?;

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::upload_service::UploadMode;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSettingsRepository::with_path(dir.path().join("settings.json"));

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, SettingsModel::default());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSettingsRepository::with_path(dir.path().join("settings.json"));

        let settings = SettingsModel {
            base_url: "https://chat.example.com/api".to_string(),
            upload_mode: UploadMode::Direct,
            max_attachment_bytes: 2048,
        };
        repo.save(settings.clone()).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply").join("nested").join("settings.json");
        let repo = JsonSettingsRepository::with_path(nested);

        repo.save(SettingsModel::default()).await.unwrap();
        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, SettingsModel::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let repo = JsonSettingsRepository::with_path(path);

        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, SettingsError::SerializationError(_)));
    }
}
