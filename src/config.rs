use crate::core::{RegionKey, Result, TagError};
use crate::tag::Compression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store configuration
///
/// Built in code with the builder methods, or loaded from JSON:
///
/// ```json
/// { "directory": "data/world/tags", "compression": "none" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `r.<x>.<z>.<ext>` files and the world file
    pub directory: PathBuf,

    /// Name reported with fallback artifacts
    #[serde(default = "default_world_name")]
    pub world_name: String,

    /// Extension of region files, without the dot
    #[serde(default = "default_extension")]
    pub file_extension: String,

    /// Compression applied when writing
    #[serde(default)]
    pub compression: Compression,

    /// Where recovery artifacts go; `<directory>/corrupted` when unset
    #[serde(default)]
    pub fallback_directory: Option<PathBuf>,

    /// Create missing directories on open
    #[serde(default = "default_true")]
    pub create_directories: bool,
}

fn default_world_name() -> String {
    "world".to_string()
}

fn default_extension() -> String {
    "dat".to_string()
}

fn default_true() -> bool {
    true
}

impl StoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            world_name: default_world_name(),
            file_extension: default_extension(),
            compression: Compression::default(),
            fallback_directory: None,
            create_directories: true,
        }
    }

    /// Set the world name
    pub fn world_name(mut self, name: &str) -> Self {
        self.world_name = name.to_string();
        self
    }

    /// Set the region file extension
    pub fn file_extension(mut self, extension: &str) -> Self {
        self.file_extension = extension.to_string();
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn fallback_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.fallback_directory = Some(directory.into());
        self
    }

    pub fn create_directories(mut self, create: bool) -> Self {
        self.create_directories = create;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TagError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn region_path(&self, key: RegionKey) -> PathBuf {
        self.directory.join(key.file_name(&self.file_extension))
    }

    pub fn world_path(&self) -> PathBuf {
        self.directory.join(format!("world.{}", self.file_extension))
    }

    pub fn fallback_path(&self) -> PathBuf {
        self.fallback_directory
            .clone()
            .unwrap_or_else(|| self.directory.join("corrupted"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(TagError::Config("directory cannot be empty".to_string()));
        }

        if self.file_extension.is_empty() || self.file_extension.contains('.') {
            return Err(TagError::Config(format!(
                "invalid file extension '{}'",
                self.file_extension
            )));
        }

        if self.world_name.is_empty() {
            return Err(TagError::Config("world_name cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::new("tags");
        assert_eq!(config.world_name, "world");
        assert_eq!(config.file_extension, "dat");
        assert_eq!(config.compression, Compression::Gzip);
        assert!(config.create_directories);
        assert_eq!(config.fallback_path(), PathBuf::from("tags").join("corrupted"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = StoreConfig::new("tags")
            .world_name("nether")
            .file_extension("nbt")
            .compression(Compression::None)
            .fallback_directory("/tmp/rescue");

        assert_eq!(config.world_name, "nether");
        assert_eq!(
            config.region_path(RegionKey::new(1, -2)),
            PathBuf::from("tags").join("r.1.-2.nbt")
        );
        assert_eq!(config.world_path(), PathBuf::from("tags").join("world.nbt"));
        assert_eq!(config.fallback_path(), PathBuf::from("/tmp/rescue"));
    }

    #[test]
    fn test_from_json() {
        let config = StoreConfig::from_json_str(
            r#"{ "directory": "data/tags", "compression": "none", "world_name": "end" }"#,
        )
        .unwrap();

        assert_eq!(config.directory, PathBuf::from("data/tags"));
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.world_name, "end");
        assert_eq!(config.file_extension, "dat");
    }

    #[test]
    fn test_from_json_missing_directory() {
        assert!(StoreConfig::from_json_str("{}").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(StoreConfig::new("tags").validate().is_ok());
        assert!(StoreConfig::new("").validate().is_err());
        assert!(StoreConfig::new("tags").file_extension("").validate().is_err());
        assert!(StoreConfig::new("tags").file_extension("d.at").validate().is_err());
        assert!(StoreConfig::new("tags").world_name("").validate().is_err());
    }
}
