//! YAML config persistence
//!
//! Loading never fails: a missing or unreadable file yields the type's
//! defaults so a delay line can always be brought up. Saving reports errors
//! with context.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a config from `path`, falling back to `T::default()`
///
/// A parse or read error is logged as a warning before falling back.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} not found, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: cannot read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("load_config: loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: invalid YAML in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write `config` to `path` as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayLineConfig;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config: DelayLineConfig = load_config(Path::new("/nonexistent/frame-delay.yaml"));
        assert_eq!(config, DelayLineConfig::default());
    }

    #[test]
    fn test_invalid_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "max_history_size: [not, a, number").unwrap();

        let config: DelayLineConfig = load_config(&path);
        assert_eq!(config, DelayLineConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("frame-delay.yaml");

        let mut config = DelayLineConfig::default();
        config.max_history_size = 12;
        config.jpeg_quality = 40;
        config.glitch.scan_data = 0.25;

        save_config(&config, &path).unwrap();
        let loaded: DelayLineConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "max_history_size: 5\n").unwrap();

        let config: DelayLineConfig = load_config(&path);
        assert_eq!(config.max_history_size, 5);
        assert_eq!(config.encode_scratch_bytes, DelayLineConfig::default().encode_scratch_bytes);
    }
}
