//! Standard locations for the delay line config file

use std::path::PathBuf;

/// File name of the YAML config
pub const CONFIG_FILENAME: &str = "frame-delay.yaml";

/// Platform config directory for frame-delay
///
/// Returns: `{config_dir}/frame-delay` (e.g. `~/.config/frame-delay` on Linux),
/// or `./frame-delay` when the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("frame-delay")
}

/// Default config file path: `{config_dir}/frame-delay/frame-delay.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILENAME)
}
