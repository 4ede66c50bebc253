//! Delay line and glitch settings

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_QUALITY;

/// Delay line configuration
///
/// Mirrors the arguments of [`DelayLine::init`](crate::DelayLine::init) plus
/// the per-frame defaults a host usually applies to every `add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayLineConfig {
    /// Number of frames kept in history
    /// Default: 60 (two seconds at 30 fps)
    pub max_history_size: usize,

    /// Encode buffer budget in bytes
    /// A frame whose compressed size exceeds this is dropped.
    /// Default: 4 MiB
    pub encode_scratch_bytes: usize,

    /// Compress frames in the background instead of storing them raw
    /// Default: true
    pub use_compression: bool,

    /// JPEG quality level (1-100)
    /// Default: 85
    pub jpeg_quality: u8,

    /// Glitch transform settings
    pub glitch: GlitchConfig,
}

impl Default for DelayLineConfig {
    fn default() -> Self {
        Self {
            max_history_size: 60,
            encode_scratch_bytes: 4 * 1024 * 1024,
            use_compression: true,
            jpeg_quality: DEFAULT_QUALITY,
            glitch: GlitchConfig::default(),
        }
    }
}

/// Glitch transform weights
///
/// Each weight is multiplied by the per-call glitchiness to get the
/// probability that a byte in that segment is rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlitchConfig {
    /// Quantization table entries (DQT)
    /// Default: 1.0
    pub quantization: f32,

    /// Huffman table symbols (DHT)
    /// Default: 0.0 (usually destroys the frame)
    pub huffman: f32,

    /// Entropy-coded scan data
    /// Default: 0.0
    pub scan_data: f32,

    /// PRNG seed
    pub seed: u64,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            quantization: 1.0,
            huffman: 0.0,
            scan_data: 0.0,
            seed: 0x5EED_F00D,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DelayLineConfig::default();
        assert_eq!(config.max_history_size, 60);
        assert!(config.use_compression);
        assert_eq!(config.glitch.huffman, 0.0);
    }

    #[test]
    fn test_yaml_roundtrip_field_names() {
        let yaml = serde_yaml::to_string(&DelayLineConfig::default()).unwrap();
        assert!(yaml.contains("max_history_size"));
        assert!(yaml.contains("quantization"));
    }
}
