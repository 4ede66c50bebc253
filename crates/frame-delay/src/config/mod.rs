//! Delay line configuration
//!
//! Settings are plain serde structs persisted as YAML:
//!
//! - [`DelayLineConfig`]: history length, encode budget, compression defaults
//! - [`GlitchConfig`]: segment weights and seed for the glitch transform
//!
//! # Usage
//!
//! ```ignore
//! use frame_delay::config::{load_config, default_config_path, DelayLineConfig};
//!
//! let config: DelayLineConfig = load_config(&default_config_path());
//! let mut line = frame_delay::DelayLine::new();
//! line.init_with_config(&config)?;
//! ```

mod delay;
mod io;
mod paths;

pub use delay::{DelayLineConfig, GlitchConfig};
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILENAME};
