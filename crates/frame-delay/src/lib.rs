//! Frame Delay - bounded image frame history with background compression
//!
//! Records a sliding window of recently produced frames and hands any of
//! them back by offset ("N frames ago") or by timestamp. Frames are stored
//! raw or JPEG-compressed on a dedicated worker thread, with at most one
//! compression job in flight.

pub mod codec;
pub mod config;
pub mod delay_line;
pub mod error;
pub mod glitch;
pub mod history;
pub mod image;
pub mod scratch;
mod worker;

pub use codec::{CompressedFrame, FrameCodec, JpegCodec};
pub use config::{DelayLineConfig, GlitchConfig};
pub use delay_line::{DelayLine, MemoryUsage};
pub use error::{DelayLineError, DelayLineResult};
pub use image::{ChannelLayout, ImageBuffer, Plane, PlanarImage};
pub use worker::{SlotState, StopToken};
