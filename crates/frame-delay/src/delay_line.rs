//! Delay line facade
//!
//! [`DelayLine`] records a sliding window of frames and serves them back by
//! offset or timestamp. Frames are either copied in raw or handed to the
//! background compression worker; finished jobs are drained into history
//! whenever the owner calls [`add`](DelayLine::add), [`tick`](DelayLine::tick),
//! [`poll`](DelayLine::poll) or one of the retrieval methods.
//!
//! # Threading
//!
//! Everything here runs on the owner thread. Only encoding happens on the
//! worker. Retrieval and mutation are not synchronized against each other,
//! so a `DelayLine` is `Send` but deliberately used from one thread at a time.
//!
//! # Lifecycle
//!
//! `init` and `shut` bracket the line's life. Calling `init` twice without a
//! `shut` in between is a caller bug: debug builds assert, release builds log
//! and replace the old worker. Before `init` (and after `shut`) the line acts
//! as an empty line with capacity 0.

use std::sync::Arc;

use crate::codec::{clamp_quality, CompressedFrame, FrameCodec, JpegCodec};
use crate::config::DelayLineConfig;
use crate::error::DelayLineResult;
use crate::glitch::JpegGlitch;
use crate::history::{FramePayload, HistoryItem, HistoryStore};
use crate::image::{deinterleave_into, ImageBuffer, PlanarImage};
use crate::scratch::ScratchArena;
use crate::worker::{CompressionWorker, SlotState, WorkItem};

/// Byte accounting snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Sum of the three byte counts below
    pub total_bytes: usize,
    /// Raw planes and compressed streams held in history
    pub history_bytes: usize,
    /// Owner-side decode and glitch buffers
    pub scratch_bytes: usize,
    /// Worker encode buffers plus the frame copy of an in-flight job
    pub pending_bytes: usize,
    /// Frames currently in history
    pub item_count: usize,
}

/// Bounded frame history with background compression
pub struct DelayLine {
    codec: Arc<dyn FrameCodec>,
    history: HistoryStore,
    worker: Option<CompressionWorker>,
    arena: ScratchArena,
    glitch: JpegGlitch,
}

impl DelayLine {
    /// Delay line using [`JpegCodec`]
    pub fn new() -> Self {
        Self::with_codec(Arc::new(JpegCodec))
    }

    /// Delay line using a caller-provided codec
    pub fn with_codec(codec: Arc<dyn FrameCodec>) -> Self {
        Self {
            codec,
            history: HistoryStore::default(),
            worker: None,
            arena: ScratchArena::new(),
            glitch: JpegGlitch::default(),
        }
    }

    /// Start the compression worker and size the history
    ///
    /// `encode_scratch_bytes` is the encode buffer reservation and also the
    /// largest compressed frame that will be kept.
    pub fn init(&mut self, max_history_size: usize, encode_scratch_bytes: usize) -> DelayLineResult<()> {
        if self.worker.is_some() {
            log::error!("DelayLine::init called twice without shut");
        }
        debug_assert!(self.worker.is_none(), "DelayLine::init called twice without shut");

        let worker = CompressionWorker::spawn(self.codec.clone(), encode_scratch_bytes)?;
        // Replacing an old worker joins it
        self.worker = Some(worker);
        self.history = HistoryStore::new(max_history_size);

        log::info!(
            "Delay line initialized: {} frames, {} byte encode budget, {} codec",
            max_history_size,
            encode_scratch_bytes,
            self.codec.name()
        );
        Ok(())
    }

    /// [`init`](Self::init) from a config, also applying its glitch settings
    pub fn init_with_config(&mut self, config: &DelayLineConfig) -> DelayLineResult<()> {
        self.glitch = JpegGlitch::new(config.glitch.clone());
        self.init(config.max_history_size, config.encode_scratch_bytes)
    }

    /// Stop the worker and free every buffer
    ///
    /// Waits for a job that is already being encoded; its result is
    /// discarded. Safe to call more than once.
    pub fn shut(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
            log::info!("Delay line shut down ({} frames discarded)", self.history.len());
        }
        self.history = HistoryStore::default();
        self.arena.release();
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.worker.is_some()
    }

    /// Block until a pending compression job finishes and store its result
    pub fn tick(&mut self) {
        self.drain(true);
    }

    /// Store a finished compression result without blocking
    ///
    /// Returns true when a job was collected.
    pub fn poll(&mut self) -> bool {
        self.drain(false)
    }

    fn drain(&mut self, block: bool) -> bool {
        let Some(worker) = self.worker.as_mut() else {
            return false;
        };
        let done = if block { worker.wait() } else { worker.try_wait() };
        let Some(done) = done else {
            return false;
        };

        if let Some(frame) = done.frame {
            log::trace!("Compressed frame t={:.3} stored ({} bytes)", done.timestamp, frame.memory_usage());
            self.history.push_front(HistoryItem::compressed(frame, done.timestamp));
        }
        true
    }

    /// Record a frame
    ///
    /// With compression, the frame is copied and queued for the worker; if a
    /// previous job is still running this blocks until it has been stored.
    /// Frames with zero width or height are always stored raw. Encode
    /// failures drop the frame silently (logged).
    pub fn add(&mut self, image: &PlanarImage<'_>, quality: i32, timestamp: f64, use_compression: bool) {
        self.drain(true);

        if !use_compression || image.is_empty() {
            self.history.push_raw(image, timestamp);
            return;
        }

        let Some(worker) = self.worker.as_mut() else {
            log::warn!("Delay line not initialized, frame at t={:.3} dropped", timestamp);
            return;
        };
        debug_assert_ne!(worker.state(), SlotState::InFlight);

        worker.submit(WorkItem {
            image: ImageBuffer::from_image(image),
            quality: clamp_quality(quality),
            timestamp,
        });
    }

    /// Copy the frame `offset` steps back (0 = newest) into `out`
    ///
    /// `glitch` carries the glitchiness for compressed frames. Returns the
    /// frame's timestamp, or `None` with `out` untouched when the offset is
    /// out of range or decoding fails.
    pub fn get(&mut self, offset: usize, out: &mut ImageBuffer, glitch: Option<f32>) -> Option<f64> {
        self.drain(true);
        self.retrieve(offset, out, glitch)
    }

    /// Look a frame up by time
    ///
    /// Scans newest to oldest and keeps the last frame whose timestamp is
    /// not less than `timestamp`, stopping at the first older one. See
    /// [`HistoryStore::find_by_timestamp`] for the exact rule.
    pub fn get_by_timestamp(&mut self, timestamp: f64, out: &mut ImageBuffer, glitch: Option<f32>) -> Option<f64> {
        self.drain(true);
        let offset = self.history.find_by_timestamp(timestamp)?;
        self.retrieve(offset, out, glitch)
    }

    fn retrieve(&mut self, offset: usize, out: &mut ImageBuffer, glitchiness: Option<f32>) -> Option<f64> {
        let Self {
            codec,
            history,
            arena,
            glitch,
            ..
        } = self;

        let item = history.get(offset)?;
        match &item.payload {
            FramePayload::Raw(image) => {
                out.copy_from(&image.as_image());
            }
            FramePayload::Compressed(frame) => {
                decode_frame(&**codec, arena, glitch, frame, glitchiness, out)?;
            }
        }
        Some(item.timestamp)
    }

    /// Number of frames currently stored
    ///
    /// Does not drain a pending job.
    #[inline]
    pub fn get_length(&self) -> usize {
        self.history.len()
    }

    /// Maximum number of frames kept
    #[inline]
    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Change the capacity, evicting the oldest frames that no longer fit
    pub fn set_length(&mut self, max_history_size: usize) {
        self.drain(true);
        let evicted = self.history.set_capacity(max_history_size);
        if evicted > 0 {
            log::debug!("History shrunk to {} frames, {} evicted", max_history_size, evicted);
        }
    }

    /// Drop every stored frame, including a job still being compressed
    pub fn clear_history(&mut self) {
        self.drain(true);
        self.history.clear();
    }

    /// Current byte accounting (does not drain)
    pub fn memory_usage(&self) -> MemoryUsage {
        let history_bytes = self.history.memory_usage();
        let scratch_bytes = self.arena.memory_usage();
        let pending_bytes = self.worker.as_ref().map_or(0, CompressionWorker::pending_bytes);

        MemoryUsage {
            total_bytes: history_bytes + scratch_bytes + pending_bytes,
            history_bytes,
            scratch_bytes,
            pending_bytes,
            item_count: self.history.len(),
        }
    }
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DelayLine {
    fn drop(&mut self) {
        self.shut();
    }
}

/// Decode `frame` into `out`, optionally glitching a private byte copy first
///
/// `out` is only written once the codec has succeeded.
fn decode_frame(
    codec: &dyn FrameCodec,
    arena: &mut ScratchArena,
    glitch: &mut JpegGlitch,
    frame: &CompressedFrame,
    glitchiness: Option<f32>,
    out: &mut ImageBuffer,
) -> Option<()> {
    let bytes = match glitchiness {
        Some(amount) if amount > 0.0 => {
            let copy = arena.glitch.fill_from(frame.bytes());
            glitch.apply(copy, amount);
            arena.glitch.contents()
        }
        _ => frame.bytes(),
    };

    let layout = frame.layout();
    arena
        .decode
        .ensure_capacity(frame.width() * frame.height() * layout.channel_count());

    let info = match codec.decode(bytes, layout, arena.decode.as_vec_mut()) {
        Ok(info) => info,
        Err(e) => {
            log::warn!("Failed to decode {}x{} frame: {}", frame.width(), frame.height(), e);
            return None;
        }
    };

    if (info.width, info.height) != (frame.width(), frame.height()) {
        log::debug!(
            "Decoded size {}x{} differs from stored {}x{}",
            info.width,
            info.height,
            frame.width(),
            frame.height()
        );
    }

    deinterleave_into(arena.decode.contents(), info.width, info.height, layout, out);
    Some(())
}
