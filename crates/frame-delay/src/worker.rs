//! Background compression worker
//!
//! One worker thread per delay line. The owner thread and the worker talk
//! through a single-job work slot made of two one-element channels:
//!
//! ```text
//! ┌──────────────┐   Compress(WorkItem)   ┌──────────────────────┐
//! │ Owner thread │ ─────────────────────► │ frame-delay-compress │
//! │ (DelayLine)  │ ◄───────────────────── │   (codec.encode)     │
//! └──────────────┘     CompletedWork      └──────────────────────┘
//! ```
//!
//! # Protocol
//!
//! - At most one job is in flight. The owner must collect the previous
//!   result ([`CompressionWorker::wait`]) before submitting another, which
//!   is what gives `add` its backpressure.
//! - Encoding runs on the worker with no lock held; the owner only blocks
//!   when it explicitly waits.
//! - Shutdown sets a [`StopToken`] and sends a `Shutdown` sentinel. A job
//!   that is already being encoded runs to completion. A job picked up
//!   after the token is set is released without encoding.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::codec::{CompressedFrame, FrameCodec};
use crate::error::DelayLineResult;
use crate::image::{interleave_into, ImageBuffer};
use crate::scratch::ScratchBuffer;

/// One compression job: a private copy of the frame plus its parameters
#[derive(Debug)]
pub(crate) struct WorkItem {
    pub image: ImageBuffer,
    pub quality: u8,
    pub timestamp: f64,
}

/// Result of a job, collected by the owner
///
/// `frame` is `None` when the codec rejected the frame, the encoded size
/// exceeded the budget, or the job was cancelled by shutdown.
#[derive(Debug)]
pub(crate) struct CompletedWork {
    pub timestamp: f64,
    pub frame: Option<CompressedFrame>,
}

enum WorkerCommand {
    Compress(WorkItem),
    Shutdown,
}

/// Owner-side view of the work slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Ready to accept a job
    Idle,
    /// A job was submitted and its result not yet collected
    InFlight,
    /// Worker has exited
    Stopped,
}

/// Cancellation flag shared with the worker loop
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle owning the worker thread and the owner end of the work slot
pub(crate) struct CompressionWorker {
    command_tx: Sender<WorkerCommand>,
    done_rx: Receiver<CompletedWork>,
    stop: StopToken,
    state: SlotState,
    /// Bytes of the frame copy currently owned by the worker
    in_flight_bytes: usize,
    /// Reserved encode-side scratch, published by the worker
    encode_capacity: Arc<AtomicUsize>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CompressionWorker {
    /// Spawn the worker thread
    ///
    /// `encode_budget` is both the initial encode buffer reservation and the
    /// largest compressed frame that will be kept.
    pub fn spawn(codec: Arc<dyn FrameCodec>, encode_budget: usize) -> DelayLineResult<Self> {
        let (command_tx, command_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        let stop = StopToken::default();
        let encode_capacity = Arc::new(AtomicUsize::new(encode_budget));

        let context = WorkerContext {
            codec,
            command_rx,
            done_tx,
            stop: stop.clone(),
            encode_budget,
            encode_capacity: encode_capacity.clone(),
        };

        let handle = thread::Builder::new()
            .name("frame-delay-compress".to_string())
            .spawn(move || context.run())?;

        Ok(Self {
            command_tx,
            done_rx,
            stop,
            state: SlotState::Idle,
            in_flight_bytes: 0,
            encode_capacity,
            thread_handle: Some(handle),
        })
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Hand a job to the worker (Idle → InFlight)
    ///
    /// Returns false, dropping the job, when the slot is not idle or the
    /// worker is gone.
    pub fn submit(&mut self, item: WorkItem) -> bool {
        if self.state != SlotState::Idle {
            debug_assert!(self.state != SlotState::InFlight, "previous job must be collected before submitting");
            log::error!("Compression slot is {:?}, frame at t={:.3} dropped", self.state, item.timestamp);
            return false;
        }

        let bytes = item.image.memory_usage();
        match self.command_tx.send(WorkerCommand::Compress(item)) {
            Ok(()) => {
                self.state = SlotState::InFlight;
                self.in_flight_bytes = bytes;
                true
            }
            Err(_) => {
                log::error!("Compression worker disconnected, frame dropped");
                self.state = SlotState::Stopped;
                false
            }
        }
    }

    /// Block until the in-flight job completes and take its result
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub fn wait(&mut self) -> Option<CompletedWork> {
        if self.state != SlotState::InFlight {
            return None;
        }
        let done = self.done_rx.recv().ok();
        self.collect(done)
    }

    /// Take the in-flight result if it is already available
    pub fn try_wait(&mut self) -> Option<CompletedWork> {
        if self.state != SlotState::InFlight {
            return None;
        }
        match self.done_rx.try_recv() {
            Ok(done) => self.collect(Some(done)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.collect(None),
        }
    }

    fn collect(&mut self, done: Option<CompletedWork>) -> Option<CompletedWork> {
        self.in_flight_bytes = 0;
        match done {
            Some(done) => {
                self.state = SlotState::Idle;
                Some(done)
            }
            None => {
                log::error!("Compression worker exited with a job in flight");
                self.state = SlotState::Stopped;
                None
            }
        }
    }

    /// Encode scratch plus the frame copy still owned by the worker
    pub fn pending_bytes(&self) -> usize {
        self.encode_capacity.load(Ordering::Relaxed) + self.in_flight_bytes
    }

    /// Stop the worker and join it
    ///
    /// Safe to call more than once. An uncollected result is discarded.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };

        self.stop.stop();
        // Fails only if the worker already exited
        let _ = self.command_tx.send(WorkerCommand::Shutdown);

        if handle.join().is_err() {
            log::error!("Compression worker panicked");
        }

        while let Ok(done) = self.done_rx.try_recv() {
            log::debug!("Discarding uncollected result for t={:.3}", done.timestamp);
        }

        self.state = SlotState::Stopped;
        self.in_flight_bytes = 0;
        self.encode_capacity.store(0, Ordering::Relaxed);
    }
}

impl Drop for CompressionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State moved onto the worker thread
struct WorkerContext {
    codec: Arc<dyn FrameCodec>,
    command_rx: Receiver<WorkerCommand>,
    done_tx: Sender<CompletedWork>,
    stop: StopToken,
    encode_budget: usize,
    encode_capacity: Arc<AtomicUsize>,
}

impl WorkerContext {
    fn run(self) {
        log::info!(
            "Compression worker started ({} codec, {} byte encode budget)",
            self.codec.name(),
            self.encode_budget
        );

        let mut staging = ScratchBuffer::new();
        let mut encoded = ScratchBuffer::with_capacity(self.encode_budget);

        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                WorkerCommand::Compress(item) => {
                    let frame = if self.stop.is_stopped() {
                        log::debug!("Stop requested, releasing frame at t={:.3} unencoded", item.timestamp);
                        None
                    } else {
                        self.compress(&item, &mut staging, &mut encoded)
                    };

                    let WorkItem { image, timestamp, .. } = item;
                    drop(image);

                    self.encode_capacity
                        .store(staging.capacity() + encoded.capacity(), Ordering::Relaxed);

                    if self.done_tx.send(CompletedWork { timestamp, frame }).is_err() {
                        log::warn!("Delay line dropped the work slot, worker exiting");
                        break;
                    }
                }
                WorkerCommand::Shutdown => {
                    log::info!("Compression worker shutting down");
                    break;
                }
            }
        }

        log::info!("Compression worker stopped");
    }

    fn compress(
        &self,
        item: &WorkItem,
        staging: &mut ScratchBuffer,
        encoded: &mut ScratchBuffer,
    ) -> Option<CompressedFrame> {
        let image = item.image.as_image();
        let (width, height, layout) = (image.width(), image.height(), image.layout());

        interleave_into(&image, staging.as_vec_mut());

        let out = encoded.as_vec_mut();
        if let Err(e) = self
            .codec
            .encode(staging.contents(), width, height, layout, item.quality, out)
        {
            log::warn!("Frame at t={:.3} dropped: {}", item.timestamp, e);
            return None;
        }

        if out.len() > self.encode_budget {
            log::warn!(
                "Frame at t={:.3} dropped: {} compressed bytes exceed the {} byte encode budget",
                item.timestamp,
                out.len(),
                self.encode_budget
            );
            return None;
        }

        Some(CompressedFrame::new(out.as_slice(), width, height, layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, CodecResult, DecodedInfo, JpegCodec};
    use crate::image::{ChannelLayout, Plane, PlanarImage};
    use std::time::Duration;

    /// Copies pixels through verbatim after an optional delay
    struct StoreCodec {
        delay: Duration,
    }

    impl FrameCodec for StoreCodec {
        fn name(&self) -> &'static str {
            "store"
        }

        fn encode(
            &self,
            pixels: &[u8],
            _width: usize,
            _height: usize,
            _layout: ChannelLayout,
            _quality: u8,
            out: &mut Vec<u8>,
        ) -> CodecResult<()> {
            thread::sleep(self.delay);
            out.clear();
            out.extend_from_slice(pixels);
            Ok(())
        }

        fn decode(&self, bytes: &[u8], _layout: ChannelLayout, out: &mut Vec<u8>) -> CodecResult<DecodedInfo> {
            out.clear();
            out.extend_from_slice(bytes);
            Err(CodecError::Decode("not needed here".to_string()))
        }
    }

    fn job(width: usize, height: usize, timestamp: f64) -> WorkItem {
        let data = vec![77u8; width * height];
        let view = PlanarImage::gray(Plane::tight(&data, width), width, height).unwrap();
        WorkItem {
            image: ImageBuffer::from_image(&view),
            quality: 80,
            timestamp,
        }
    }

    #[test]
    fn test_wait_without_job_is_noop() {
        let mut worker = CompressionWorker::spawn(Arc::new(JpegCodec), 1 << 16).unwrap();
        assert_eq!(worker.state(), SlotState::Idle);
        assert!(worker.wait().is_none());
        assert!(worker.try_wait().is_none());
        worker.shutdown();
        assert_eq!(worker.state(), SlotState::Stopped);
    }

    #[test]
    fn test_job_cycle() {
        let mut worker = CompressionWorker::spawn(Arc::new(JpegCodec), 1 << 16).unwrap();

        assert!(worker.submit(job(16, 16, 1.5)));
        assert_eq!(worker.state(), SlotState::InFlight);
        assert!(worker.pending_bytes() >= 16 * 16);

        let done = worker.wait().expect("job result");
        assert_eq!(done.timestamp, 1.5);
        let frame = done.frame.expect("jpeg encodes a 16x16 frame");
        assert_eq!((frame.width(), frame.height()), (16, 16));
        assert_eq!(worker.state(), SlotState::Idle);
    }

    #[test]
    fn test_over_budget_frame_dropped() {
        // StoreCodec output is 64 * 64 bytes, far over a 100 byte budget
        let codec = Arc::new(StoreCodec { delay: Duration::ZERO });
        let mut worker = CompressionWorker::spawn(codec, 100).unwrap();

        assert!(worker.submit(job(64, 64, 2.0)));
        let done = worker.wait().unwrap();
        assert_eq!(done.timestamp, 2.0);
        assert!(done.frame.is_none());
    }

    #[test]
    fn test_try_wait_eventually_collects() {
        let codec = Arc::new(StoreCodec { delay: Duration::from_millis(20) });
        let mut worker = CompressionWorker::spawn(codec, 1 << 20).unwrap();
        assert!(worker.submit(job(8, 8, 0.0)));

        let mut collected = None;
        for _ in 0..500 {
            if let Some(done) = worker.try_wait() {
                collected = Some(done);
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(collected.expect("result within a second").frame.is_some());
    }

    #[test]
    fn test_shutdown_with_job_in_flight() {
        let codec = Arc::new(StoreCodec { delay: Duration::from_millis(50) });
        let mut worker = CompressionWorker::spawn(codec, 1 << 20).unwrap();
        assert!(worker.submit(job(32, 32, 3.0)));

        worker.shutdown();
        assert_eq!(worker.state(), SlotState::Stopped);
        assert_eq!(worker.pending_bytes(), 0);

        // Idempotent, and a stopped slot accepts nothing
        worker.shutdown();
        assert!(!worker.submit(job(4, 4, 4.0)));
    }

    #[test]
    fn test_stop_token() {
        let token = StopToken::default();
        let shared = token.clone();
        assert!(!shared.is_stopped());
        token.stop();
        assert!(shared.is_stopped());
    }
}
