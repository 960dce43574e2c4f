//! Worker pool that drives frames from the input queue to the result queue.
//!
//! Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`. A
//! stopped processor can be started again; frames still queued at `stop()`
//! stay queued for the next run.

use crate::monitor::{PerformanceMonitor, PerformanceStats};
use crate::processor::{FrameProcessor, ProcessingResult};
use crate::queue::{DropOldestQueue, FrameQueue, PushOutcome};
use crossbeam_channel::{Receiver, Sender};
use endoguide_core::{EndoGuideError, Frame, PipelineConfig, Result, SharedInference};
use endoguide_edge::{detect_device, optimize, EdgeDeviceProfile};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Lifecycle state of a [`StreamProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Snapshot returned by [`StreamProcessor::health`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub state: StreamState,
    pub device: EdgeDeviceProfile,
    pub model: String,
    pub worker_count: usize,
    pub queue_len: usize,
    pub queue_capacity: usize,
    /// Frames accepted but not yet turned into a result.
    pub outstanding: usize,
    pub dropped_results: u64,
    pub performance: PerformanceStats,
}

/// State shared with the worker threads.
struct Shared {
    frames: FrameQueue,
    results: DropOldestQueue<ProcessingResult>,
    processor: FrameProcessor,
    inference: SharedInference,
    outstanding: AtomicUsize,
    state: Mutex<StreamState>,
    config: PipelineConfig,
}

impl Shared {
    fn state(&self) -> StreamState {
        *self.state.lock()
    }

    fn set_state(&self, state: StreamState) {
        *self.state.lock() = state;
    }

    /// Account for a frame that will never produce a result.
    fn release_one(&self) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Join handles of the current run.
#[derive(Default)]
struct Workers {
    /// Stop flag of the current run. Each run gets a fresh one, so a worker
    /// detached from an earlier run never sees a later reset.
    stop: Arc<AtomicBool>,
    handles: Vec<(usize, JoinHandle<()>)>,
    exits: Option<Receiver<usize>>,
    /// Workers that missed a shutdown deadline and were left running.
    detached: Vec<JoinHandle<()>>,
}

/// Sends the worker index when dropped, so exit is reported even on unwind.
struct ExitNotice {
    index: usize,
    tx: Sender<usize>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(self.index);
    }
}

/// Multi-threaded frame pipeline with drop-oldest input and output queues.
pub struct StreamProcessor {
    shared: Arc<Shared>,
    profile: EdgeDeviceProfile,
    monitor: Arc<PerformanceMonitor>,
    workers: Mutex<Workers>,
}

impl StreamProcessor {
    /// Validate `config`, probe the device and adapt `inference` to it.
    pub fn new(config: PipelineConfig, inference: SharedInference) -> Result<Self> {
        config.validate()?;
        Self::with_profile(config, inference, detect_device())
    }

    /// Like [`StreamProcessor::new`] with a caller-supplied device profile.
    pub fn with_profile(
        config: PipelineConfig,
        inference: SharedInference,
        profile: EdgeDeviceProfile,
    ) -> Result<Self> {
        config.validate()?;

        let cpus = num_cpus::get();
        if config.worker_count > cpus {
            warn!(
                workers = config.worker_count,
                cpus, "More workers than logical CPUs"
            );
        }

        let monitor = Arc::new(PerformanceMonitor::new(
            config.monitor_window,
            config.max_latency_ms,
            config.target_fps,
        ));
        let inference = optimize(inference, &profile, config.serial_inference);
        let shared = Shared {
            frames: DropOldestQueue::new(config.queue_capacity)?,
            results: DropOldestQueue::new(config.result_capacity)?,
            processor: FrameProcessor::new(&config, monitor.clone()),
            inference,
            outstanding: AtomicUsize::new(0),
            state: Mutex::new(StreamState::Stopped),
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
            profile,
            monitor,
            workers: Mutex::new(Workers::default()),
        })
    }

    /// Enqueue a frame. Never blocks; a full queue evicts its oldest frame,
    /// which is returned in [`PushOutcome::ReplacedOldest`].
    pub fn submit(&self, frame: Frame) -> PushOutcome<Frame> {
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        let outcome = self.shared.frames.push(frame);
        if let PushOutcome::ReplacedOldest(old) = &outcome {
            self.shared.release_one();
            self.monitor.record_drop();
            debug!(frame = %old.id(), "Input queue full, dropped oldest frame");
        }
        outcome
    }

    /// Spawn the worker pool. A no-op with a warning when already running.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        let state = self.shared.state();
        if state != StreamState::Stopped {
            warn!(state = ?state, "start() called while not stopped; ignoring");
            return Ok(());
        }

        self.shared.set_state(StreamState::Starting);
        self.await_detached(&mut workers);
        let stop = Arc::new(AtomicBool::new(false));
        workers.stop = stop.clone();

        let count = self.shared.config.worker_count;
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(count);
        for index in 0..count {
            let shared = self.shared.clone();
            let stop = stop.clone();
            let notice = ExitNotice {
                index,
                tx: exit_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("endoguide-worker-{index}"))
                .spawn(move || {
                    let _notice = notice;
                    worker_loop(index, &shared, &stop);
                });

            match spawned {
                Ok(handle) => workers.handles.push((index, handle)),
                Err(e) => {
                    error!(worker = index, error = %e, "Failed to spawn worker");
                    workers.exits = Some(exit_rx);
                    self.shutdown(&mut workers);
                    return Err(EndoGuideError::Worker(format!(
                        "failed to spawn worker {index}: {e}"
                    )));
                }
            }
        }
        workers.exits = Some(exit_rx);

        self.shared.set_state(StreamState::Running);
        info!(
            workers = count,
            device = %self.profile.device_class,
            model = self.shared.inference.name(),
            "Stream processor running"
        );
        Ok(())
    }

    /// Signal the workers to stop and wait for them, at most
    /// `shutdown_timeout`. Workers that overrun are detached. A no-op when
    /// already stopped.
    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        if self.shared.state() == StreamState::Stopped {
            return;
        }
        self.shutdown(&mut workers);
    }

    fn shutdown(&self, workers: &mut Workers) {
        self.shared.set_state(StreamState::Stopping);
        workers.stop.store(true, Ordering::Release);
        self.shared.frames.wake_all();

        let deadline = Instant::now() + self.shared.config.shutdown_timeout();
        let mut exited = vec![false; workers.handles.len()];
        if let Some(exits) = workers.exits.take() {
            let mut remaining = workers.handles.len();
            while remaining > 0 {
                match exits.recv_deadline(deadline) {
                    Ok(index) => {
                        if let Some(pos) = workers.handles.iter().position(|(i, _)| *i == index) {
                            if !exited[pos] {
                                exited[pos] = true;
                                remaining -= 1;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        }

        let handles: Vec<_> = workers.handles.drain(..).collect();
        for ((index, handle), done) in handles.into_iter().zip(exited) {
            if done {
                if handle.join().is_err() {
                    error!(worker = index, "Worker panicked");
                }
            } else {
                warn!(worker = index, "Worker missed the shutdown deadline; detaching");
                workers.detached.push(handle);
            }
        }
        workers.detached.retain(|h| !h.is_finished());
        let detached = workers.detached.len();

        self.shared.set_state(StreamState::Stopped);
        self.shared.results.wake_all();
        info!(detached, "Stream processor stopped");
    }

    /// Give workers detached by an earlier `stop()` up to `shutdown_timeout`
    /// to finish their last frame before a new pool is spawned.
    fn await_detached(&self, workers: &mut Workers) {
        workers.detached.retain(|h| !h.is_finished());
        if workers.detached.is_empty() {
            return;
        }
        let deadline = Instant::now() + self.shared.config.shutdown_timeout();
        let poll = self.shared.config.poll_interval();
        while workers.detached.iter().any(|h| !h.is_finished()) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(poll.min(left));
        }
        workers.detached.retain(|h| !h.is_finished());
        if !workers.detached.is_empty() {
            warn!(
                detached = workers.detached.len(),
                "Workers from the previous run are still finishing a frame"
            );
        }
    }

    /// Results as they arrive. The iterator ends once every accepted frame
    /// has been accounted for, or the processor is stopped and no results
    /// are left.
    pub fn drain_results(&self) -> ResultDrain<'_> {
        ResultDrain {
            shared: &self.shared,
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn profile(&self) -> &EdgeDeviceProfile {
        &self.profile
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn queue_len(&self) -> usize {
        self.shared.frames.len()
    }

    /// Frames evicted from the input queue.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.frames.dropped_count()
    }

    /// Worker threads still running, including any detached by `stop()`.
    pub fn live_workers(&self) -> usize {
        let workers = self.workers.lock();
        let attached = workers.handles.iter().filter(|(_, h)| !h.is_finished());
        let detached = workers.detached.iter().filter(|h| !h.is_finished());
        attached.count() + detached.count()
    }

    pub fn health(&self) -> PipelineHealth {
        PipelineHealth {
            state: self.state(),
            device: self.profile.clone(),
            model: self.shared.inference.name().to_string(),
            worker_count: self.shared.config.worker_count,
            queue_len: self.shared.frames.len(),
            queue_capacity: self.shared.frames.capacity(),
            outstanding: self.shared.outstanding.load(Ordering::Acquire),
            dropped_results: self.shared.results.dropped_count(),
            performance: self.monitor.snapshot(),
        }
    }
}

impl Drop for StreamProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(index: usize, shared: &Shared, stop: &AtomicBool) {
    let span = info_span!("stream.worker", worker = index);
    let _enter = span.enter();
    debug!("Worker started");

    let poll = shared.config.poll_interval();
    let mut processed = 0u64;
    while !stop.load(Ordering::Acquire) {
        let Some(frame) = shared.frames.pop_timeout(poll) else {
            continue;
        };
        let result = shared.processor.process(frame, shared.inference.as_ref());
        if let PushOutcome::ReplacedOldest(old) = shared.results.push(result) {
            warn!(frame = %old.frame_id, "Result queue full, dropped oldest result");
        }
        shared.release_one();
        processed += 1;
    }

    debug!(processed, "Worker exiting");
}

/// Iterator returned by [`StreamProcessor::drain_results`].
pub struct ResultDrain<'a> {
    shared: &'a Shared,
}

impl Iterator for ResultDrain<'_> {
    type Item = ProcessingResult;

    fn next(&mut self) -> Option<ProcessingResult> {
        let poll = self.shared.config.poll_interval();
        loop {
            if let Some(result) = self.shared.results.pop_timeout(poll) {
                return Some(result);
            }
            let idle = self.shared.outstanding.load(Ordering::Acquire) == 0;
            if idle || self.shared.state() == StreamState::Stopped {
                // A result may have landed between the timeout and the check
                return self.shared.results.try_pop();
            }
        }
    }
}
