//! EndoGuide Pipeline - Bounded-latency frame processing
//!
//! Frames flow from a producer into a drop-oldest [`FrameQueue`], through a
//! pool of worker threads running the [`FrameProcessor`], and out of a
//! drop-oldest result queue drained by the caller:
//! - [`StreamProcessor`] owns the lifecycle and the worker pool
//! - [`PerformanceMonitor`] tracks latency percentiles, throughput and drops
//! - [`DropOldestQueue`] keeps memory bounded when the consumer falls behind

pub mod monitor;
pub mod preprocess;
pub mod processor;
pub mod queue;
pub mod stream;

pub use monitor::{PerformanceMonitor, PerformanceStats};
pub use preprocess::preprocess;
pub use processor::{FrameFault, FrameProcessor, PipelineStage, ProcessingResult};
pub use queue::{DropOldestQueue, FrameQueue, PushOutcome};
pub use stream::{PipelineHealth, ResultDrain, StreamProcessor, StreamState};
