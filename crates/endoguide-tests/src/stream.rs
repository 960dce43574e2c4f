//! Integration tests for the stream processor.
//!
//! Exercises endoguide-pipeline end to end with endoguide-analysis stages,
//! the edge dispatcher and closure-backed models.

use endoguide_core::{
    EndoGuideError, FnInference, Frame, FrameIdGenerator, PipelineConfig, PixelBuffer, Prediction,
    PreprocessedFrame, Rect, SharedInference,
};
use endoguide_edge::EdgeDeviceProfile;
use endoguide_pipeline::{PipelineStage, StreamProcessor, StreamState};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ── Helpers ────────────────────────────────────────────────────

fn lesion_frame(ids: &FrameIdGenerator) -> Frame {
    let buffer = PixelBuffer::lesion_pattern(160, 120, Rect::new(60.0, 40.0, 40.0, 30.0));
    Frame::new(ids.next_id(), buffer)
}

fn model_with_latency(latency: Duration) -> SharedInference {
    FnInference::new(move |_: &PreprocessedFrame| {
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        Ok(Prediction::new("adenoma", 0.85))
    })
    .with_name("test-model")
    .shared()
}

fn stream(config: PipelineConfig, model: SharedInference) -> StreamProcessor {
    StreamProcessor::with_profile(config, model, EdgeDeviceProfile::generic_cpu()).unwrap()
}

// ── Paced stream ───────────────────────────────────────────────

#[test]
fn paced_single_worker_stream_keeps_order() {
    let sp = stream(
        PipelineConfig {
            worker_count: 1,
            queue_capacity: 5,
            ..Default::default()
        },
        model_with_latency(Duration::ZERO),
    );
    sp.start().unwrap();

    let ids = FrameIdGenerator::new();
    let period = Duration::from_millis(33);
    let mut received = Vec::new();
    let mut next = Instant::now();
    for n in 1..=100 {
        assert!(sp.submit(lesion_frame(&ids)).is_accepted());
        // Drain well before the result queue could fill
        if n % 10 == 0 {
            received.extend(sp.drain_results().map(|r| r.frame_id.0));
        }
        next += period;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
    received.extend(sp.drain_results().map(|r| r.frame_id.0));
    sp.stop();

    assert_eq!(received.len(), 100);
    assert!(received.windows(2).all(|w| w[0] < w[1]), "{received:?}");
    assert_eq!(sp.dropped_frames(), 0);

    let health = sp.health();
    assert_eq!(health.performance.total_processed, 100);
    assert_eq!(health.performance.dropped_frames, 0);
    assert_eq!(health.dropped_results, 0);
    assert!(health.performance.p99_ms >= health.performance.p95_ms);
    assert!(health.performance.p95_ms >= health.performance.avg_ms);

    let json = serde_json::to_value(&health).unwrap();
    assert_eq!(json["state"], "stopped");
    assert_eq!(json["device"]["device_class"], "generic_cpu");
    assert_eq!(json["performance"]["total_processed"], 100);
}

#[test]
fn multi_worker_stream_yields_every_frame_once() {
    let sp = stream(
        PipelineConfig {
            worker_count: 2,
            queue_capacity: 40,
            ..Default::default()
        },
        model_with_latency(Duration::from_millis(2)),
    );
    sp.start().unwrap();

    let ids = FrameIdGenerator::new();
    for _ in 0..40 {
        assert!(sp.submit(lesion_frame(&ids)).is_accepted());
    }
    let received: Vec<u64> = sp.drain_results().map(|r| r.frame_id.0).collect();
    sp.stop();

    let unique: HashSet<u64> = received.iter().copied().collect();
    assert_eq!(received.len(), 40);
    assert_eq!(unique, (0..40).collect::<HashSet<_>>());
}

#[test]
fn results_carry_analysis_for_lesion_frames() {
    let sp = stream(PipelineConfig::default(), model_with_latency(Duration::ZERO));
    sp.start().unwrap();
    let ids = FrameIdGenerator::new();
    sp.submit(lesion_frame(&ids));

    let result = sp.drain_results().next().unwrap();
    sp.stop();

    assert!(!result.is_degraded(), "{:?}", result.faults);
    assert_eq!(result.prediction.unwrap().label, "adenoma");
    let boundary = &result.segmentation.unwrap().boundaries[0];
    assert!(boundary.area > 0.0);
    let depth = result.depth_estimate.unwrap();
    assert!(depth.min_depth_mm <= depth.mean_depth_mm && depth.mean_depth_mm <= depth.max_depth_mm);
    let margin = result.safe_margin.unwrap();
    assert!((0.0..=1.0).contains(&margin.safety_score));
    assert!(!margin.recommendations.is_empty());
}

// ── Overload ───────────────────────────────────────────────────

#[test]
fn overload_drops_oldest_and_bounds_queue() {
    let config = PipelineConfig {
        queue_capacity: 5,
        result_capacity: 1_000,
        max_latency_ms: 55.0,
        ..Default::default()
    };
    let (window, budget) = (config.monitor_window, config.max_latency_ms);
    let sp = stream(config, model_with_latency(Duration::from_millis(50)));
    sp.start().unwrap();

    let ids = FrameIdGenerator::new();
    let mut evicted = 0u64;
    for _ in 0..1_000 {
        if !sp.submit(lesion_frame(&ids)).is_accepted() {
            evicted += 1;
        }
        assert!(sp.queue_len() <= 5);
    }
    let results: Vec<_> = sp.drain_results().collect();
    sp.stop();

    assert!(evicted > 0);
    assert_eq!(sp.dropped_frames(), evicted);
    assert_eq!(results.len() as u64 + evicted, 1_000);
    assert!(results.iter().all(|r| r.processing_time_ms >= 50.0));
    assert!(results.iter().all(|r| r.latency_violation == (r.processing_time_ms > budget)));

    // One worker: results arrive in the order the monitor recorded them
    let stats = sp.health().performance;
    let recent = &results[results.len().saturating_sub(window)..];
    let over = recent.iter().filter(|r| r.processing_time_ms > budget).count();
    assert_eq!(stats.sample_count, recent.len());
    assert_eq!(stats.violation_count, over);
    assert!((stats.violation_rate - over as f64 / recent.len() as f64).abs() < 1e-9);
    assert_eq!(stats.dropped_frames, evicted);
    assert_eq!(sp.health().dropped_results, 0);
}

#[test]
fn concurrent_producers_respect_capacity() {
    let sp = Arc::new(stream(
        PipelineConfig {
            queue_capacity: 3,
            ..Default::default()
        },
        model_with_latency(Duration::from_millis(5)),
    ));
    let ids = Arc::new(FrameIdGenerator::new());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let (sp, ids) = (sp.clone(), ids.clone());
            thread::spawn(move || {
                for _ in 0..50 {
                    sp.submit(lesion_frame(&ids));
                    assert!(sp.queue_len() <= 3);
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    assert_eq!(sp.queue_len(), 3);
    assert_eq!(sp.dropped_frames(), 197);
}

// ── Fault isolation ────────────────────────────────────────────

#[test]
fn failing_inference_keeps_stream_running() {
    let model = FnInference::new(|input: &PreprocessedFrame| {
        match input.frame_id.0 % 3 {
            0 => Err(EndoGuideError::Inference("transient model error".into())),
            1 => panic!("model crashed on frame {}", input.frame_id),
            _ => Ok(Prediction::new("ok", 0.7)),
        }
    })
    .shared();
    let sp = stream(
        PipelineConfig {
            queue_capacity: 32,
            ..Default::default()
        },
        model,
    );
    sp.start().unwrap();

    let ids = FrameIdGenerator::new();
    for _ in 0..30 {
        sp.submit(lesion_frame(&ids));
    }
    let results: Vec<_> = sp.drain_results().collect();
    assert_eq!(sp.state(), StreamState::Running);
    sp.stop();

    assert_eq!(results.len(), 30);
    for result in &results {
        let failed = result.frame_id.0 % 3 != 2;
        assert_eq!(result.is_degraded(), failed, "frame {}", result.frame_id);
        assert_eq!(result.prediction.is_none(), failed);
        if failed {
            assert_eq!(result.faults[0].stage, PipelineStage::Inference);
        }
        // Analysis is independent of the model
        assert!(result.segmentation.is_some());
    }
}

// ── Shutdown ───────────────────────────────────────────────────

#[test]
fn stop_is_bounded_and_leaves_no_workers() {
    let config = PipelineConfig {
        worker_count: 4,
        poll_interval_ms: 20,
        shutdown_timeout_ms: 2_000,
        ..Default::default()
    };
    let sp = stream(config, model_with_latency(Duration::from_millis(50)));
    sp.start().unwrap();
    let ids = FrameIdGenerator::new();
    for _ in 0..20 {
        sp.submit(lesion_frame(&ids));
    }
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    sp.stop();
    // One poll interval plus one in-flight frame, with generous slack
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert_eq!(sp.state(), StreamState::Stopped);
    assert_eq!(sp.live_workers(), 0);

    // Frames dequeued before the stop was observed still deliver results
    let delivered = sp.drain_results().count();
    assert!(delivered >= 1);
}

#[test]
fn restart_after_stop_processes_queued_frames() {
    let sp = stream(
        PipelineConfig {
            queue_capacity: 8,
            ..Default::default()
        },
        model_with_latency(Duration::ZERO),
    );
    let ids = FrameIdGenerator::new();

    sp.start().unwrap();
    sp.stop();
    for _ in 0..4 {
        sp.submit(lesion_frame(&ids));
    }
    assert_eq!(sp.queue_len(), 4);

    sp.start().unwrap();
    assert_eq!(sp.drain_results().count(), 4);
    sp.stop();
}
