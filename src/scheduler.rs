//! Periodic metric aggregation and the external poll interface
use crate::buffer::TelemetryBuffer;
use crate::emitter::MetricEmitter;
use crate::stats::{self, RequestSample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the player collaborators expose each cycle. `None` from the probe
/// means "no active stream yet" and skips the whole cycle.
#[derive(Debug, Clone, Default)]
pub struct PlayerSnapshot {
    pub max_quality: i64,
    /// Buffered media ahead of the playhead, seconds.
    pub buffer_length: f64,
    pub dropped_frames: u64,
    /// Bitrate of the active representation, kbps.
    pub reported_bitrate: f64,
    pub framerate: f64,
    pub resolution_width: u32,
    pub resolution_height: u32,
    /// 0-based quality index of the active representation.
    pub quality: u32,
    pub live_latency: f64,
    pub playhead_time: f64,
    pub playback_rate: f64,
    /// Player-measured average throughput, bps.
    pub average_throughput: f64,
    pub http_requests: Vec<RequestSample>,
}

pub trait PlayerProbe: Send + Sync {
    fn snapshot(&self) -> Option<PlayerSnapshot>;
}

/// Result of one poll: drained telemetry text, or the signal to stop polling.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRead {
    Content(String),
    Stop,
}

impl LogRead {
    /// Wire form handed to the transport: the drained text, or the literal
    /// `STOP` sentinel.
    pub fn into_body(self) -> String {
        match self {
            LogRead::Content(text) => text,
            LogRead::Stop => "STOP".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct DrainScheduler {
    probe: Arc<dyn PlayerProbe>,
    emitter: MetricEmitter,
    buffer: TelemetryBuffer,
    finished: Arc<AtomicBool>,
    stream_type: String,
}

impl DrainScheduler {
    pub fn new(
        probe: Arc<dyn PlayerProbe>,
        emitter: MetricEmitter,
        buffer: TelemetryBuffer,
        finished: Arc<AtomicBool>,
        stream_type: impl Into<String>,
    ) -> Self {
        Self {
            probe,
            emitter,
            buffer,
            finished,
            stream_type: stream_type.into(),
        }
    }

    /// One aggregation cycle: emit the cheap state metrics from the snapshot,
    /// then the windowed HTTP metrics when a window exists this cycle.
    pub async fn tick(&self) {
        let Some(snapshot) = self.probe.snapshot() else {
            return;
        };
        let emitter = &self.emitter;

        emitter.metric("max_quality", snapshot.max_quality).await;
        emitter.metric("buffer_length", snapshot.buffer_length).await;
        emitter.metric("dropped_frames", snapshot.dropped_frames).await;
        emitter
            .metric("reported_bitrate", snapshot.reported_bitrate.round())
            .await;
        emitter.metric("framerate", snapshot.framerate).await;
        emitter
            .metric("resolution_width", snapshot.resolution_width)
            .await;
        emitter
            .metric("resolution_height", snapshot.resolution_height)
            .await;
        emitter.metric("quality", snapshot.quality + 1).await;
        emitter.metric("live_latency", snapshot.live_latency).await;
        emitter.metric("playhead_time", snapshot.playhead_time).await;
        emitter
            .metric("playback_rate", round2(snapshot.playback_rate))
            .await;

        let Some(stats) = stats::compute(&self.stream_type, &snapshot.http_requests) else {
            return;
        };
        emitter
            .metric("mtp", round3(snapshot.average_throughput / 1000.0))
            .await;

        emitter.metric("download_low", round2(stats.download.low)).await;
        emitter
            .metric("download_average", round2(stats.download.average))
            .await;
        emitter.metric("download_high", round2(stats.download.high)).await;

        emitter.metric("latency_low", round2(stats.latency.low)).await;
        emitter
            .metric("latency_average", round2(stats.latency.average))
            .await;
        emitter.metric("latency_high", round2(stats.latency.high)).await;

        emitter.metric("ratio_low", round2(stats.ratio.low)).await;
        emitter
            .metric("ratio_average", round2(stats.ratio.average))
            .await;
        emitter.metric("ratio_high", round2(stats.ratio.high)).await;

        emitter.metric("etp", round3(stats.etp / 1000.0)).await;
    }

    /// Drains the buffer for the external poller. `Stop` once the session is
    /// finished and nothing is left to hand over; a drain fault also maps to
    /// `Stop` rather than propagating into the transport.
    pub async fn read_log(&self) -> LogRead {
        match self.buffer.drain().await {
            Ok(text) => {
                if text.is_empty() && self.finished.load(Ordering::Acquire) {
                    LogRead::Stop
                } else {
                    LogRead::Content(text)
                }
            }
            Err(err) => {
                tracing::error!(%err, "drain failed, terminating telemetry poll");
                LogRead::Stop
            }
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
