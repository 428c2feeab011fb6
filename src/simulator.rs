//! Simulated live playback session standing in for a real player
use crate::scheduler::{PlayerProbe, PlayerSnapshot};
use crate::stats::{RequestSample, MEDIA_SEGMENT};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const SEGMENT_DURATION_SECS: f64 = 2.0;
const REQUEST_HISTORY_CAP: usize = 100;
const QUALITY_LADDER: &[(f64, u32, u32)] = &[
    // kbps, width, height
    (1_500.0, 854, 480),
    (3_000.0, 1280, 720),
    (6_000.0, 1920, 1080),
];

/// Fabricates segment requests and playback state on a fixed cadence, and
/// trips the shared finished flag at the end of the session.
pub struct SimulatedPlayer {
    session_secs: f64,
    finished: Arc<AtomicBool>,
    state: Mutex<SimState>,
}

struct SimState {
    started_at: Instant,
    requests: Vec<RequestSample>,
    segments_fetched: u64,
    quality: usize,
    dropped_frames: u64,
}

impl SimulatedPlayer {
    pub fn new(session_secs: f64, finished: Arc<AtomicBool>) -> Self {
        Self {
            session_secs,
            finished,
            state: Mutex::new(SimState {
                started_at: Instant::now(),
                requests: Vec::new(),
                segments_fetched: 0,
                quality: 1,
                dropped_frames: 0,
            }),
        }
    }

    fn fabricate_segment(&self, state: &mut SimState) {
        let mut rng = rand::thread_rng();

        // occasional manifest refresh, filtered out by the stats window
        if state.segments_fetched % 5 == 0 {
            state.requests.push(RequestSample {
                request_type: "MPD".to_string(),
                status_code: 200,
                stream_type: "video".to_string(),
                request_time_ms: now_ms() - 30.0,
                response_time_ms: now_ms() - 10.0,
                finish_time_ms: now_ms(),
                media_duration: None,
                extended_throughput_hint: None,
            });
        }

        let latency_ms = rng.gen_range(20.0..80.0);
        let download_ms = rng.gen_range(150.0..700.0);
        let finish = now_ms();
        let response = finish - download_ms;
        state.requests.push(RequestSample {
            request_type: MEDIA_SEGMENT.to_string(),
            status_code: 200,
            stream_type: "video".to_string(),
            request_time_ms: response - latency_ms,
            response_time_ms: response,
            finish_time_ms: finish,
            media_duration: Some(SEGMENT_DURATION_SECS),
            extended_throughput_hint: if rng.gen_bool(0.3) {
                Some(rng.gen_range(2_000_000.0..8_000_000.0))
            } else {
                None
            },
        });
        state.segments_fetched += 1;

        if state.requests.len() > REQUEST_HISTORY_CAP {
            state.requests.remove(0);
        }

        // slow random walk over the quality ladder
        if rng.gen_bool(0.2) {
            state.quality = if rng.gen_bool(0.5) {
                (state.quality + 1).min(QUALITY_LADDER.len() - 1)
            } else {
                state.quality.saturating_sub(1)
            };
        }
        if rng.gen_bool(0.05) {
            state.dropped_frames += rng.gen_range(1..4u64);
        }
    }
}

impl PlayerProbe for SimulatedPlayer {
    fn snapshot(&self) -> Option<PlayerSnapshot> {
        let mut state = self.state.lock().ok()?;
        let elapsed = state.started_at.elapsed().as_secs_f64();

        if elapsed >= self.session_secs {
            self.finished.store(true, Ordering::Release);
            return None;
        }

        let due = (elapsed / SEGMENT_DURATION_SECS) as u64 + 1;
        while state.segments_fetched < due {
            self.fabricate_segment(&mut state);
        }

        let mut rng = rand::thread_rng();
        let (bitrate, width, height) = QUALITY_LADDER[state.quality];
        Some(PlayerSnapshot {
            max_quality: QUALITY_LADDER.len() as i64 - 1,
            buffer_length: (SEGMENT_DURATION_SECS + rng.gen_range(-0.5..0.5)).max(0.0),
            dropped_frames: state.dropped_frames,
            reported_bitrate: bitrate,
            framerate: 30.0,
            resolution_width: width,
            resolution_height: height,
            quality: state.quality as u32,
            live_latency: 1.5 + rng.gen_range(-0.3..0.3),
            playhead_time: elapsed,
            playback_rate: 1.0 + rng.gen_range(-0.05..0.05),
            average_throughput: bitrate * 1000.0 * rng.gen_range(1.1..1.8),
            http_requests: state.requests.clone(),
        })
    }
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;

    #[test]
    fn snapshot_carries_a_computable_window() {
        let finished = Arc::new(AtomicBool::new(false));
        let player = SimulatedPlayer::new(60.0, finished.clone());
        let snapshot = player.snapshot().expect("session is running");
        assert!(stats::compute("video", &snapshot.http_requests).is_some());
        assert!(!finished.load(Ordering::Acquire));
    }

    #[test]
    fn session_end_trips_finished_and_stops_snapshots() {
        let finished = Arc::new(AtomicBool::new(false));
        let player = SimulatedPlayer::new(0.0, finished.clone());
        assert!(player.snapshot().is_none());
        assert!(finished.load(Ordering::Acquire));
    }
}
