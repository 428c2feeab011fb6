//! Windowed statistics over completed HTTP segment requests
use serde::{Deserialize, Serialize};

/// Request category carrying playable media data.
pub const MEDIA_SEGMENT: &str = "MediaSegment";

/// How far back in the request history one cycle looks.
const SCAN_DEPTH: usize = 20;
/// How many qualifying requests one cycle aggregates over.
const WINDOW_SIZE: usize = 4;

/// One completed network request, as reported by the player's request
/// instrumentation. Timestamps are wall-clock milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSample {
    pub request_type: String,
    pub status_code: u16,
    pub stream_type: String,
    pub request_time_ms: f64,
    pub response_time_ms: f64,
    pub finish_time_ms: f64,
    /// Playable duration of the fetched segment, seconds.
    pub media_duration: Option<f64>,
    /// Server-advertised estimated throughput (bps), when present.
    pub extended_throughput_hint: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    pub average: f64,
    pub high: f64,
    pub low: f64,
    pub count: usize,
}

impl Aggregate {
    /// Unweighted mean/max/min. `values` must be non-empty.
    fn over(values: &[f64]) -> Self {
        let sum: f64 = values.iter().sum();
        Self {
            average: sum / values.len() as f64,
            high: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            low: values.iter().copied().fold(f64::INFINITY, f64::min),
            count: values.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpStats {
    pub latency: Aggregate,
    pub download: Aggregate,
    pub ratio: Aggregate,
    /// Throughput hint from the last request in the window, bps; 0 if absent.
    pub etp: f64,
}

/// Computes latency/download/ratio statistics for `stream_type` over the
/// trailing window of `requests`. Returns `None` when no request qualifies,
/// in which case the caller skips the cycle's derived metrics entirely.
///
/// Zero download aggregates make the ratios non-finite; that is left to the
/// emitter's coercion rather than guarded here.
pub fn compute(stream_type: &str, requests: &[RequestSample]) -> Option<HttpStats> {
    let scan_start = requests.len().saturating_sub(SCAN_DEPTH);
    let qualifying: Vec<&RequestSample> = requests[scan_start..]
        .iter()
        .filter(|req| {
            (200..300).contains(&req.status_code)
                && req.request_type == MEDIA_SEGMENT
                && req.stream_type == stream_type
                && req.media_duration.is_some_and(|d| d != 0.0)
        })
        .collect();
    let window = &qualifying[qualifying.len().saturating_sub(WINDOW_SIZE)..];
    if window.is_empty() {
        return None;
    }

    let latencies: Vec<f64> = window
        .iter()
        .map(|req| (req.response_time_ms - req.request_time_ms).abs() / 1000.0)
        .collect();
    let downloads: Vec<f64> = window
        .iter()
        .map(|req| (req.finish_time_ms - req.response_time_ms).abs() / 1000.0)
        .collect();
    let durations: Vec<f64> = window
        .iter()
        .map(|req| req.media_duration.unwrap_or(0.0))
        .collect();

    let latency = Aggregate::over(&latencies);
    let download = Aggregate::over(&downloads);
    let duration = Aggregate::over(&durations);

    // Not per-sample ratios: the best case pairs a duration extreme with the
    // opposite download extreme, the worst case the other way around.
    let ratio = Aggregate {
        average: duration.average / download.average,
        high: duration.high / download.low,
        low: duration.low / download.high,
        count: duration.count,
    };

    let etp = window
        .last()
        .and_then(|req| req.extended_throughput_hint)
        .unwrap_or(0.0);

    Some(HttpStats {
        latency,
        download,
        ratio,
        etp,
    })
}
