//! Metric and log line formatting in front of the buffer
use crate::buffer::TelemetryBuffer;
use chrono::Local;
use std::fmt;
use tokio::sync::broadcast;

/// Metric that is mirrored to the live-latency display.
pub const LIVE_LATENCY: &str = "live_latency";

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Number(v as f64)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Number(v as f64)
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::Number(f64::from(v))
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

/// Formats metric and log lines and writes them to the buffer. Calls never
/// fail outward: a dead buffer degrades to a diagnostic and a dropped line.
#[derive(Clone)]
pub struct MetricEmitter {
    buffer: TelemetryBuffer,
    latency_tx: Option<broadcast::Sender<f64>>,
}

impl MetricEmitter {
    pub fn new(buffer: TelemetryBuffer) -> Self {
        Self {
            buffer,
            latency_tx: None,
        }
    }

    /// Mirrors `live_latency` values to the given display feed.
    pub fn with_latency_display(mut self, tx: broadcast::Sender<f64>) -> Self {
        self.latency_tx = Some(tx);
        self
    }

    /// Writes one `timestamp;name;value` line. Non-finite numbers (NaN, ±inf
    /// from the ratio metrics' zero-download cycles) are coerced to 0.
    pub async fn metric(&self, name: &str, value: impl Into<MetricValue>) {
        let value = match value.into() {
            MetricValue::Number(n) if !n.is_finite() => MetricValue::Number(0.0),
            v => v,
        };

        if name == LIVE_LATENCY {
            if let (Some(tx), MetricValue::Number(n)) = (&self.latency_tx, &value) {
                // no connected display is fine
                let _ = tx.send(*n);
            }
        }

        let line = format!("{};{};{}\r\n", local_timestamp(), name, value);
        if let Err(err) = self.buffer.write(line).await {
            tracing::warn!(name, %err, "metric line dropped");
        }
    }

    /// Writes one `# text` diagnostic line, with embedded line breaks
    /// stripped so it stays a single line.
    pub async fn log(&self, text: &str) {
        let sanitized: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        tracing::debug!("{sanitized}");
        let line = format!("# {sanitized}\r\n");
        if let Err(err) = self.buffer.write(line).await {
            tracing::warn!(%err, "log line dropped");
        }
    }
}

/// Local wall-clock time, `YYYY-MM-DD HH:MM:SS,mmm`. The fractional separator
/// is a comma because the downstream metric files use `;` as the field
/// separator and get loaded into decimal-comma locales.
fn local_timestamp() -> String {
    let now = Local::now();
    format!(
        "{},{:03}",
        now.format("%Y-%m-%d %H:%M:%S"),
        now.timestamp_subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(line: &str) -> Vec<String> {
        line.split(';').map(str::to_string).collect()
    }

    #[tokio::test]
    async fn metric_line_has_timestamp_name_value() {
        let buffer = TelemetryBuffer::new();
        let emitter = MetricEmitter::new(buffer.clone());
        emitter.metric("buffer_length", 3.25).await;

        let drained = buffer.drain().await.unwrap();
        assert!(drained.ends_with("\r\n"));
        let parts = fields(drained.trim_end());
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], "buffer_length");
        assert_eq!(parts[2], "3.25");
        // 2026-08-25 12:34:56,789
        assert_eq!(parts[0].len(), 23);
        assert_eq!(&parts[0][19..20], ",");
    }

    #[tokio::test]
    async fn non_finite_values_become_zero() {
        let buffer = TelemetryBuffer::new();
        let emitter = MetricEmitter::new(buffer.clone());
        emitter.metric("ratio_average", f64::NAN).await;
        emitter.metric("ratio_high", f64::INFINITY).await;
        emitter.metric("ratio_low", f64::NEG_INFINITY).await;

        let drained = buffer.drain().await.unwrap();
        for line in drained.lines() {
            assert_eq!(fields(line)[2], "0");
        }
    }

    #[tokio::test]
    async fn integer_values_print_without_fraction() {
        let buffer = TelemetryBuffer::new();
        let emitter = MetricEmitter::new(buffer.clone());
        emitter.metric("quality", 3_u32).await;
        emitter.metric("playing", 1.0).await;

        let drained = buffer.drain().await.unwrap();
        let values: Vec<String> = drained.lines().map(|l| fields(l)[2].clone()).collect();
        assert_eq!(values, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn text_values_pass_through() {
        let buffer = TelemetryBuffer::new();
        let emitter = MetricEmitter::new(buffer.clone());
        emitter.metric("framerate", "30000/1001").await;

        let drained = buffer.drain().await.unwrap();
        assert_eq!(fields(drained.trim_end())[2], "30000/1001");
    }

    #[tokio::test]
    async fn log_lines_are_prefixed_and_newline_stripped() {
        let buffer = TelemetryBuffer::new();
        let emitter = MetricEmitter::new(buffer.clone());
        emitter.log("player error:\r\ncode 27\nrecovering").await;

        let drained = buffer.drain().await.unwrap();
        assert_eq!(drained, "# player error:code 27recovering\r\n");
    }

    #[tokio::test]
    async fn live_latency_is_mirrored_to_display() {
        let buffer = TelemetryBuffer::new();
        let (tx, mut rx) = broadcast::channel(8);
        let emitter = MetricEmitter::new(buffer.clone()).with_latency_display(tx);

        emitter.metric(LIVE_LATENCY, 1.5).await;
        emitter.metric("buffer_length", 2.0).await;

        assert_eq!(rx.recv().await.unwrap(), 1.5);
        assert!(rx.try_recv().is_err());
    }
}
