//! Playback telemetry capture pipeline
mod buffer;
mod dashboard;
mod emitter;
mod scheduler;
mod simulator;
mod stats;

use buffer::TelemetryBuffer;
use emitter::MetricEmitter;
use scheduler::{DrainScheduler, LogRead};
use simulator::SimulatedPlayer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

const TICK_MS: u64 = 100;
const POLL_MS: u64 = 500;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_SECS: f64 = 30.0;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (session_secs, port) = parse_args();

    println!("{}", "=".repeat(70));
    println!("PLAYBACK TELEMETRY PIPELINE");
    println!("{}", "=".repeat(70));
    println!("\nSimulated live session: {session_secs}s");
    println!("Aggregation cadence: {TICK_MS}ms, poll cadence: {POLL_MS}ms");
    println!("Poll endpoint: http://127.0.0.1:{port}/log (returns STOP when done)");
    println!("{}", "=".repeat(70));

    let buffer = TelemetryBuffer::new();
    let (latency_tx, _) = broadcast::channel(100);
    let emitter = MetricEmitter::new(buffer.clone()).with_latency_display(latency_tx.clone());
    let finished = Arc::new(AtomicBool::new(false));
    let player = Arc::new(SimulatedPlayer::new(session_secs, finished.clone()));
    let scheduler = DrainScheduler::new(
        player,
        emitter.clone(),
        buffer.clone(),
        finished.clone(),
        "video",
    );

    tokio::spawn(dashboard::serve(port, scheduler.clone(), latency_tx));

    emitter.metric("client_running", 1.0).await;
    emitter
        .log(&format!("session started: {session_secs}s simulated live stream"))
        .await;
    emitter.metric("playing", 1.0).await;

    let mut tick_interval = interval(Duration::from_millis(TICK_MS));
    // stand-in for the external transport poller
    let mut poll_interval = interval(Duration::from_millis(POLL_MS));
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut session_closed = false;
    let mut lines_forwarded = 0u64;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                emitter.log("interrupted, closing session").await;
                close_session(&emitter).await;
                if let LogRead::Content(text) = scheduler.read_log().await {
                    lines_forwarded += forward(&text);
                }
                break;
            }

            _ = tick_interval.tick() => {
                scheduler.tick().await;
                if finished.load(Ordering::Acquire) && !session_closed {
                    session_closed = true;
                    close_session(&emitter).await;
                }
            }

            _ = poll_interval.tick() => {
                match scheduler.read_log().await {
                    LogRead::Stop => break,
                    LogRead::Content(text) => lines_forwarded += forward(&text),
                }
            }
        }
    }

    println!("\n{}", "=".repeat(70));
    println!("SESSION COMPLETE");
    println!("{}", "=".repeat(70));
    println!("  Metric lines forwarded: {lines_forwarded}");
}

async fn close_session(emitter: &MetricEmitter) {
    emitter.metric("playing", 0.0).await;
    emitter.metric("client_running", 0.0).await;
    emitter.log("playback ended").await;
}

/// Hands drained lines to the local sink: comments to the console, metric
/// lines counted the way the remote collector would ingest them.
fn forward(text: &str) -> u64 {
    let mut metric_lines = 0;
    for line in text.lines() {
        if line.starts_with('#') {
            println!("{line}");
        } else {
            metric_lines += 1;
        }
    }
    metric_lines
}

fn parse_args() -> (f64, u16) {
    let mut session_secs = DEFAULT_SESSION_SECS;
    let mut port = DEFAULT_PORT;

    let args: Vec<String> = std::env::args().collect();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--session-secs" => {
                if let Some(v) = iter.next().and_then(|v| v.parse().ok()) {
                    session_secs = v;
                }
            }
            "--port" => {
                if let Some(v) = iter.next().and_then(|v| v.parse().ok()) {
                    port = v;
                }
            }
            other => {
                eprintln!("[WARN] ignoring unknown argument: {other}");
            }
        }
    }

    (session_secs, port)
}
