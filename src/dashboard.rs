//! Poll endpoint and live-latency display server
use crate::scheduler::DrainScheduler;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tower_http::cors::CorsLayer;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Playback telemetry</title></head>
<body>
  <h3>Playback telemetry</h3>
  <div id="live-latency">Live latency: - seconds</div>
  <p>Poll <a href="/log">/log</a> for the raw telemetry lines.</p>
  <script>
    const el = document.querySelector('#live-latency');
    const ws = new WebSocket(`ws://${location.host}/ws`);
    ws.onmessage = (msg) => {
      const data = JSON.parse(msg.data);
      el.textContent = `Live latency: ${data.live_latency} seconds`;
    };
  </script>
</body>
</html>
"#;

#[derive(Clone)]
struct DashboardState {
    scheduler: DrainScheduler,
    latency_tx: broadcast::Sender<f64>,
}

/// Serves `GET /log` (the poll interface: drained lines, or the literal
/// `STOP` body once the session is over) and `/ws` (display updates).
pub async fn serve(port: u16, scheduler: DrainScheduler, latency_tx: broadcast::Sender<f64>) {
    let app = Router::new()
        .route("/", get(index))
        .route("/log", get(read_log))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(DashboardState {
            scheduler,
            latency_tx,
        });

    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port, %err, "failed to bind telemetry endpoint");
            return;
        }
    };
    tracing::info!("telemetry poll endpoint: http://127.0.0.1:{port}/log");

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(%err, "telemetry endpoint stopped");
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn read_log(State(state): State<DashboardState>) -> String {
    state.scheduler.read_log().await.into_body()
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<DashboardState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state.latency_tx))
}

async fn handle_socket(socket: WebSocket, tx: broadcast::Sender<f64>) {
    let (mut sink, mut stream) = socket.split();
    let mut rx = tx.subscribe();
    let mut ping_interval = interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            Ok(latency) = rx.recv() => {
                let payload = serde_json::json!({ "live_latency": latency }).to_string();
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}
