//! Headless skeleton monitor.
//!
//! Run with: cargo run -p skeleton-monitor -- --host 127.0.0.1 --port 8765
//!
//! Connects to the tracking service, samples both hands at a fixed tick
//! rate the way a renderer would, and logs reactive changes as a UI would
//! receive them. `RUST_LOG=debug` shows per-tick hand output.

use std::{sync::Arc, time::Duration};

use clap::Parser;
use futures::{StreamExt, stream::BoxStream};
use handsync_core::{
    ConnectionState, Handedness, StoreChange, SyncStore,
    render::{self, HandVisual, RenderSample},
};
use handsync_transport::{SyncConfig, WsConnectionManager, WsConnector};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "skeleton-monitor", about = "Watch the hand-pose stream")]
struct Cli {
    /// Tracker host
    #[arg(long, env = "HANDSYNC_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Tracker WebSocket port
    #[arg(long, env = "HANDSYNC_PORT", default_value_t = 8765)]
    port: u16,

    /// Camera preview port
    #[arg(long, default_value_t = 8766)]
    stream_port: u16,

    /// Render ticks per second
    #[arg(long, default_value_t = 30)]
    tick_hz: u32,

    /// Ask the tracker to act on gestures once connected
    #[arg(long)]
    activate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(cli.tick_hz > 0, "--tick-hz must be positive");

    let config = SyncConfig::default()
        .with_host(cli.host)
        .with_port(cli.port)
        .with_stream_port(cli.stream_port);
    tracing::info!(stream = %config.stream_url(), "camera preview");

    let store = Arc::new(SyncStore::new());
    let manager = Arc::new(WsConnectionManager::new(config, WsConnector, Arc::clone(&store)));

    let ui_task = tokio::spawn(log_changes(Arc::clone(&store)));
    // Subscribed before `start` so the first open is not missed.
    let activate_task = cli
        .activate
        .then(|| tokio::spawn(keep_active(Arc::clone(&manager), store.changes())));

    manager.start().await;

    let mut ticker = tokio::time::interval(Duration::from_secs(1) / cli.tick_hz);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_frame = None;
    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    tracing::warn!("failed to listen for ctrl-c: {e}");
                }
                break;
            }
            _ = ticker.tick() => {
                let frame_id = store.frame_id();
                let sample = render::sample(store.as_ref());
                if last_frame != Some(frame_id) {
                    draw(frame_id, &sample);
                    last_frame = Some(frame_id);
                }
            }
        }
    }

    if let Some(task) = activate_task {
        task.abort();
    }
    manager.disconnect().await;
    ui_task.abort();
    Ok(())
}

/// Stand-in for UI bindings: one line per reactive change.
async fn log_changes(store: Arc<SyncStore>) {
    let mut changes = store.changes();
    while let Some(change) = changes.next().await {
        match change {
            StoreChange::Connection(state) => tracing::info!(?state, "connection"),
            StoreChange::Active(active) => tracing::info!(active, "control"),
            StoreChange::InferenceTime(ms) => tracing::trace!(ms, "inference time"),
            StoreChange::Fps(fps) => tracing::info!("fps {fps:.1}"),
            StoreChange::LastEvent(event) => tracing::info!(
                event_type = ?event.event_type,
                gesture = %event.gesture,
                hand_id = %event.hand_id,
                hold_ms = event.hold_duration,
                "gesture event"
            ),
        }
    }
}

/// Ask the tracker to act on gestures each time the socket opens.
async fn keep_active(manager: Arc<WsConnectionManager>, mut changes: BoxStream<'static, StoreChange>) {
    while let Some(change) = changes.next().await {
        if change == StoreChange::Connection(ConnectionState::Connected) {
            manager.set_active(true);
        }
    }
}

fn draw(frame_id: u64, sample: &RenderSample) {
    for side in [Handedness::Left, Handedness::Right] {
        match sample.side(side) {
            Some(visual) => draw_hand(frame_id, side, visual),
            None => tracing::debug!(frame_id, side = side.as_str(), "hidden"),
        }
    }
}

fn draw_hand(frame_id: u64, side: Handedness, visual: &HandVisual) {
    let pose = &visual.pose;
    let tips: Vec<String> = render::FINGERTIPS
        .iter()
        .map(|&i| {
            let p = pose.landmarks[i];
            format!("({:.2},{:.2},{:.2})", p.x, p.y, p.z)
        })
        .collect();
    let wrist = pose.wrist();

    tracing::debug!(
        frame_id,
        side = side.as_str(),
        gesture = %pose.gesture,
        score = pose.gesture_score,
        lifecycle = ?pose.lifecycle,
        color = %visual.color,
        "wrist ({:.2},{:.2},{:.2}) tips {}",
        wrist.x,
        wrist.y,
        wrist.z,
        tips.join(" ")
    );
}
