use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use droidmirror::clock::SystemClock;
use droidmirror::decoder::{DecoderBackend, new_decoder};
use droidmirror::device::{DeviceError, VideoReader};
use droidmirror::mirror::MirrorSession;
use droidmirror::relay::HostRelay;
use droidmirror::replay::{DEFAULT_FPS, Replay};
use droidmirror::settings::MirrorSettings;
use droidmirror::system;
use droidmirror::wire::WireMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(short, long, env = "DROIDMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides decoder.backend
    #[arg(long, value_enum)]
    backend: Option<DecoderBackend>,

    /// Expect the scrcpy codec header before the stream
    #[arg(long)]
    codec_meta: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plays a recorded Annex-B H.264 file through the mirror
    Replay {
        path: PathBuf,

        /// Pictures per second
        #[arg(long, default_value_t = DEFAULT_FPS, value_parser = clap::value_parser!(u32).range(1..))]
        fps: u32,
    },
    /// Mirrors a live scrcpy video socket
    Connect {
        /// e.g. 127.0.0.1:27183 after `adb forward`
        addr: String,

        /// Name reported for the device, defaults to the address
        #[arg(long)]
        device: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("droidmirror=info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let mut settings =
        MirrorSettings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(backend) = cli.backend {
        settings.decoder.backend = backend;
    }
    if cli.codec_meta {
        settings.device.codec_meta = true;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    rt.block_on(run(cli.command, settings))
}

async fn run(command: Command, settings: MirrorSettings) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (wire_tx, mut wire_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let reader = match command {
        Command::Replay { path, fps } => {
            let recording = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let replay = Replay::new(path.display().to_string(), recording.into(), fps);
            if replay.frame_interval() <= settings.batcher.flush_interval() {
                tracing::warn!(
                    fps,
                    flush_interval = ?settings.batcher.flush_interval(),
                    "frame interval is not above the flush interval, pictures will merge"
                );
            }
            tokio::spawn(replay.run(event_tx, shutdown.child_token()))
        }
        Command::Connect { addr, device } => {
            let stream = tokio::net::TcpStream::connect(&addr)
                .await
                .with_context(|| format!("failed to connect to {addr}"))?;
            stream.set_nodelay(true)?;
            let name = device.unwrap_or_else(|| addr.clone());
            tracing::info!(%name, %addr, "connected to device socket");
            let reader = VideoReader::new(name, stream, settings.device.clone());
            tokio::spawn(reader.run(event_tx, shutdown.child_token()))
        }
    };

    let relay = tokio::spawn(HostRelay::new(settings.batcher.clone()).run(
        event_rx,
        wire_tx,
        shutdown.child_token(),
    ));

    let backend = settings.decoder.backend;
    let mut mirror = MirrorSession::new(
        move || new_decoder(backend),
        SystemClock,
        settings.decoder.clone(),
    );

    let ui = async {
        while let Some(json) = wire_rx.recv().await {
            match mirror.handle_json(&json) {
                Ok(Some(WireMessage::Log { message, .. })) => tracing::error!("{message}"),
                Ok(_) => {}
                Err(err) => tracing::warn!("dropping malformed wire message: {err}"),
            }
        }
    };
    let signal = async {
        if let Err(err) = system::wait_for_signal().await {
            tracing::warn!("signal handlers unavailable: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ui => tracing::info!("video stream finished"),
        _ = signal => tracing::info!("shutting down gracefully..."),
    }
    shutdown.cancel();
    drop(wire_rx);

    match reader.await.context("device reader panicked")? {
        Ok(()) | Err(DeviceError::Eof) | Err(DeviceError::ReceiverClosed) => {}
        Err(err) => tracing::warn!("device reader stopped: {err}"),
    }
    let relay_stats = relay.await.context("host relay panicked")?;

    let surface = mirror.surface();
    tracing::info!(
        chunks = relay_stats.chunks,
        flushes = relay_stats.flushes,
        overflows = relay_stats.overflows,
        frames_drawn = surface.frames_drawn(),
        resizes = surface.resizes(),
        geometry = ?surface.geometry(),
        "mirror finished"
    );
    println!("{}", mirror.stats().to_json()?);
    Ok(())
}
