//! `dxo-link` command line entry point
//!
//! Replays captured packet streams into JPEG files and, with the `usb`
//! feature, drives an attached camera.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use dxo_link::replay::replay_live_view_frames;
use dxo_link::SessionConfig;

#[derive(Parser, Debug)]
#[command(name = "dxo-link", version, about = "DXO One USB tethering tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode live-view frames from a capture file
    Replay {
        /// Capture file written by a previous `live-view --capture` run
        capture: PathBuf,

        /// Directory receiving frame_NNNN.jpg files
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the camera status
    #[cfg(feature = "usb")]
    Status,

    /// Print all camera settings
    #[cfg(feature = "usb")]
    Settings,

    /// Take a photo
    #[cfg(feature = "usb")]
    Photo,

    /// Stream live-view frames to disk
    #[cfg(feature = "usb")]
    LiveView {
        /// Directory receiving frame_NNNN.jpg files
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Stop after this many frames
        #[arg(long, default_value_t = 30)]
        frames: usize,

        /// Also record the raw packet stream into this directory
        #[arg(long, env = "DXO_CAPTURE_DIR")]
        capture: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = SessionConfig::from_env();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: SessionConfig) -> anyhow::Result<()> {
    match command {
        Command::Replay { capture, out } => {
            let frames = replay_live_view_frames(&capture, &config)
                .await
                .with_context(|| format!("failed to replay {}", capture.display()))?;
            std::fs::create_dir_all(&out)?;
            for (index, frame) in frames.iter().enumerate() {
                write_frame(&out, index, frame)?;
            }
            log::info!("Wrote {} frames to {}", frames.len(), out.display());
            Ok(())
        }
        #[cfg(feature = "usb")]
        Command::Status => camera::status(config).await,
        #[cfg(feature = "usb")]
        Command::Settings => camera::settings(config).await,
        #[cfg(feature = "usb")]
        Command::Photo => camera::photo(config).await,
        #[cfg(feature = "usb")]
        Command::LiveView {
            out,
            frames,
            capture,
        } => camera::live_view(config, &out, frames, capture.as_deref()).await,
    }
}

fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{:04}.jpg", index))
}

fn write_frame(dir: &Path, index: usize, frame: &[u8]) -> anyhow::Result<()> {
    let path = frame_path(dir, index);
    std::fs::write(&path, frame).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(feature = "usb")]
mod camera {
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::Context;

    use dxo_link::capture::{CaptureMetadata, CaptureState, RecordingTransport};
    use dxo_link::protocol::DXO_VENDOR_ID;
    use dxo_link::rpc::RpcMessage;
    use dxo_link::{Session, SessionConfig, Transport, UsbTransport};

    async fn open(config: SessionConfig) -> anyhow::Result<Session<UsbTransport>> {
        let transport = UsbTransport::open().context("failed to open camera")?;
        Ok(Session::open(transport, config).await?)
    }

    fn print_answer(answer: Option<RpcMessage>) -> anyhow::Result<()> {
        match answer {
            Some(message) => println!("{}", serde_json::to_string_pretty(&message)?),
            None => log::warn!("Camera returned no answer"),
        }
        Ok(())
    }

    pub async fn status(config: SessionConfig) -> anyhow::Result<()> {
        let mut session = open(config).await?;
        let answer = session.get_status().await?;
        session.close().await?;
        print_answer(answer)
    }

    pub async fn settings(config: SessionConfig) -> anyhow::Result<()> {
        let mut session = open(config).await?;
        let answer = session.get_all_settings().await?;
        session.close().await?;
        print_answer(answer)
    }

    pub async fn photo(config: SessionConfig) -> anyhow::Result<()> {
        let mut session = open(config).await?;
        let answer = session.take_photo().await?;
        session.close().await?;
        print_answer(answer)
    }

    pub async fn live_view(
        config: SessionConfig,
        out: &Path,
        frames: usize,
        capture_dir: Option<&Path>,
    ) -> anyhow::Result<()> {
        std::fs::create_dir_all(out)?;
        let usb = UsbTransport::open().context("failed to open camera")?;

        match capture_dir {
            None => stream(Session::open(usb, config).await?, out, frames, None).await,
            Some(dir) => {
                let (in_endpoint, out_endpoint) = (usb.in_endpoint(), usb.out_endpoint());
                let state = Arc::new(CaptureState::new());
                state.start_capture(CaptureMetadata::for_device(
                    DXO_VENDOR_ID,
                    usb.product_id(),
                    "live_view",
                ))?;
                let transport =
                    RecordingTransport::with_endpoints(usb, Arc::clone(&state), in_endpoint, out_endpoint);
                let streamed =
                    stream(Session::open(transport, config).await?, out, frames, Some(state.as_ref())).await;

                let result = state.stop_capture(dir)?;
                log::info!(
                    "Saved {} packets to {}",
                    result.metadata.total_packets,
                    result.packets_path
                );
                streamed
            }
        }
    }

    async fn stream<T: Transport>(
        mut session: Session<T>,
        out: &Path,
        limit: usize,
        capture: Option<&CaptureState>,
    ) -> anyhow::Result<()> {
        let stopper = session.live_view_stopper();
        let mut written = 0usize;
        let mut failure = None;

        let mut sink = |frame: Vec<u8>| {
            if let Err(e) = super::write_frame(out, written, &frame) {
                failure = Some(e);
                stopper.stop();
                return;
            }
            written += 1;
            if let Some(state) = capture {
                state.record_frame();
            }
            if written >= limit.max(1) {
                stopper.stop();
            }
        };
        let stats = session.start_live_view(&mut sink).await?;
        session.close().await?;

        if let Some(e) = failure {
            return Err(e);
        }
        log::info!("Wrote {} of {} stitched frames", written, stats.frames);
        Ok(())
    }
}
