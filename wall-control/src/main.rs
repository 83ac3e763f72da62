mod cli;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use wall_control::callup::CallupSink;
use wall_control::camera_registry::CameraRegistry;
use wall_control::command_watcher::CommandWatcher;
use wall_control::http_client::HttpTransport;
use wall_control::settings::Settings;
use wall_control::video_wall::{VideoWall, WallDisplay};

/// Display used when no shell is attached: every slot change is logged.
struct LogDisplay;

#[async_trait]
impl WallDisplay for LogDisplay {
    async fn play(&self, slot: usize, uri: &str) {
        log::info!("viewer {}: playing {}", slot + 1, uri);
    }

    async fn show_unavailable(&self, slot: usize, reason: &str) {
        log::warn!("viewer {}: camera unavailable: {}", slot + 1, reason);
    }

    async fn set_sequencing(&self, slot: usize, enabled: bool) {
        log::info!("viewer {}: sequencing {}", slot + 1, enabled);
    }

    async fn report_status(&self, slot: usize, message: &str) {
        log::info!("viewer {}: {}", slot + 1, message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args = cli::Args::parse();
    let mut settings = Settings::load(&args.settings)?;
    if args.cameras.is_some() {
        settings.camera_file = args.cameras;
    }
    if args.schema.is_some() {
        settings.schema_file = args.schema;
    }
    if args.command_file.is_some() {
        settings.command_file = args.command_file;
    }
    settings.validate()?;

    let registry = CameraRegistry::load(
        settings.camera_file()?,
        &settings.schema_file()?,
        &settings.registry_defaults(),
    )
    .context("camera database could not be loaded")?;
    if args.check {
        log::info!(
            "{} camera(s) valid, {} rejected",
            registry.len(),
            registry.rejected().len()
        );
        return Ok(());
    }

    let transport = Arc::new(HttpTransport::new(settings.request_timeout())?);
    let wall = VideoWall::spawn(
        registry.into_shared(),
        Arc::new(LogDisplay),
        transport,
        settings.wall_options(),
    );
    let sink: Arc<dyn CallupSink> = Arc::new(wall);

    let mut watcher = CommandWatcher::new(settings.command_file()?, settings.poll_interval(), sink)
        .await
        .context("callup file is not accessible")?;
    watcher.initialize().await?;
    watcher.spawn().await?;
    Ok(())
}

fn init_logger() {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .init();
}
