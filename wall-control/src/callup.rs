use crate::command_file::Command;
use async_trait::async_trait;
use mockall::automock;

/// Receiver of callups from every ingestion front-end. Monitors and slots are 0-based.
#[automock]
#[async_trait]
pub trait CallupSink: Send + Sync + 'static {
    async fn callup(&self, monitor: usize, camera: u32, preset: u32);
    async fn callup_uri(&self, uri: &str, slot: usize);
    async fn set_sequencing(&self, monitor: usize, enabled: bool);
}

pub async fn dispatch(sink: &dyn CallupSink, command: &Command) {
    match *command {
        Command::Callup {
            monitor,
            camera,
            preset,
        } => sink.callup(monitor, camera, preset).await,
        Command::Sequencing { monitor, enabled } => sink.set_sequencing(monitor, enabled).await,
    }
}
