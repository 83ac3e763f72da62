use crate::callup::{self, CallupSink};
use crate::command_file::{self, Batch};
use crate::error::{CommandSyntaxError, ConfigurationError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls the operator's command file and feeds new batches to a sink.
pub struct CommandWatcher {
    path: PathBuf,
    status_path: PathBuf,
    interval: Duration,
    last: Option<String>,
    sink: Arc<dyn CallupSink>,
}

impl CommandWatcher {
    pub async fn new(
        path: &Path,
        interval: Duration,
        sink: Arc<dyn CallupSink>,
    ) -> Result<Self, ConfigurationError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|source| ConfigurationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            status_path: command_file::status_path(path),
            interval,
            last: None,
            sink,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Writes the startup banner so the writer side can confirm access.
    pub async fn initialize(&mut self) -> Result<(), ConfigurationError> {
        let banner = command_file::startup_banner(OffsetDateTime::now_utc());
        tokio::fs::write(&self.path, &banner)
            .await
            .map_err(|source| ConfigurationError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.last = Some(command_file::normalize(&banner));
        log::info!("callup file {} initialized", self.path.display());
        Ok(())
    }

    /// Reads the file once. `None` when unchanged or unreadable.
    pub async fn poll_once(&mut self) -> Option<Result<Batch, CommandSyntaxError>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("cannot read {}: {err}; retrying", self.path.display());
                return None;
            }
        };
        let text = command_file::normalize(&raw);
        if self.last.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last = Some(text.clone());
        log::info!("change detected in {}: {}", self.path.display(), text);

        let outcome = command_file::parse_batch(&text);
        match &outcome {
            Ok(batch) => {
                for command in &batch.commands {
                    callup::dispatch(self.sink.as_ref(), command).await;
                }
                for err in &batch.errors {
                    log::error!("{err}");
                }
            }
            Err(CommandSyntaxError::Empty) => {
                log::debug!("{} is empty", self.path.display());
                return Some(outcome);
            }
            Err(err) => log::error!("{err}"),
        }
        self.write_status(&text, &outcome).await;
        Some(outcome)
    }

    async fn write_status(&self, text: &str, outcome: &Result<Batch, CommandSyntaxError>) {
        let report = command_file::status_report(text, outcome, OffsetDateTime::now_utc());
        if let Err(err) = tokio::fs::write(&self.status_path, report).await {
            log::error!("cannot write {}: {err}", self.status_path.display());
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
