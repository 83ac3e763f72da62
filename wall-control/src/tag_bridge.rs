use crate::callup::CallupSink;
use crate::error::{ProtocolError, TriggerResolutionError};
use crate::tag_bus::{self, TagBus, TagUpdate};
use crate::tag_mirror::{TagMirror, TagValue};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TRIGGER_SUFFIX: &str = "Trigger";
pub const COMPANION_SUFFIX: &str = "CameraURI";

/// Turns rising edges of `<root>Trigger` tags into URI callups.
pub struct TagBridge {
    bus: Arc<dyn TagBus>,
    sink: Arc<dyn CallupSink>,
    tag_path: String,
    mirror: TagMirror,
}

impl TagBridge {
    pub fn new(bus: Arc<dyn TagBus>, sink: Arc<dyn CallupSink>, tag_path: impl Into<String>) -> Self {
        Self {
            bus,
            sink,
            tag_path: tag_path.into(),
            mirror: TagMirror::new(),
        }
    }

    pub fn mirror(&self) -> &TagMirror {
        &self.mirror
    }

    /// Subscribes and runs the bridge on its own task.
    pub async fn start(self, publish_interval: Duration) -> Result<JoinHandle<()>, ProtocolError> {
        let rx = self.bus.subscribe(&self.tag_path, publish_interval).await?;
        log::info!("subscribed to tag path {}", self.tag_path);
        Ok(tokio::spawn(self.run(rx)))
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<TagUpdate>) {
        while let Some(update) = rx.recv().await {
            if let Err(err) = self.handle(update).await {
                log::warn!("{err}");
            }
        }
        log::info!("tag subscription {} closed", self.tag_path);
    }

    /// Mirrors one update. Returns true when it fired a callup.
    pub async fn handle(&mut self, update: TagUpdate) -> Result<bool, TriggerResolutionError> {
        let TagUpdate {
            name,
            value,
            quality,
        } = update;
        let rising = value.is_true();
        let previous = self
            .mirror
            .update(&name, value, quality, OffsetDateTime::now_utc());
        let Some(root) = name.strip_suffix(TRIGGER_SUFFIX) else {
            return Ok(false);
        };
        if !rising || previous.as_ref().is_some_and(TagValue::is_true) {
            return Ok(false);
        }
        log::info!("{name} raised");

        // Reset first so the edge cannot fire twice.
        let path = tag_bus::tag_path(&self.tag_path, &name);
        if let Err(err) = self.bus.write(&path, TagValue::Bool(false)).await {
            log::error!("failed to reset {path}: {err}");
        }

        let (uri, slot) = self.resolve(root)?;
        log::info!("callup from {name}: {uri} to viewer {}", slot + 1);
        self.sink.callup_uri(&uri, slot).await;
        Ok(true)
    }

    fn resolve(&self, root: &str) -> Result<(String, usize), TriggerResolutionError> {
        let companion = format!("{root}{COMPANION_SUFFIX}");
        let uri = self
            .mirror
            .value(&companion)
            .ok_or_else(|| TriggerResolutionError::MissingCompanion(companion.clone()))?
            .as_text()
            .ok_or_else(|| TriggerResolutionError::EmptyCompanion(companion.clone()))?
            .to_string();
        let slot = slot_index(root)
            .ok_or_else(|| TriggerResolutionError::NoSlotIndex(format!("{root}{TRIGGER_SUFFIX}")))?;
        Ok((uri, slot))
    }
}

/// Trailing digits of a tag root, made 0-based. `Cam01` is slot 0.
pub fn slot_index(root: &str) -> Option<usize> {
    let digits = root.len() - root.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    root[root.len() - digits..]
        .parse::<usize>()
        .ok()?
        .checked_sub(1)
}
