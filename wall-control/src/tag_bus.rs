use crate::error::ProtocolError;
use crate::tag_mirror::{Quality, TagValue};
use async_trait::async_trait;
use mockall::automock;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

const SUBSCRIPTION_DEPTH: usize = 64;

/// A pushed value. `name` is relative to the subscription path.
#[derive(Debug, Clone, PartialEq)]
pub struct TagUpdate {
    pub name: String,
    pub value: TagValue,
    pub quality: Quality,
}

#[automock]
#[async_trait]
pub trait TagBus: Send + Sync + 'static {
    async fn subscribe(
        &self,
        path: &str,
        publish_interval: Duration,
    ) -> Result<mpsc::Receiver<TagUpdate>, ProtocolError>;
    async fn write(&self, path: &str, value: TagValue) -> Result<(), ProtocolError>;
}

/// Joins a subscription path and a tag name with `/`.
pub fn tag_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn relative_name<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    path.strip_prefix(prefix)?.strip_prefix('/')
}

struct Subscriber {
    prefix: String,
    tx: mpsc::Sender<TagUpdate>,
}

#[derive(Default)]
struct Inner {
    values: BTreeMap<String, TagValue>,
    writes: Vec<(String, TagValue)>,
    subscribers: Vec<Subscriber>,
}

/// In-process tag store. Writes are echoed to subscribers like a server would.
#[derive(Default)]
pub struct MemoryTagBus {
    inner: Mutex<Inner>,
}

impl MemoryTagBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a value as if changed upstream and notifies matching subscribers.
    pub fn publish(&self, path: &str, value: TagValue) {
        let mut inner = self.lock();
        inner.values.insert(path.to_string(), value.clone());
        inner.subscribers.retain(|subscriber| {
            let Some(name) = relative_name(&subscriber.prefix, path) else {
                return !subscriber.tx.is_closed();
            };
            let update = TagUpdate {
                name: name.to_string(),
                value: value.clone(),
                quality: Quality::Good,
            };
            match subscriber.tx.try_send(update) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(update)) => {
                    log::warn!("tag subscriber lagging, dropped update for {}", update.name);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    pub fn value(&self, path: &str) -> Option<TagValue> {
        self.lock().values.get(path).cloned()
    }

    /// Every `write` received, oldest first.
    pub fn writes(&self) -> Vec<(String, TagValue)> {
        self.lock().writes.clone()
    }
}

#[async_trait]
impl TagBus for MemoryTagBus {
    async fn subscribe(
        &self,
        path: &str,
        publish_interval: Duration,
    ) -> Result<mpsc::Receiver<TagUpdate>, ProtocolError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
        let mut inner = self.lock();
        // Initial synchronization with the current values.
        for (tag, value) in &inner.values {
            if let Some(name) = relative_name(path, tag) {
                let update = TagUpdate {
                    name: name.to_string(),
                    value: value.clone(),
                    quality: Quality::Good,
                };
                if tx.try_send(update).is_err() {
                    log::warn!("initial tag snapshot for {path} truncated");
                    break;
                }
            }
        }
        inner.subscribers.push(Subscriber {
            prefix: path.to_string(),
            tx,
        });
        log::debug!("subscribed to {path} every {publish_interval:?}");
        Ok(rx)
    }

    async fn write(&self, path: &str, value: TagValue) -> Result<(), ProtocolError> {
        self.lock().writes.push((path.to_string(), value.clone()));
        self.publish(path, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    mod success {
        use crate::tag_bus::{tag_path, MemoryTagBus, TagBus};
        use crate::tag_mirror::TagValue;
        use std::time::Duration;

        #[test]
        fn joins_paths() {
            assert_eq!(tag_path("Wall/Viewers/", "Cam01Trigger"), "Wall/Viewers/Cam01Trigger");
            assert_eq!(tag_path("", "Cam01Trigger"), "Cam01Trigger");
        }

        #[tokio::test]
        async fn subscription_sees_snapshot_then_changes() {
            let bus = MemoryTagBus::new();
            bus.publish("Wall/Cam01CameraURI", TagValue::Text("rtsp://x".into()));
            bus.publish("Other/Cam09Trigger", TagValue::Bool(true));

            let mut rx = bus.subscribe("Wall", Duration::from_millis(100)).await.unwrap();
            let first = rx.recv().await.unwrap();
            assert_eq!(first.name, "Cam01CameraURI");

            bus.write("Wall/Cam01Trigger", TagValue::Bool(false)).await.unwrap();
            let echoed = rx.recv().await.unwrap();
            assert_eq!(echoed.name, "Cam01Trigger");
            assert_eq!(echoed.value, TagValue::Bool(false));
            assert!(rx.try_recv().is_err());
            assert_eq!(
                bus.writes(),
                vec![("Wall/Cam01Trigger".to_string(), TagValue::Bool(false))]
            );
        }
    }

    mod failure {
        use crate::tag_bus::{MemoryTagBus, TagBus};
        use crate::tag_mirror::TagValue;
        use std::time::Duration;

        #[tokio::test]
        async fn closed_subscribers_are_pruned() {
            let bus = MemoryTagBus::new();
            let rx = bus.subscribe("Wall", Duration::from_millis(100)).await.unwrap();
            drop(rx);
            bus.publish("Wall/Cam01Trigger", TagValue::Bool(true));
            assert_eq!(bus.value("Wall/Cam01Trigger"), Some(TagValue::Bool(true)));
            assert!(bus.value("Wall/Missing").is_none());
        }
    }
}
