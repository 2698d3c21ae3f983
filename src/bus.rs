//! Notification Bus
//!
//! Best-effort, payload-less fan-out. A notification only says "something
//! under this topic changed"; it may be dropped, arrive late, or arrive with
//! no underlying change. Consumers re-read the store, and [`ChangeStream`]
//! also polls and supports on-demand refresh so a lost message never leaves
//! a view stale for good.

use crate::config::BusConfig;
use crate::store::{RecordKey, SharedStore, StoreError, SyncContext};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

/// Notification topics, one per persisted record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "players:update")]
    Players,
    #[serde(rename = "queue:update")]
    Queue,
    #[serde(rename = "match:update")]
    Match,
    #[serde(rename = "upcoming:update")]
    Upcoming,
    #[serde(rename = "round:update")]
    Round,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Players => "players:update",
            Topic::Queue => "queue:update",
            Topic::Match => "match:update",
            Topic::Upcoming => "upcoming:update",
            Topic::Round => "round:update",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one independent execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic tag plus the actor that published it. Carries no record data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub topic: Topic,
    pub origin: ActorId,
}

#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
    drop_rate: f64,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx, drop_rate: 0.0 }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.capacity).with_drop_rate(config.drop_rate)
    }

    /// Handle on the same channel that drops each outgoing notification with
    /// the given probability. NaN counts as no loss.
    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.drop_rate = if drop_rate.is_nan() {
            0.0
        } else {
            drop_rate.clamp(0.0, 1.0)
        };
        self
    }

    /// Fire and forget. Returns whether the notification reached the channel.
    pub fn publish(&self, topic: Topic, origin: ActorId) -> bool {
        if self.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.drop_rate) {
            debug!(topic = %topic, origin = %origin, "Notification dropped");
            return false;
        }

        // No subscribers is not an error
        self.tx.send(Notification { topic, origin }).is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Live view of one record.
///
/// A background task re-reads the record when its topic is announced, when
/// the subscription lagged, on every polling tick, and on [`refresh`]. The
/// watch channel only fires when the decoded value actually changed.
///
/// [`refresh`]: ChangeStream::refresh
pub struct ChangeStream<T> {
    rx: watch::Receiver<Option<T>>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl<T> ChangeStream<T>
where
    T: DeserializeOwned + PartialEq + Clone + Send + Sync + 'static,
{
    pub async fn spawn<S: SharedStore>(
        ctx: SyncContext<S>,
        key: RecordKey,
        poll_interval: Duration,
    ) -> Result<Self, StoreError> {
        // Subscribe before the first read so no change slips between them
        let mut notifications = ctx.bus().subscribe();
        let initial = ctx.read::<T>(key).await?;
        let (tx, rx) = watch::channel(initial);
        let refresh = Arc::new(Notify::new());
        let wake = refresh.clone();
        let topic = key.topic();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    received = notifications.recv() => match received {
                        Ok(note) if note.topic == topic => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(missed)) => {
                            debug!(key = %key, missed, "Change stream lagged, re-reading");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = wake.notified() => {}
                    _ = ticker.tick() => {}
                }

                if tx.is_closed() {
                    break;
                }

                match ctx.read::<T>(key).await {
                    Ok(latest) => {
                        tx.send_if_modified(|current| {
                            if *current == latest {
                                false
                            } else {
                                *current = latest;
                                true
                            }
                        });
                    }
                    Err(e) => warn!(key = %key, error = %e, "Change stream re-read failed"),
                }
            }
        });

        Ok(Self { rx, refresh, task })
    }

    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    /// Ask for an immediate re-read.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }
}

impl<T> Drop for ChangeStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
