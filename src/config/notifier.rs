//! Subtree-level change notifications.
//!
//! Each config subtree has its own broadcast topic, named
//! `configuration.changed.<subtree>`. A change is published only when the subtree's
//! previous and new values differ.

use super::{AppConfig, CentralSettings, CloudWorkerSettings, JobsSettings, RuntimeSettings};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub const TOPIC_PREFIX: &str = "configuration.changed";

const CHANNEL_CAPACITY: usize = 16;

/// Previous and new value of one subtree.
#[derive(Debug)]
pub struct ConfigChange<T> {
    pub previous: Option<Arc<T>>,
    pub current: Option<Arc<T>>,
}

impl<T> Clone for ConfigChange<T> {
    fn clone(&self) -> Self {
        ConfigChange {
            previous: self.previous.clone(),
            current: self.current.clone(),
        }
    }
}

impl<T> ConfigChange<T> {
    /// Both sides of the change, or `None` when either is absent. Subscribers take
    /// no action on a one-sided change.
    pub fn both(&self) -> Option<(&Arc<T>, &Arc<T>)> {
        match (&self.previous, &self.current) {
            (Some(previous), Some(current)) => Some((previous, current)),
            _ => None,
        }
    }
}

/// Waits for the next change on an optional subscription, or forever when there is
/// none.
pub(crate) async fn next_change<T>(
    receiver: &mut Option<broadcast::Receiver<ConfigChange<T>>>,
) -> Result<ConfigChange<T>, broadcast::error::RecvError> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// A named, structurally comparable slice of [`AppConfig`].
pub trait ConfigSubtree: Sized + Debug + PartialEq + Send + Sync + 'static {
    const NAME: &'static str;

    fn of(config: &AppConfig) -> &Arc<Self>;

    fn sender(notifier: &ConfigNotifier) -> &broadcast::Sender<ConfigChange<Self>>;
}

pub fn topic<T: ConfigSubtree>() -> String {
    format!("{}.{}", TOPIC_PREFIX, T::NAME)
}

macro_rules! config_subtree {
    ($settings:ty, $name:literal, $field:ident) => {
        impl ConfigSubtree for $settings {
            const NAME: &'static str = $name;

            fn of(config: &AppConfig) -> &Arc<Self> {
                &config.$field
            }

            fn sender(notifier: &ConfigNotifier) -> &broadcast::Sender<ConfigChange<Self>> {
                &notifier.$field
            }
        }
    };
}

config_subtree!(RuntimeSettings, "runtime", runtime);
config_subtree!(CentralSettings, "central", central);
config_subtree!(CloudWorkerSettings, "cloud_worker", cloud_worker);
config_subtree!(JobsSettings, "jobs", jobs);

pub struct ConfigNotifier {
    runtime: broadcast::Sender<ConfigChange<RuntimeSettings>>,
    central: broadcast::Sender<ConfigChange<CentralSettings>>,
    cloud_worker: broadcast::Sender<ConfigChange<CloudWorkerSettings>>,
    jobs: broadcast::Sender<ConfigChange<JobsSettings>>,
}

impl Default for ConfigNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigNotifier {
    pub fn new() -> Self {
        ConfigNotifier {
            runtime: broadcast::channel(CHANNEL_CAPACITY).0,
            central: broadcast::channel(CHANNEL_CAPACITY).0,
            cloud_worker: broadcast::channel(CHANNEL_CAPACITY).0,
            jobs: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe<T: ConfigSubtree>(&self) -> broadcast::Receiver<ConfigChange<T>> {
        T::sender(self).subscribe()
    }

    /// Compares every subtree of `previous` and `current` and publishes the ones
    /// that differ. Returns the topics that were published.
    pub fn publish(&self, previous: Option<&AppConfig>, current: &AppConfig) -> Vec<String> {
        let mut published = Vec::new();
        self.publish_subtree::<RuntimeSettings>(previous, current, &mut published);
        self.publish_subtree::<CentralSettings>(previous, current, &mut published);
        self.publish_subtree::<CloudWorkerSettings>(previous, current, &mut published);
        self.publish_subtree::<JobsSettings>(previous, current, &mut published);
        published
    }

    fn publish_subtree<T: ConfigSubtree>(
        &self,
        previous: Option<&AppConfig>,
        current: &AppConfig,
        published: &mut Vec<String>,
    ) {
        let previous = previous.map(|config| T::of(config).clone());
        let current = T::of(current).clone();
        if previous.as_deref() == Some(&*current) {
            debug!("Config subtree '{}' unchanged", T::NAME);
            return;
        }

        let topic = topic::<T>();
        info!("Publishing {}", topic);
        // No receivers is fine, nobody cares about this subtree yet
        let _ = T::sender(self).send(ConfigChange {
            previous,
            current: Some(current),
        });
        published.push(topic);
    }
}
