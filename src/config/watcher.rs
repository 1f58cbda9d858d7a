use super::{AppConfig, CliConfig, ConfigError, ConfigNotifier};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Re-reads the config file periodically and publishes subtree changes.
///
/// A file that fails to load or validate is logged and skipped; the last known good
/// configuration stays current.
pub struct ConfigWatcher {
    path: PathBuf,
    cli: CliConfig,
    notifier: Arc<ConfigNotifier>,
    current: AppConfig,
}

impl ConfigWatcher {
    pub fn new(
        path: PathBuf,
        cli: CliConfig,
        notifier: Arc<ConfigNotifier>,
        current: AppConfig,
    ) -> Self {
        ConfigWatcher {
            path,
            cli,
            notifier,
            current,
        }
    }

    pub fn current(&self) -> &AppConfig {
        &self.current
    }

    /// Loads the file once. On success publishes what changed and returns the
    /// published topics.
    pub fn reload(&mut self) -> Result<Vec<String>, ConfigError> {
        let next = AppConfig::load(&self.cli, Some(&self.path))?;
        let published = self.notifier.publish(Some(&self.current), &next);
        self.current = next;
        Ok(published)
    }

    pub async fn run(mut self, shutdown_token: CancellationToken) {
        let period = Duration::from_millis(self.current.runtime.config_scan_period_ms);
        info!(
            "Watching {:?} for configuration changes every {:?}",
            self.path, period
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick completes immediately, the config was just loaded
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("Config watcher stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.reload() {
                        error!("Ignoring configuration reload, keeping last known good: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloudWorkerSettings, JobsSettings};
    use tempfile::TempDir;

    fn cli() -> CliConfig {
        CliConfig {
            in_memory: true,
            ..Default::default()
        }
    }

    fn watcher_for(dir: &TempDir, content: &str) -> (ConfigWatcher, Arc<ConfigNotifier>) {
        let path = dir.path().join("vm-central.toml");
        std::fs::write(&path, content).unwrap();
        let initial = AppConfig::load(&cli(), Some(&path)).unwrap();
        let notifier = Arc::new(ConfigNotifier::new());
        (
            ConfigWatcher::new(path, cli(), notifier.clone(), initial),
            notifier,
        )
    }

    #[test]
    fn reload_publishes_changed_subtree() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, notifier) =
            watcher_for(&dir, "[jobs.vm_update_status]\nperiod_millis = 1000\n");
        let mut jobs_rx = notifier.subscribe::<JobsSettings>();

        std::fs::write(
            dir.path().join("vm-central.toml"),
            "[jobs.vm_update_status]\nperiod_millis = 4000\n",
        )
        .unwrap();
        let published = watcher.reload().unwrap();

        assert_eq!(published, vec!["configuration.changed.jobs".to_string()]);
        assert_eq!(watcher.current().jobs.vm_update_status.period_millis, 4000);
        assert!(jobs_rx.try_recv().is_ok());
    }

    #[test]
    fn unchanged_file_publishes_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, _notifier) = watcher_for(&dir, "[cloud_worker]\npool_size = 2\n");
        assert!(watcher.reload().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_keeps_last_known_good() {
        let dir = TempDir::new().unwrap();
        let (mut watcher, notifier) = watcher_for(&dir, "[cloud_worker]\npool_size = 2\n");
        let mut worker_rx = notifier.subscribe::<CloudWorkerSettings>();

        std::fs::write(dir.path().join("vm-central.toml"), "[cloud_worker\npool_size =").unwrap();
        assert!(matches!(watcher.reload(), Err(ConfigError::Parse { .. })));
        assert_eq!(watcher.current().cloud_worker.pool_size, 2);
        assert!(worker_rx.try_recv().is_err());

        std::fs::write(dir.path().join("vm-central.toml"), "[cloud_worker]\npool_size = 0\n")
            .unwrap();
        assert!(matches!(watcher.reload(), Err(ConfigError::Invalid(_))));
        assert_eq!(watcher.current().cloud_worker.pool_size, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (watcher, _notifier) = watcher_for(&dir, "");
        let token = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(12_000)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
