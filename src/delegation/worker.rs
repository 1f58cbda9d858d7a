//! The cloud worker: answers provisioning and liveness requests on its own bounded
//! pool of concurrent jobs.

use super::bus::MessageBus;
use super::messages::{channels, DelegatedRequest, Failure, Replier, PONG};
use crate::config::{next_change, CloudWorkerSettings, ConfigChange};
use crate::store::{VmRecord, VmStatus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Performs the remote provisioning of a VM.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, vm: &VmRecord) -> anyhow::Result<()>;

    /// Applies updated worker settings. The default ignores them.
    fn reconfigure(&self, _settings: &CloudWorkerSettings) {}
}

/// Provisioner that only waits, standing in for a cloud provider SDK.
pub struct SimulatedProvisioner {
    latency_ms: AtomicU64,
}

impl SimulatedProvisioner {
    pub fn new(latency: Duration) -> Self {
        SimulatedProvisioner {
            latency_ms: AtomicU64::new(latency.as_millis() as u64),
        }
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    async fn provision(&self, vm: &VmRecord) -> anyhow::Result<()> {
        let latency = self.latency();
        debug!(
            "Provisioning {} on {} (simulated, {:?})",
            vm.id,
            vm.provider.as_str(),
            latency
        );
        tokio::time::sleep(latency).await;
        Ok(())
    }

    fn reconfigure(&self, settings: &CloudWorkerSettings) {
        self.latency_ms
            .store(settings.provisioning_latency_ms, Ordering::Relaxed);
    }
}

pub struct CloudWorker {
    bus: Arc<MessageBus>,
    provisioner: Arc<dyn Provisioner>,
    pool: Arc<Semaphore>,
    config_changes: Option<broadcast::Receiver<ConfigChange<CloudWorkerSettings>>>,
}

impl CloudWorker {
    pub fn new(
        bus: Arc<MessageBus>,
        settings: &CloudWorkerSettings,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        CloudWorker {
            bus,
            provisioner,
            pool: Arc::new(Semaphore::new(settings.pool_size)),
            config_changes: None,
        }
    }

    /// Forward `cloud_worker` config changes to the provisioner.
    pub fn with_config_changes(
        mut self,
        receiver: broadcast::Receiver<ConfigChange<CloudWorkerSettings>>,
    ) -> Self {
        self.config_changes = Some(receiver);
        self
    }

    /// Registers the worker's channels and starts serving them until
    /// `shutdown_token` is cancelled.
    pub async fn start(self, shutdown_token: CancellationToken) -> JoinHandle<()> {
        let create_rx = self.bus.register(channels::RESOURCE_CREATE).await;
        let health_rx = self.bus.register(channels::WORKER_HEALTHCHECK).await;
        info!(
            "Cloud worker listening on {} and {} with {} slots",
            channels::RESOURCE_CREATE,
            channels::WORKER_HEALTHCHECK,
            self.pool.available_permits()
        );
        tokio::spawn(self.run(create_rx, health_rx, shutdown_token))
    }

    async fn run(
        mut self,
        mut create_rx: mpsc::Receiver<DelegatedRequest>,
        mut health_rx: mpsc::Receiver<DelegatedRequest>,
        shutdown_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("Cloud worker shutting down");
                    break;
                }
                request = create_rx.recv() => {
                    let Some(request) = request else {
                        warn!("{} channel closed", channels::RESOURCE_CREATE);
                        break;
                    };
                    self.dispatch_create(request);
                }
                request = health_rx.recv() => {
                    let Some(request) = request else {
                        warn!("{} channel closed", channels::WORKER_HEALTHCHECK);
                        break;
                    };
                    let (_, replier) = request.split();
                    replier.succeed(PONG);
                }
                change = next_change(&mut self.config_changes) => {
                    self.apply_change(change);
                }
            }
        }
        self.bus.unregister(channels::RESOURCE_CREATE).await;
        self.bus.unregister(channels::WORKER_HEALTHCHECK).await;
    }

    fn apply_change(
        &mut self,
        change: Result<ConfigChange<CloudWorkerSettings>, broadcast::error::RecvError>,
    ) {
        match change {
            Ok(change) => {
                if let Some((previous, current)) = change.both() {
                    if previous.pool_size != current.pool_size {
                        warn!("cloud_worker.pool_size changes take effect after restart");
                    }
                    self.provisioner.reconfigure(current);
                    info!("Cloud worker reconfigured");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Cloud worker missed {} config changes", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.config_changes = None;
            }
        }
    }

    fn dispatch_create(&self, request: DelegatedRequest) {
        let pool = self.pool.clone();
        let provisioner = self.provisioner.clone();
        tokio::spawn(async move {
            let (envelope, replier) = request.split();
            let vm: VmRecord = match serde_json::from_value(envelope.payload) {
                Ok(vm) => vm,
                Err(e) => {
                    warn!("Rejecting {} request: {}", channels::RESOURCE_CREATE, e);
                    replier.fail(Failure::bad_request(format!("invalid vm payload: {}", e)));
                    return;
                }
            };
            let Ok(_permit) = pool.acquire_owned().await else {
                replier.fail(Failure::internal("worker pool closed"));
                return;
            };
            provision(provisioner.as_ref(), vm, replier).await;
        });
    }
}

async fn provision(provisioner: &dyn Provisioner, vm: VmRecord, replier: Replier) {
    match provisioner.provision(&vm).await {
        Ok(()) => {
            info!("VM {} is up", vm.id);
            replier.succeed(vm.with_status(VmStatus::Up));
        }
        Err(e) => {
            error!("Provisioning of {} failed: {:#}", vm.id, e);
            replier.fail(Failure::internal(e.to_string()));
        }
    }
}
