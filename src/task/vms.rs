use super::{Task, TaskContext};
use crate::delegation::{channels, TransportError};
use crate::error::TaskError;
use crate::security::{authorize, is_allowed, Operation, Ownership, Principal, PrincipalKind};
use crate::store::{next_vm_id, VmProvider, VmRecord, VmStatus};
use async_trait::async_trait;
use tracing::{error, info};

pub struct CreateVmTask {
    ctx: TaskContext,
    provider: VmProvider,
}

impl CreateVmTask {
    pub(super) fn new(ctx: TaskContext, provider: VmProvider) -> Self {
        CreateVmTask { ctx, provider }
    }
}

#[async_trait]
impl Task for CreateVmTask {
    type Output = VmRecord;

    fn operation(&self) -> Operation {
        Operation::CreateVm
    }

    /// Stores the VM as `INITIALIZING` and hands provisioning to the cloud worker
    /// in the background. The returned record is the one just stored.
    async fn execute(self, principal: &Principal) -> Result<VmRecord, TaskError> {
        authorize(principal, Operation::CreateVm, Ownership::NoTarget)?;

        if principal.kind() == PrincipalKind::User {
            // the owner account must still exist
            self.ctx.users.get(principal.id()).await?;
        }

        let vm = VmRecord {
            id: next_vm_id(),
            provider: self.provider,
            status: VmStatus::Initializing,
            owner_id: principal.id().to_string(),
        };
        let stored = self.ctx.vms.add(vm, true).await?;
        info!(
            "VM {} ({}) created for {}",
            stored.id,
            stored.provider.as_str(),
            stored.owner_id
        );

        let ctx = self.ctx.clone();
        let pending = stored.clone();
        tokio::spawn(async move {
            if let Err(e) = provision_vm(&ctx, &pending).await {
                error!("Provisioning of VM {} failed, not retrying: {}", pending.id, e);
            }
        });

        Ok(stored)
    }
}

/// Asks the cloud worker to provision `vm` and stores the state it replies with.
///
/// A reply that does not describe the same VM is rejected as malformed and nothing
/// is written.
pub async fn provision_vm(ctx: &TaskContext, vm: &VmRecord) -> Result<VmRecord, TaskError> {
    let reply: VmRecord = ctx
        .delegation
        .request(channels::RESOURCE_CREATE, vm)
        .await?;

    if reply.id != vm.id || reply.owner_id != vm.owner_id {
        return Err(TransportError::MalformedReply {
            channel: channels::RESOURCE_CREATE.to_string(),
            reason: format!("reply describes {} instead of {}", reply.id, vm.id),
        }
        .into());
    }

    let updated = ctx.vms.put(reply).await?;
    info!("VM {} is now {}", updated.id, updated.status.as_str());
    Ok(updated)
}

pub struct GetVmTask {
    ctx: TaskContext,
    vm_id: String,
}

impl GetVmTask {
    pub(super) fn new(ctx: TaskContext, vm_id: String) -> Self {
        GetVmTask { ctx, vm_id }
    }
}

#[async_trait]
impl Task for GetVmTask {
    type Output = VmRecord;

    fn operation(&self) -> Operation {
        Operation::GetVm
    }

    async fn execute(self, principal: &Principal) -> Result<VmRecord, TaskError> {
        // roles without any grant are turned away before the fetch
        authorize(principal, Operation::GetVm, Ownership::NoTarget)?;

        let vm = self.ctx.vms.get(&self.vm_id).await?;
        authorize(
            principal,
            Operation::GetVm,
            Ownership::of(principal, &vm.owner_id),
        )?;
        Ok(vm)
    }
}

pub struct GetAllVmsTask {
    ctx: TaskContext,
}

impl GetAllVmsTask {
    pub(super) fn new(ctx: TaskContext) -> Self {
        GetAllVmsTask { ctx }
    }
}

#[async_trait]
impl Task for GetAllVmsTask {
    type Output = Vec<VmRecord>;

    fn operation(&self) -> Operation {
        Operation::GetAllVms
    }

    /// Admins get every VM, users only the ones they own.
    async fn execute(self, principal: &Principal) -> Result<Vec<VmRecord>, TaskError> {
        authorize(principal, Operation::GetAllVms, Ownership::NoTarget)?;

        let vms = self.ctx.vms.get_all().await?;
        Ok(vms
            .into_iter()
            .filter(|vm| {
                is_allowed(
                    principal,
                    Operation::GetAllVms,
                    Ownership::of(principal, &vm.owner_id),
                )
            })
            .collect())
    }
}

pub struct BulkUpdateVmsTask {
    ctx: TaskContext,
    vms: Vec<VmRecord>,
}

impl BulkUpdateVmsTask {
    pub(super) fn new(ctx: TaskContext, vms: Vec<VmRecord>) -> Self {
        BulkUpdateVmsTask { ctx, vms }
    }
}

#[async_trait]
impl Task for BulkUpdateVmsTask {
    type Output = Vec<VmRecord>;

    fn operation(&self) -> Operation {
        Operation::BulkUpdateVms
    }

    async fn execute(self, principal: &Principal) -> Result<Vec<VmRecord>, TaskError> {
        authorize(principal, Operation::BulkUpdateVms, Ownership::NoTarget)?;
        if self.vms.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.ctx.vms.put_all(self.vms).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudWorkerSettings;
    use crate::delegation::{
        CloudWorker, DelegationClient, Failure, MessageBus, SimulatedProvisioner,
    };
    use crate::security::{CredentialHasher, Role, SystemPrincipal};
    use crate::store::{Repository, UserRecord};
    use crate::testing::{user_principal, user_record, CountingRepository};
    use crate::Tasks;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        bus: Arc<MessageBus>,
        vms: Arc<CountingRepository<VmRecord>>,
        tasks: Tasks,
    }

    fn fixture(users: Vec<UserRecord>, vms: Vec<VmRecord>) -> Fixture {
        let bus = Arc::new(MessageBus::new());
        let vms = Arc::new(CountingRepository::with_items(vms));
        let ctx = TaskContext {
            users: Arc::new(CountingRepository::with_items(users)),
            vms: vms.clone(),
            delegation: DelegationClient::new(bus.clone(), Duration::from_secs(5)),
            hasher: CredentialHasher::Argon2,
        };
        Fixture {
            bus,
            vms,
            tasks: Tasks::new(ctx),
        }
    }

    fn vm(id: &str, owner: &str, status: VmStatus) -> VmRecord {
        VmRecord {
            id: id.to_string(),
            provider: VmProvider::Aws,
            status,
            owner_id: owner.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn created_vm_is_provisioned_in_background() {
        let f = fixture(vec![user_record("USER:1", "alice", Role::User)], vec![]);
        let _worker = CloudWorker::new(
            f.bus.clone(),
            &CloudWorkerSettings::default(),
            Arc::new(SimulatedProvisioner::new(Duration::from_secs(3))),
        )
        .start(CancellationToken::new())
        .await;

        let created = f
            .tasks
            .create_vm(VmProvider::Gcp)
            .submit_trusted(&user_principal("USER:1", Role::User))
            .await
            .unwrap();
        assert!(created.id.starts_with("VM:"));
        assert_eq!(created.status, VmStatus::Initializing);
        assert_eq!(created.owner_id, "USER:1");

        tokio::time::sleep(Duration::from_secs(4)).await;
        let stored = f.vms.get(&created.id).await.unwrap();
        assert_eq!(stored.status, VmStatus::Up);
    }

    #[tokio::test]
    async fn create_succeeds_even_when_worker_is_absent() {
        let f = fixture(vec![user_record("USER:1", "alice", Role::User)], vec![]);
        let created = f
            .tasks
            .create_vm(VmProvider::Aws)
            .submit_trusted(&user_principal("USER:1", Role::User))
            .await
            .unwrap();

        tokio::task::yield_now().await;
        let stored = f.vms.get(&created.id).await.unwrap();
        assert_eq!(stored.status, VmStatus::Initializing);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_provisioning_is_not_retried() {
        let f = fixture(vec![user_record("USER:1", "alice", Role::User)], vec![]);
        let received = Arc::new(AtomicUsize::new(0));
        let mut rx = f.bus.register(channels::RESOURCE_CREATE).await;
        let counter = received.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                counter.fetch_add(1, Ordering::SeqCst);
                request.split().1.fail(Failure::internal("provider unavailable"));
            }
        });

        let created = f
            .tasks
            .create_vm(VmProvider::Aws)
            .submit_trusted(&user_principal("USER:1", Role::User))
            .await
            .unwrap();

        // well past the 5s request timeout
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
        let stored = f.vms.get(&created.id).await.unwrap();
        assert_eq!(stored.status, VmStatus::Initializing);
        assert_eq!(f.vms.writes(), 1);
    }

    #[tokio::test]
    async fn create_for_deleted_account_is_not_found() {
        let f = fixture(vec![], vec![]);
        let err = f
            .tasks
            .create_vm(VmProvider::Aws)
            .submit_trusted(&user_principal("USER:gone", Role::User))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.vms.writes(), 0);
    }

    #[tokio::test]
    async fn malformed_reply_writes_nothing() {
        let f = fixture(vec![], vec![]);
        let mut rx = f.bus.register(channels::RESOURCE_CREATE).await;
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                request.split().1.succeed(json!({"status": "UP"}));
            }
        });

        let pending = vm("VM:1", "USER:1", VmStatus::Initializing);
        let err = provision_vm(f.tasks.context(), &pending).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Transport(TransportError::MalformedReply { .. })
        ));
        assert_eq!(f.vms.writes(), 0);
    }

    #[tokio::test]
    async fn reply_for_another_vm_writes_nothing() {
        let f = fixture(vec![], vec![]);
        let mut rx = f.bus.register(channels::RESOURCE_CREATE).await;
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                request
                    .split()
                    .1
                    .succeed(vm("VM:other", "USER:1", VmStatus::Up));
            }
        });

        let pending = vm("VM:1", "USER:1", VmStatus::Initializing);
        assert!(provision_vm(f.tasks.context(), &pending).await.is_err());
        assert_eq!(f.vms.writes(), 0);
    }

    #[tokio::test]
    async fn user_sees_only_owned_vms() {
        let f = fixture(
            vec![],
            vec![
                vm("VM:1", "USER:1", VmStatus::Up),
                vm("VM:2", "USER:2", VmStatus::Up),
                vm("VM:3", "USER:1", VmStatus::Down),
            ],
        );

        let mine = f
            .tasks
            .get_all_vms()
            .submit_trusted(&user_principal("USER:1", Role::User))
            .await
            .unwrap();
        let ids: Vec<&str> = mine.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["VM:1", "VM:3"]);

        let all = f
            .tasks
            .get_all_vms()
            .submit_trusted(&Principal::from(SystemPrincipal::BackgroundJob))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn get_vm_checks_owner_after_fetch() {
        let f = fixture(vec![], vec![vm("VM:2", "USER:2", VmStatus::Up)]);

        let err = f
            .tasks
            .get_vm("VM:2")
            .submit_trusted(&user_principal("USER:1", Role::User))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());

        let owned = f
            .tasks
            .get_vm("VM:2")
            .submit_trusted(&user_principal("USER:2", Role::User))
            .await
            .unwrap();
        assert_eq!(owned.id, "VM:2");
        assert_eq!(f.vms.writes(), 0);
    }

    #[tokio::test]
    async fn bulk_update_is_admin_only() {
        let f = fixture(vec![], vec![vm("VM:1", "USER:1", VmStatus::Down)]);
        let err = f
            .tasks
            .bulk_update_vms(vec![vm("VM:1", "USER:1", VmStatus::Up)])
            .submit_trusted(&user_principal("USER:1", Role::User))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(f.vms.calls(), 0);
    }

    #[tokio::test]
    async fn empty_bulk_update_does_not_write() {
        let f = fixture(vec![], vec![]);
        let updated = f
            .tasks
            .bulk_update_vms(Vec::new())
            .submit_trusted(&Principal::from(SystemPrincipal::BackgroundJob))
            .await
            .unwrap();
        assert!(updated.is_empty());
        assert_eq!(f.vms.writes(), 0);
    }
}
