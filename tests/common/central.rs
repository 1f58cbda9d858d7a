#![allow(dead_code)]

use super::constants::*;
use super::counting::CountingRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vm_central::config::CloudWorkerSettings;
use vm_central::delegation::{CloudWorker, DelegationClient, MessageBus, SimulatedProvisioner};
use vm_central::security::CredentialHasher;
use vm_central::store::VmRecord;
use vm_central::task::{NewUser, Task, TaskContext, Tasks};
use vm_central::{AuthenticatedCaller, Principal, Role, SystemPrincipal, UserRecord};

/// The central side wired over counting in-memory repositories, optionally with a
/// cloud worker answering on the same bus.
pub struct TestCentral {
    pub tasks: Tasks,
    pub users: Arc<CountingRepository<UserRecord>>,
    pub vms: Arc<CountingRepository<VmRecord>>,
    pub bus: Arc<MessageBus>,
    pub admin: UserRecord,
    pub shutdown_token: CancellationToken,
}

impl TestCentral {
    /// Central side with a running cloud worker and a bootstrapped admin.
    pub async fn spawn() -> Self {
        let central = Self::without_worker().await;
        let settings = CloudWorkerSettings {
            provisioning_latency_ms: PROVISIONING_LATENCY_MS,
            ..Default::default()
        };
        CloudWorker::new(
            central.bus.clone(),
            &settings,
            Arc::new(SimulatedProvisioner::new(Duration::from_millis(
                PROVISIONING_LATENCY_MS,
            ))),
        )
        .start(central.shutdown_token.clone())
        .await;
        central
    }

    /// Central side with nobody answering delegation requests.
    pub async fn without_worker() -> Self {
        let users = Arc::new(CountingRepository::<UserRecord>::new());
        let vms = Arc::new(CountingRepository::<VmRecord>::new());
        let bus = Arc::new(MessageBus::new());
        let tasks = Tasks::new(TaskContext {
            users: users.clone(),
            vms: vms.clone(),
            delegation: DelegationClient::new(
                bus.clone(),
                Duration::from_millis(REQUEST_TIMEOUT_MS),
            ),
            hasher: CredentialHasher::default(),
        });

        let admin = tasks
            .create_user(new_user(ADMIN_USERNAME, ADMIN_PASSWORD, Role::Admin))
            .ensure_unique(false)
            .submit_trusted(&Principal::from(SystemPrincipal::Root))
            .await
            .expect("Failed to bootstrap admin");

        TestCentral {
            tasks,
            users,
            vms,
            bus,
            admin,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub async fn principal_of(&self, user: &UserRecord) -> Principal {
        self.tasks
            .resolver()
            .resolve(&AuthenticatedCaller::new(user.id.clone()))
            .await
            .expect("Failed to resolve principal")
    }

    pub async fn admin_principal(&self) -> Principal {
        self.principal_of(&self.admin).await
    }

    /// Creates an account as the admin.
    pub async fn create_user(&self, username: &str, role: Role) -> UserRecord {
        self.tasks
            .create_user(new_user(username, USER_PASSWORD, role))
            .submit_trusted(&self.admin_principal().await)
            .await
            .expect("Failed to create user")
    }
}

impl Drop for TestCentral {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

pub fn new_user(username: &str, password: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_string(),
        password: password.to_string(),
        first_name: "firstname".to_string(),
        last_name: "lastname".to_string(),
        role,
    }
}
