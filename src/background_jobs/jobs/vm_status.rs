//! Brings every VM that is not up to `UP`.

use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::config::{JobSettings, JobsSettings};
use crate::store::{VmRecord, VmStatus};
use crate::task::Task;
use async_trait::async_trait;
use tracing::{debug, info};

pub struct UpdateVmStatusJob;

/// The VMs whose status must change, already carrying their new status.
pub fn vms_needing_transition(vms: &[VmRecord]) -> Vec<VmRecord> {
    vms.iter()
        .filter(|vm| vm.status != VmStatus::Up)
        .map(|vm| vm.with_status(VmStatus::Up))
        .collect()
}

#[async_trait]
impl BackgroundJob for UpdateVmStatusJob {
    fn id(&self) -> &'static str {
        "vm_update_status"
    }

    fn name(&self) -> &'static str {
        "VM Status Update"
    }

    fn description(&self) -> &'static str {
        "Move VMs that are not up to status UP"
    }

    fn settings(&self, jobs: &JobsSettings) -> JobSettings {
        jobs.vm_update_status.clone()
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let vms = ctx.tasks.get_all_vms().submit_trusted(&ctx.principal).await?;
        let updates = vms_needing_transition(&vms);
        if updates.is_empty() {
            debug!("All {} VMs are up", vms.len());
            return Ok(());
        }

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let updated = ctx
            .tasks
            .bulk_update_vms(updates)
            .submit_trusted(&ctx.principal)
            .await?;
        info!("Moved {} VMs to {}", updated.len(), VmStatus::Up.as_str());
        Ok(())
    }
}
