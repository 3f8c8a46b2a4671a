//! Application manager driven by shell commands.
//!
//! - deploy: start the launch command in the background through the
//!   descriptor's host and remember its pid
//! - kill: destroy the tracked process, or `kill <pid>` through the host
//! - liveness: poll the tracked process, or `kill -0 <pid>` through the host

use std::sync::Arc;

use async_trait::async_trait;
use drover_reconcile::{
    ApplicationHandle, ApplicationManager, AttributeKey, Descriptor, ManagerError,
};
use tracing::{debug, info};

/// Pid of the launched instance, stored on the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchedPid(pub u32);

pub struct CommandManager {
    launch_command: String,
    pid_key: Arc<AttributeKey<LaunchedPid>>,
}

impl CommandManager {
    pub fn new(launch_command: impl Into<String>) -> Self {
        Self {
            launch_command: launch_command.into(),
            pid_key: Arc::new(AttributeKey::new("launched-pid")),
        }
    }

    /// Pid recorded for `descriptor` by the last successful deploy.
    pub fn pid(&self, descriptor: &Descriptor) -> Option<u32> {
        descriptor.attribute(&self.pid_key).map(|pid| pid.0)
    }

    async fn is_alive(&self, descriptor: &Descriptor, pid: u32) -> Result<bool, ManagerError> {
        if let Some(running) = descriptor.local_process_running().await {
            return Ok(running);
        }

        let mut probe = descriptor
            .host()
            .execute(&format!("kill -0 {pid}"))
            .await?;
        Ok(probe.wait().await?.success())
    }
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("launch_command", &self.launch_command)
            .finish()
    }
}

#[async_trait]
impl ApplicationManager for CommandManager {
    async fn deploy(&self, descriptor: &Descriptor) -> Result<ApplicationHandle, ManagerError> {
        // A previous attempt may have started the instance already.
        if let Some(pid) = self.pid(descriptor) {
            if self.is_alive(descriptor, pid).await? {
                debug!(descriptor_id = %descriptor.id(), pid, "Instance already running, reusing it");
                return Ok(ApplicationHandle::with_payload(LaunchedPid(pid)));
            }
        }

        let command = format!("exec {} >/dev/null 2>&1", self.launch_command);
        let process = descriptor.host().execute(&command).await?;
        let pid = process
            .id()
            .ok_or_else(|| ManagerError::Failed("launched process exited immediately".into()))?;

        descriptor.set_attribute(&self.pid_key, LaunchedPid(pid));
        if descriptor.host().is_local() {
            if let Some(mut stale) = descriptor.set_local_process(process).await {
                stale.destroy().await;
            }
        }

        info!(
            descriptor_id = %descriptor.id(),
            host = descriptor.host().address(),
            pid,
            "Launched instance"
        );
        Ok(ApplicationHandle::with_payload(LaunchedPid(pid)))
    }

    async fn kill(&self, descriptor: &Descriptor) -> Result<(), ManagerError> {
        let Some(pid) = self.pid(descriptor) else {
            return Err(ManagerError::NotDeployed(descriptor.id().to_string()));
        };

        if !descriptor.destroy_local_process().await {
            let mut kill = descriptor.host().execute(&format!("kill {pid}")).await?;
            kill.wait().await?.into_result()?;
        }

        descriptor.remove_attribute(&self.pid_key);
        info!(descriptor_id = %descriptor.id(), pid, "Killed instance");
        Ok(())
    }

    async fn attempt_application_call(&self, descriptor: &Descriptor) -> Result<(), ManagerError> {
        let Some(pid) = self.pid(descriptor) else {
            return Err(ManagerError::NotDeployed(descriptor.id().to_string()));
        };

        if self.is_alive(descriptor, pid).await? {
            Ok(())
        } else {
            Err(ManagerError::Failed(format!("process {pid} is not running")))
        }
    }
}
