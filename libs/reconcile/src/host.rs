//! Host collaborator interface.
//!
//! A host executes shell commands, locally or remotely. The engine needs
//! very little from it: the status scanner runs a side-effect-free round
//! trip (`cd /`) and the network closes every host on shutdown.

use async_trait::async_trait;

use crate::error::HostError;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status; `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// True if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Convert a non-zero exit into [`HostError::Exited`].
    pub fn into_result(self) -> Result<Self, HostError> {
        if self.success() {
            Ok(self)
        } else {
            Err(HostError::Exited {
                status: self.status.unwrap_or(-1),
                stderr: self.stderr,
            })
        }
    }
}

/// A process started through [`Host::execute`].
#[async_trait]
pub trait HostProcess: Send + Sync {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Exit status if the process has finished, without blocking.
    fn try_wait(&mut self) -> Result<Option<i32>, HostError>;

    /// Wait for the process to exit and collect its output.
    async fn wait(&mut self) -> Result<ProcessOutput, HostError>;

    /// Terminate the process. Destroying an exited process is a no-op.
    async fn destroy(&mut self);
}

/// Command execution endpoint for one machine.
#[async_trait]
pub trait Host: Send + Sync + std::fmt::Debug {
    /// Address used to reach the host (a hostname, or `localhost`).
    fn address(&self) -> &str;

    /// True if commands run on the managing machine itself.
    fn is_local(&self) -> bool;

    /// Start `command` through the host's shell.
    async fn execute(&self, command: &str) -> Result<Box<dyn HostProcess>, HostError>;

    /// Release connections held to the host. Idempotent.
    async fn close(&self);
}
