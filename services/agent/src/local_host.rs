//! Host implementation that runs commands on the managing machine.
//!
//! Commands go through `sh -c`. Output is captured through pipes, so
//! long-running commands should redirect their own output.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use drover_reconcile::{Host, HostError, HostProcess, ProcessOutput};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// The local machine.
#[derive(Debug)]
pub struct LocalHost {
    address: String,
    shell: String,
    closed: AtomicBool,
}

impl LocalHost {
    pub fn new() -> Self {
        Self {
            address: "localhost".to_string(),
            shell: "sh".to_string(),
            closed: AtomicBool::new(false),
        }
    }

    /// Use a different POSIX shell.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Host for LocalHost {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn execute(&self, command: &str) -> Result<Box<dyn HostProcess>, HostError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostError::Closed(self.address.clone()));
        }

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        debug!(command, pid = ?child.id(), "Spawned local command");
        Ok(Box::new(LocalProcess { child }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A child process of the agent.
#[derive(Debug)]
pub struct LocalProcess {
    child: Child,
}

#[async_trait]
impl HostProcess for LocalProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<i32>, HostError> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| status.code().unwrap_or(-1)))
    }

    async fn wait(&mut self) -> Result<ProcessOutput, HostError> {
        let mut stdout_pipe = self.child.stdout.take();
        let mut stderr_pipe = self.child.stderr.take();

        let read_stdout = async {
            let mut buf = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_string(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_string(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (status, stdout, stderr) = tokio::try_join!(self.child.wait(), read_stdout, read_stderr)?;

        Ok(ProcessOutput {
            status: status.code(),
            stdout,
            stderr,
        })
    }

    async fn destroy(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!(pid = ?self.child.id(), error = %e, "Failed to kill local process");
        }
    }
}
