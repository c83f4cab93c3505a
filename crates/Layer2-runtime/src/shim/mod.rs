//! Shim - one supervisor process plus its RPC session
//!
//! A shim is launched per task: the launcher binds the task's private
//! socket, spawns the supervisor with the bound listener as an inherited
//! descriptor, then dials back and keeps the session for the task's
//! lifetime. A shim whose session has been closed must not be used again.

mod client;
mod process;
mod socket;

pub use process::OOM_SCORE_MAX_KILLABLE;
pub use socket::shim_socket_address;

use crate::bundle::Bundle;
use crate::task::{CreateOpts, ExitStatus, TaskHandle};
use async_trait::async_trait;
use client::{CreateTaskRequest, DeleteTaskRequest, ShimClient, TaskClient};
use keel_foundation::{Context, Error, Result, RuntimeConfig};
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, OnceLock};
use tracing::{info, trace, warn};

/// Pid file inside the bundle's persistent path
const PID_FILENAME: &str = "shim.pid";

/// A supervisor process and the RPC session bound to it
pub struct Shim {
    bundle: Bundle,
    client: Arc<ShimClient>,
    tasks: TaskClient,
    shim_pid: u32,
    /// Set exactly once, at successful task creation
    task_pid: OnceLock<u32>,
}

impl Shim {
    /// Launch a supervisor for a bundle and attach to it
    ///
    /// Any failure after the process is spawned kills the spawned process
    /// before returning; a failed launch leaves no orphaned supervisor.
    pub async fn launch(
        ctx: &Context,
        bundle: Bundle,
        runtime: &str,
        config: &RuntimeConfig,
    ) -> Result<Shim> {
        let ns = ctx.namespace_required()?;
        let address = socket::shim_socket_address(ctx, &bundle.id)?;
        let listener = socket::bind_abstract(&address)?;
        let binary = process::shim_binary(runtime);

        let mut cmd = process::shim_command(
            &binary,
            ns,
            &config.control_address,
            &bundle.path,
            config.shim_worker_threads,
            listener.as_raw_fd(),
        );
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Launch(format!("failed to spawn {}: {}", binary, e)))?;
        let shim_pid = child
            .id()
            .ok_or_else(|| Error::Launch(format!("{} exited during spawn", binary)))?;

        // the child inherited the bound socket; the local copy is done
        drop(listener);

        // detached reap so the exit is collected without blocking anyone
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        match Self::attach(&bundle, &address, shim_pid, config).await {
            Ok((client, tasks)) => {
                info!(pid = shim_pid, address = %address, "shim {} started", binary);
                Ok(Shim {
                    bundle,
                    client,
                    tasks,
                    shim_pid,
                    task_pid: OnceLock::new(),
                })
            }
            Err(err) => {
                process::kill_shim(shim_pid);
                Err(err)
            }
        }
    }

    /// Post-spawn bookkeeping and dial-back
    async fn attach(
        bundle: &Bundle,
        address: &str,
        shim_pid: u32,
        config: &RuntimeConfig,
    ) -> Result<(Arc<ShimClient>, TaskClient)> {
        process::write_pid_file(&bundle.path.join(PID_FILENAME), shim_pid).await?;
        process::set_oom_score(shim_pid, OOM_SCORE_MAX_KILLABLE).await?;

        let stream = socket::connect_abstract(address, config.dial_timeout()).await?;
        let client = Arc::new(ShimClient::new(stream));
        let id = bundle.id.clone();
        client.on_close(move || trace!(id = %id, "shim session closed"));
        let tasks = TaskClient::new(client.clone());
        Ok((client, tasks))
    }

    /// Identifier of the shim and its task
    pub fn id(&self) -> &str {
        &self.bundle.id
    }

    /// Pid of the supervisor process
    pub fn shim_pid(&self) -> u32 {
        self.shim_pid
    }

    /// The bundle this shim was launched for
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    /// Ask the supervisor to create the task
    ///
    /// The returned pid is recorded on the shim; the shim itself then serves
    /// as the task handle. Remote failures are surfaced verbatim.
    pub async fn create(&self, opts: &CreateOpts) -> Result<u32> {
        let request = CreateTaskRequest {
            id: self.bundle.id.clone(),
            bundle: self.bundle.path.display().to_string(),
            stdin: opts.io.stdin.clone(),
            stdout: opts.io.stdout.clone(),
            stderr: opts.io.stderr.clone(),
            terminal: opts.io.terminal,
            checkpoint: opts.checkpoint.clone(),
            rootfs: opts.rootfs.clone(),
            options: opts.options.clone(),
        };
        let response = self.tasks.create(request).await?;
        if self.task_pid.set(response.pid).is_err() {
            warn!(
                id = %self.bundle.id,
                pid = response.pid,
                "task pid already recorded; keeping the first"
            );
        }
        Ok(response.pid)
    }

    /// Close the RPC session only; idempotent
    ///
    /// Killing the supervisor and deleting the bundle are the caller's
    /// explicit, separate responsibilities.
    pub async fn close(&self) {
        self.client.close().await;
    }
}

impl std::fmt::Debug for Shim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shim")
            .field("id", &self.bundle.id)
            .field("shim_pid", &self.shim_pid)
            .field("task_pid", &self.task_pid.get())
            .finish()
    }
}

#[async_trait]
impl TaskHandle for Shim {
    fn id(&self) -> &str {
        &self.bundle.id
    }

    fn pid(&self) -> Option<u32> {
        self.task_pid.get().copied()
    }

    async fn delete(&self) -> Result<ExitStatus> {
        let response = self
            .tasks
            .delete(DeleteTaskRequest {
                id: self.bundle.id.clone(),
            })
            .await?;
        Ok(ExitStatus {
            status: response.exit_status,
            exited_at: response.exited_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_foundation::Context;

    fn ctx() -> Context {
        Context::with_namespace("default")
    }

    async fn test_bundle(dir: &std::path::Path, id: &str) -> Bundle {
        Bundle::new(&ctx(), dir.join("root"), dir.join("state"), id, b"{}")
            .await
            .unwrap()
    }

    fn test_config(dial_secs: u64) -> RuntimeConfig {
        RuntimeConfig {
            dial_timeout_secs: dial_secs,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test]
    async fn over_long_address_fails_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let id = "x".repeat(120);
        let bundle = test_bundle(dir.path(), &id).await;

        let err = Shim::launch(&ctx(), bundle.clone(), "io.keel.runc.v1", &test_config(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
        // nothing was spawned, so no pid file was ever written
        assert!(!bundle.path.join("shim.pid").exists());
    }

    #[tokio::test]
    async fn missing_shim_binary_fails_launch() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = test_bundle(dir.path(), "absent").await;

        let err = Shim::launch(
            &ctx(),
            bundle.clone(),
            "io.keel.task.absentshim",
            &test_config(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
        assert!(!bundle.path.join("shim.pid").exists());
    }

    #[tokio::test]
    async fn shim_exiting_before_handshake_fails_launch() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = test_bundle(dir.path(), "earlyexit").await;

        // a "shim" that exits immediately, before any RPC handshake
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let fake = bin_dir.join("keel-shim-fake");
        std::fs::write(&fake, "#!/bin/sh\nexit 0\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let path = format!(
            "{}:{}",
            bin_dir.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        std::env::set_var("PATH", path);

        // the supervisor may still be mid-exit when the dial lands; either
        // the launch itself fails or the first call on the session does
        match Shim::launch(&ctx(), bundle, "io.keel.fake", &test_config(2)).await {
            Err(_) => {}
            Ok(shim) => {
                let opts = CreateOpts::new(b"{}".to_vec(), "io.keel.fake");
                assert!(shim.create(&opts).await.is_err());
                shim.close().await;
            }
        }
    }
}
