//! Shim process plumbing - binary resolution, spawn setup, pid file, OOM
//!
//! The shim runs in its own process group with the bound listening socket
//! inherited as fd 3, so the RPC channel exists before the shim's first
//! instruction and the process outlives the launcher's terminal.

use keel_foundation::{Error, Result};
use std::os::unix::io::RawFd;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Naming convention for shim executables: `keel-shim-<component>`
const SHIM_BINARY_PREFIX: &str = "keel-shim";

/// Fd number the shim finds its listening socket on
const SOCKET_FD: RawFd = 3;

/// Worker-thread hint exported to the shim's async runtime
const WORKER_THREADS_ENV: &str = "TOKIO_WORKER_THREADS";

/// The shim is expendable: never preferred for survival over its workload
pub const OOM_SCORE_MAX_KILLABLE: i32 = 1000;

/// Resolve a supervisor selector to an executable name
///
/// The last dot-delimited component of the selector is substituted into the
/// naming convention, so "io.keel.runc.v1" runs `keel-shim-v1`.
pub fn shim_binary(selector: &str) -> String {
    let component = selector.rsplit('.').next().unwrap_or(selector);
    format!("{}-{}", SHIM_BINARY_PREFIX, component)
}

/// Build the shim spawn command
///
/// Working directory is the bundle's persistent path; the environment is
/// inherited plus the worker-thread hint; the bound listener lands on fd 3
/// in the child; the child gets its own process group.
pub fn shim_command(
    binary: &str,
    namespace: &str,
    control_address: &str,
    bundle_path: &Path,
    worker_threads: usize,
    socket_fd: RawFd,
) -> Command {
    let mut cmd = Command::new(binary);
    cmd.arg("--namespace")
        .arg(namespace)
        .arg("--address")
        .arg(control_address)
        .current_dir(bundle_path)
        .env(WORKER_THREADS_ENV, worker_threads.to_string())
        .process_group(0);
    unsafe {
        cmd.pre_exec(move || {
            // hand the bound listener to the shim as fd 3; dup2 leaves the
            // new descriptor without CLOEXEC so it survives the exec
            if libc::dup2(socket_fd, SOCKET_FD) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    cmd
}

/// Write a pid file atomically (dot-temp in the same directory + rename)
///
/// A reader never observes a partially written pid.
pub async fn write_pid_file(path: &Path, pid: u32) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Internal(format!("pid file path {:?} has no parent", path)))?;
    let name = path
        .file_name()
        .ok_or_else(|| Error::Internal(format!("pid file path {:?} has no file name", path)))?;
    let temp = parent.join(format!(".{}", name.to_string_lossy()));
    tokio::fs::write(&temp, pid.to_string()).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}

/// Pin a process's OOM kill priority
pub async fn set_oom_score(pid: u32, score: i32) -> Result<()> {
    let path = format!("/proc/{}/oom_score_adj", pid);
    tokio::fs::write(&path, score.to_string())
        .await
        .map_err(|e| Error::Launch(format!("failed to set OOM score on shim {}: {}", pid, e)))
}

/// Kill a spawned shim outright; failure only means it is already gone
pub fn kill_shim(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %e, "shim already gone at kill");
    }
}
