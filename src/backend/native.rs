//! # Native OS process backend.
//!
//! Launches processes with [`tokio::process::Command`]. Each launched child is
//! owned by a dedicated **reaper** task:
//!
//! ```text
//! start() ──► spawn child ──► reaper task
//!                               ├─ child.wait()            ─► publish exit on watch channel
//!                               ├─ terminate request       ─► SIGTERM (if not reaped yet)
//!                               └─ kill request            ─► child.start_kill()
//!
//! wait()  ──► watch::Receiver::wait_for(exit observed)
//! stop()  ──► terminate request ─► wait ≤ stop_grace ─► kill request ─► wait for reap
//! stats() ──► /proc/<pid>/stat (Linux)
//! ```
//!
//! ## Rules
//! - Every started child is reaped exactly once, even if nobody calls `wait`.
//! - `wait` can be called any number of times; all callers see the same outcome.
//! - Both signals go through the reaper, which still owns the unreaped child,
//!   so they can never hit a recycled pid.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};

use super::{Backend, PartialStats, ProcessHandle, procfs};
use crate::error::BackendError;
use crate::process::ProcessConfig;

/// How a reaped child ended.
#[derive(Clone, Debug)]
enum Outcome {
    Status(ExitStatus),
    WaitFailed(String),
}

/// Requests handled by the reaper while it still owns the child.
enum Control {
    Terminate(oneshot::Sender<Result<(), BackendError>>),
    Kill,
}

/// Backend-private state stored in each [`ProcessHandle`].
struct NativeProc {
    exit: watch::Receiver<Option<Outcome>>,
    control: mpsc::Sender<Control>,
}

impl NativeProc {
    /// Asks the reaper for a SIGTERM. A child that is already reaped counts as
    /// terminated.
    async fn terminate(&self) -> Result<(), BackendError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(Control::Terminate(ack_tx)).await.is_err() {
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }
}

/// Backend for local OS processes.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    stop_grace: Duration,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl NativeBackend {
    /// Creates a backend that escalates from SIGTERM to a hard kill after `stop_grace`.
    pub fn new(stop_grace: Duration) -> Self {
        Self { stop_grace }
    }

    /// Grace between the polite and the hard termination request.
    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    fn proc<'a>(&self, handle: &'a ProcessHandle) -> Result<&'a NativeProc, BackendError> {
        handle
            .state::<NativeProc>()
            .ok_or(BackendError::UnknownHandle { id: handle.id() })
    }

    fn command(cfg: &ProcessConfig) -> Command {
        let mut cmd = Command::new(cfg.program());
        cmd.args(cfg.args())
            .stdin(Stdio::null())
            .kill_on_drop(false);
        if cfg.clear_env() {
            cmd.env_clear();
        }
        cmd.envs(cfg.env());
        if let Some(dir) = cfg.cwd() {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Backend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    async fn start(&self, cfg: &ProcessConfig) -> Result<ProcessHandle, BackendError> {
        let mut child = Self::command(cfg)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: cfg.program().display().to_string(),
                source,
            })?;

        let Some(pid) = child.id() else {
            let _ = child.start_kill();
            return Err(BackendError::Io(std::io::Error::other(
                "spawned child reported no pid",
            )));
        };

        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(4);
        tokio::spawn(reap(child, control_rx, exit_tx));

        let state = NativeProc {
            exit: exit_rx,
            control: control_tx,
        };
        Ok(ProcessHandle::new(pid).with_state(Arc::new(state)))
    }

    async fn stop(&self, handle: &ProcessHandle) -> Result<(), BackendError> {
        let proc = self.proc(handle)?;
        if proc.exit.borrow().is_some() {
            return Ok(());
        }

        let mut exit = proc.exit.clone();
        let signalled = proc.terminate().await;

        let graceful = tokio::time::timeout(self.stop_grace, exit.wait_for(Option::is_some));
        if !matches!(graceful.await, Ok(Ok(_))) {
            let _ = proc.control.send(Control::Kill).await;
            let _ = tokio::time::timeout(self.stop_grace, exit.wait_for(Option::is_some)).await;
        }

        match signalled {
            Err(err) if exit.borrow().is_none() => Err(err),
            _ => Ok(()),
        }
    }

    async fn wait(&self, handle: &ProcessHandle) -> Result<(), BackendError> {
        let mut exit = self.proc(handle)?.exit.clone();
        let outcome = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BackendError::Io(std::io::Error::other("reaper task vanished")))?
            .clone();

        match outcome {
            Some(Outcome::Status(status)) => status_to_result(status),
            Some(Outcome::WaitFailed(msg)) => Err(BackendError::Io(std::io::Error::other(msg))),
            None => Ok(()),
        }
    }

    async fn stats(&self, handle: &ProcessHandle) -> PartialStats {
        match self.proc(handle) {
            Ok(proc) if proc.exit.borrow().is_some() => {
                return PartialStats::degraded("process exited");
            }
            Ok(_) => {}
            Err(err) => return PartialStats::degraded(err.to_string()),
        }
        match procfs::sample(handle.pid()) {
            Ok(sample) => sample.into_stats(),
            Err(err) => PartialStats::degraded(format!("stats unavailable: {err}")),
        }
    }
}

/// Owns the child until it is reaped; honors signal requests meanwhile.
async fn reap(
    mut child: Child,
    mut control: mpsc::Receiver<Control>,
    exit: watch::Sender<Option<Outcome>>,
) {
    let res = loop {
        tokio::select! {
            res = child.wait() => break res,
            Some(req) = control.recv() => match req {
                Control::Terminate(ack) => {
                    // `id()` is gone once the child has been reaped
                    let res = child.id().map_or(Ok(()), terminate);
                    let _ = ack.send(res);
                }
                Control::Kill => {
                    let _ = child.start_kill();
                }
            }
        }
    };
    let outcome = match res {
        Ok(status) => Outcome::Status(status),
        Err(err) => Outcome::WaitFailed(err.to_string()),
    };
    let _ = exit.send(Some(outcome));
}

fn status_to_result(status: ExitStatus) -> Result<(), BackendError> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(BackendError::ExitCode { code });
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(BackendError::Signaled { signal });
        }
    }
    Err(BackendError::ExitCode { code: -1 })
}

/// Polite termination request. A vanished process counts as success.
#[cfg(unix)]
fn terminate(pid: u32) -> Result<(), BackendError> {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return Err(BackendError::Signal {
            pid,
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        });
    };
    // SAFETY: plain syscall; only called by the reaper while it still owns
    // the unreaped child, so the pid cannot have been recycled.
    if unsafe { libc::kill(raw, libc::SIGTERM) } == 0 {
        return Ok(());
    }
    let source = std::io::Error::last_os_error();
    if source.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(BackendError::Signal { pid, source })
    }
}

/// No polite signal off unix; the hard kill after the grace period does the work.
#[cfg(not(unix))]
fn terminate(_pid: u32) -> Result<(), BackendError> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessConfig {
        ProcessConfig::builder("/bin/sh").args(["-c", script]).build()
    }

    #[tokio::test]
    async fn wait_reports_exit_code() {
        let backend = NativeBackend::default();
        let h = backend.start(&sh("exit 3")).await.unwrap();

        let err = backend.wait(&h).await.unwrap_err();
        assert!(matches!(err, BackendError::ExitCode { code: 3 }));
        // repeatable
        let again = backend.wait(&h).await.unwrap_err();
        assert!(matches!(again, BackendError::ExitCode { code: 3 }));
    }

    #[tokio::test]
    async fn clean_exit_is_ok() {
        let backend = NativeBackend::default();
        let h = backend.start(&sh("exit 0")).await.unwrap();
        backend.wait(&h).await.unwrap();
        assert!(backend.stats(&h).await.get("error").is_some());
    }

    #[tokio::test]
    async fn stop_terminates_with_sigterm() {
        let backend = NativeBackend::new(Duration::from_secs(5));
        let h = backend
            .start(&ProcessConfig::builder("sleep").arg("100").build())
            .await
            .unwrap();

        backend.stop(&h).await.unwrap();
        let err = backend.wait(&h).await.unwrap_err();
        assert!(matches!(err, BackendError::Signaled { signal } if signal == libc::SIGTERM));

        // stopping again is a no-op
        backend.stop(&h).await.unwrap();
    }

    #[tokio::test]
    async fn terminate_request_after_reap_is_a_no_op() {
        let backend = NativeBackend::default();
        let h = backend.start(&sh("exit 0")).await.unwrap();
        backend.wait(&h).await.unwrap();

        let proc = h.state::<NativeProc>().unwrap();
        proc.terminate().await.unwrap();
        proc.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn terminate_request_reaches_running_child() {
        let backend = NativeBackend::default();
        let h = backend
            .start(&ProcessConfig::builder("sleep").arg("100").build())
            .await
            .unwrap();

        h.state::<NativeProc>().unwrap().terminate().await.unwrap();
        let err = backend.wait(&h).await.unwrap_err();
        assert!(matches!(err, BackendError::Signaled { signal } if signal == libc::SIGTERM));
    }

    #[tokio::test]
    async fn stop_escalates_when_sigterm_is_ignored() {
        let backend = NativeBackend::new(Duration::from_millis(200));
        let h = backend
            .start(&sh("trap '' TERM; while :; do sleep 1; done"))
            .await
            .unwrap();
        // let the shell install its trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        backend.stop(&h).await.unwrap();
        let err = backend.wait(&h).await.unwrap_err();
        assert!(matches!(err, BackendError::Signaled { signal } if signal == libc::SIGKILL));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let backend = NativeBackend::default();
        let err = backend
            .start(&ProcessConfig::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "backend_spawn");
    }

    #[tokio::test]
    async fn foreign_handle_is_rejected() {
        let backend = NativeBackend::default();
        let foreign = ProcessHandle::new(1);
        assert!(matches!(
            backend.wait(&foreign).await,
            Err(BackendError::UnknownHandle { .. })
        ));
        assert!(backend.stats(&foreign).await.get("error").is_some());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stats_of_running_process() {
        let backend = NativeBackend::default();
        let h = backend
            .start(&ProcessConfig::builder("sleep").arg("100").build())
            .await
            .unwrap();
        let stats = backend.stats(&h).await;
        assert!(stats.get("error").is_none(), "{stats:?}");
        assert!(stats.get_path("memory.rss_bytes").is_some());
        backend.stop(&h).await.unwrap();
    }
}
