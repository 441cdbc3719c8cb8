//! Scripted in-memory backend shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use procvisor::{
    Backend, BackendError, BackendRef, Config, Event, EventKind, PartialStats, ProcessConfig,
    ProcessHandle, Service,
};
use serde_json::json;
use tokio::sync::{broadcast, watch};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeExit {
    Code(i32),
    Signal(i32),
}

struct FakeProc {
    exit: watch::Sender<Option<FakeExit>>,
}

/// Backend whose processes only exist in memory and exit when told to.
#[derive(Default)]
pub struct FakeBackend {
    next_pid: AtomicU32,
    fail_starts: AtomicU32,
    stop_hangs: AtomicBool,
    stop_fails: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
    procs: Mutex<HashMap<u32, Arc<FakeProc>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(900_000),
            ..Self::default()
        })
    }

    /// Makes the next `n` starts fail.
    pub fn fail_next_starts(&self, n: u32) {
        self.fail_starts.store(n, Ordering::SeqCst);
    }

    /// `stop` never returns.
    pub fn hang_stops(&self, on: bool) {
        self.stop_hangs.store(on, Ordering::SeqCst);
    }

    /// `stop` returns an error and leaves the process running.
    pub fn fail_stops(&self, on: bool) {
        self.stop_fails.store(on, Ordering::SeqCst);
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Ends the process with `pid`.
    pub fn exit(&self, pid: u32, how: FakeExit) {
        let procs = self.procs.lock().unwrap();
        let proc = procs.get(&pid).expect("unknown fake pid");
        proc.exit.send_if_modified(|cur| {
            if cur.is_none() {
                *cur = Some(how);
                true
            } else {
                false
            }
        });
    }

    pub fn crash(&self, pid: u32, code: i32) {
        self.exit(pid, FakeExit::Code(code));
    }

    pub fn is_running(&self, pid: u32) -> bool {
        let procs = self.procs.lock().unwrap();
        procs.get(&pid).is_some_and(|p| p.exit.borrow().is_none())
    }

    fn proc_of(&self, handle: &ProcessHandle) -> Result<Arc<FakeProc>, BackendError> {
        self.procs
            .lock()
            .unwrap()
            .get(&handle.pid())
            .cloned()
            .ok_or(BackendError::UnknownHandle { id: handle.id() })
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(&self, cfg: &ProcessConfig) -> Result<ProcessHandle, BackendError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .fail_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted {
            return Err(BackendError::Spawn {
                program: cfg.program().display().to_string(),
                source: std::io::Error::other("scripted start failure"),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (exit, _) = watch::channel(None);
        self.procs
            .lock()
            .unwrap()
            .insert(pid, Arc::new(FakeProc { exit }));
        Ok(ProcessHandle::new(pid))
    }

    async fn stop(&self, handle: &ProcessHandle) -> Result<(), BackendError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.stop_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.stop_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Signal {
                pid: handle.pid(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        self.proc_of(handle)?;
        self.exit(handle.pid(), FakeExit::Signal(15));
        Ok(())
    }

    async fn wait(&self, handle: &ProcessHandle) -> Result<(), BackendError> {
        let mut rx = self.proc_of(handle)?.exit.subscribe();
        let outcome = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BackendError::Io(std::io::Error::other("fake process dropped")))?;
        match outcome {
            Some(FakeExit::Code(0)) | None => Ok(()),
            Some(FakeExit::Code(code)) => Err(BackendError::ExitCode { code }),
            Some(FakeExit::Signal(signal)) => Err(BackendError::Signaled { signal }),
        }
    }

    async fn stats(&self, handle: &ProcessHandle) -> PartialStats {
        match self.proc_of(handle) {
            Ok(proc) if proc.exit.borrow().is_none() => {
                let mut s = PartialStats::new();
                s.insert("threads", 1);
                s.insert("memory", json!({ "rss_bytes": 4096 }));
                s
            }
            Ok(_) => PartialStats::degraded("process exited"),
            Err(err) => PartialStats::degraded(err.to_string()),
        }
    }
}

pub fn sleeper() -> ProcessConfig {
    ProcessConfig::builder("sleep").arg("100").build()
}

pub fn service(fake: &Arc<FakeBackend>) -> Service {
    service_with(fake, Config::default())
}

pub fn service_with(fake: &Arc<FakeBackend>, cfg: Config) -> Service {
    let backend: BackendRef = fake.clone();
    Service::new("test", backend, cfg)
}

/// Receives events until one of `kind` arrives.
pub async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind:?} event within 5s"))
}
