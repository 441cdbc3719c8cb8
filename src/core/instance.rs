//! # Instance: one named, supervised process.
//!
//! An [`Instance`] binds a name to a live [`ProcessHandle`] and owns the
//! supervisor task watching it.
//!
//! ## Lifecycle
//! ```text
//! launch() ──► start (retry once) ──► spawn supervisor ──► Running
//!
//! Running ── restart() ──► start new ─► hand over old ─► spawn new ─► join old ─► Running (generation + 1)
//!    │                      (start fails → old handle kept, RestartFailed)
//!    ├── process exits on its own ─► Exit{expected: false} ─► Exited (still supervised)
//!    │
//!    ├── stop()  ─► fire lifeline ─► backend.stop ─► leave registry
//!    └── close() ─► fire lifeline ─► join supervisor ─► Closed (result cached)
//! ```
//!
//! ## Rules
//! - At most one supervisor watches the bound handle. A restart hands the old
//!   one over and installs its successor before it waits for the old one to
//!   wind down.
//! - `restart` and `close` are cancel safe: `bound` always holds a supervisor
//!   across an await, so a dropped call never leaves the instance unwatched.
//! - The bound handle, its generation and its log span change together under
//!   one lock.
//! - `stop` is best effort and never fails; `close` is idempotent and every
//!   caller gets the result of the first one.
//! - A restart abandons the old handle without stopping it. Callers that want
//!   the old process gone stop it first.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::json;
use tokio::sync::{Mutex, OnceCell, watch};

use super::lifeline::Lifeline;
use super::service::Registry;
use super::supervisor::{self, Exit, SupervisorCtx, Watch};
use crate::backend::{BackendRef, KEY_NAME, KEY_PROCESS, PartialStats, ProcessHandle, procfs};
use crate::error::InstanceError;
use crate::events::{Bus, Event, EventKind};
use crate::process::ProcessConfig;

/// Launch attempts made by [`Instance::launch`] before giving up.
const START_ATTEMPTS: u32 = 2;

/// Everything needed to launch an instance.
pub(crate) struct Launch {
    pub service: Arc<str>,
    pub name: Arc<str>,
    pub config: ProcessConfig,
    pub backend: BackendRef,
    pub bus: Bus,
    pub registry: Weak<Registry>,
}

/// State that changes on restart.
struct Bound {
    handle: ProcessHandle,
    generation: u64,
    span: tracing::Span,
    watch: Option<Watch>,
}

/// A named process under supervision.
///
/// Obtained from [`Service::new_instance`](crate::Service::new_instance).
pub struct Instance {
    name: Arc<str>,
    service: Arc<str>,
    config: ProcessConfig,
    backend: BackendRef,
    bus: Bus,
    registry: Weak<Registry>,
    lifeline: Lifeline,
    exits: Arc<watch::Sender<Option<Exit>>>,
    bound: Mutex<Bound>,
    closed: OnceCell<Result<(), InstanceError>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("service", &self.service)
            .field("name", &self.name)
            .field("dying", &self.lifeline.is_dying())
            .finish_non_exhaustive()
    }
}

impl Instance {
    /// Starts the process and its supervisor.
    ///
    /// A failed start is retried once. If no supervisor can be spawned the
    /// fresh process is stopped again before the error is returned.
    pub(crate) async fn launch(l: Launch) -> Result<Arc<Self>, InstanceError> {
        let handle = Self::start_with_retry(&l).await?;

        let rt = match supervisor::runtime(&l.name) {
            Ok(rt) => rt,
            Err(err) => {
                tracing::error!(service = %l.service, instance = %l.name, error = %err, "failed to supervise instance");
                if let Err(stop) = l.backend.stop(&handle).await {
                    tracing::debug!(service = %l.service, instance = %l.name, error = %stop, "failed to stop unsupervised process");
                }
                return Err(err);
            }
        };

        let (exits, _) = watch::channel(None);
        let exits = Arc::new(exits);
        let lifeline = Lifeline::new();
        let pid = handle.pid();
        let span = instance_span(&l.service, &l.name, pid);
        tracing::info!(parent: &span, "instance started");
        l.bus.publish(
            Event::new(EventKind::InstanceStarted)
                .with_service(l.service.clone())
                .with_instance(l.name.clone())
                .with_pid(pid),
        );

        let watch = supervisor::spawn_on(
            &rt,
            SupervisorCtx {
                service: l.service.clone(),
                instance: l.name.clone(),
                backend: l.backend.clone(),
                handle: handle.clone(),
                generation: 1,
                lifeline: lifeline.clone(),
                exits: exits.clone(),
                bus: l.bus.clone(),
                span: span.clone(),
            },
        );

        Ok(Arc::new(Self {
            name: l.name,
            service: l.service,
            config: l.config,
            backend: l.backend,
            bus: l.bus,
            registry: l.registry,
            lifeline,
            exits,
            bound: Mutex::new(Bound {
                handle,
                generation: 1,
                span,
                watch: Some(watch),
            }),
            closed: OnceCell::new(),
        }))
    }

    async fn start_with_retry(l: &Launch) -> Result<ProcessHandle, InstanceError> {
        let mut attempt = 1;
        loop {
            l.bus.publish(
                Event::new(EventKind::InstanceStarting)
                    .with_service(l.service.clone())
                    .with_instance(l.name.clone())
                    .with_attempt(attempt),
            );
            match l.backend.start(&l.config).await {
                Ok(handle) => return Ok(handle),
                Err(err) => {
                    tracing::warn!(service = %l.service, instance = %l.name, attempt, error = %err, "failed to start instance");
                    l.bus.publish(
                        Event::new(EventKind::StartFailed)
                            .with_service(l.service.clone())
                            .with_instance(l.name.clone())
                            .with_attempt(attempt)
                            .with_reason(err.to_string()),
                    );
                    if attempt >= START_ATTEMPTS {
                        return Err(InstanceError::Start {
                            name: l.name.to_string(),
                            source: Arc::new(err),
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Instance name, unique within its service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Launch configuration, reused by every restart.
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Pid of the currently bound process.
    pub async fn pid(&self) -> u32 {
        self.bound.lock().await.handle.pid()
    }

    /// The currently bound handle.
    pub async fn handle(&self) -> ProcessHandle {
        self.bound.lock().await.handle.clone()
    }

    /// Number of handles bound so far (1 after launch, +1 per restart).
    pub async fn generation(&self) -> u64 {
        self.bound.lock().await.generation
    }

    /// Identity snapshot: `name` and `process.{id, name}`.
    ///
    /// The process name lookup is best effort; failures are logged and leave
    /// the name empty.
    pub async fn info(&self) -> PartialStats {
        let (pid, span) = {
            let bound = self.bound.lock().await;
            (bound.handle.pid(), bound.span.clone())
        };
        let process_name = procfs::process_name(pid).unwrap_or_else(|err| {
            tracing::warn!(parent: &span, error = %err, "failed to look up process name");
            String::new()
        });

        let mut stats = PartialStats::new();
        stats.insert(KEY_NAME, self.name.as_ref());
        stats.insert(KEY_PROCESS, json!({ "id": pid, "name": process_name }));
        stats
    }

    /// Runtime statistics of the bound process, straight from the backend.
    pub async fn stats(&self) -> PartialStats {
        let handle = self.handle().await;
        self.backend.stats(&handle).await
    }

    /// Relaunches the process and rebinds supervision to the new handle.
    ///
    /// On failure the old handle stays bound and supervised. Fails with
    /// [`InstanceError::Closed`] once the instance is dying.
    pub async fn restart(&self) -> Result<(), InstanceError> {
        let mut bound = self.bound.lock().await;
        if self.lifeline.is_dying() {
            return Err(self.closed_error());
        }

        let handle = match self.backend.start(&self.config).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(parent: &bound.span, error = %err, "failed to restart instance");
                self.publish(
                    self.event(EventKind::RestartFailed)
                        .with_pid(bound.handle.pid())
                        .with_reason(err.to_string()),
                );
                return Err(InstanceError::Restart {
                    name: self.name.to_string(),
                    source: Arc::new(err),
                });
            }
        };

        // stop/close raced with the launch: the new process must not outlive us
        if self.lifeline.is_dying() {
            if let Err(err) = self.backend.stop(&handle).await {
                tracing::debug!(parent: &bound.span, error = %err, "failed to stop process of a closed instance");
            }
            return Err(self.closed_error());
        }

        let rt = match supervisor::runtime(&self.name) {
            Ok(rt) => rt,
            Err(err) => {
                if let Err(stop) = self.backend.stop(&handle).await {
                    tracing::debug!(parent: &bound.span, error = %stop, "failed to stop unsupervised process");
                }
                return Err(err);
            }
        };

        if let Some(old) = &bound.watch {
            old.hand_over();
        }

        let generation = bound.generation + 1;
        let pid = handle.pid();
        let span = instance_span(&self.service, &self.name, pid);
        let watch = supervisor::spawn_on(
            &rt,
            SupervisorCtx {
                service: self.service.clone(),
                instance: self.name.clone(),
                backend: self.backend.clone(),
                handle: handle.clone(),
                generation,
                lifeline: self.lifeline.clone(),
                exits: self.exits.clone(),
                bus: self.bus.clone(),
                span: span.clone(),
            },
        );
        let mut old = std::mem::replace(
            &mut *bound,
            Bound {
                handle,
                generation,
                span,
                watch: Some(watch),
            },
        );

        tracing::info!(parent: &bound.span, generation, "instance restarted");
        self.publish(self.event(EventKind::InstanceRestarted).with_pid(pid));

        if let Some(ref mut watch) = old.watch {
            if let Err(err) = watch.join(&self.name).await {
                tracing::debug!(parent: &old.span, error = %err, "previous supervision ended with error");
            }
        }
        Ok(())
    }

    /// Stops the process and removes the instance from its service.
    ///
    /// Marks the instance dying first, so the exit that follows is treated as
    /// expected. Backend failures are logged and published, never returned.
    pub async fn stop(&self) {
        self.lifeline.fire(Some("stopped"));
        let (handle, span) = {
            let bound = self.bound.lock().await;
            (bound.handle.clone(), bound.span.clone())
        };

        tracing::info!(parent: &span, "instance is stopping");
        self.publish(self.event(EventKind::InstanceStopping).with_pid(handle.pid()));

        if let Err(err) = self.backend.stop(&handle).await {
            tracing::debug!(parent: &span, error = %err, "failed to stop instance");
            self.publish(
                self.event(EventKind::StopFailed)
                    .with_pid(handle.pid())
                    .with_reason(err.to_string()),
            );
        }

        self.deregister().await;
    }

    /// Ends supervision and waits for the supervisor task to finish.
    ///
    /// Does not stop the process. Returns the supervisor's result: the exit
    /// error if the current process crashed before the close, `Ok` otherwise.
    /// Repeated or concurrent calls all get the first result.
    pub async fn close(&self) -> Result<(), InstanceError> {
        self.closed
            .get_or_init(|| async {
                self.lifeline.fire(None);
                // the watch stays in place until joined, so a dropped close
                // leaves the next caller something to wait on
                let mut bound = self.bound.lock().await;
                let span = bound.span.clone();
                let res = match bound.watch.as_mut() {
                    Some(watch) => watch.join(&self.name).await,
                    None => Ok(()),
                };
                drop(bound);

                let mut ev = self.event(EventKind::InstanceClosed);
                match &res {
                    Ok(()) => tracing::debug!(parent: &span, "instance closed"),
                    Err(err) => {
                        tracing::debug!(parent: &span, error = %err, "instance closed");
                        ev = ev.with_reason(err.to_string());
                    }
                }
                self.publish(ev);
                res
            })
            .await
            .clone()
    }

    /// Resolves once the instance is dying (stop or close was requested).
    pub async fn dying(&self) {
        self.lifeline.dying().await
    }

    /// Non-blocking check for [`dying`](Self::dying).
    pub fn is_dying(&self) -> bool {
        self.lifeline.is_dying()
    }

    /// Reason recorded when the instance started dying (`"stopped"` for stop).
    pub fn dying_reason(&self) -> Option<Arc<str>> {
        self.lifeline.reason()
    }

    /// Waits for the current process to exit.
    ///
    /// Returns the exit of the generation bound at call time or a later one,
    /// or `None` if the instance starts dying before any such exit is seen.
    pub async fn exited(&self) -> Option<Exit> {
        let generation = self.generation().await;
        let mut rx = self.exits.subscribe();
        let current = |e: &Option<Exit>| e.as_ref().is_some_and(|e| e.generation >= generation);

        tokio::select! {
            biased;
            res = rx.wait_for(current) => return res.ok().and_then(|exit| (*exit).clone()),
            _ = self.lifeline.dying() => {}
        }
        rx.borrow().clone().filter(|e| e.generation >= generation)
    }

    /// Receiver over the most recent [`Exit`], updated once per generation.
    pub fn subscribe_exits(&self) -> watch::Receiver<Option<Exit>> {
        self.exits.subscribe()
    }

    /// True while a supervisor task is attached and running.
    pub async fn is_supervising(&self) -> bool {
        self.bound
            .lock()
            .await
            .watch
            .as_ref()
            .is_some_and(Watch::is_running)
    }

    pub(crate) fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_service(self.service.clone())
            .with_instance(self.name.clone())
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    fn closed_error(&self) -> InstanceError {
        InstanceError::Closed {
            name: self.name.to_string(),
        }
    }

    /// Removes this exact instance from the registry, if it is still there.
    async fn deregister(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let removed = {
            let mut map = registry.write().await;
            match map.get(self.name.as_ref()) {
                Some(cur) if std::ptr::eq(Arc::as_ptr(cur), self) => {
                    map.remove(self.name.as_ref()).is_some()
                }
                _ => false,
            }
        };
        if removed {
            self.publish(self.event(EventKind::InstanceRemoved));
        }
    }
}

fn instance_span(service: &str, instance: &str, pid: u32) -> tracing::Span {
    tracing::info_span!("instance", service = %service, instance = %instance, pid)
}
