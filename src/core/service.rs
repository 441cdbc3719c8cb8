//! # Service: named registry of supervised instances.
//!
//! A [`Service`] groups instances that share a backend, an event bus and a
//! [`Config`]. It is the registry interface: create, look up, remove, report.
//!
//! ## Architecture
//! ```text
//! Service::builder(name)
//!     .with_config(cfg) .with_backend(b) .with_subscribers(subs)
//!     .build() ──► Service { registry, bus, backend }
//!                     └─► listener task: Bus ──► SubscriberSet (only with subscribers)
//!
//! new_instance(name, cfg) ──► Instance::launch ──► registry.insert
//! remove(name)            ──► instance.stop() ──► instance.close()
//! shutdown()              ──► stop + close every instance concurrently, bounded by `grace`
//! ```
//!
//! ## Rules
//! - Names are unique; a taken name is `AlreadyExists` and nothing is launched.
//! - An instance leaves the registry when it is stopped, never on its own.
//! - The listener lives as long as the last clone of the service.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::config::Config;
use super::instance::{Instance, Launch};
use crate::backend::{Backend, BackendRef, NativeBackend, PartialStats};
use crate::error::{InstanceError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::process::ProcessConfig;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Instance name → instance.
pub(crate) type Registry = RwLock<HashMap<String, Arc<Instance>>>;

struct Inner {
    name: Arc<str>,
    cfg: Config,
    backend: BackendRef,
    bus: Bus,
    registry: Arc<Registry>,
    _listener: Option<DropGuard>,
}

/// Registry of supervised instances sharing one backend.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.inner.name)
            .field("backend", &self.inner.backend.name())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Service`].
pub struct ServiceBuilder {
    name: String,
    cfg: Config,
    backend: Option<BackendRef>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ServiceBuilder {
    /// Replaces the default [`Config`].
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Uses `backend` instead of a [`NativeBackend`].
    pub fn with_backend<B: Backend>(self, backend: B) -> Self {
        self.with_shared_backend(Arc::new(backend))
    }

    /// Uses an already shared backend.
    pub fn with_shared_backend(mut self, backend: BackendRef) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Event subscribers fed from the service bus.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the service.
    ///
    /// With subscribers this spawns the bus listener, so it must run inside a
    /// tokio runtime.
    pub fn build(self) -> Service {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(NativeBackend::new(self.cfg.stop_grace)));
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = if self.subscribers.is_empty() {
            None
        } else {
            Some(spawn_listener(&bus, self.subscribers))
        };

        Service {
            inner: Arc::new(Inner {
                name: Arc::from(self.name),
                cfg: self.cfg,
                backend,
                bus,
                registry: Arc::new(RwLock::new(HashMap::new())),
                _listener: listener,
            }),
        }
    }
}

impl Service {
    /// Creates a service without subscribers.
    pub fn new(name: impl Into<String>, backend: BackendRef, cfg: Config) -> Self {
        Self::builder(name)
            .with_config(cfg)
            .with_shared_backend(backend)
            .build()
    }

    /// Starts building a service. Defaults: `Config::default()`, native backend.
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            cfg: Config::default(),
            backend: None,
            subscribers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    pub fn backend(&self) -> &BackendRef {
        &self.inner.backend
    }

    /// The service event bus.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Shorthand for `bus().subscribe()`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Launches a new supervised instance under `name`.
    ///
    /// Fails with [`InstanceError::AlreadyExists`] if the name is taken (nothing
    /// is launched), or [`InstanceError::Start`] if both launch attempts fail.
    pub async fn new_instance(
        &self,
        name: impl Into<String>,
        config: ProcessConfig,
    ) -> Result<Arc<Instance>, InstanceError> {
        let name = name.into();
        if self.inner.registry.read().await.contains_key(&name) {
            return Err(InstanceError::AlreadyExists { name });
        }

        let instance = Instance::launch(Launch {
            service: self.inner.name.clone(),
            name: Arc::from(name.as_str()),
            config,
            backend: self.inner.backend.clone(),
            bus: self.inner.bus.clone(),
            registry: Arc::downgrade(&self.inner.registry),
        })
        .await?;

        let lost_race = {
            let mut map = self.inner.registry.write().await;
            if map.contains_key(&name) {
                true
            } else {
                map.insert(name.clone(), instance.clone());
                false
            }
        };
        if lost_race {
            tracing::debug!(service = %self.inner.name, instance = %name, "name taken while launching, discarding");
            instance.stop().await;
            if let Err(err) = instance.close().await {
                tracing::debug!(service = %self.inner.name, instance = %name, error = %err, "discarded instance closed with error");
            }
            return Err(InstanceError::AlreadyExists { name });
        }
        Ok(instance)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Instance>> {
        self.inner.registry.read().await.get(name).cloned()
    }

    /// Sorted instance names.
    pub async fn list(&self) -> Vec<String> {
        let map = self.inner.registry.read().await;
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// All instances, sorted by name.
    pub async fn instances(&self) -> Vec<Arc<Instance>> {
        let map = self.inner.registry.read().await;
        let mut all: Vec<Arc<Instance>> = map.values().cloned().collect();
        all.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub async fn len(&self) -> usize {
        self.inner.registry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.registry.read().await.is_empty()
    }

    /// Stops and closes the named instance.
    ///
    /// Returns the close result, which carries the exit error if the process
    /// had crashed before the removal.
    pub async fn remove(&self, name: &str) -> Result<(), InstanceError> {
        let Some(instance) = self.get(name).await else {
            return Err(InstanceError::NotFound {
                name: name.to_string(),
            });
        };
        instance.stop().await;
        instance.close().await
    }

    /// `info()` merged with `stats()` for every instance, sorted by name.
    pub async fn stats(&self) -> Vec<PartialStats> {
        let mut out = Vec::new();
        for instance in self.instances().await {
            let mut report = instance.info().await;
            report.merge(instance.stats().await);
            out.push(report);
        }
        out
    }

    /// Stops and closes every instance, waiting at most `Config::grace`.
    ///
    /// Instances that do not finish in time keep closing in the background
    /// and are named in [`RuntimeError::GraceExceeded`].
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let grace = self.inner.cfg.grace;
        self.publish(Event::new(EventKind::ShutdownRequested));
        tracing::info!(service = %self.inner.name, ?grace, "service is shutting down");

        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut set = JoinSet::new();
        for instance in self.instances().await {
            pending.insert(instance.name().to_string());
            set.spawn(async move {
                instance.stop().await;
                if let Err(err) = instance.close().await {
                    tracing::debug!(instance = %instance.name(), error = %err, "instance closed with error");
                }
                instance.name().to_string()
            });
        }

        let all_done = async {
            while let Some(res) = set.join_next().await {
                if let Ok(name) = res {
                    pending.remove(&name);
                }
            }
        };

        let finished = tokio::time::timeout(grace, all_done).await;
        match finished {
            Ok(()) => {
                self.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                set.detach_all();
                let stuck: Vec<String> = pending.into_iter().collect();
                tracing::warn!(service = %self.inner.name, ?stuck, "shutdown grace exceeded");
                self.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    fn publish(&self, ev: Event) {
        self.inner.bus.publish(ev.with_service(self.inner.name.clone()));
    }
}

/// Forwards bus events to the subscribers until the service is dropped.
fn spawn_listener(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>) -> DropGuard {
    let token = CancellationToken::new();
    let stop = token.clone();
    let set = SubscriberSet::new(subscribers, bus.clone());
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        // forward what was already queued
        loop {
            match rx.try_recv() {
                Ok(ev) => set.emit(&ev),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        set.shutdown().await;
    });

    token.drop_guard()
}
