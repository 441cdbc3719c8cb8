mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{FakeBackend, next_of, service, service_with, sleeper};
use procvisor::{
    BackendRef, Config, Event, EventKind, InstanceError, RuntimeError, Service, Subscribe,
};
use tokio::sync::mpsc;

#[tokio::test]
async fn duplicate_names_are_rejected_before_launch() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    let first = svc.new_instance("web", sleeper()).await.unwrap();
    let err = svc.new_instance("web", sleeper()).await.unwrap_err();

    assert!(matches!(err, InstanceError::AlreadyExists { ref name } if name == "web"));
    assert_eq!(fake.starts(), 1);
    assert!(Arc::ptr_eq(&svc.get("web").await.unwrap(), &first));
}

#[tokio::test]
async fn list_is_sorted() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    for name in ["c", "a", "b"] {
        svc.new_instance(name, sleeper()).await.unwrap();
    }
    assert_eq!(svc.list().await, vec!["a", "b", "c"]);
    assert_eq!(svc.len().await, 3);
    let names: Vec<String> = svc
        .instances()
        .await
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn remove_stops_and_closes() {
    let fake = FakeBackend::new();
    let svc = service(&fake);
    let mut events = svc.subscribe();

    let inst = svc.new_instance("web", sleeper()).await.unwrap();
    let pid = inst.pid().await;

    svc.remove("web").await.unwrap();
    assert!(!fake.is_running(pid));
    assert!(svc.is_empty().await);
    assert!(!inst.is_supervising().await);
    next_of(&mut events, EventKind::InstanceRemoved).await;

    let err = svc.remove("web").await.unwrap_err();
    assert_eq!(err.as_label(), "instance_not_found");
}

#[tokio::test]
async fn stale_stop_leaves_the_replacement_registered() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    let old = svc.new_instance("web", sleeper()).await.unwrap();
    old.stop().await;
    let new = svc.new_instance("web", sleeper()).await.unwrap();

    // stopping the old instance again must not evict the new one
    old.stop().await;
    let current = svc.get("web").await.unwrap();
    assert!(Arc::ptr_eq(&current, &new));
}

#[tokio::test]
async fn stats_merge_identity_with_backend_fields() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    svc.new_instance("b", sleeper()).await.unwrap();
    svc.new_instance("a", sleeper()).await.unwrap();

    let reports = svc.stats().await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].get("name"), Some(&serde_json::json!("a")));
    assert!(reports[0].get_path("process.id").is_some());
    assert_eq!(reports[1].get("threads"), Some(&serde_json::json!(1)));
}

#[tokio::test]
async fn shutdown_closes_everything_within_grace() {
    let fake = FakeBackend::new();
    let svc = service(&fake);
    let mut events = svc.subscribe();

    let a = svc.new_instance("a", sleeper()).await.unwrap();
    let b = svc.new_instance("b", sleeper()).await.unwrap();

    svc.shutdown().await.unwrap();
    next_of(&mut events, EventKind::ShutdownRequested).await;
    next_of(&mut events, EventKind::AllStoppedWithin).await;

    assert!(svc.is_empty().await);
    assert!(!a.is_supervising().await);
    assert!(!b.is_supervising().await);
}

#[tokio::test]
async fn shutdown_names_instances_stuck_past_grace() {
    let fake = FakeBackend::new();
    let cfg = Config {
        grace: Duration::from_millis(100),
        ..Config::default()
    };
    let svc = service_with(&fake, cfg);
    let mut events = svc.subscribe();

    svc.new_instance("z", sleeper()).await.unwrap();
    svc.new_instance("y", sleeper()).await.unwrap();
    fake.hang_stops(true);

    let err = svc.shutdown().await.unwrap_err();
    let RuntimeError::GraceExceeded { grace, stuck } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*grace, Duration::from_millis(100));
    assert_eq!(stuck, &vec!["y".to_string(), "z".to_string()]);
    assert_eq!(err.as_label(), "runtime_grace_exceeded");
    next_of(&mut events, EventKind::GraceExceeded).await;
}

struct Forward(mpsc::UnboundedSender<EventKind>);

#[async_trait]
impl Subscribe for Forward {
    async fn on_event(&self, event: &Event) {
        let _ = self.0.send(event.kind);
    }

    fn name(&self) -> &'static str {
        "forward"
    }
}

#[tokio::test]
async fn subscribers_receive_lifecycle_events() {
    let fake = FakeBackend::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let backend: BackendRef = fake.clone();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Forward(tx))];
    let svc = Service::builder("subs")
        .with_shared_backend(backend)
        .with_subscribers(subs)
        .build();

    let inst = svc.new_instance("web", sleeper()).await.unwrap();
    inst.stop().await;
    inst.close().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(Some(kind)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        seen.push(kind);
        if kind == EventKind::InstanceClosed {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            EventKind::InstanceStarting,
            EventKind::InstanceStarted,
            EventKind::InstanceStopping,
            EventKind::InstanceRemoved,
            EventKind::InstanceClosed,
        ]
    );
}
