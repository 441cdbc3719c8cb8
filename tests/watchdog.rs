mod common;

use std::time::Duration;

use common::{FakeBackend, FakeExit, next_of, service, sleeper};
use procvisor::{
    BackoffPolicy, EventKind, JitterPolicy, RestartPolicy, Watchdog, WatchdogExit, WatchdogParams,
};

fn quick() -> BackoffPolicy {
    BackoffPolicy {
        first: Duration::from_millis(10),
        max: Duration::from_millis(500),
        factor: 1.0,
        jitter: JitterPolicy::None,
    }
}

#[tokio::test]
async fn on_failure_restarts_a_crashed_instance() {
    let fake = FakeBackend::new();
    let svc = service(&fake);
    let mut events = svc.subscribe();

    let inst = svc.new_instance("web", sleeper()).await.unwrap();
    let wd = Watchdog::spawn(inst.clone(), RestartPolicy::OnFailure, quick());

    let first = inst.pid().await;
    fake.crash(first, 1);

    let scheduled = next_of(&mut events, EventKind::RestartScheduled).await;
    assert_eq!(scheduled.attempt, Some(1));
    assert_eq!(scheduled.delay_ms, Some(10));
    let restarted = next_of(&mut events, EventKind::InstanceRestarted).await;
    assert_ne!(restarted.pid, Some(first));
    assert_eq!(inst.generation().await, 2);

    inst.stop().await;
    assert_eq!(wd.join().await, WatchdogExit::InstanceDying);
    let _ = inst.close().await;
}

#[tokio::test]
async fn never_policy_leaves_the_instance_down() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    let inst = svc.new_instance("web", sleeper()).await.unwrap();
    let wd = Watchdog::spawn(inst.clone(), RestartPolicy::Never, quick());

    fake.crash(inst.pid().await, 1);
    assert_eq!(wd.join().await, WatchdogExit::PolicyDeclined);
    assert_eq!(fake.starts(), 1);
    assert_eq!(inst.generation().await, 1);
}

#[tokio::test]
async fn on_failure_ignores_clean_exits() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    let inst = svc.new_instance("job", sleeper()).await.unwrap();
    let wd = Watchdog::spawn(inst.clone(), RestartPolicy::OnFailure, quick());

    fake.exit(inst.pid().await, FakeExit::Code(0));
    assert_eq!(wd.join().await, WatchdogExit::PolicyDeclined);
    assert_eq!(fake.starts(), 1);
}

#[tokio::test]
async fn always_restarts_after_a_clean_exit() {
    let fake = FakeBackend::new();
    let svc = service(&fake);
    let mut events = svc.subscribe();

    let inst = svc.new_instance("cron", sleeper()).await.unwrap();
    let always = RestartPolicy::Always {
        interval: Some(Duration::from_millis(5)),
    };
    let wd = Watchdog::spawn(inst.clone(), always, quick());

    fake.exit(inst.pid().await, FakeExit::Code(0));
    let scheduled = next_of(&mut events, EventKind::RestartScheduled).await;
    assert_eq!(scheduled.delay_ms, Some(5));
    assert!(scheduled.reason.is_none());
    next_of(&mut events, EventKind::InstanceRestarted).await;

    wd.cancel();
    assert_eq!(wd.join().await, WatchdogExit::Cancelled);
    inst.stop().await;
    let _ = inst.close().await;
}

#[tokio::test]
async fn gives_up_after_max_consecutive_failures() {
    let fake = FakeBackend::new();
    let svc = service(&fake);
    let mut events = svc.subscribe();

    let inst = svc.new_instance("doomed", sleeper()).await.unwrap();
    let params = WatchdogParams::new(RestartPolicy::OnFailure, quick()).with_max_restarts(2);
    let wd = Watchdog::spawn_with(inst.clone(), params);

    fake.fail_next_starts(u32::MAX);
    fake.crash(inst.pid().await, 1);

    assert_eq!(wd.join().await, WatchdogExit::Exhausted);
    next_of(&mut events, EventKind::RestartFailed).await;
    let exhausted = next_of(&mut events, EventKind::WatchdogExhausted).await;
    assert_eq!(exhausted.attempt, Some(3));
    // launch + two failed relaunches
    assert_eq!(fake.starts(), 3);
}

#[tokio::test]
async fn cancel_leaves_the_instance_alone() {
    let fake = FakeBackend::new();
    let svc = service(&fake);

    let inst = svc.new_instance("web", sleeper()).await.unwrap();
    let wd = Watchdog::spawn_with(inst.clone(), WatchdogParams::default());

    wd.cancel();
    assert_eq!(wd.join().await, WatchdogExit::Cancelled);
    assert!(!inst.is_dying());
    assert!(inst.is_supervising().await);
}
