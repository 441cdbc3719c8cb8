#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use procvisor::{
    Backend, BackendError, Config, InstanceError, NativeBackend, ProcessConfig, Service,
};

fn native_service() -> Service {
    let cfg = Config {
        stop_grace: Duration::from_secs(2),
        ..Config::default()
    };
    Service::new("native", Arc::new(NativeBackend::new(cfg.stop_grace)), cfg)
}

#[tokio::test]
async fn sleep_is_started_stopped_and_closed() {
    let svc = native_service();
    let inst = svc
        .new_instance("sleeper", ProcessConfig::builder("sleep").arg("100").build())
        .await
        .unwrap();
    assert!(inst.pid().await > 0);

    #[cfg(target_os = "linux")]
    {
        let info = inst.info().await;
        assert_eq!(info.get_path("process.name"), Some(&serde_json::json!("sleep")));
        assert!(inst.stats().await.get_path("memory.rss_bytes").is_some());
    }

    inst.stop().await;
    inst.close().await.unwrap();
    assert!(svc.is_empty().await);
    assert!(inst.stats().await.get("error").is_some());
}

#[tokio::test]
async fn missing_binary_fails_after_retry() {
    let svc = native_service();
    let err = svc
        .new_instance("ghost", ProcessConfig::new("/nonexistent/binary"))
        .await
        .unwrap_err();

    let InstanceError::Start { source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(matches!(source.as_ref(), BackendError::Spawn { .. }));
    assert!(svc.get("ghost").await.is_none());
}

#[tokio::test]
async fn nonzero_exit_reaches_the_exit_channel() {
    let svc = native_service();
    let inst = svc
        .new_instance(
            "failing",
            ProcessConfig::builder("/bin/sh").args(["-c", "exit 7"]).build(),
        )
        .await
        .unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(5), inst.exited())
        .await
        .unwrap()
        .unwrap();
    assert!(!exit.expected);
    assert!(matches!(exit.error.as_deref(), Some(BackendError::ExitCode { code: 7 })));

    assert!(matches!(inst.close().await, Err(InstanceError::Exited { .. })));
}

#[tokio::test]
async fn restart_launches_a_fresh_process() {
    let svc = native_service();
    let inst = svc
        .new_instance("web", ProcessConfig::builder("sleep").arg("100").build())
        .await
        .unwrap();
    let old = inst.handle().await;

    inst.restart().await.unwrap();
    assert_ne!(inst.pid().await, old.pid());

    // the abandoned process is ours to clean up
    svc.backend().stop(&old).await.unwrap();
    inst.stop().await;
    inst.close().await.unwrap();
}
