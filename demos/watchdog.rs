//! # Example: watchdog
//!
//! Supervises a shell that crashes shortly after every start and lets a
//! [`Watchdog`] relaunch it with exponential backoff until the restart limit
//! is reached.
//!
//! ## Flow
//! ```text
//! sh -c "sleep 0.2; exit 3"
//!   └─► Exit{expected: false, error: exit code 3}
//! Watchdog
//!   ├─► RestartScheduled{attempt=1, delay≈100ms} → restart()
//!   ├─► RestartScheduled{attempt=2, delay≈200ms} → restart()
//!   ├─► RestartScheduled{attempt=3, delay≈400ms} → restart()
//!   └─► WatchdogExhausted
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example watchdog
//! ```

use std::time::Duration;

use procvisor::{
    BackoffPolicy, Config, JitterPolicy, ProcessConfig, RestartPolicy, Service, Watchdog,
    WatchdogParams,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("procvisor=info".parse()?))
        .init();

    let cfg = Config {
        restart: RestartPolicy::OnFailure,
        backoff: BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        },
        max_restarts: 3,
        ..Config::default()
    };
    let service = Service::builder("crashers").with_config(cfg).build();

    let crasher = service
        .new_instance(
            "crasher",
            ProcessConfig::builder("/bin/sh")
                .args(["-c", "sleep 0.2; exit 3"])
                .build(),
        )
        .await?;

    let watchdog = Watchdog::spawn_with(
        crasher.clone(),
        WatchdogParams::from_config(service.config()),
    );
    let outcome = watchdog.join().await;
    println!("watchdog ended: {outcome:?} after {} launches", crasher.generation().await);

    if let Err(err) = service.shutdown().await {
        eprintln!("shutdown: {err}");
    }
    Ok(())
}
