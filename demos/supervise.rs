//! # Example: supervise
//!
//! Launches a long-running `sleep`, prints its telemetry, then stops and
//! closes it. Every lifecycle event is rendered by the built-in [`LogWriter`].
//!
//! ## Flow
//! ```text
//! Service::new_instance("sleeper")
//!   ├─► publish(InstanceStarting, attempt=1)
//!   ├─► backend.start(sleep 100)
//!   └─► publish(InstanceStarted{pid})
//! Service::stats()            → [{"name": "sleeper", "process": {...}, "memory": {...}}]
//! Instance::stop()            → publish(InstanceStopping), SIGTERM, publish(InstanceRemoved)
//! Instance::close()           → publish(InstanceClosed)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example supervise --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use procvisor::{Config, LogWriter, ProcessConfig, Service, Subscribe};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("procvisor=info".parse()?))
        .init();

    // 1. Configure the service (short stop grace for the demo)
    let mut cfg = Config::default();
    cfg.stop_grace = Duration::from_secs(2);

    // 2. Attach the built-in log subscriber
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let service = Service::builder("demo")
        .with_config(cfg)
        .with_subscribers(subs)
        .build();

    // 3. Launch
    let sleeper = service
        .new_instance("sleeper", ProcessConfig::builder("sleep").arg("100").build())
        .await?;

    // 4. Report upward telemetry
    tokio::time::sleep(Duration::from_millis(200)).await;
    for report in service.stats().await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    // 5. Tear down
    sleeper.stop().await;
    sleeper.close().await?;

    // give the subscriber worker a moment to flush
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
