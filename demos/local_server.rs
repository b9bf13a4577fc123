use anyhow::Context;
use cassandra_harness::config::{validate_config, validate_paths};
use cassandra_harness::{HarnessConfig, ProcessSupervisor};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go through a background writer so server output never blocks the monitor.
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(writer)
        .init();

    tracing::info!("Starting local_server example");

    // Pass a JSON or YAML file, or fall back to a node on 127.0.0.1
    let config = match std::env::args().nth(1) {
        Some(path) => HarnessConfig::from_file(&path)
            .with_context(|| format!("loading harness config from {}", path))?,
        None => HarnessConfig::for_address("127.0.0.1"),
    };
    validate_config(&config)?;
    if let Err(e) = validate_paths(&config) {
        println!("Warning: {}", e);
    }

    let mut supervisor = ProcessSupervisor::new(config);

    println!("Starting server at {}...", supervisor.endpoint());
    if let Err(e) = supervisor.start().await {
        println!("Server failed to start: {}", e);
        supervisor.stop().await.context("cleaning up after failed start")?;
        return Err(e.into());
    }

    println!("Server {} is {}", supervisor.endpoint(), supervisor.state());
    if let Some(pid) = supervisor.process_id() {
        println!("Process id: {}", pid);
    }

    let client = supervisor.client_config();
    println!(
        "Client settings: host={} storage={} timeout={:?}",
        client.hostname,
        client.storage_directory.display(),
        client.timeout()
    );

    // Ctrl-C here runs the kill-on-exit hook, so the server never outlives us.
    println!("Stopping in 5 seconds (Ctrl-C kills the server immediately)...");
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;

    println!("\nStopping server...");
    if let Err(e) = supervisor.stop().await {
        println!("Warning: Failed to stop server: {}", e);
    }

    tracing::info!("local_server example finished");
    Ok(())
}
