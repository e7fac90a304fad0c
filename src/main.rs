use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rtc_policy_server::model::MockPolicyLoader;
use rtc_policy_server::server::{Server, ServerConfig};
use rtc_policy_server::telemetry;

/// Asynchronous policy inference server with real-time action chunking.
#[derive(Parser, Debug)]
#[command(name = "rtc-policy-server", version, about)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8765)]
    port: u16,

    /// Target control-loop frequency in Hz; derives `environment_dt`.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Estimated per-chunk inference latency in seconds, used to shift the
    /// RTC guidance window before the real measured delay is known.
    #[arg(long, default_value_t = 0.0)]
    inference_latency: f64,

    /// How long `GetActions` waits for an observation before returning an
    /// empty response.
    #[arg(long, default_value_t = 1.0)]
    obs_queue_timeout: f64,

    /// Upper bound on `actions_per_chunk`, regardless of what a client
    /// requests in `SendPolicyInstructions`.
    #[arg(long, default_value_t = 1000)]
    actions_per_chunk_cap: usize,

    /// Optional TOML file overlaying the flags above.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    fps: Option<f64>,
    inference_latency: Option<f64>,
    obs_queue_timeout: Option<f64>,
    actions_per_chunk_cap: Option<usize>,
}

fn load_server_config(cli: Cli) -> anyhow::Result<ServerConfig> {
    let overlay = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            toml::from_str::<FileConfig>(&text)?
        }
        None => FileConfig::default(),
    };

    Ok(ServerConfig {
        host: overlay.host.unwrap_or(cli.host),
        port: overlay.port.unwrap_or(cli.port),
        fps: overlay.fps.unwrap_or(cli.fps),
        inference_latency_s: overlay.inference_latency.unwrap_or(cli.inference_latency),
        obs_queue_timeout: Duration::from_secs_f64(
            overlay.obs_queue_timeout.unwrap_or(cli.obs_queue_timeout),
        ),
        actions_per_chunk_cap: overlay
            .actions_per_chunk_cap
            .unwrap_or(cli.actions_per_chunk_cap),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("info");

    let cli = Cli::parse();
    let config = load_server_config(cli)?;

    let server = Server::new(config, Arc::new(MockPolicyLoader));
    server.serve().await?;
    Ok(())
}
