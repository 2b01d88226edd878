//! workerd — the pipeline worker daemon.
//!
//! Keeps the worker registered with the control-plane leader and
//! serves a small HTTP surface:
//! - Membership agent (registration, heartbeats, leader redirects)
//! - `/health`, `/status`, `/metrics`
//!
//! # Usage
//!
//! ```text
//! WORKER_ID=worker-1 WORKER_CLOUD_TAG=aws ORCHESTRATOR_ADDR=cp-1:50051 workerd
//! workerd --worker-id worker-1 --orchestrator-addr cp-1:50051 --config workerd.toml
//! ```

mod config;
mod worker_mode;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerdConfig;
use crate::worker_mode::{WorkerSettings, run_worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Parser)]
#[command(name = "workerd", about = "Pipeline worker daemon")]
struct Cli {
    /// Identifier this worker registers under.
    #[arg(long, env = "WORKER_ID", default_value = "worker-unknown")]
    worker_id: String,

    /// Cloud the worker runs in.
    #[arg(long, env = "WORKER_CLOUD_TAG", default_value = "unknown")]
    cloud_tag: String,

    /// Initial control-plane gRPC address. Empty disables the agent.
    #[arg(long, env = "ORCHESTRATOR_ADDR", default_value = "")]
    orchestrator_addr: String,

    /// Address advertised to the control plane. Defaults to the worker id.
    #[arg(long, env = "WORKER_ADDR", default_value = "")]
    worker_addr: String,

    /// Port for the HTTP surface.
    #[arg(long, env = "HTTP_PORT", default_value = "8081")]
    http_port: u16,

    /// Optional TOML file with membership timings.
    #[arg(long, env = "WORKERD_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    log_format: LogFormat,
}

impl Cli {
    fn into_settings(self, file: WorkerdConfig) -> WorkerSettings {
        WorkerSettings {
            worker_id: self.worker_id,
            cloud_tag: self.cloud_tag,
            orchestrator_addr: self.orchestrator_addr,
            worker_addr: self.worker_addr,
            http_port: self.http_port,
            agent: file.membership.agent_config(),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,workerd=debug,worker_membership=info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let file = match &cli.config {
        Some(path) => WorkerdConfig::from_file(path)?,
        None => WorkerdConfig::default(),
    };

    run_worker(cli.into_settings(file)).await
}
