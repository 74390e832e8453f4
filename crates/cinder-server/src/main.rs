use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cinder_cluster::ClusterRouter;
use cinder_core::{Dispatch, Router};
use cinder_persistence::AofHandler;

mod config;
mod connection;
mod server;

use config::Config;

#[derive(Parser)]
#[command(name = "cinder-server", about = "RESP-compatible in-memory key-value server")]
struct Cli {
    /// Path to the configuration file.
    #[arg(default_value = "./redis.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info".into()),
        )
        .init();

    let cli = Cli::parse();
    if !cli.config.is_file() {
        eprintln!("config file not found: {}", cli.config.display());
        return ExitCode::FAILURE;
    }
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cannot read config file {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    // cluster mode wraps a single-database router; standalone gets the
    // configured database count
    let (dispatcher, aof): (Arc<dyn Dispatch>, Option<AofHandler>) = if config.cluster_enabled() {
        info!("starting in cluster mode");
        let cluster = Arc::new(ClusterRouter::new(config.self_addr.clone(), &config.peers));
        let aof = match start_aof(&config, cluster.local()) {
            Ok(aof) => aof,
            Err(code) => return code,
        };
        (cluster, aof)
    } else {
        let router = Arc::new(
            Router::new(config.databases).with_require_select(config.require_select),
        );
        let aof = match start_aof(&config, &router) {
            Ok(aof) => aof,
            Err(code) => return code,
        };
        (router, aof)
    };

    let result = server::run(&config.addr(), dispatcher).await;

    // release the journal sinks before joining the writer thread
    if let Some(aof) = aof {
        aof.shutdown();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Replays and attaches the AOF when append-only mode is on. Failing to
/// open the append file is the one fatal startup error.
fn start_aof(config: &Config, router: &Router) -> Result<Option<AofHandler>, ExitCode> {
    if !config.append_only {
        return Ok(None);
    }
    match AofHandler::start(&config.append_only_filename, router) {
        Ok(handler) => {
            info!("append-only file: {}", config.append_only_filename);
            Ok(Some(handler))
        }
        Err(e) => {
            error!("cannot open aof file {}: {e}", config.append_only_filename);
            Err(ExitCode::FAILURE)
        }
    }
}
