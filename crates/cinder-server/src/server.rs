//! TCP accept loop with signal-driven graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use cinder_core::Dispatch;

use crate::connection;

/// Bound on how long open connections get to finish after shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Binds `addr` and serves until a termination signal arrives, then
/// drains open connections with a bounded wait.
pub async fn run(addr: &str, dispatcher: Arc<dyn Dispatch>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("bind: {addr}, start listening...");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down...");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = dispatcher.clone();
                        connections.spawn(async move {
                            if let Err(e) = connection::handle(stream, dispatcher).await {
                                error!("connection error from {peer}: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                        break;
                    }
                }
            }
        }
    }

    drop(listener);

    // bounded drain of the remaining connection tasks
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
        warn!(
            "connection drain timed out, aborting {} tasks",
            connections.len()
        );
        connections.abort_all();
    }

    Ok(())
}

/// Resolves when any of SIGHUP, SIGQUIT, SIGTERM, or SIGINT arrives.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
    for kind in [
        SignalKind::hangup(),
        SignalKind::quit(),
        SignalKind::terminate(),
        SignalKind::interrupt(),
    ] {
        match signal(kind) {
            Ok(mut stream) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    stream.recv().await;
                    let _ = tx.send(()).await;
                });
            }
            Err(e) => error!("cannot install signal handler: {e}"),
        }
    }
    drop(tx);
    let _ = rx.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
