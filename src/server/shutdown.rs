//! Serving with a bounded graceful shutdown

use std::future::{Future, IntoFuture};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Resolves on ctrl-c or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}

/// Serve `app` until `shutdown` resolves, then give in-flight requests at most
/// `grace` to finish before returning.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    app: Router,
    grace: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    });
    let mut server = tokio::spawn(server.into_future());

    let grace_elapsed = async {
        match signalled_rx.await {
            Ok(()) => {
                info!(grace_secs = grace.as_secs(), "draining in-flight requests");
                tokio::time::sleep(grace).await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        joined = &mut server => joined.map_err(std::io::Error::other)?,
        () = grace_elapsed => {
            warn!("grace period elapsed, dropping remaining connections");
            server.abort();
            Ok(())
        }
    }
}
