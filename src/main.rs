use std::net::SocketAddr;
use std::sync::Arc;

use vocab_trainer_backend::config::Config;
use vocab_trainer_backend::logging::init_tracing;
use vocab_trainer_backend::{bootstrap, build_router};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    let runtime = bootstrap(&config).await;

    if let Some(bridge) = runtime.bridge.as_ref() {
        Arc::clone(bridge).start_subscriber().await;
    }

    if let Err(e) = runtime.workers.start().await {
        tracing::error!(error = %e, "failed to start workers");
    }

    let app = build_router(runtime.state.clone());

    let addr = config.bind_addr();
    tracing::info!(%addr, "vocab-trainer-backend listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "bind listener failed");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    runtime.workers.stop().await;
    runtime.state.queue().shutdown().await;
    if let Some(bridge) = runtime.bridge.as_ref() {
        bridge.stop().await;
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
