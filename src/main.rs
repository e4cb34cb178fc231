use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use modoffload::config::Config;
use modoffload::pipeline::Server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
        tracing::error!(error = %e, dir = ?config.cache_dir, "failed to create cache directory");
        std::process::exit(1);
    }

    let listen_port = config.listen_port;
    let server = Arc::new(Server::new(config));

    let listener = TcpListener::bind(format!("0.0.0.0:{listen_port}"))
        .await
        .expect("failed to bind to address");

    tracing::info!(port = listen_port, "offload server listening");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        let server = server.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, addr.ip().to_string()).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                }
            }
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
