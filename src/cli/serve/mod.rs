//! Serve command - runs the HTTP function surface

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::api::create_router;
use crate::config::AppConfig;
use crate::infrastructure::services::IngestionService;
use crate::Backend;

const JOB_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// Run the server until Ctrl-C. Refuses to start on invalid configuration.
pub async fn run(backend: Backend) -> anyhow::Result<()> {
    let config = super::load_config(&backend)?;
    let state = crate::create_app_state(&config, &backend).await?;

    spawn_job_cleanup(state.ingestion.as_ref().clone());

    let app = create_router(state);
    let addr = build_socket_addr(&config)?;
    info!(
        in_memory = backend.is_in_memory(),
        "Starting RAG pipeline server on {}", addr
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}

fn spawn_job_cleanup(service: IngestionService) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(JOB_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = service.cleanup_old().await;
            if removed > 0 {
                debug!(removed, "Dropped finished ingestion jobs");
            }
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_socket_addr() {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 7071;

        assert_eq!(
            build_socket_addr(&config).unwrap(),
            "127.0.0.1:7071".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let mut config = AppConfig::default();
        config.server.host = "not-an-ip".to_string();
        assert!(build_socket_addr(&config).is_err());
    }
}
