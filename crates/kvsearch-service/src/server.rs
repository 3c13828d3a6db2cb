//! gRPC server setup with health check and reflection.

use std::net::SocketAddr;

use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing::info;

use crate::grpc::SearchServiceImpl;
use crate::pb::{search_service_server::SearchServiceServer, FILE_DESCRIPTOR_SET};

/// Run the gRPC server with graceful shutdown support.
///
/// In-flight requests finish once `shutdown_signal` resolves; new ones are
/// refused.
pub async fn run_server_with_shutdown<F>(
    addr: SocketAddr,
    service: SearchServiceImpl,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    info!("Starting gRPC server on {} (with graceful shutdown)", addr);

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<SearchServiceServer<SearchServiceImpl>>()
        .await;

    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    info!("gRPC server ready on {}", addr);

    Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(SearchServiceServer::new(service))
        .serve_with_shutdown(addr, shutdown_signal)
        .await?;

    info!("gRPC server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use kvsearch_index::{IndexConfig, IndexEngine};
    use kvsearch_store::MemoryStore;
    use kvsearch_sync::SyncStatus;
    use kvsearch_types::SearchSettings;

    #[tokio::test]
    async fn test_server_starts_and_shuts_down() {
        let engine = Arc::new(IndexEngine::new(IndexConfig::default().with_memory_mb(15)).unwrap());
        let service = SearchServiceImpl::new(
            engine,
            Arc::new(MemoryStore::new()),
            Arc::new(SyncStatus::new()),
            "test/",
            &SearchSettings::default(),
        );
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server_handle = tokio::spawn(async move {
            run_server_with_shutdown(addr, service, async {
                rx.await.ok();
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();

        let result = timeout(Duration::from_secs(5), server_handle).await;
        assert!(result.is_ok(), "Server should shut down within timeout");
    }
}
