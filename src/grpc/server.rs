//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::envoy::service::ratelimit::v3::rate_limit_service_server::RateLimitServiceServer;
use super::service::RateLimitServiceImpl;
use super::trace::trace_interceptor;

use crate::error::{RatewardenError, Result};
use crate::ratelimit::{CounterStore, DecisionEngine};

/// gRPC server for the rate limit service.
pub struct GrpcServer<S: CounterStore + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The decision engine
    engine: Arc<DecisionEngine<S>>,
}

impl<S: CounterStore + 'static> GrpcServer<S> {
    /// Create a new gRPC server serving decisions from the given engine.
    pub fn new(addr: SocketAddr, engine: Arc<DecisionEngine<S>>) -> Self {
        Self { addr, engine }
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let service = RateLimitServiceImpl::new(self.engine);

        let reflection_v1 = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(super::FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| RatewardenError::Reflection(e.to_string()))?;
        let reflection_v1alpha = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(super::FILE_DESCRIPTOR_SET)
            .build_v1alpha()
            .map_err(|e| RatewardenError::Reflection(e.to_string()))?;

        info!(
            addr = %self.addr,
            "Starting gRPC server for RateLimitService"
        );

        Server::builder()
            .add_service(RateLimitServiceServer::with_interceptor(
                service,
                trace_interceptor,
            ))
            .add_service(reflection_v1)
            .add_service(reflection_v1alpha)
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                RatewardenError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatcherSettings, CacheSettings};
    use crate::ratelimit::store::testing::MemoryCounterStore;
    use crate::ratelimit::{AdmissionCache, LimitTable, UpdateBatcher};
    use std::time::Duration;

    #[tokio::test]
    async fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let store = Arc::new(MemoryCounterStore::new(Duration::from_secs(60)));
        let settings = BatcherSettings::default();
        let engine = Arc::new(DecisionEngine::new(
            Arc::clone(&store),
            AdmissionCache::new(&CacheSettings::default(), Duration::from_secs(60)),
            LimitTable::default(),
            UpdateBatcher::spawn(store, &settings),
        ));
        let _server = GrpcServer::new(addr, engine);
    }
}
