//! Rate limit service implementation.

use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use tracing::{debug, info_span, Instrument};

use super::proto::envoy::service::ratelimit::v3::{
    rate_limit_service_server::RateLimitService, RateLimitRequest, RateLimitResponse,
};
use super::trace::RequestTrace;

use crate::metrics;
use crate::ratelimit::{CounterStore, DecisionEngine};

/// Implementation of the Envoy RateLimitService gRPC interface.
pub struct RateLimitServiceImpl<S: CounterStore> {
    /// The decision engine shared by all in-flight requests
    engine: Arc<DecisionEngine<S>>,
}

impl<S: CounterStore> RateLimitServiceImpl<S> {
    /// Create a new RateLimitServiceImpl over the given decision engine.
    pub fn new(engine: Arc<DecisionEngine<S>>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl<S: CounterStore + 'static> RateLimitService for RateLimitServiceImpl<S> {
    /// Determine whether rate limiting should take place.
    ///
    /// Per-descriptor failures never fail the call; the response always
    /// carries one status per input descriptor, in input order.
    async fn should_rate_limit(
        &self,
        request: Request<RateLimitRequest>,
    ) -> Result<Response<RateLimitResponse>, Status> {
        let started = Instant::now();

        let trace = request
            .extensions()
            .get::<RequestTrace>()
            .cloned()
            .unwrap_or_default();
        let req = request.into_inner();

        let span = info_span!(
            "rate_limit_request",
            request_id = %trace.request_id,
            trace_id = trace.trace_id.as_deref().unwrap_or(""),
            span_id = trace.span_id.as_deref().unwrap_or(""),
            domain = %req.domain,
            descriptor_count = req.descriptors.len(),
        );

        let response = async {
            debug!(
                descriptors = ?req.descriptors,
                hits_addend = req.hits_addend,
                "processing rate limit request"
            );

            let (overall_code, statuses) = self.engine.decide(&req.descriptors).await;

            debug!(overall_code = ?overall_code, "rate limit decision made");

            RateLimitResponse {
                overall_code: overall_code.into(),
                statuses,
                response_headers_to_add: Vec::new(),
                request_headers_to_add: Vec::new(),
                raw_body: Vec::new(),
            }
        }
        .instrument(span)
        .await;

        metrics::record_request_success();
        metrics::record_request_latency(started.elapsed().as_secs_f64());

        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatcherSettings, CacheSettings};
    use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::{
        rate_limit_descriptor::Entry, RateLimitDescriptor,
    };
    use crate::grpc::proto::envoy::service::ratelimit::v3::rate_limit_response::Code;
    use crate::ratelimit::store::testing::{FailingCounterStore, MemoryCounterStore};
    use crate::ratelimit::{AdmissionCache, LimitTable, UpdateBatcher};
    use std::time::Duration;

    fn service_with_store<S: CounterStore + 'static>(
        store: Arc<S>,
        limits: LimitTable,
    ) -> RateLimitServiceImpl<S> {
        let settings = BatcherSettings {
            queue_capacity: 16,
            workers: 1,
            buffer_capacity: 4,
            flush_interval_ms: 10,
        };
        let engine = DecisionEngine::new(
            Arc::clone(&store),
            AdmissionCache::new(&CacheSettings { max_cost: 1024 }, Duration::from_secs(60)),
            limits,
            UpdateBatcher::spawn(store, &settings),
        );
        RateLimitServiceImpl::new(Arc::new(engine))
    }

    fn memory_service() -> RateLimitServiceImpl<MemoryCounterStore> {
        service_with_store(
            Arc::new(MemoryCounterStore::new(Duration::from_secs(60))),
            LimitTable::default(),
        )
    }

    fn descriptor(entries: &[(&str, &str)]) -> RateLimitDescriptor {
        RateLimitDescriptor {
            entries: entries
                .iter()
                .map(|(k, v)| Entry {
                    key: k.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            limit: None,
        }
    }

    fn rate_limit_request(descriptors: Vec<RateLimitDescriptor>) -> Request<RateLimitRequest> {
        Request::new(RateLimitRequest {
            domain: "edge".to_string(),
            descriptors,
            hits_addend: 0,
        })
    }

    #[tokio::test]
    async fn test_single_descriptor_under_limit() {
        let service = memory_service();

        let request = rate_limit_request(vec![descriptor(&[("remote_address", "10.0.0.1")])]);
        let response = service.should_rate_limit(request).await.unwrap().into_inner();

        assert_eq!(response.overall_code, i32::from(Code::Ok));
        assert_eq!(response.statuses.len(), 1);
        assert_eq!(response.statuses[0].code(), Code::Ok);
        assert_eq!(response.statuses[0].limit_remaining, 999);
        let limit = response.statuses[0].current_limit.as_ref().unwrap();
        assert_eq!(limit.requests_per_unit, 1000);
    }

    #[tokio::test]
    async fn test_statuses_match_input_length_and_order() {
        let service = memory_service();

        let request = rate_limit_request(vec![
            descriptor(&[("remote_address", "10.0.0.1")]),
            descriptor(&[("unknown", "x")]),
            descriptor(&[("user_id", "u-1")]),
        ]);
        let response = service.should_rate_limit(request).await.unwrap().into_inner();

        assert_eq!(response.statuses.len(), 3);
        // The unrecognized middle descriptor carries no limit metadata.
        assert!(response.statuses[0].current_limit.is_some());
        assert!(response.statuses[1].current_limit.is_none());
        assert!(response.statuses[2].current_limit.is_some());
        assert_eq!(
            response.statuses[2].current_limit.as_ref().unwrap().requests_per_unit,
            100
        );
    }

    #[tokio::test]
    async fn test_over_limit_descriptor_flips_overall_code() {
        let service = service_with_store(
            Arc::new(MemoryCounterStore::new(Duration::from_secs(60))),
            LimitTable {
                user: 1,
                ..LimitTable::default()
            },
        );

        let first = rate_limit_request(vec![descriptor(&[("user_id", "u-1")])]);
        service.should_rate_limit(first).await.unwrap();

        let second = rate_limit_request(vec![
            descriptor(&[("remote_address", "10.0.0.1")]),
            descriptor(&[("user_id", "u-1")]),
        ]);
        let response = service.should_rate_limit(second).await.unwrap().into_inner();

        assert_eq!(response.overall_code, i32::from(Code::OverLimit));
        assert_eq!(response.statuses[0].code(), Code::Ok);
        assert_eq!(response.statuses[1].code(), Code::OverLimit);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_an_rpc_error() {
        let service = service_with_store(Arc::new(FailingCounterStore), LimitTable::default());

        let request = rate_limit_request(vec![descriptor(&[("remote_address", "10.0.0.1")])]);
        let response = service.should_rate_limit(request).await.unwrap().into_inner();

        assert_eq!(response.overall_code, i32::from(Code::OverLimit));
        assert_eq!(response.statuses[0].code(), Code::OverLimit);
    }

    #[tokio::test]
    async fn test_empty_descriptor_list_is_lenient() {
        let service = memory_service();

        let response = service
            .should_rate_limit(rate_limit_request(Vec::new()))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.overall_code, i32::from(Code::Ok));
        assert!(response.statuses.is_empty());
    }
}
