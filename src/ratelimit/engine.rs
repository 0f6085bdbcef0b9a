//! Decision engine: descriptor sets in, verdicts out.
//!
//! Each descriptor selects one counter key and limit; the engine consults
//! the admission cache first and falls through to the counter store, failing
//! closed on store errors. After deciding a request it hands the descriptors
//! to the update batcher as one deferred update.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::RateLimitDescriptor;
use crate::grpc::proto::envoy::service::ratelimit::v3::rate_limit_response::{
    rate_limit::Unit, Code, DescriptorStatus, RateLimit,
};
use crate::metrics;

use super::batch::{DeferredUpdate, UpdateBatcher};
use super::cache::AdmissionCache;
use super::limits::{LimitTable, SelectedLimit};
use super::store::CounterStore;

/// The decision engine. Process-wide, shared by every in-flight RPC.
pub struct DecisionEngine<S> {
    store: Arc<S>,
    cache: AdmissionCache,
    limits: LimitTable,
    batcher: UpdateBatcher,
}

impl<S: CounterStore> DecisionEngine<S> {
    /// Assemble the engine from its collaborators.
    pub fn new(
        store: Arc<S>,
        cache: AdmissionCache,
        limits: LimitTable,
        batcher: UpdateBatcher,
    ) -> Self {
        Self {
            store,
            cache,
            limits,
            batcher,
        }
    }

    /// Decide a full descriptor set.
    ///
    /// Statuses are returned in input order with one entry per descriptor;
    /// the overall code is `OK` only when every descriptor is `OK`. The
    /// request's descriptors are enqueued as a deferred update regardless of
    /// the verdict.
    pub async fn decide(
        &self,
        descriptors: &[RateLimitDescriptor],
    ) -> (Code, Vec<DescriptorStatus>) {
        let mut statuses = Vec::with_capacity(descriptors.len());
        let mut overall = Code::Ok;

        for descriptor in descriptors {
            let status = self.check_descriptor(descriptor).await;
            if status.code() == Code::OverLimit {
                overall = Code::OverLimit;
            }
            statuses.push(status);
        }

        self.batcher.enqueue(DeferredUpdate::new(descriptors));

        (overall, statuses)
    }

    /// Decide a single descriptor.
    async fn check_descriptor(&self, descriptor: &RateLimitDescriptor) -> DescriptorStatus {
        let Some(selected) = self.limits.select(descriptor) else {
            // Lenient wire behavior: the descriptor stays OK, only the error
            // metric records the bad input.
            warn!(descriptor = ?descriptor.entries, "no valid rate limit key found in descriptor");
            metrics::record_request_error("no valid rate limit key found in descriptor");
            return DescriptorStatus {
                code: Code::Ok.into(),
                current_limit: None,
                limit_remaining: 0,
                duration_until_reset: None,
            };
        };

        // A cached over-limit count denies without a store round trip. The
        // cached value may be stale; staleness only delays the verdict by at
        // most one refresh, never corrupts the counters.
        if let Some(count) = self.cache.get(&selected.key) {
            if count >= selected.limit {
                debug!(
                    key = %selected.key,
                    count,
                    limit = selected.limit,
                    "rate limit exceeded (cached)"
                );
                return over_limit_status(&selected);
            }
        }

        match self.store.incr(&selected.key).await {
            Ok(count) => {
                self.cache.insert(&selected.key, count);
                if count > selected.limit {
                    debug!(
                        key = %selected.key,
                        count,
                        limit = selected.limit,
                        "rate limit exceeded"
                    );
                    over_limit_status(&selected)
                } else {
                    DescriptorStatus {
                        code: Code::Ok.into(),
                        current_limit: Some(current_limit(&selected)),
                        limit_remaining: selected.limit.saturating_sub(count) as u32,
                        duration_until_reset: None,
                    }
                }
            }
            Err(e) => {
                // Fail closed: a store we cannot reach denies the descriptor.
                warn!(key = %selected.key, error = %e, "counter store increment failed");
                metrics::record_request_error(e.to_string());
                DescriptorStatus {
                    code: Code::OverLimit.into(),
                    current_limit: None,
                    limit_remaining: 0,
                    duration_until_reset: None,
                }
            }
        }
    }
}

fn current_limit(selected: &SelectedLimit) -> RateLimit {
    RateLimit {
        name: String::new(),
        requests_per_unit: selected.limit as u32,
        unit: Unit::Minute.into(),
    }
}

fn over_limit_status(selected: &SelectedLimit) -> DescriptorStatus {
    DescriptorStatus {
        code: Code::OverLimit.into(),
        current_limit: Some(current_limit(selected)),
        limit_remaining: 0,
        duration_until_reset: None,
    }
}
