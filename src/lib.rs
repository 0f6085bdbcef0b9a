//! Ratewarden - Distributed Rate Limiting Decision Service
//!
//! This crate implements a rate limiting decision service that integrates
//! with Envoy Proxy's global rate limiting API. Counters are coordinated
//! across replicas through a shared Redis cluster, fronted by a per-process
//! frequency-aware admission cache, with counter writes amortized through a
//! background batching worker pool.

pub mod config;
pub mod error;
pub mod grpc;
pub mod metrics;
pub mod ratelimit;
