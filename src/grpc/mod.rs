//! gRPC server module for the Envoy rate limit service.

mod server;
mod service;
mod trace;

pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;
pub use trace::{trace_interceptor, RequestTrace};

// Include the generated protobuf code
pub mod proto {
    pub mod envoy {
        pub mod config {
            pub mod core {
                pub mod v3 {
                    tonic::include_proto!("envoy.config.core.v3");
                }
            }
        }
        pub mod r#type {
            pub mod v3 {
                // prost-build sanitizes the `type` package segment to `r#type`
                // when naming the generated file, so this can't use
                // `tonic::include_proto!`, which concatenates the literal
                // package name.
                include!(concat!(env!("OUT_DIR"), "/envoy.r#type.v3.rs"));
            }
        }
        pub mod extensions {
            pub mod common {
                pub mod ratelimit {
                    pub mod v3 {
                        tonic::include_proto!("envoy.extensions.common.ratelimit.v3");
                    }
                }
            }
        }
        pub mod service {
            pub mod ratelimit {
                pub mod v3 {
                    tonic::include_proto!("envoy.service.ratelimit.v3");
                }
            }
        }
    }
}

/// File descriptor set for gRPC reflection, generated at build time.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("envoy_ratelimit_descriptor");

// Re-export commonly used types
pub use proto::envoy::extensions::common::ratelimit::v3::RateLimitDescriptor;
pub use proto::envoy::service::ratelimit::v3::{
    rate_limit_service_server::RateLimitServiceServer, RateLimitRequest, RateLimitResponse,
};
