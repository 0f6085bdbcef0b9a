//! Trace propagation from gRPC metadata.
//!
//! The edge proxy forwards request and B3 trace identifiers as gRPC
//! metadata; the interceptor lifts them into a request extension so the
//! handler can thread them through its logging span.

use tonic::metadata::MetadataMap;
use tonic::{Request, Status};
use uuid::Uuid;

/// Metadata key carrying the edge request id.
pub const REQUEST_ID_KEY: &str = "x-request-id";
/// Metadata key carrying the B3 trace id.
pub const TRACE_ID_KEY: &str = "x-b3-traceid";
/// Metadata key carrying the B3 span id.
pub const SPAN_ID_KEY: &str = "x-b3-spanid";

/// Tracing identifiers extracted from one request's metadata.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    /// Request id from the edge, or a locally generated one
    pub request_id: String,
    /// B3 trace id, when forwarded
    pub trace_id: Option<String>,
    /// B3 span id, when forwarded
    pub span_id: Option<String>,
}

impl Default for RequestTrace {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            trace_id: None,
            span_id: None,
        }
    }
}

/// Unary interceptor that extracts tracing headers into a [`RequestTrace`]
/// request extension.
pub fn trace_interceptor(mut request: Request<()>) -> Result<Request<()>, Status> {
    let metadata = request.metadata();

    let trace = RequestTrace {
        request_id: metadata_value(metadata, REQUEST_ID_KEY)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        trace_id: metadata_value(metadata, TRACE_ID_KEY),
        span_id: metadata_value(metadata, SPAN_ID_KEY),
    };

    request.extensions_mut().insert(trace);
    Ok(request)
}

fn metadata_value(metadata: &MetadataMap, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
