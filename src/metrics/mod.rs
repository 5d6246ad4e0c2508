pub mod monitor;
pub mod percentiles;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use monitor::{HttpMonitor, MonitorSummary};

/// Everything observable about one completed HTTP exchange.
/// This is the "write" side — the instrumented transport creates
/// these and pushes them in. Never mutated after insertion.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// HTTP verb, e.g. "GET"
    pub method: String,
    /// Fully qualified request URL
    pub url: String,
    /// Deep snapshot of the outbound headers, taken before the call.
    /// Independent of the live request's header map.
    pub headers: HashMap<String, Vec<String>>,
    /// Declared request body length; 0 when no body was declared
    pub request_bytes: u64,
    /// Response body length. `None` means the size could not be
    /// determined — distinct from `Some(0)` (an empty body).
    pub response_bytes: Option<u64>,
    /// `None` when the call failed before a response was obtained
    pub status: Option<u16>,
    /// Wall-clock time for the whole call
    pub duration: Duration,
    /// When the call started
    pub started_at: DateTime<Utc>,
    /// Failure cause, present iff the underlying call failed
    pub error: Option<String>,
    /// Caller-assigned tag grouping records by logical call site
    pub function: String,
}
