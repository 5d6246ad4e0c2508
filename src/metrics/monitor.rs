use std::collections::HashMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::RequestRecord;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range for call durations: 1 μs → 60 s, 3 sig figs
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Headers shown in the detailed report. Everything else — notably
/// `authorization` — is withheld.
const REPORT_HEADERS: &[&str] = &["content-type", "accept", "user-agent", "content-length"];

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe store of per-call HTTP records.
/// The instrumented transport calls `add()`; everything else reads.
/// `add` takes the write lock; all query operations take the read
/// lock and may run concurrently with each other.
pub struct HttpMonitor {
    records: RwLock<Vec<RequestRecord>>,
}

/// Aggregate statistics over every recorded call, computed in one
/// pass under the read lock.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub total_requests: u64,
    pub requests_by_function: HashMap<String, u64>,
    pub requests_by_method: HashMap<String, u64>,
    /// Calls that failed before a response carry no status and are
    /// not counted here — they show up in `total_errors` instead.
    pub status_codes: HashMap<u16, u64>,
    pub total_errors: u64,
    /// 0.0 when nothing has been recorded
    pub average_duration_ms: f64,
    pub duration: PercentileSet,
    pub total_request_bytes: u64,
    /// Sum over responses whose size was determinable. Partial when
    /// `unknown_response_sizes` is non-zero.
    pub known_response_bytes: u64,
    /// How many responses had no determinable size. Kept separate so
    /// an unknown size never silently flattens to zero in the sum.
    pub unknown_response_sizes: u64,
}

// ─── HttpMonitor impl ────────────────────────────────────────────

impl HttpMonitor {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Append one record. Called exactly once per HTTP call attempt,
    /// successful or not.
    pub fn add(&self, record: RequestRecord) {
        self.records.write().push(record);
    }

    /// Point-in-time copy of every record, in insertion order.
    /// Safe to iterate without holding the store's lock.
    pub fn all(&self) -> Vec<RequestRecord> {
        self.records.read().clone()
    }

    /// Records whose function tag equals `function`, preserving
    /// insertion order. Empty when no call carried that tag.
    pub fn by_function(&self, function: &str) -> Vec<RequestRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.function == function)
            .cloned()
            .collect()
    }

    /// One-pass aggregate over everything recorded so far.
    pub fn summary(&self) -> MonitorSummary {
        summarize(&self.records.read())
    }

    /// Render the summary plus every record, sorted by start time.
    /// Only the `REPORT_HEADERS` allow-list appears; credential
    /// material (notably `authorization`) never does, even though the
    /// record snapshots retain it.
    pub fn render_report(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "=== HTTP MONITORING DETAILED REPORT ===");

        // One snapshot feeds both the summary and the detail list, so
        // an `add` racing the report cannot make them disagree.
        let mut records = self.all();
        if records.is_empty() {
            let _ = writeln!(out, "No HTTP requests recorded");
            return out;
        }
        let summary = summarize(&records);
        records.sort_by_key(|r| r.started_at);

        let _ = writeln!(out, "Total requests:       {}", summary.total_requests);
        let _ = writeln!(
            out,
            "Requests by function: {}",
            fmt_counts(&summary.requests_by_function)
        );
        let _ = writeln!(
            out,
            "Requests by method:   {}",
            fmt_counts(&summary.requests_by_method)
        );
        let _ = writeln!(out, "Status codes:         {}", fmt_counts(&summary.status_codes));
        let _ = writeln!(out, "Total errors:         {}", summary.total_errors);
        let _ = writeln!(out, "Average duration:     {:.2} ms", summary.average_duration_ms);
        let _ = writeln!(out, "Total request size:   {} bytes", summary.total_request_bytes);
        let _ = write!(out, "Total response size:  {} bytes", summary.known_response_bytes);
        if summary.unknown_response_sizes > 0 {
            let _ = write!(
                out,
                " (partial — {} response(s) of unknown size)",
                summary.unknown_response_sizes
            );
        }
        let _ = writeln!(out);
        if summary.duration.has_data() {
            let d = &summary.duration;
            let _ = writeln!(
                out,
                "Duration percentiles: p50 {}μs  p95 {}μs  p99 {}μs  max {}μs",
                d.p50_us, d.p95_us, d.p99_us, d.max_us
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Individual requests:");
        for (i, record) in records.iter().enumerate() {
            let _ = writeln!(out, "Request #{} [{}]:", i + 1, record.function);
            let _ = writeln!(out, "  {} {}", record.method, record.url);
            let _ = writeln!(
                out,
                "  Status: {}, Duration: {:?}",
                record
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
                record.duration
            );
            let _ = writeln!(
                out,
                "  Request size: {} bytes, Response size: {}",
                record.request_bytes,
                match record.response_bytes {
                    Some(n) => format!("{n} bytes"),
                    None => "unknown".into(),
                }
            );
            for header in REPORT_HEADERS {
                if let Some(values) = record.headers.get(*header) {
                    let _ = writeln!(out, "  {}: {}", header, values.join(", "));
                }
            }
            if let Some(error) = &record.error {
                let _ = writeln!(out, "  ERROR: {error}");
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "=== END OF HTTP MONITORING REPORT ===");
        out
    }

    /// Print the rendered report to stdout.
    pub fn print_report(&self) {
        print!("{}", self.render_report());
    }
}

/// One-pass aggregation over a record snapshot. Shared by `summary()`
/// and `render_report()` so a report's totals always describe the
/// exact records it lists.
fn summarize(records: &[RequestRecord]) -> MonitorSummary {
    let mut by_function: HashMap<String, u64> = HashMap::new();
    let mut by_method: HashMap<String, u64> = HashMap::new();
    let mut status_codes: HashMap<u16, u64> = HashMap::new();
    let mut hist = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation");

    let mut total_errors = 0u64;
    let mut total_duration = Duration::ZERO;
    let mut total_request_bytes = 0u64;
    let mut known_response_bytes = 0u64;
    let mut unknown_response_sizes = 0u64;

    for record in records {
        *by_function.entry(record.function.clone()).or_default() += 1;
        *by_method.entry(record.method.clone()).or_default() += 1;
        if let Some(status) = record.status {
            *status_codes.entry(status).or_default() += 1;
        }
        if record.error.is_some() {
            total_errors += 1;
        }
        total_duration += record.duration;
        let _ = hist.record((record.duration.as_micros() as u64).max(1));
        total_request_bytes += record.request_bytes;
        match record.response_bytes {
            Some(n) => known_response_bytes += n,
            None => unknown_response_sizes += 1,
        }
    }

    // Empty snapshot → 0.0 average, no division
    let average_duration_ms = if records.is_empty() {
        0.0
    } else {
        total_duration.as_secs_f64() * 1000.0 / records.len() as f64
    };

    MonitorSummary {
        total_requests: records.len() as u64,
        requests_by_function: by_function,
        requests_by_method: by_method,
        status_codes,
        total_errors,
        average_duration_ms,
        duration: PercentileSet::from_histogram(&hist),
        total_request_bytes,
        known_response_bytes,
        unknown_response_sizes,
    }
}

impl Default for HttpMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// "k=v" pairs sorted by key, so report lines are deterministic.
fn fmt_counts<K: Ord + std::fmt::Display>(counts: &HashMap<K, u64>) -> String {
    let mut entries: Vec<_> = counts.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Tests ───────────────────────────────────────────────────────
