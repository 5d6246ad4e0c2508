use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

mod config;
mod metrics;
mod registry;
mod scenarios;
mod transport;

use config::RegistryConfig;
use metrics::HttpMonitor;
use transport::{ReqwestTransport, Transport};

/// Pause between the two scenarios, purely for log readability.
const INTER_SCENARIO_PAUSE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let config = RegistryConfig::parse();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  REGISTRY PROBE — HTTP MONITORING DEMO      ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();
    println!("Target registry: {}", config.registry);
    println!("Target image:    {}", config.image_reference());
    println!("Authentication:  {}", config.redacted_credentials());
    println!();
    println!("Two fetch styles run through the same instrumented transport:");
    println!("1. {} — manifest, config, and size", scenarios::FULL_IMAGE_FETCH);
    println!("2. {} — one targeted manifest request", scenarios::MANIFEST_PROBE);
    println!();

    let monitor = Arc::new(HttpMonitor::new());
    let base: Arc<dyn Transport> = match ReqwestTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("❌ Cannot build HTTP transport: {e}");
            std::process::exit(1);
        }
    };

    // Scenario failures are logged, never fatal — the other scenario
    // and the final report always run.
    println!("🔍 Scenario 1: {}", scenarios::FULL_IMAGE_FETCH);
    match scenarios::full_image_fetch(&config, &base, &monitor).await {
        Ok(()) => println!("✅ {} completed successfully", scenarios::FULL_IMAGE_FETCH),
        Err(e) => println!("❌ {} failed: {e}", scenarios::FULL_IMAGE_FETCH),
    }
    println!();

    tokio::time::sleep(INTER_SCENARIO_PAUSE).await;

    println!("🔍 Scenario 2: {}", scenarios::MANIFEST_PROBE);
    match scenarios::manifest_probe(&config, &base, &monitor).await {
        Ok(()) => println!("✅ {} completed successfully", scenarios::MANIFEST_PROBE),
        Err(e) => println!("❌ {} failed: {e}", scenarios::MANIFEST_PROBE),
    }

    println!();
    println!("✨ Both scenarios finished");
    println!();

    println!("🔍 HTTP MONITORING RESULTS:");
    monitor.print_report();

    println!();
    println!("📊 FUNCTION COMPARISON:");
    print_comparison(&monitor);

    if config.summary_json {
        println!();
        println!("📊 SUMMARY (JSON):");
        match serde_json::to_string_pretty(&monitor.summary()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("failed to serialize summary: {e}"),
        }
    }
}

/// Per-function request count and total/average duration. Guards the
/// average against tags that issued zero requests.
fn print_comparison(monitor: &HttpMonitor) {
    for tag in [scenarios::FULL_IMAGE_FETCH, scenarios::MANIFEST_PROBE] {
        let records = monitor.by_function(tag);
        println!("{tag} made {} HTTP request(s)", records.len());

        if records.is_empty() {
            continue;
        }
        let total: Duration = records.iter().map(|r| r.duration).sum();
        let average = total / records.len() as u32;
        println!("  total time: {total:?} (avg: {average:?} per request)");
    }
}
