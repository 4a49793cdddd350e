//! Buyer-account pull demo.
//!
//! Drives a full incremental sync against an in-process loopback "proxy"
//! seeded with three pages of buyer records, logging progress as pages
//! arrive.
//!
//! Run with: cargo run -p buyer_pull

use ledgersync_engine::{
    LoopbackClient, LoopbackServer, ProxyConfig, ProxyFetcher, SyncConfig, SyncEngine,
    SyncObserver, SyncOutcome, SyncProgress,
};
use ledgersync_protocol::{PageEnvelope, ProxyRequest, Record};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const PAGE_SIZE: u32 = 4;

/// Serves pages of demo buyer records the way the forwarding proxy would.
struct DemoProxy {
    pages: Vec<Vec<Record>>,
    total: u64,
}

impl LoopbackServer for DemoProxy {
    fn handle_post(&self, _url: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let request: ProxyRequest = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        let page = request
            .params
            .get("pagination[page]")
            .and_then(|v| v.as_u64())
            .ok_or("missing page parameter")?;

        let records = self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default();
        let envelope = PageEnvelope::page(records, Some(self.total));
        serde_json::to_vec(&envelope).map_err(|e| e.to_string())
    }
}

/// Logs each accepted page.
struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_progress(&self, progress: SyncProgress) {
        info!(
            page = progress.page_just_fetched,
            fetched = progress.fetched_count,
            total = ?progress.total_expected,
            "page accepted"
        );
    }
}

fn buyer(id: u64, name: &str, balance: f64) -> Record {
    Record::from_value(json!({"id": id, "name": name, "balance": balance}))
        .expect("buyer is an object")
}

fn demo_pages() -> Vec<Vec<Record>> {
    vec![
        vec![
            buyer(1, "Acme Trading", 1250.0),
            buyer(2, "Bolt Supplies", -340.5),
            buyer(3, "Core Industrial", 87.25),
            buyer(4, "Dynamo Foods", 0.0),
        ],
        vec![
            // Shifted page boundary upstream: buyer 4 shows up again.
            buyer(4, "Dynamo Foods", 12.0),
            buyer(5, "Edge Logistics", 990.0),
            buyer(6, "Flux Energy", 15.75),
            buyer(7, "Gauge Metals", -8.0),
        ],
        vec![buyer(8, "Helix Labs", 410.0)],
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let proxy = DemoProxy {
        pages: demo_pages(),
        total: 8,
    };
    let config = ProxyConfig::new("loopback://proxy", "/buyers").with_token("demo-token");
    let fetcher = ProxyFetcher::new(config, LoopbackClient::new(proxy));

    let engine = SyncEngine::new(
        SyncConfig::new().with_page_size(PAGE_SIZE),
        fetcher,
        LogObserver,
    );

    match engine.start_sync().await? {
        SyncOutcome::Completed(report) => {
            info!(records = report.record_count, stop = ?report.stop, "pull finished");
            for record in engine.snapshot() {
                info!(
                    id = %record.id().unwrap_or_default(),
                    name = ?record.get("name"),
                    "buyer"
                );
            }
        }
        SyncOutcome::AlreadyRunning => unreachable!("no concurrent sync in this demo"),
    }

    Ok(())
}
