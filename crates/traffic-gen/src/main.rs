//! Fires GET requests at `host-app` so its network feed has something to
//! show. Grounded on the teacher's `loadgen`: concurrent worker tasks, an
//! optional requests-per-second cap and a periodic throughput log survive
//! unchanged; the Zipfian key distribution doesn't, since there is no cache
//! here whose hit rate it would stress — item ids are drawn uniformly
//! instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use reqwest::Client;
use tracing_subscriber::EnvFilter;

/// Traffic generator for the sharpinspect host-app demo.
#[derive(Parser)]
#[command(name = "traffic-gen")]
struct Args {
    /// Target host-app URL
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    target_url: String,

    /// Number of unique item ids to request
    #[arg(long, default_value_t = 1_000)]
    num_items: u64,

    /// Number of concurrent request tasks
    #[arg(long, default_value_t = 4)]
    concurrency: u64,

    /// Target requests per second across all workers (0 = unlimited)
    #[arg(long, default_value_t = 20)]
    rps: u64,
}

struct GenState {
    target_url: String,
    num_items: u64,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
}

async fn worker(state: Arc<GenState>, client: Client, delay: Option<Duration>) {
    loop {
        let id = rand::thread_rng().gen_range(0..state.num_items);
        let url = format!("{}/api/items/{id}", state.target_url);

        match client.get(&url).send().await {
            Ok(_resp) => {
                state.total_requests.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                state.total_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "request failed");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }

        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let state = Arc::new(GenState {
        target_url: args.target_url.clone(),
        num_items: args.num_items,
        total_requests: AtomicU64::new(0),
        total_errors: AtomicU64::new(0),
    });

    tracing::info!(
        target = %args.target_url,
        num_items = args.num_items,
        concurrency = args.concurrency,
        rps = args.rps,
        "traffic-gen starting"
    );

    let per_worker_delay = if args.rps > 0 {
        let per_worker_rps = args.rps / args.concurrency.max(1);
        (per_worker_rps > 0).then(|| Duration::from_micros(1_000_000 / per_worker_rps))
    } else {
        None
    };

    let client = Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build HTTP client");

    let mut handles = Vec::new();
    for _ in 0..args.concurrency {
        let s = Arc::clone(&state);
        let c = client.clone();
        handles.push(tokio::spawn(worker(s, c, per_worker_delay)));
    }

    let stats_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut prev = 0u64;
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let current = stats_state.total_requests.load(Ordering::Relaxed);
            let delta = current - prev;
            prev = current;
            tracing::info!(
                total = current,
                errors = stats_state.total_errors.load(Ordering::Relaxed),
                rps = format!("{:.0}", delta as f64 / 5.0),
                "throughput"
            );
        }
    });

    for h in handles {
        let _ = h.await;
    }
}
