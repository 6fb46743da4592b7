//! Fan-out throughput benchmark for SubPub.
//!
//! Publisher threads blast messages at a topic while consumer threads drain
//! their mailboxes, measuring sustained delivery rate under backpressure.

use anyhow::Result;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use subpub_core::{MailboxError, MqttTopic, SubPub, SubPubConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TOPIC: &str = "benchmark/fanout";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;
const DEFAULT_CAPACITY: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout_throughput=info,subpub_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let num_consumers = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let num_publishers = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(2);

    let mut config = SubPubConfig::load()?;
    if config.capacity == 0 {
        config.capacity = DEFAULT_CAPACITY;
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              SubPub Fan-out Throughput Benchmark             ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_fanout_benchmark(&config, num_consumers, num_publishers)
}

fn run_fanout_benchmark(
    config: &SubPubConfig,
    num_consumers: usize,
    num_publishers: usize,
) -> Result<()> {
    println!(
        "📊 Fan-out: {} publishers → {} consumers (capacity {})",
        num_publishers, num_consumers, config.capacity
    );
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let sp = Arc::new(SubPub::<Bytes>::with_config(config));
    let received = Arc::new(AtomicU64::new(0));
    let timeouts = Arc::new(AtomicU64::new(0));
    let running = Arc::new(AtomicBool::new(true));
    let barrier = Arc::new(Barrier::new(num_consumers + num_publishers + 1));

    let mut handles = Vec::new();

    // Spawn consumer threads
    for _ in 0..num_consumers {
        let q = sp.subscribe(MqttTopic::new("benchmark/#"))?;
        let received = Arc::clone(&received);
        let running = Arc::clone(&running);
        let barrier = Arc::clone(&barrier);

        handles.push(thread::spawn(move || {
            barrier.wait();
            while running.load(Ordering::Relaxed) {
                match q.get(Some(POLL_INTERVAL)) {
                    Ok(_) => {
                        received.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(MailboxError::Empty) => continue,
                    Err(e) => {
                        warn!(error = %e, "Consumer failed");
                        break;
                    }
                }
            }
        }));
    }

    // Spawn publisher threads
    for _ in 0..num_publishers {
        let sp = Arc::clone(&sp);
        let timeouts = Arc::clone(&timeouts);
        let running = Arc::clone(&running);
        let barrier = Arc::clone(&barrier);

        handles.push(thread::spawn(move || {
            let payload = Bytes::from(vec![0u8; 64]);
            barrier.wait();
            while running.load(Ordering::Relaxed) {
                if let Err(e) = sp.publish(TOPIC, payload.clone()) {
                    if e.is_full() {
                        timeouts.fetch_add(1, Ordering::Relaxed);
                    } else {
                        warn!(error = %e, "Publisher failed");
                        break;
                    }
                }
            }
        }));
    }

    barrier.wait();
    info!(
        subscriptions = sp.stats().subscriptions,
        "All threads started"
    );

    // Warmup phase
    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    thread::sleep(Duration::from_secs(WARMUP_SECS));

    // Reset counters and start measurement
    received.store(0, Ordering::SeqCst);
    timeouts.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    thread::sleep(Duration::from_secs(BENCH_SECS));

    let elapsed = start.elapsed();
    let total_messages = received.load(Ordering::SeqCst);
    let total_timeouts = timeouts.load(Ordering::SeqCst);

    // Signal threads to stop. A publisher blocked on a full mailbox returns
    // once its publish times out.
    running.store(false, Ordering::SeqCst);
    sp.unsubscribe_all();
    for handle in handles {
        if handle.join().is_err() {
            warn!("Benchmark thread panicked");
        }
    }

    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();
    let msgs_per_sec_per_consumer = msgs_per_sec / num_consumers as f64;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Consumers:            {:>10}                           ║",
        num_consumers
    );
    println!(
        "║  Publishers:           {:>10}                           ║",
        num_publishers
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Total Messages:       {:>10}                           ║",
        total_messages
    );
    println!(
        "║  Publish Timeouts:     {:>10}                           ║",
        total_timeouts
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        msgs_per_sec
    );
    println!(
        "║  Per-Consumer:         {:>10.0} msg/s                    ║",
        msgs_per_sec_per_consumer
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    Ok(())
}
