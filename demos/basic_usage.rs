//! Basic priority pool usage example
//!
//! Demonstrates ordering, pause/resume, error capture and both ways of
//! shutting a pool down.
//!
//! Run with: cargo run --example basic_usage

use rust_priority_pool::prelude::*;
use rust_priority_pool::watcher;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Request {
    urgency: u8,
    path: String,
}

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Rust Priority Pool - Basic Usage Example ===\n");

    // Most urgent request first
    let pool = PriorityPool::with_config(
        PoolConfig::new(2).with_thread_name_prefix("requests"),
        |a: &Request, b: &Request| b.urgency.cmp(&a.urgency),
        |req: Request| {
            println!(
                "  [{}] urgency {} -> {}",
                thread::current().name().unwrap_or("?"),
                req.urgency,
                req.path
            );
            if req.path == "/crash" {
                return Err(ConsumeError::failed("refusing to serve /crash"));
            }
            thread::sleep(Duration::from_millis(20));
            Ok(())
        },
    )?;

    println!("1. Queueing requests before start");
    for (urgency, path) in [(1, "/static/logo.png"), (9, "/checkout"), (5, "/search"), (7, "/login")] {
        pool.produce(Request {
            urgency,
            path: path.to_string(),
        })?;
    }
    println!("   Queued: {}", pool.size());

    println!("\n2. Starting {} workers", pool.num_threads());
    pool.start()?;
    pool.wait_until_queue_empty()?;

    println!("\n3. Pausing; new requests wait");
    pool.pause();
    pool.produce(Request {
        urgency: 3,
        path: "/report".to_string(),
    })?;
    pool.produce(Request {
        urgency: 3,
        path: "/report".to_string(),
    })?;
    println!("   Queued while paused: {}", pool.size());

    let dropped = pool.remove_matching(&Request {
        urgency: 3,
        path: "/report".to_string(),
    });
    println!("   Withdrew {} duplicate requests", dropped.len());
    pool.resume();

    println!("\n4. A failing request");
    pool.produce(Request {
        urgency: 10,
        path: "/crash".to_string(),
    })?;
    match pool.wait_until_idle() {
        Ok(()) => println!("   No error captured"),
        Err(e) => println!("   Captured: {}", e),
    }
    println!("   Live workers: {}", pool.live_consumers());

    println!("\n5. Statistics:");
    for (i, stat) in pool.get_stats().iter().enumerate() {
        println!(
            "   Worker {}: {} processed, {} failed, avg time: {:.2}μs",
            i,
            stat.get_items_processed(),
            stat.get_items_failed(),
            stat.get_average_processing_time_us()
        );
    }

    println!("\n6. Stopping");
    let abandoned = pool.stop()?;
    println!("   Abandoned: {}", abandoned.len());

    println!("\n7. Watching a thread");
    let (tx, rx) = crossbeam_channel::bounded(1);
    let background = thread::spawn(|| thread::sleep(Duration::from_millis(30)));
    watcher::watch(background, move || {
        let _ = tx.send(());
    })?;
    if rx.recv_timeout(Duration::from_secs(1)).is_ok() {
        println!("   Background thread finished");
    }

    println!("\n=== Example completed successfully ===");
    Ok(())
}
