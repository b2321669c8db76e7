//! Stress tests for the aggregation engine
//!
//! Run with: cargo test --release stress -- --ignored

use examon::*;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_ingest() {
    let metric = Metric::parse("node/+/power;avg");
    let sources = 8;
    let cycles = 250_000;
    let start = Instant::now();

    for cycle in 0..cycles {
        for source in 0..sources {
            let value = 100.0 + (cycle as f64 * 0.001).sin() + source as f64;
            metric.ingest(Reading::new(value, cycle as f64));
        }
    }

    let elapsed = start.elapsed();
    let readings = cycles * sources;
    let rate = readings as f64 / elapsed.as_secs_f64();

    println!("Ingested {} readings in {:?}", readings, elapsed);
    println!("Rate: {:.0} readings/second", rate);

    assert_eq!(metric.stats().completed_cycles, cycles as u64 - 1);
    assert!(
        rate > 1_000_000.0,
        "Should ingest at least 1M readings/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_dispatch() {
    let mut dispatcher = Dispatcher::new(CollectorConfig::bare());
    for i in 0..64 {
        dispatcher.register(&format!("node/+/metric{};sum", i)).unwrap();
    }

    let iterations = 20_000;
    let start = Instant::now();

    for t in 0..iterations {
        for i in 0..64 {
            for node in ["a", "b"] {
                let topic = format!("node/{}/metric{}", node, i);
                let payload = format!("1;{}", t);
                dispatcher.dispatch(&topic, payload.as_bytes());
            }
        }
    }

    let elapsed = start.elapsed();
    let events = dispatcher.stats().events;
    let rate = events as f64 / elapsed.as_secs_f64();

    println!("Dispatched {} messages in {:?}", events, elapsed);
    println!("Rate: {:.0} messages/second", rate);

    for id in dispatcher.ids() {
        assert_eq!(dispatcher.value(id).unwrap(), Some(ReportedValue::Double(2.0)));
    }
    assert!(
        rate > 100_000.0,
        "Should dispatch at least 100k msg/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_concurrent_drain() {
    let metric = Arc::new(Metric::parse("node/+/power;sum").with_history(true));
    let cycles: u64 = 200_000;

    let producer = {
        let metric = Arc::clone(&metric);
        thread::spawn(move || {
            for cycle in 0..cycles {
                for _ in 0..4 {
                    metric.ingest(Reading::new(1.0, cycle as f64));
                }
            }
        })
    };

    let consumer = {
        let metric = Arc::clone(&metric);
        thread::spawn(move || {
            let mut drained = Vec::new();
            while drained.len() < (cycles - 1) as usize {
                drained.extend(metric.drain_history());
                // Readers must never observe a half-applied cycle
                if let Some(value) = metric.sample() {
                    assert_eq!(value, 4.0);
                }
                thread::yield_now();
            }
            drained
        })
    };

    producer.join().unwrap();
    let drained = consumer.join().unwrap();

    assert_eq!(drained.len(), (cycles - 1) as usize);
    assert!(drained.iter().all(|s| s.value == 4.0));
    assert!(drained
        .windows(2)
        .all(|pair| pair[0].captured_at <= pair[1].captured_at));
}
