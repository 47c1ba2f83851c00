//! Concurrent Read Consistency Tests
//!
//! Readers racing the dispatch task must always observe a coherent
//! book: complete snapshots, never a half-applied mutation, and never
//! a negative quantity.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;

use market_mirror::infrastructure::exchange::kalshi::KalshiDecoder;
use market_mirror::{BookService, Side, StreamHandler, SubscriptionSet};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn service() -> Arc<BookService> {
    Arc::new(BookService::new(
        Arc::new(KalshiDecoder::new()),
        Arc::new(SubscriptionSet::new()),
        None,
    ))
}

fn snapshot_frame(seq: u64, yes: &str, no: &str) -> String {
    format!(
        r#"{{"type":"orderbook_snapshot","seq":{seq},"msg":{{"market_ticker":"MKT","yes":{yes},"no":{no}}}}}"#
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_only_observe_complete_snapshots() {
    let service = service();
    let done = Arc::new(AtomicBool::new(false));

    // Two coherent book states the writer alternates between. A torn
    // read would surface as a mixed pair.
    let state_a = (Some(dec("0.40")), Some(dec("0.60")));
    let state_b = (Some(dec("0.45")), Some(dec("0.55")));

    let mut readers = Vec::new();
    for _ in 0..3 {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        readers.push(tokio::task::spawn_blocking(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::Relaxed) {
                if let Some(quote) = service.quote("MKT") {
                    let pair = (
                        quote.bid.map(|l| l.price),
                        quote.ask.map(|l| l.price),
                    );
                    assert!(
                        pair == state_a || pair == state_b,
                        "torn read: {pair:?}"
                    );
                    observed += 1;
                }
            }
            observed
        }));
    }

    for seq in 1..=500u64 {
        let frame = if seq % 2 == 1 {
            snapshot_frame(seq, "[[40,10]]", "[[40,8]]")
        } else {
            snapshot_frame(seq, "[[45,10]]", "[[45,8]]")
        };
        service.on_message(&frame).await;
        if seq % 50 == 0 {
            tokio::task::yield_now().await;
        }
    }

    done.store(true, Ordering::Relaxed);
    for reader in readers {
        let observed = reader.await.unwrap();
        assert!(observed > 0, "reader never saw a quote");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quantities_stay_non_negative_under_delta_burst() {
    let service = service();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        tokio::task::spawn_blocking(move || {
            while !done.load(Ordering::Relaxed) {
                let quantity = service.quantity_at("MKT", Side::Bid, dec("0.40"));
                assert!(quantity >= Decimal::ZERO, "negative quantity {quantity}");
                for level in service.levels("MKT", Side::Bid) {
                    assert!(level.quantity > Decimal::ZERO);
                }
            }
        })
    };

    service.on_message(&snapshot_frame(1, "[[40,5]]", "[]")).await;

    // Alternating over-removes and refills around zero.
    let mut seq = 1u64;
    for round in 0..200i64 {
        seq += 1;
        let delta = if round % 2 == 0 { -7 } else { 9 };
        let frame = format!(
            r#"{{"type":"orderbook_delta","seq":{seq},"msg":{{"market_ticker":"MKT","price":40,"delta":{delta},"side":"yes"}}}}"#
        );
        service.on_message(&frame).await;
    }

    done.store(true, Ordering::Relaxed);
    reader.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_do_not_block_each_other() {
    let service = service();
    service.on_message(&snapshot_frame(1, "[[40,10]]", "[[55,5]]")).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            for _ in 0..1_000 {
                let quote = service.quote("MKT").unwrap();
                assert_eq!(quote.bid.map(|l| l.price), Some(dec("0.40")));
                assert_eq!(quote.mid(), Some(dec("0.425")));
                assert_eq!(service.spread("MKT"), Some(dec("0.05")));
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}
