//! Command correlation benchmark suite.
//!
//! Benchmarks the registry hot path at different numbers of in-flight
//! commands:
//! - Raw issue/deliver on a [`CommandRegistry`]
//! - Full engine round trips over the in-process transport
//!
//! Run with: cargo bench --bench correlation
//! Results saved to: target/criterion/

use std::cell::RefCell;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::future::join_all;
use serde_json::Value;
use sharer_bridge::protocol::{Command, Response};
use sharer_bridge::transport::ChannelTransport;
use sharer_bridge::{CommandRegistry, Engine, PendingReply};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const IN_FLIGHT: &[usize] = &[1, 64, 1024];

// ============================================================================
// Benchmark: Registry Issue/Deliver
// ============================================================================

fn bench_issue_deliver(c: &mut Criterion) {
    let mut group = c.benchmark_group("issue_deliver");

    for &count in IN_FLIGHT {
        group.bench_with_input(BenchmarkId::new("in_flight", count), &count, |b, &count| {
            let (transport, mut peer) = ChannelTransport::pair();
            let registry = CommandRegistry::new(Arc::new(transport));

            b.iter(|| {
                let replies: Vec<PendingReply> = (0..count)
                    .map(|_| registry.issue(&Command::StopReceiver))
                    .collect();

                // Settle newest first to exercise out-of-order delivery
                for reply in replies.iter().rev() {
                    registry
                        .deliver(Response::success(reply.command_id(), Value::Null))
                        .unwrap();
                }

                while peer.try_next_request().is_some() {}
                replies
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Engine Round Trip
// ============================================================================

fn bench_engine_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("engine_round_trip");

    for &count in IN_FLIGHT {
        group.bench_with_input(BenchmarkId::new("in_flight", count), &count, |b, &count| {
            let (transport, peer) = ChannelTransport::pair();
            let engine = Engine::builder().transport(transport).build().unwrap();
            let peer = RefCell::new(peer);

            b.to_async(&rt).iter(|| async {
                let pending: Vec<_> = (0..count).map(|_| engine.stop_player()).collect();

                {
                    let mut peer = peer.borrow_mut();
                    while let Some(request) = peer.try_next_request() {
                        peer.reply(request["cmd_id"].as_u64().unwrap(), true, Value::Null);
                    }
                }

                for result in join_all(pending).await {
                    result.unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_issue_deliver, bench_engine_round_trip);
criterion_main!(benches);
