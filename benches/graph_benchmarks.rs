use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use intelgraph::audit::Actor;
use intelgraph::graph::{Direction, EdgeType, NewEdge, NewNode, NodeId, NodeType, TenantId};
use intelgraph::traversal::TraversalRequest;
use intelgraph::{EngineConfig, IntelligenceGraph};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn runtime() -> Runtime {
    Runtime::new().expect("tokio runtime")
}

/// Build a graph where node `i` links to `i + 1` and `2i + 1`
fn populate(rt: &Runtime, size: usize) -> (IntelligenceGraph, TenantId, Vec<NodeId>) {
    let engine = IntelligenceGraph::open(EngineConfig::default()).expect("engine");
    let tenant = TenantId::new("bench");
    let actor = Actor::system();
    let ids = rt.block_on(async {
        let mut ids = Vec::with_capacity(size);
        for i in 0..size {
            let node = engine
                .store()
                .create_node(&tenant, &actor, NewNode::new(NodeType::Keyword, format!("kw-{}", i)).with_property("rank", i as i64))
                .await
                .expect("node");
            ids.push(node.id);
        }
        for i in 0..size {
            for j in [i + 1, 2 * i + 1] {
                if j < size {
                    engine
                        .store()
                        .create_edge(&tenant, &actor, NewEdge::new(EdgeType::RelatedTo, ids[i], ids[j]))
                        .await
                        .expect("edge");
                }
            }
        }
        ids
    });
    (engine, tenant, ids)
}

/// Benchmark node insertion throughput, audit included
fn bench_node_insertion(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("node_insertion");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let engine = IntelligenceGraph::open(EngineConfig::default()).expect("engine");
                let tenant = TenantId::new("bench");
                let actor = Actor::system();
                rt.block_on(async {
                    for i in 0..size {
                        engine
                            .store()
                            .create_node(&tenant, &actor, NewNode::new(NodeType::Article, format!("a-{}", i)))
                            .await
                            .expect("node");
                    }
                });
            });
        });
    }
    group.finish();
}

/// Benchmark bounded BFS latency
fn bench_traversal(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("traversal");

    for size in [1000, 10_000].iter() {
        let (engine, tenant, ids) = populate(&rt, *size);
        let request = TraversalRequest::new(ids[0], Direction::Outbound, 6);
        let token = CancellationToken::new();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let hits = rt
                    .block_on(engine.traversal().traverse(&tenant, &request, &token))
                    .expect("traverse");
                criterion::black_box(hits.len());
            });
        });
    }
    group.finish();
}

/// Benchmark full analytics recompute (projection, centrality, clusters)
fn bench_analytics(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("analytics");
    group.sample_size(20);

    for size in [1000, 10_000].iter() {
        let (engine, tenant, _) = populate(&rt, *size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let report = rt.block_on(engine.analytics().recompute(&tenant)).expect("analytics");
                criterion::black_box(report.clusters.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_node_insertion, bench_traversal, bench_analytics);
criterion_main!(benches);
