//! Performance benchmarks for the fanout gateway
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;

use fanout_gateway::config::{BufferConfig, PipelineConfig};
use fanout_gateway::pipeline::buffer::BufferPool;
use fanout_gateway::pipeline::{CallGraphParser, Gateway};
use fanout_gateway::plugin::GatewayPluginsBuilder;
use fanout_gateway::plugin::builtin::BuiltinEnv;
use fanout_gateway::rpc::{LocalTransport, MethodDescriptor, ParamSpec, StaticSchemaRegistry};

fn schema() -> StaticSchemaRegistry {
    StaticSchemaRegistry::from_descriptors([
        MethodDescriptor::new("item.get").with_param(ParamSpec::optional("id")),
        MethodDescriptor::new("item.sum"),
    ])
}

/// `n` calls where every call after the first depends on its predecessor
fn chain_spec(n: usize) -> String {
    (0..n)
        .map(|i| match i {
            0 => "item.get@c0".to_string(),
            _ => format!("item.get@c{i}:c{}", i - 1),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `n` independent calls feeding one aggregate
fn fan_in_spec(n: usize) -> String {
    let mut calls: Vec<String> = (0..n).map(|i| format!("item.get@c{i}")).collect();
    let deps: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
    calls.push(format!("item.sum:{}", deps.join("/")));
    calls.join(",")
}

/// Benchmark call specification parsing
fn bench_call_graph_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_graph_parsing");
    group.measurement_time(Duration::from_secs(5));

    let schema = schema();
    let parser = CallGraphParser::new(&schema);
    let params = HashMap::new();

    for n in [1usize, 8, 32] {
        let spec = chain_spec(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("chain", n), &spec, |b, spec| {
            b.iter(|| parser.parse(black_box(spec), &params));
        });
    }

    group.finish();
}

/// Benchmark plugin-point resolution at startup
fn bench_plugin_resolution(c: &mut Criterion) {
    let env = BuiltinEnv::new(
        PipelineConfig::default(),
        Arc::new(ArcSwap::from_pointee(HashSet::new())),
        Arc::new(BufferPool::new(&BufferConfig::default())),
    );

    c.bench_function("resolve_builtin_plugins", |b| {
        b.iter(|| GatewayPluginsBuilder::with_builtins(black_box(&env)).build());
    });
}

/// Benchmark complete requests against in-process backends
fn bench_request_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_execution");
    group.measurement_time(Duration::from_secs(5));

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let transport = LocalTransport::new();
    transport.register_sync("item.get", |request, _| Ok(json!({ "id": request.arg("id") })));
    transport.register_sync("item.sum", |request, _| Ok(json!(request.upstream.len())));
    let gateway = Gateway::builder(Arc::new(transport), Arc::new(schema()))
        .build()
        .unwrap();

    for n in [4usize, 16] {
        for (shape, spec) in [("chain", chain_spec(n)), ("fan_in", fan_in_spec(n))] {
            let params = HashMap::from([("_mt".to_string(), spec)]);
            group.throughput(Throughput::Elements(n as u64));
            group.bench_with_input(BenchmarkId::new(shape, n), &params, |b, params| {
                b.to_async(&runtime)
                    .iter(|| gateway.handle("bench", black_box(params.clone())));
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_call_graph_parsing,
    bench_plugin_resolution,
    bench_request_execution,
);
criterion_main!(benches);
