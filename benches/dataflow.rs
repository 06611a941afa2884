//! Benchmarks for the dataflow solver and the full pass pipeline.
//!
//! Inputs are generated scripts with nested loops and branches so the
//! worklist revisits blocks:
//! - Liveness over a single large scope
//! - Type hints over the same scope
//! - The interpreter pipeline over a tree of methods, sequential and parallel

extern crate irscope;

use criterion::{criterion_group, criterion_main, Criterion};
use irscope::{
    dataflow::TypeHintAnalysis,
    prelude::*,
};
use std::hint::black_box;

/// `n = n + k` style counter loop with a branch in the body.
fn counter_loop(var: &str, k: i64) -> Node {
    Node::While {
        condition: Box::new(Node::call(Node::var(var), "<", vec![Node::int(1000)])),
        body: Box::new(Node::If {
            condition: Box::new(Node::call(Node::var(var), "odd?", vec![])),
            then_body: Some(Box::new(Node::assign(
                var,
                Node::call(Node::var(var), "+", vec![Node::int(k)]),
            ))),
            else_body: Some(Box::new(Node::assign(
                var,
                Node::call(Node::var(var), "*", vec![Node::int(2)]),
            ))),
        }),
    }
}

/// A script body with `loops` sibling loops, each nesting a second loop.
fn script(loops: usize) -> Node {
    let mut statements = Vec::new();
    for i in 0..loops {
        let outer = format!("o{i}");
        let inner = format!("i{i}");
        statements.push(Node::assign(&outer, Node::int(0)));
        statements.push(Node::assign(&inner, Node::int(1)));
        statements.push(Node::While {
            condition: Box::new(Node::call(Node::var(&outer), "<", vec![Node::int(10)])),
            body: Box::new(Node::seq(vec![
                counter_loop(&inner, i as i64 + 1),
                Node::assign(&outer, Node::call(Node::var(&outer), "+", vec![Node::int(1)])),
            ])),
        });
    }
    Node::seq(statements)
}

/// `methods` method definitions, each holding a small script.
fn program(methods: usize) -> Node {
    Node::seq(
        (0..methods)
            .map(|i| Node::Def {
                name: format!("m{i}"),
                params: vec!["arg".into()],
                optional: vec![],
                block_param: None,
                body: Box::new(script(4)),
            })
            .collect(),
    )
}

fn lowered(ast: &Node) -> IrScope {
    let mut scope = IrBuilder::new().build_root(ast).unwrap();
    scope.build_cfg().unwrap();
    scope
}

/// Liveness over one scope with 50 nested loop pairs.
fn bench_liveness_large_scope(c: &mut Criterion) {
    let scope = lowered(&script(50));
    let solver = DataFlowSolver::new();

    c.bench_function("dataflow_liveness_50_loops", |b| {
        b.iter(|| {
            let solution = LiveVariables::compute(black_box(&scope), &solver).unwrap();
            black_box(solution.iterations())
        });
    });
}

/// Forward kind inference over the same scope.
fn bench_type_hints_large_scope(c: &mut Criterion) {
    let scope = lowered(&script(50));
    let solver = DataFlowSolver::new();

    c.bench_function("dataflow_type_hints_50_loops", |b| {
        b.iter(|| {
            let hints = TypeHintAnalysis::compute(black_box(&scope), &solver).unwrap();
            black_box(hints)
        });
    });
}

/// Interpreter pipeline over 32 methods, one thread.
fn bench_pipeline_sequential(c: &mut Criterion) {
    let ast = program(32);

    c.bench_function("pipeline_32_methods_sequential", |b| {
        b.iter(|| {
            let mut root = IrBuilder::new().build_root(black_box(&ast)).unwrap();
            let ctx = CompilationContext::new(CompilerConfig::interpreter());
            black_box(ctx.compile(&mut root).unwrap())
        });
    });
}

/// Interpreter pipeline over 32 methods on the rayon pool.
fn bench_pipeline_parallel(c: &mut Criterion) {
    let ast = program(32);

    c.bench_function("pipeline_32_methods_parallel", |b| {
        b.iter(|| {
            let mut root = IrBuilder::new().build_root(black_box(&ast)).unwrap();
            let ctx = CompilationContext::new(CompilerConfig::interpreter().with_parallel(true));
            black_box(ctx.compile(&mut root).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_liveness_large_scope,
    bench_type_hints_large_scope,
    bench_pipeline_sequential,
    bench_pipeline_parallel,
);
criterion_main!(benches);
