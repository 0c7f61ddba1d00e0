//! Resolution Benchmarks
//!
//! Cached vs. fresh element resolution through a nested page tree.
//!
//! Run with: `cargo bench --bench resolve_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pom::prelude::*;

/// Page with a chain of `depth` nested blocks ending in a button
fn nested_app(depth: usize) -> (App, MockDriver) {
    let driver = MockDriver::new();
    let mut parent: Option<String> = None;
    for level in 0..depth {
        let key = format!("block{level}");
        let mut el = MockElement::new(key.clone(), Locator::css(format!("div.l{level}")));
        if let Some(p) = &parent {
            el = el.inside(p.clone());
        }
        driver.add(el);
        parent = Some(key);
    }
    let mut leaf = MockElement::new("button", Locator::css("button"));
    if let Some(p) = &parent {
        leaf = leaf.inside(p.clone());
    }
    driver.add(leaf);

    let mut spec = ui::button(Locator::css("button"));
    let mut name = "button".to_string();
    for level in (0..depth).rev() {
        spec = ui::block(Locator::css(format!("div.l{level}"))).child(name, spec);
        name = format!("b{level}");
    }
    let app = App::builder("http://localhost")
        .page("deep", PageSpec::new("/").child(name, spec))
        .build(driver.clone())
        .unwrap();
    (app, driver)
}

fn leaf_path(depth: usize) -> String {
    let mut path: Vec<String> = (0..depth).map(|l| format!("b{l}")).collect();
    path.push("button".to_string());
    path.join(".")
}

fn bench_cached_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_resolution");

    for depth in [1, 3, 6] {
        let (app, _driver) = nested_app(depth);
        let button = app.page("deep").unwrap().element(&leaf_path(depth)).unwrap();
        button.resolve().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &button, |bench, node| {
            bench.iter(|| black_box(node.resolve().unwrap()));
        });
    }

    group.finish();
}

fn bench_fresh_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("fresh_resolution");

    for depth in [1, 3, 6] {
        let (app, _driver) = nested_app(depth);
        let button = app.page("deep").unwrap().element(&leaf_path(depth)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &button, |bench, node| {
            bench.iter(|| {
                app.refresh();
                black_box(node.resolve().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let (app, _driver) = nested_app(6);
    let page = app.page("deep").unwrap();
    let path = leaf_path(6);

    c.bench_function("lookup_depth_6", |bench| {
        bench.iter(|| black_box(page.element(black_box(&path)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_cached_resolution,
    bench_fresh_resolution,
    bench_lookup
);
criterion_main!(benches);
