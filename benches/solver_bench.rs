//! Benchmarks for the line-set solver

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use paraglider_lines::prelude::*;

/// One riser per row (A, B, C), a knot per rib pair, one line per rib
fn create_glider(ribs: usize) -> LineSet {
    let registry = LineTypeRegistry::with_catalog();
    let riser = registry.get("liros.ntsl250").unwrap();
    let middle = registry.get("liros.ntsl160").unwrap();
    let top = registry.get("liros.dsl35").unwrap();

    let mut builder = LineSetBuilder::new().with_inflow(Vec3::new(-10.0, 0.0, -1.0));
    builder.add_node(Node::lower("main", Vec3::zeros())).unwrap();

    for (r, row) in ["A", "B", "C"].iter().enumerate() {
        let x = 0.4 * r as f64;
        let row_knot = format!("k_{}", row);
        builder.add_node(Node::knot(&row_knot, Vec3::new(x, 0.0, 2.0))).unwrap();
        builder
            .add_line(&format!("{}_main", row), "main", &row_knot, riser.clone(), 2.0)
            .unwrap();

        for pair in 0..ribs / 2 {
            let pair_knot = format!("k_{}{}", row, pair);
            builder
                .add_node(Node::knot(&pair_knot, Vec3::new(x, 0.5 * pair as f64, 4.5)))
                .unwrap();
            builder
                .add_line(&format!("{}_{}", row, pair), &row_knot, &pair_knot, middle.clone(), 2.5)
                .unwrap();

            for rib in [2 * pair, 2 * pair + 1] {
                let name = format!("{}{}", row, rib + 1);
                let y = 0.25 * rib as f64 + 0.1;
                let node = Node::upper(&name, Vec3::new(x, y, 7.0 - 0.02 * y * y), Vec3::new(0.0, 5.0, 40.0))
                    .with_rib_pos(rib as f64)
                    .with_offset(0.02);
                builder.add_node(node).unwrap();
                builder
                    .add_line(&format!("{}{}_line", row, rib + 1), &pair_knot, &name, top.clone(), 2.3)
                    .unwrap();
            }
        }
    }

    builder.build().unwrap()
}

fn benchmark_straight(c: &mut Criterion) {
    let options = RecalcOptions::default().without_sag();
    c.bench_function("glider_20_ribs_no_sag", |b| {
        b.iter(|| {
            let mut lineset = create_glider(20);
            black_box(lineset.recalc(&options, None));
        })
    });
}

fn benchmark_sag(c: &mut Criterion) {
    let options = RecalcOptions::default();
    c.bench_function("glider_20_ribs_sag", |b| {
        b.iter(|| {
            let mut lineset = create_glider(20);
            black_box(lineset.recalc(&options, None));
        })
    });
}

fn benchmark_large_sag(c: &mut Criterion) {
    let options = RecalcOptions::default();
    c.bench_function("glider_60_ribs_sag", |b| {
        b.iter(|| {
            let mut lineset = create_glider(60);
            black_box(lineset.recalc(&options, None));
        })
    });
}

fn benchmark_reports(c: &mut Criterion) {
    let mut lineset = create_glider(40);
    lineset.recalc(&RecalcOptions::default(), None);
    c.bench_function("glider_40_ribs_length_table", |b| {
        b.iter(|| black_box(lineset.length_table()))
    });
}

criterion_group!(
    benches,
    benchmark_straight,
    benchmark_sag,
    benchmark_large_sag,
    benchmark_reports,
);

criterion_main!(benches);
