use criterion::{Criterion, black_box, criterion_group, criterion_main};

use facerig_core::coupling::{GROUPS, resolve_inverse, resolve_pair, resolve_proportional};
use facerig_core::{Calibration, ChannelRegistry};

fn bench_inverse(c: &mut Criterion) {
    let a = Calibration::new(20, 160, 90).unwrap_or_default();
    let b = Calibration::new(30, 120, 90).unwrap_or_default();
    c.bench_function("inverse_sweep", |bench| {
        bench.iter(|| {
            let mut acc = 0u32;
            for angle in 0..=180 {
                let (x, y) = resolve_inverse(&a, &b, black_box(angle), Some(2));
                acc += u32::from(x) + u32::from(y);
            }
            acc
        });
    });
}

fn bench_proportional(c: &mut Criterion) {
    let p = Calibration::new(56, 98, 79).unwrap_or_default();
    let s = Calibration::new(38, 75, 55).unwrap_or_default();
    c.bench_function("proportional_sweep", |bench| {
        bench.iter(|| {
            let mut acc = 0u32;
            for angle in 0..=180 {
                let (x, y) = resolve_proportional(&p, &s, black_box(angle));
                acc += u32::from(x) + u32::from(y);
            }
            acc
        });
    });
}

fn bench_all_groups(c: &mut Criterion) {
    let reg = ChannelRegistry::new();
    c.bench_function("resolve_every_group", |bench| {
        bench.iter(|| {
            for g in &GROUPS[1..] {
                black_box(resolve_pair(&reg, g, g.pair.1, black_box(120)));
            }
        });
    });
}

criterion_group!(benches, bench_inverse, bench_proportional, bench_all_groups);
criterion_main!(benches);
