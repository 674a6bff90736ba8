//! Benchmarks for per-frame command building against the mock context.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use volley_render::{
    CascadeMask, CommandSubsystem, CommandSubsystemDescriptor, DrawParams, DrawableRef,
    FrameCommandBuilder, ImmediateDrawList, MAT_COUNT, MaterialType, NodeId, PassMask,
};
use volley_test_utils::MockRenderContext;

fn scene(count: u64) -> ImmediateDrawList {
    let mut list = ImmediateDrawList::with_capacity(count as usize);
    for id in 0..count {
        let material = MaterialType::ALL[(id % MAT_COUNT as u64) as usize];
        let drawable = DrawableRef::new(NodeId(id), material, DrawParams::new(36, 0, 0))
            .with_passes(PassMask::SOLID | PassMask::RSM)
            .with_cascades(CascadeMask::from_bits_truncate((id % 16) as u8));
        list.append(drawable);
    }
    list
}

fn bench_build_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_frame");

    for size in [100, 1000, 5000] {
        group.throughput(Throughput::Elements(size));
        let drawables = scene(size);

        for (name, persistent) in [("streaming", false), ("persistent_ring", true)] {
            let mock = Arc::new(MockRenderContext::new().with_persistent_mapping(persistent));
            let mut subsystem =
                CommandSubsystem::new(mock.clone(), CommandSubsystemDescriptor::default());
            let mut builder = FrameCommandBuilder::new();

            group.bench_with_input(BenchmarkId::new(name, size), &drawables, |b, drawables| {
                b.iter(|| {
                    volley_core::profiling::new_frame();
                    mock.clear_calls();
                    builder
                        .build_frame(&mut subsystem, PassMask::all(), black_box(drawables), None)
                        .map(|report| report.total_commands())
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_build_frame);
criterion_main!(benches);
