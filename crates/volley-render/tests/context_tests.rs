//! Graphics context tests against a real adapter, plus GPU-free error checks.

use std::sync::Arc;
use volley_render::{
    CommandBatchCapability, CommandSubsystem, CommandSubsystemDescriptor, DrawParams,
    DrawableRef, FrameCommandBuilder, GraphicsContext, GraphicsContextDescriptor, GraphicsError,
    GpuFeatures, ImmediateDrawList, MaterialType, NodeId, PassMask, PassTarget,
    UploadStrategyKind,
};

fn context_with_batching() -> Option<Arc<GraphicsContext>> {
    let descriptor = GraphicsContextDescriptor::new().request_capability::<CommandBatchCapability>();
    match pollster::block_on(GraphicsContext::new_owned_with_descriptor(descriptor)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            println!("GPU not available: {}", e);
            None
        }
    }
}

#[test]
#[ignore] // Requires GPU - run with: cargo test --test context_tests -- --ignored
fn test_context_arc_cleanup() {
    let Some(ctx) = context_with_batching() else {
        return;
    };
    assert_eq!(Arc::strong_count(&ctx), 1);

    let weak = Arc::downgrade(&ctx);
    drop(ctx);

    assert!(weak.upgrade().is_none());
}

#[test]
#[ignore] // Requires GPU
fn test_strategy_follows_enabled_features() {
    let Some(ctx) = context_with_batching() else {
        return;
    };
    let mapping = ctx.has_feature(GpuFeatures::MAPPABLE_PRIMARY_BUFFERS);

    let subsystem = CommandSubsystem::new(ctx.clone(), CommandSubsystemDescriptor::default());

    let expected = if mapping {
        UploadStrategyKind::PersistentRing
    } else {
        UploadStrategyKind::Streaming
    };
    assert_eq!(subsystem.strategy_kind(), expected);
}

#[test]
#[ignore] // Requires GPU
fn test_frame_uploads_without_gpu_errors() {
    let Some(ctx) = context_with_batching() else {
        return;
    };
    let mut subsystem = CommandSubsystem::new(ctx.clone(), CommandSubsystemDescriptor::default());
    let mut builder = FrameCommandBuilder::new();

    let mut drawables = ImmediateDrawList::new();
    for id in 0..100u64 {
        let material = MaterialType::ALL[id as usize % MaterialType::ALL.len()];
        drawables.append(DrawableRef::new(
            NodeId(id),
            material,
            DrawParams::new(36, 0, 0),
        ));
    }

    for _ in 0..4 {
        let report = builder
            .build_frame(&mut subsystem, PassMask::SOLID, &drawables, None)
            .expect("frame should build");
        assert!(report.diagnostics.gpu_errors.is_empty(), "{:?}", report.diagnostics);
        assert_eq!(report.pass(volley_render::PassKind::Solid).draw_calls, 7);
    }

    let table = subsystem.table(PassTarget::Solid).expect("frame is committed");
    assert_eq!(table.command_count(), 100);

    subsystem.shutdown();
}

#[test]
fn test_graphics_error_display() {
    let err = GraphicsError::NoAdapter;
    assert!(format!("{:?}", err).contains("NoAdapter"));
    assert_eq!(err.to_string(), "No suitable GPU adapter found");

    let err = GraphicsError::DeviceCreation("out of memory".to_string());
    assert!(err.to_string().contains("out of memory"));
}
