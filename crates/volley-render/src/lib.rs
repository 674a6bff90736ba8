//! Volley Render - GPU indirect draw-command aggregation
//!
//! This crate turns per-frame lists of visible drawables into packed indirect
//! draw buffers, one per render pass, so each pass can be issued as one
//! multi-draw call per material instead of one call per object:
//! - Fixed-capacity command buffers per pass kind (Solid, Shadow, RSM, Glow)
//! - Offset/size tables per material and per shadow cascade
//! - Streaming or persistent-ring uploads, chosen once from device capability
//! - Overflow truncation and GPU error tracking reported as diagnostics
//!
//! # Example
//!
//! ```ignore
//! use volley_render::*;
//!
//! let ctx = GraphicsContext::new_owned_sync()?;
//! let mut subsystem = CommandSubsystem::new(ctx.clone(), CommandSubsystemDescriptor::default());
//! let mut builder = FrameCommandBuilder::new();
//!
//! // Each frame
//! let report = builder.build_frame(&mut subsystem, PassMask::all(), &drawables, Some(&particles))?;
//!
//! // In the solid pass
//! let output = subsystem.pass_output(PassTarget::Solid).unwrap();
//! pass.multi_draw_table(output.buffer.as_wgpu(), output.table, |pass, material| {
//!     pass.set_pipeline(&pipelines[material.index()]);
//! });
//! ```

// Device
mod capability;
mod context;
mod context_impl;
mod features;

// Data model
mod draw_list;
mod indirect;
mod material;
mod offset_table;
mod pass;

// Buffers and frame building
mod builder;
mod command_buffer;
mod diagnostics;
mod subsystem;
mod upload;

pub use capability::{CommandBatchCapability, GpuRequirements, RenderCapability};
pub use context::{GraphicsContext, GraphicsContextDescriptor, GraphicsError};
pub use features::{FeatureSupportResult, GpuFeatures};

pub use draw_list::{
    DrawParams, DrawableRef, ImmediateDrawList, NodeId, ParticleSystemRef, ParticlesList,
};
pub use indirect::{DrawIndexedIndirect, IndirectCommand, RenderPassMultiDrawIndirectExt};
pub use material::{MAT_COUNT, MaterialType};
pub use offset_table::{CommandRun, OffsetSizeTable, PassTables};
pub use pass::{
    CASCADE_COUNT, CascadeIndex, CascadeMask, PASS_KIND_COUNT, PASS_TARGET_COUNT, PassKind,
    PassMask, PassTarget,
};

pub use builder::{BuilderError, BuilderState, FrameCommandBuilder, FrameReport, PassStats};
pub use command_buffer::{CommandBufferAllocator, CommandBufferError, CommitOutcome};
pub use diagnostics::{FrameDiagnostics, GpuErrorDiagnostic, OverflowDiagnostic};
pub use subsystem::{
    COMMAND_BUFFER_CAPACITY, CommandSubsystem, CommandSubsystemDescriptor,
    DEFAULT_MAX_CONSECUTIVE_GPU_ERRORS, ParticleOutput, PassOutput,
};
pub use upload::{
    COMMAND_BUFFER_USAGE, DEFAULT_RING_DEPTH, PersistentRingUpload, StreamingUpload,
    UploadPreference, UploadStrategy, UploadStrategyKind, create_strategy,
};

pub use volley_test_utils::{GpuBuffer, RenderContext};
