//! Upload strategies moving recorded commands into GPU memory.
//!
//! Two strategies implement the same write/upload contract and are chosen
//! once at subsystem init:
//!
//! - [`StreamingUpload`] keeps one GPU buffer and a staging copy, and sends
//!   the whole written region every frame.
//! - [`PersistentRingUpload`] keeps a ring of GPU buffers, each with a CPU
//!   view that lives as long as the buffer, and sends only the records that
//!   differ from what a slot already holds.

use std::ops::Range;

use volley_core::profiling::profile_function;
use volley_test_utils::{GpuBuffer, RenderContext};

use crate::indirect::{DrawIndexedIndirect, IndirectCommand};

/// Number of slots in the persistent ring by default.
pub const DEFAULT_RING_DEPTH: usize = 3;

/// Usage flags of every command buffer.
pub const COMMAND_BUFFER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::INDIRECT
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::STORAGE);

/// Which strategy an allocator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStrategyKind {
    /// Full upload of the written region each frame.
    Streaming,
    /// Ring of persistently mirrored buffers with dirty-range uploads.
    PersistentRing,
}

impl UploadStrategyKind {
    /// Pick a strategy from the device capability and the caller's preference.
    pub fn select(supports_persistent_mapping: bool, preference: UploadPreference) -> Self {
        match preference {
            UploadPreference::ForceStreaming => Self::Streaming,
            UploadPreference::Auto if supports_persistent_mapping => Self::PersistentRing,
            UploadPreference::Auto => Self::Streaming,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::PersistentRing => "persistent-ring",
        }
    }
}

impl std::fmt::Display for UploadStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller preference for strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UploadPreference {
    /// Persistent ring when the device supports it, streaming otherwise.
    #[default]
    Auto,
    /// Always stream, even when persistent mapping is available.
    ForceStreaming,
}

/// The write/upload contract shared by both strategies.
///
/// The allocator owns the cursor and capacity checks; a strategy only stores
/// commands at slots it is given and moves them to the GPU on [`upload`].
///
/// [`upload`]: UploadStrategy::upload
pub trait UploadStrategy: Send {
    fn kind(&self) -> UploadStrategyKind;

    /// Called once at the start of each frame, before any write.
    fn begin_frame(&mut self);

    /// Store `command` at `slot`. `slot` is always below the capacity.
    fn write(&mut self, slot: u32, command: DrawIndexedIndirect);

    /// The first `len` commands as the CPU currently sees them.
    fn commands(&self, len: u32) -> &[DrawIndexedIndirect];

    /// Make the first `len` commands visible to the GPU.
    ///
    /// Returns the number of bytes sent.
    fn upload(&mut self, ctx: &dyn RenderContext, len: u32) -> u64;

    /// Forget what the GPU is assumed to hold for the first `len` commands,
    /// so the next upload sends them again. Called after a failed upload.
    fn invalidate(&mut self, len: u32);

    /// The GPU buffer the current frame's commands live in.
    fn buffer(&self) -> &GpuBuffer;

    /// Destroy every GPU buffer owned by the strategy.
    fn release(&mut self, ctx: &dyn RenderContext);
}

/// Build the strategy of the given kind.
pub fn create_strategy(
    kind: UploadStrategyKind,
    ctx: &dyn RenderContext,
    label: &str,
    capacity: u32,
    ring_depth: usize,
) -> Box<dyn UploadStrategy> {
    match kind {
        UploadStrategyKind::Streaming => Box::new(StreamingUpload::new(ctx, label, capacity)),
        UploadStrategyKind::PersistentRing => {
            Box::new(PersistentRingUpload::new(ctx, label, capacity, ring_depth))
        }
    }
}

fn create_command_buffer(ctx: &dyn RenderContext, label: &str, capacity: u32) -> GpuBuffer {
    ctx.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: DrawIndexedIndirect::SIZE * capacity.max(1) as u64,
        usage: COMMAND_BUFFER_USAGE,
        mapped_at_creation: false,
    })
}

/// Full upload of the written region every frame.
pub struct StreamingUpload {
    buffer: GpuBuffer,
    staging: Vec<DrawIndexedIndirect>,
}

impl StreamingUpload {
    pub fn new(ctx: &dyn RenderContext, label: &str, capacity: u32) -> Self {
        Self {
            buffer: create_command_buffer(ctx, label, capacity),
            staging: vec![DrawIndexedIndirect::default(); capacity as usize],
        }
    }
}

impl UploadStrategy for StreamingUpload {
    fn kind(&self) -> UploadStrategyKind {
        UploadStrategyKind::Streaming
    }

    fn begin_frame(&mut self) {}

    fn write(&mut self, slot: u32, command: DrawIndexedIndirect) {
        self.staging[slot as usize] = command;
    }

    fn commands(&self, len: u32) -> &[DrawIndexedIndirect] {
        &self.staging[..len as usize]
    }

    fn upload(&mut self, ctx: &dyn RenderContext, len: u32) -> u64 {
        profile_function!();

        if len == 0 {
            return 0;
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.staging[..len as usize]);
        ctx.write_buffer(&self.buffer, 0, bytes);
        bytes.len() as u64
    }

    // Every upload already sends the whole written region.
    fn invalidate(&mut self, _len: u32) {}

    fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    fn release(&mut self, ctx: &dyn RenderContext) {
        ctx.destroy_buffer(&self.buffer);
    }
}

struct RingSlot {
    buffer: GpuBuffer,
    /// CPU view of the buffer, valid for the buffer's whole lifetime.
    mapped: Vec<DrawIndexedIndirect>,
    /// Records changed since the last upload of this slot.
    dirty: Option<Range<u32>>,
}

impl RingSlot {
    fn mark_dirty(&mut self, slot: u32) {
        self.mark_range_dirty(slot..slot + 1);
    }

    fn mark_range_dirty(&mut self, records: Range<u32>) {
        self.dirty = Some(match self.dirty.take() {
            Some(range) => range.start.min(records.start)..range.end.max(records.end),
            None => records,
        });
    }
}

/// Ring of persistently mirrored buffers.
///
/// Slots are filled through [`RenderContext::write_buffer`], which is already
/// ordered against queued GPU reads, so the ring does not guard any hazard.
/// It mirrors the layout of a persistently mapped ring: each slot keeps the
/// commands of the frame `depth` frames back, and a frame whose draw list is
/// unchanged since then uploads nothing. A depth of 1 gives the smallest
/// footprint; deeper rings only help when consecutive frames alternate
/// between a few stable layouts.
pub struct PersistentRingUpload {
    slots: Vec<RingSlot>,
    current: usize,
}

impl PersistentRingUpload {
    pub fn new(ctx: &dyn RenderContext, label: &str, capacity: u32, depth: usize) -> Self {
        let depth = depth.max(1);
        let slots = (0..depth)
            .map(|i| RingSlot {
                buffer: create_command_buffer(ctx, &format!("{label}[{i}]"), capacity),
                mapped: vec![DrawIndexedIndirect::default(); capacity as usize],
                dirty: None,
            })
            .collect();

        Self { slots, current: 0 }
    }

    /// Number of buffers in the ring.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the current frame writes to.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    fn slot(&self) -> &RingSlot {
        &self.slots[self.current]
    }

    fn slot_mut(&mut self) -> &mut RingSlot {
        &mut self.slots[self.current]
    }
}

impl UploadStrategy for PersistentRingUpload {
    fn kind(&self) -> UploadStrategyKind {
        UploadStrategyKind::PersistentRing
    }

    fn begin_frame(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    fn write(&mut self, slot: u32, command: DrawIndexedIndirect) {
        let ring_slot = self.slot_mut();
        let mapped = &mut ring_slot.mapped[slot as usize];
        if *mapped != command {
            *mapped = command;
            ring_slot.mark_dirty(slot);
        }
    }

    fn commands(&self, len: u32) -> &[DrawIndexedIndirect] {
        &self.slot().mapped[..len as usize]
    }

    fn upload(&mut self, ctx: &dyn RenderContext, len: u32) -> u64 {
        profile_function!();

        let current = self.current;
        let slot = self.slot_mut();
        let Some(dirty) = slot.dirty.take() else {
            return 0;
        };
        // Records past `len` are never read this frame.
        let end = dirty.end.min(len);
        if dirty.start >= end {
            slot.dirty = Some(dirty);
            return 0;
        }
        if end < dirty.end {
            slot.dirty = Some(end..dirty.end);
        }

        let bytes: &[u8] = bytemuck::cast_slice(&slot.mapped[dirty.start as usize..end as usize]);
        ctx.write_buffer(&slot.buffer, dirty.start as u64 * DrawIndexedIndirect::SIZE, bytes);
        tracing::trace!(
            "Flushed records {}..{} of ring slot {}",
            dirty.start,
            end,
            current
        );
        bytes.len() as u64
    }

    fn invalidate(&mut self, len: u32) {
        if len > 0 {
            self.slot_mut().mark_range_dirty(0..len);
        }
    }

    fn buffer(&self) -> &GpuBuffer {
        &self.slot().buffer
    }

    fn release(&mut self, ctx: &dyn RenderContext) {
        for slot in &self.slots {
            ctx.destroy_buffer(&slot.buffer);
        }
    }
}
