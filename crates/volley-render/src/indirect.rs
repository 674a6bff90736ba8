//! Indirect draw commands and multi-draw helpers.
//!
//! [`DrawIndexedIndirect`] is the record stored in every pass buffer. Its
//! layout matches what `wgpu::RenderPass::multi_draw_indexed_indirect` reads.
//!
//! # Feature Requirements
//!
//! - `INDIRECT_FIRST_INSTANCE`: required for a non-zero `first_instance`.
//! - `multi_draw_indexed_indirect()`: requires `DownlevelFlags::INDIRECT_EXECUTION`,
//!   which every desktop GPU has.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::material::MaterialType;
use crate::offset_table::{CommandRun, OffsetSizeTable};

/// Indirect draw command for indexed geometry.
///
/// # Fields
///
/// * `index_count` - Number of indices to draw
/// * `instance_count` - Number of instances to draw
/// * `first_index` - Index of the first index to draw
/// * `base_vertex` - Value added to each index before indexing into the vertex buffer
/// * `first_instance` - Instance ID of the first instance (requires INDIRECT_FIRST_INSTANCE)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

// SAFETY: DrawIndexedIndirect is a repr(C) struct of 4-byte fields with no padding
unsafe impl Pod for DrawIndexedIndirect {}
unsafe impl Zeroable for DrawIndexedIndirect {}

const_assert_eq!(std::mem::size_of::<DrawIndexedIndirect>(), 20);

impl DrawIndexedIndirect {
    pub const fn new(
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Self {
        Self {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        }
    }

    /// A single instance of `index_count` indices.
    pub const fn single(index_count: u32) -> Self {
        Self::new(index_count, 1, 0, 0, 0)
    }

    pub const fn instanced(index_count: u32, instance_count: u32) -> Self {
        Self::new(index_count, instance_count, 0, 0, 0)
    }

    /// Raw bytes as they are laid out in GPU memory.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Marker trait for indirect draw command types.
pub trait IndirectCommand: Pod + Zeroable + Default {
    /// Size of a single command in bytes.
    const SIZE: u64;
}

impl IndirectCommand for DrawIndexedIndirect {
    const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Extension trait issuing multi-draw calls from offset/size tables.
///
/// Requires `DownlevelFlags::INDIRECT_EXECUTION` (available on all desktop GPUs).
pub trait RenderPassMultiDrawIndirectExt {
    /// Draw every command of one run with a single call.
    ///
    /// Empty runs issue nothing.
    fn multi_draw_indexed_run(&mut self, indirect_buffer: &wgpu::Buffer, run: CommandRun);

    /// Draw every non-empty run of a table, one call per material.
    ///
    /// `bind_material` runs before each call so the caller can switch
    /// pipelines. Returns the number of draw calls issued.
    fn multi_draw_table<F>(
        &mut self,
        indirect_buffer: &wgpu::Buffer,
        table: &OffsetSizeTable,
        bind_material: F,
    ) -> u32
    where
        F: FnMut(&mut Self, MaterialType);
}

impl RenderPassMultiDrawIndirectExt for wgpu::RenderPass<'_> {
    fn multi_draw_indexed_run(&mut self, indirect_buffer: &wgpu::Buffer, run: CommandRun) {
        if run.is_empty() {
            return;
        }
        self.multi_draw_indexed_indirect(indirect_buffer, run.byte_offset(), run.count);
    }

    fn multi_draw_table<F>(
        &mut self,
        indirect_buffer: &wgpu::Buffer,
        table: &OffsetSizeTable,
        mut bind_material: F,
    ) -> u32
    where
        F: FnMut(&mut Self, MaterialType),
    {
        let mut calls = 0;
        for (material, run) in table.non_empty() {
            bind_material(self, material);
            self.multi_draw_indexed_run(indirect_buffer, run);
            calls += 1;
        }
        calls
    }
}
