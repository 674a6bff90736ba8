//! Trait abstracting the GPU operations the command batcher relies on.

use crate::gpu_types::GpuBuffer;
use wgpu::BufferDescriptor;

/// Trait abstracting GPU buffer management.
///
/// Methods take `&self` and return owned handles, so one context can be
/// shared (via `Arc`) by every allocator and a mock can record calls through
/// interior mutability.
///
/// # Example
///
/// ```rust,no_run
/// use volley_test_utils::RenderContext;
/// use wgpu::{BufferDescriptor, BufferUsages};
///
/// fn upload(ctx: &dyn RenderContext, bytes: &[u8]) {
///     let buffer = ctx.create_buffer(&BufferDescriptor {
///         label: Some("commands"),
///         size: bytes.len() as u64,
///         usage: BufferUsages::INDIRECT | BufferUsages::COPY_DST,
///         mapped_at_creation: false,
///     });
///
///     ctx.push_error_scope();
///     ctx.write_buffer(&buffer, 0, bytes);
///     if let Some(error) = ctx.pop_error_scope() {
///         eprintln!("upload failed: {error}");
///     }
/// }
/// ```
pub trait RenderContext: Send + Sync {
    /// Create a GPU buffer.
    fn create_buffer(&self, desc: &BufferDescriptor) -> GpuBuffer;

    /// Write data to a buffer.
    ///
    /// For real buffers this maps to `queue.write_buffer()`, which stages the
    /// data and lets the driver order it against in-flight GPU reads.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Release a buffer's GPU memory immediately.
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// Whether buffers can stay CPU-visible while the GPU reads them.
    ///
    /// Queried once when the batcher is created.
    fn supports_persistent_mapping(&self) -> bool;

    /// Start capturing validation errors raised by subsequent calls.
    fn push_error_scope(&self);

    /// Stop capturing and return the first error raised since the matching
    /// [`push_error_scope`](Self::push_error_scope), if any.
    fn pop_error_scope(&self) -> Option<String>;
}
