//! Implementation of the RenderContext trait for GraphicsContext.
//!
//! This lets the command batcher run against a real device or, in tests,
//! against `MockRenderContext`.

use crate::context::GraphicsContext;
use crate::features::GpuFeatures;
use volley_test_utils::{GpuBuffer, RenderContext};
use wgpu::BufferDescriptor;

impl RenderContext for GraphicsContext {
    fn create_buffer(&self, desc: &BufferDescriptor) -> GpuBuffer {
        let buffer = self.device.create_buffer(desc);
        GpuBuffer::from_wgpu(buffer)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        let wgpu_buffer = buffer.as_wgpu();
        self.queue.write_buffer(wgpu_buffer, offset, data);
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        buffer.as_wgpu().destroy();
    }

    fn supports_persistent_mapping(&self) -> bool {
        self.has_feature(GpuFeatures::MAPPABLE_PRIMARY_BUFFERS)
    }

    fn push_error_scope(&self) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
    }

    fn pop_error_scope(&self) -> Option<String> {
        pollster::block_on(self.device.pop_error_scope()).map(|error| error.to_string())
    }
}
