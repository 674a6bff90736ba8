//! Mock implementation of RenderContext for testing.
//!
//! This module provides a mock GPU context that records operations
//! without actually interacting with the GPU. Written bytes are kept per
//! buffer so tests can compare what reached "GPU memory".

use crate::{gpu_types::GpuBuffer, render_context::RenderContext};
use parking_lot::Mutex;
use std::collections::VecDeque;
use wgpu::*;

/// Records a GPU operation call for verification in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    CreateBuffer {
        label: Option<String>,
        size: u64,
        usage: BufferUsages,
    },
    WriteBuffer {
        buffer_id: usize,
        offset: u64,
        size: usize,
    },
    DestroyBuffer {
        buffer_id: usize,
    },
    PushErrorScope,
    PopErrorScope {
        error: Option<String>,
    },
}

/// Mock buffers stored in the context.
#[derive(Debug, Clone)]
struct MockBuffer {
    label: Option<String>,
    usage: BufferUsages,
    data: Vec<u8>,
    destroyed: bool,
}

/// Mock implementation of RenderContext for testing.
///
/// # Interior Mutability
///
/// Methods take `&self` but need to mutate internal state (record calls).
/// `parking_lot::Mutex` keeps the type `Send + Sync`, which the trait needs.
///
/// # Example
///
/// ```rust
/// use volley_test_utils::{MockRenderContext, RenderContext};
///
/// let mock = MockRenderContext::new().with_persistent_mapping(true);
/// assert!(mock.supports_persistent_mapping());
///
/// mock.inject_error("device lost");
/// mock.push_error_scope();
/// assert_eq!(mock.pop_error_scope().as_deref(), Some("device lost"));
/// ```
pub struct MockRenderContext {
    /// Recorded calls for verification
    calls: Mutex<Vec<RenderCall>>,

    /// Mock buffers (we don't create real GPU buffers)
    buffers: Mutex<Vec<MockBuffer>>,

    /// Errors raised inside the currently open scopes, innermost last
    scopes: Mutex<Vec<Option<String>>>,

    /// Errors that the next popped scopes will report
    injected_errors: Mutex<VecDeque<String>>,

    /// Errors raised by the next writes, which then store nothing
    failing_writes: Mutex<VecDeque<String>>,

    persistent_mapping: bool,
}

impl MockRenderContext {
    /// Create a new mock render context without persistent mapping support.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            scopes: Mutex::new(Vec::new()),
            injected_errors: Mutex::new(VecDeque::new()),
            failing_writes: Mutex::new(VecDeque::new()),
            persistent_mapping: false,
        }
    }

    /// Set the answer to [`RenderContext::supports_persistent_mapping`].
    pub fn with_persistent_mapping(mut self, supported: bool) -> Self {
        self.persistent_mapping = supported;
        self
    }

    /// Queue an error to be reported by the next popped error scope.
    pub fn inject_error(&self, message: impl Into<String>) {
        self.injected_errors.lock().push_back(message.into());
    }

    /// Make the next [`RenderContext::write_buffer`] drop its data and raise
    /// `message` in the enclosing error scope.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.failing_writes.lock().push_back(message.into());
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    /// Count buffer creations.
    pub fn count_buffer_creates(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, RenderCall::CreateBuffer { .. }))
            .count()
    }

    /// Count buffer write operations.
    pub fn count_buffer_writes(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, RenderCall::WriteBuffer { .. }))
            .count()
    }

    /// Count buffer destructions.
    pub fn count_buffer_destroys(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, RenderCall::DestroyBuffer { .. }))
            .count()
    }

    /// Total bytes passed to `write_buffer` so far.
    pub fn bytes_written(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .map(|call| match call {
                RenderCall::WriteBuffer { size, .. } => *size,
                _ => 0,
            })
            .sum()
    }

    /// Writes recorded against one buffer, as `(offset, size)` pairs.
    pub fn writes_to(&self, buffer: &GpuBuffer) -> Vec<(u64, usize)> {
        let Some(id) = buffer.mock_id() else {
            return Vec::new();
        };
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::WriteBuffer {
                    buffer_id,
                    offset,
                    size,
                } if *buffer_id == id => Some((*offset, *size)),
                _ => None,
            })
            .collect()
    }

    /// Current bytes of a mock buffer.
    pub fn buffer_contents(&self, buffer: &GpuBuffer) -> Vec<u8> {
        buffer
            .mock_id()
            .and_then(|id| self.buffers.lock().get(id).map(|b| b.data.clone()))
            .unwrap_or_default()
    }

    /// Label a mock buffer was created with.
    pub fn buffer_label(&self, buffer: &GpuBuffer) -> Option<String> {
        buffer
            .mock_id()
            .and_then(|id| self.buffers.lock().get(id).and_then(|b| b.label.clone()))
    }

    /// Usage flags a mock buffer was created with.
    pub fn buffer_usage(&self, buffer: &GpuBuffer) -> Option<BufferUsages> {
        buffer
            .mock_id()
            .and_then(|id| self.buffers.lock().get(id).map(|b| b.usage))
    }

    /// Number of buffers that have been created and not destroyed.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().iter().filter(|b| !b.destroyed).count()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn raise(&self, message: String) {
        if let Some(slot) = self.scopes.lock().last_mut() {
            slot.get_or_insert(message);
        }
    }
}

impl Default for MockRenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for MockRenderContext {
    fn create_buffer(&self, desc: &BufferDescriptor) -> GpuBuffer {
        let mut buffers = self.buffers.lock();
        let id = buffers.len();

        buffers.push(MockBuffer {
            label: desc.label.map(|s| s.to_string()),
            usage: desc.usage,
            data: vec![0; desc.size as usize],
            destroyed: false,
        });

        self.calls.lock().push(RenderCall::CreateBuffer {
            label: desc.label.map(|s| s.to_string()),
            size: desc.size,
            usage: desc.usage,
        });

        GpuBuffer::mock(id, desc.size)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        let Some(buffer_id) = buffer.mock_id() else {
            return;
        };

        self.calls.lock().push(RenderCall::WriteBuffer {
            buffer_id,
            offset,
            size: data.len(),
        });

        if let Some(message) = self.failing_writes.lock().pop_front() {
            self.raise(message);
            return;
        }

        let error = {
            let mut buffers = self.buffers.lock();
            match buffers.get_mut(buffer_id) {
                Some(mock) if mock.destroyed => {
                    Some(format!("write to destroyed buffer {buffer_id}"))
                }
                Some(mock) => {
                    let start = offset as usize;
                    let end = start + data.len();
                    if end > mock.data.len() {
                        Some(format!(
                            "write of {} bytes at offset {} overruns buffer {} of {} bytes",
                            data.len(),
                            offset,
                            buffer_id,
                            mock.data.len()
                        ))
                    } else {
                        mock.data[start..end].copy_from_slice(data);
                        None
                    }
                }
                None => Some(format!("unknown buffer {buffer_id}")),
            }
        };

        if let Some(message) = error {
            self.raise(message);
        }
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        let Some(buffer_id) = buffer.mock_id() else {
            return;
        };
        if let Some(mock) = self.buffers.lock().get_mut(buffer_id) {
            mock.destroyed = true;
        }
        self.calls
            .lock()
            .push(RenderCall::DestroyBuffer { buffer_id });
    }

    fn supports_persistent_mapping(&self) -> bool {
        self.persistent_mapping
    }

    fn push_error_scope(&self) {
        self.scopes.lock().push(None);
        self.calls.lock().push(RenderCall::PushErrorScope);
    }

    fn pop_error_scope(&self) -> Option<String> {
        let raised = self.scopes.lock().pop().flatten();
        let error = raised.or_else(|| self.injected_errors.lock().pop_front());
        self.calls.lock().push(RenderCall::PopErrorScope {
            error: error.clone(),
        });
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indirect_buffer(mock: &MockRenderContext, size: u64) -> GpuBuffer {
        mock.create_buffer(&BufferDescriptor {
            label: Some("test_buffer"),
            size,
            usage: BufferUsages::INDIRECT | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    #[test]
    fn test_mock_buffer_creation() {
        let mock = MockRenderContext::new();
        let buffer = indirect_buffer(&mock, 1024);

        assert!(buffer.is_mock());
        assert_eq!(buffer.size(), 1024);
        assert_eq!(mock.count_buffer_creates(), 1);
        assert_eq!(mock.buffer_label(&buffer).as_deref(), Some("test_buffer"));
    }

    #[test]
    fn test_mock_buffer_write_stores_bytes() {
        let mock = MockRenderContext::new();
        let buffer = indirect_buffer(&mock, 8);

        mock.write_buffer(&buffer, 4, &[9, 8, 7, 6]);

        assert_eq!(mock.count_buffer_writes(), 1);
        assert_eq!(mock.buffer_contents(&buffer), vec![0, 0, 0, 0, 9, 8, 7, 6]);
        assert_eq!(mock.writes_to(&buffer), vec![(4, 4)]);
    }

    #[test]
    fn test_out_of_bounds_write_raises_scoped_error() {
        let mock = MockRenderContext::new();
        let buffer = indirect_buffer(&mock, 4);

        mock.push_error_scope();
        mock.write_buffer(&buffer, 2, &[1, 2, 3, 4]);
        let error = mock.pop_error_scope();

        assert!(error.is_some_and(|e| e.contains("overruns")));
        assert_eq!(mock.buffer_contents(&buffer), vec![0; 4]);
    }

    #[test]
    fn test_injected_error_is_reported_once() {
        let mock = MockRenderContext::new();
        mock.inject_error("invalid buffer state");

        mock.push_error_scope();
        assert_eq!(mock.pop_error_scope().as_deref(), Some("invalid buffer state"));

        mock.push_error_scope();
        assert_eq!(mock.pop_error_scope(), None);
    }

    #[test]
    fn test_failed_write_stores_nothing() {
        let mock = MockRenderContext::new();
        let buffer = indirect_buffer(&mock, 4);
        mock.fail_next_write("queue lost");

        mock.push_error_scope();
        mock.write_buffer(&buffer, 0, &[1, 2, 3, 4]);
        assert_eq!(mock.pop_error_scope().as_deref(), Some("queue lost"));
        assert_eq!(mock.buffer_contents(&buffer), vec![0; 4]);

        mock.write_buffer(&buffer, 0, &[1, 2, 3, 4]);
        assert_eq!(mock.buffer_contents(&buffer), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_destroy_buffer() {
        let mock = MockRenderContext::new();
        let buffer = indirect_buffer(&mock, 16);
        assert_eq!(mock.live_buffer_count(), 1);

        mock.destroy_buffer(&buffer);

        assert_eq!(mock.live_buffer_count(), 0);
        assert_eq!(mock.count_buffer_destroys(), 1);
    }

    #[test]
    fn test_clear_calls() {
        let mock = MockRenderContext::new();
        indirect_buffer(&mock, 1024);

        assert_eq!(mock.call_count(), 1);

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }
}
