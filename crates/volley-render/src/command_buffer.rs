//! Fixed-capacity command buffer allocator.
//!
//! One allocator owns the GPU buffer of one pass kind. Commands are appended
//! at a cursor that is reset every frame, and [`CommandBufferAllocator::commit`]
//! hands the written region to the upload strategy inside a GPU error scope.

use volley_core::profiling::profile_function;
use volley_test_utils::{GpuBuffer, RenderContext};

use crate::indirect::DrawIndexedIndirect;
use crate::upload::{UploadStrategy, UploadStrategyKind};

/// Errors raised by [`CommandBufferAllocator::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferError {
    /// The buffer is full; the command was dropped.
    CapacityExceeded { capacity: u32 },
    /// The buffer was halted after repeated GPU errors, or released.
    Faulted,
}

impl std::fmt::Display for CommandBufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { capacity } => {
                write!(f, "Command buffer capacity of {} commands exceeded", capacity)
            }
            Self::Faulted => write!(f, "Command buffer is halted or released"),
        }
    }
}

impl std::error::Error for CommandBufferError {}

/// Result of [`CommandBufferAllocator::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The written region reached the GPU.
    Uploaded { bytes: u64 },
    /// The GPU reported an error around the upload.
    Failed { error: String, halted: bool },
    /// The allocator is faulted; nothing was sent.
    Skipped,
}

/// Owns one fixed-capacity command buffer and its write cursor.
///
/// Not safe for concurrent appends; the frame builder drives it from the
/// render thread.
pub struct CommandBufferAllocator {
    label: String,
    capacity: u32,
    len: u32,
    strategy: Box<dyn UploadStrategy>,
    consecutive_errors: u32,
    max_consecutive_errors: u32,
    faulted: bool,
    released: bool,
}

impl CommandBufferAllocator {
    pub fn new(
        label: impl Into<String>,
        capacity: u32,
        strategy: Box<dyn UploadStrategy>,
        max_consecutive_errors: u32,
    ) -> Self {
        let label = label.into();
        tracing::debug!(
            "Created command buffer '{}' ({} commands, {})",
            label,
            capacity,
            strategy.kind()
        );
        Self {
            label,
            capacity,
            len: 0,
            strategy,
            consecutive_errors: 0,
            max_consecutive_errors: max_consecutive_errors.max(1),
            faulted: false,
            released: false,
        }
    }

    /// Prepare for a new frame: rotate the upload strategy and reset the cursor.
    pub fn begin_frame(&mut self) {
        self.strategy.begin_frame();
        self.reset();
    }

    /// Truncate to zero written commands. Nothing is freed or resized.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Write `command` at the next free slot and return that slot.
    pub fn append(&mut self, command: DrawIndexedIndirect) -> Result<u32, CommandBufferError> {
        if !self.is_usable() {
            return Err(CommandBufferError::Faulted);
        }
        if self.len >= self.capacity {
            return Err(CommandBufferError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let slot = self.len;
        self.strategy.write(slot, command);
        self.len += 1;
        Ok(slot)
    }

    /// Make this frame's commands visible to the GPU.
    ///
    /// GPU errors are caught by an error scope around the upload and never
    /// propagate. After `max_consecutive_errors` failing frames the buffer is
    /// halted and every later commit is skipped.
    pub fn commit(&mut self, ctx: &dyn RenderContext) -> CommitOutcome {
        profile_function!();

        if self.faulted || self.released {
            tracing::trace!("Skipping upload of unusable buffer '{}'", self.label);
            return CommitOutcome::Skipped;
        }

        ctx.push_error_scope();
        let bytes = self.strategy.upload(ctx, self.len);
        match ctx.pop_error_scope() {
            None => {
                self.consecutive_errors = 0;
                tracing::trace!(
                    "Committed {} commands ({} bytes) to '{}'",
                    self.len,
                    bytes,
                    self.label
                );
                CommitOutcome::Uploaded { bytes }
            }
            Some(error) => {
                // The GPU copy can no longer be trusted to match the CPU view.
                self.strategy.invalidate(self.len);
                self.consecutive_errors += 1;
                self.faulted = self.consecutive_errors >= self.max_consecutive_errors;
                tracing::error!(
                    "GPU error uploading {} commands to '{}': {}",
                    self.len,
                    self.label,
                    error
                );
                if self.faulted {
                    tracing::error!(
                        "Halting command buffer '{}' after {} consecutive GPU errors",
                        self.label,
                        self.consecutive_errors
                    );
                }
                CommitOutcome::Failed {
                    error,
                    halted: self.faulted,
                }
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Commands written since the last reset.
    pub fn written_count(&self) -> u32 {
        self.len
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn remaining(&self) -> u32 {
        self.capacity - self.len
    }

    /// Commands written since the last reset, as the CPU sees them.
    pub fn commands(&self) -> &[DrawIndexedIndirect] {
        self.strategy.commands(self.len)
    }

    /// The GPU buffer holding this frame's commands.
    pub fn buffer(&self) -> &GpuBuffer {
        self.strategy.buffer()
    }

    pub fn strategy_kind(&self) -> UploadStrategyKind {
        self.strategy.kind()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Stop using the buffer, as if it had failed too many uploads.
    ///
    /// Used when the buffer could not be created.
    pub fn halt(&mut self) {
        self.faulted = true;
    }

    /// Destroy the GPU buffers. The allocator must not be used afterwards.
    ///
    /// Returns the GPU error raised while destroying them, if any.
    pub fn release(&mut self, ctx: &dyn RenderContext) -> Option<String> {
        if self.released {
            return None;
        }
        tracing::debug!("Releasing command buffer '{}'", self.label);
        ctx.push_error_scope();
        self.strategy.release(ctx);
        let error = ctx.pop_error_scope();
        if let Some(error) = &error {
            tracing::error!("GPU error during release of '{}': {}", self.label, error);
        }
        self.len = 0;
        self.released = true;
        error
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether commands can still be appended and uploaded.
    pub fn is_usable(&self) -> bool {
        !self.faulted && !self.released
    }
}

impl std::fmt::Debug for CommandBufferAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBufferAllocator")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("len", &self.len)
            .field("strategy", &self.strategy.kind())
            .field("faulted", &self.faulted)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{StreamingUpload, create_strategy};
    use volley_test_utils::MockRenderContext;

    fn allocator(mock: &MockRenderContext, capacity: u32) -> CommandBufferAllocator {
        CommandBufferAllocator::new(
            "solid",
            capacity,
            Box::new(StreamingUpload::new(mock, "solid", capacity)),
            3,
        )
    }

    #[test]
    fn test_append_returns_consecutive_slots() {
        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 4);

        assert_eq!(alloc.append(DrawIndexedIndirect::single(3)), Ok(0));
        assert_eq!(alloc.append(DrawIndexedIndirect::single(6)), Ok(1));
        assert_eq!(alloc.written_count(), 2);
        assert_eq!(alloc.remaining(), 2);
    }

    #[test]
    fn test_append_past_capacity_fails() {
        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 2);

        alloc.append(DrawIndexedIndirect::single(1)).unwrap();
        alloc.append(DrawIndexedIndirect::single(2)).unwrap();
        let err = alloc.append(DrawIndexedIndirect::single(3)).unwrap_err();

        assert_eq!(err, CommandBufferError::CapacityExceeded { capacity: 2 });
        assert_eq!(alloc.written_count(), 2);
        assert_eq!(alloc.commands()[1], DrawIndexedIndirect::single(2));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 4);
        alloc.append(DrawIndexedIndirect::single(3)).unwrap();

        alloc.reset();
        assert_eq!(alloc.written_count(), 0);
        alloc.reset();
        assert_eq!(alloc.written_count(), 0);
        assert_eq!(alloc.capacity(), 4);
        assert_eq!(mock.count_buffer_creates(), 1);
    }

    #[test]
    fn test_commit_wraps_upload_in_error_scope() {
        use volley_test_utils::RenderCall;

        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 4);
        alloc.append(DrawIndexedIndirect::single(3)).unwrap();
        mock.clear_calls();

        assert_eq!(alloc.commit(&mock), CommitOutcome::Uploaded { bytes: 20 });

        let calls = mock.calls();
        assert_eq!(calls.first(), Some(&RenderCall::PushErrorScope));
        assert_eq!(calls.last(), Some(&RenderCall::PopErrorScope { error: None }));
    }

    #[test]
    fn test_repeated_gpu_errors_halt_buffer() {
        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 4);

        for i in 0..3 {
            mock.inject_error("validation error");
            let outcome = alloc.commit(&mock);
            assert_eq!(
                outcome,
                CommitOutcome::Failed {
                    error: "validation error".to_string(),
                    halted: i == 2,
                }
            );
        }

        assert!(alloc.is_faulted());
        assert_eq!(alloc.commit(&mock), CommitOutcome::Skipped);
        assert_eq!(
            alloc.append(DrawIndexedIndirect::single(3)),
            Err(CommandBufferError::Faulted)
        );
    }

    #[test]
    fn test_successful_commit_resets_error_streak() {
        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 4);

        for _ in 0..2 {
            mock.inject_error("validation error");
            alloc.commit(&mock);
        }
        alloc.commit(&mock);
        mock.inject_error("validation error");
        alloc.commit(&mock);

        assert!(!alloc.is_faulted());
    }

    #[test]
    fn test_failed_commit_resends_unchanged_commands() {
        let mock = MockRenderContext::new();
        let strategy = create_strategy(UploadStrategyKind::PersistentRing, &mock, "solid", 4, 1);
        let mut alloc = CommandBufferAllocator::new("solid", 4, strategy, 3);

        alloc.append(DrawIndexedIndirect::single(36)).unwrap();
        mock.fail_next_write("device lost");
        assert!(matches!(alloc.commit(&mock), CommitOutcome::Failed { halted: false, .. }));

        alloc.begin_frame();
        alloc.append(DrawIndexedIndirect::single(36)).unwrap();
        assert_eq!(alloc.commit(&mock), CommitOutcome::Uploaded { bytes: 20 });
        assert_eq!(
            &mock.buffer_contents(alloc.buffer())[..20],
            DrawIndexedIndirect::single(36).as_bytes()
        );
    }

    #[test]
    fn test_release_reports_gpu_error() {
        let mock = MockRenderContext::new();
        let mut alloc = allocator(&mock, 4);

        mock.inject_error("device lost");
        assert_eq!(alloc.release(&mock).as_deref(), Some("device lost"));
        assert!(alloc.is_released());
        assert_eq!(alloc.release(&mock), None);
    }

    #[test]
    fn test_release_destroys_buffers() {
        let mock = MockRenderContext::new();
        let strategy = create_strategy(UploadStrategyKind::PersistentRing, &mock, "glow", 4, 2);
        let mut alloc = CommandBufferAllocator::new("glow", 4, strategy, 3);

        alloc.release(&mock);

        assert_eq!(mock.live_buffer_count(), 0);
        assert_eq!(alloc.commit(&mock), CommitOutcome::Skipped);
    }
}
