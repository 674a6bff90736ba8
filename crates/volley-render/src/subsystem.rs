//! The command subsystem: pass registry, tables and lifecycle.
//!
//! A [`CommandSubsystem`] is constructed once with a render context, owns one
//! [`CommandBufferAllocator`] per [`PassKind`] plus one for particles, and is
//! handed to the [`FrameCommandBuilder`] every frame. After a frame is
//! committed the pass executor reads each target's [`PassOutput`].
//!
//! [`FrameCommandBuilder`]: crate::FrameCommandBuilder

use std::sync::Arc;

use volley_test_utils::{GpuBuffer, RenderContext};

use crate::command_buffer::CommandBufferAllocator;
use crate::diagnostics::{FrameDiagnostics, GpuErrorDiagnostic, OneShotLog};
use crate::offset_table::{CommandRun, OffsetSizeTable, PassTables};
use crate::pass::{PASS_KIND_COUNT, PassKind, PassTarget};
use crate::upload::{DEFAULT_RING_DEPTH, UploadPreference, UploadStrategyKind, create_strategy};

/// Commands each pass buffer holds.
pub const COMMAND_BUFFER_CAPACITY: u32 = 10_000;

/// Consecutive failing uploads after which a buffer is halted.
pub const DEFAULT_MAX_CONSECUTIVE_GPU_ERRORS: u32 = 3;

/// Configuration of a [`CommandSubsystem`].
#[derive(Debug, Clone)]
pub struct CommandSubsystemDescriptor {
    /// Commands per pass buffer (and for the particle buffer).
    pub capacity: u32,
    /// Buffers per pass when the persistent ring is used.
    pub ring_depth: usize,
    pub upload: UploadPreference,
    pub max_consecutive_gpu_errors: u32,
    /// Prefix of every buffer label.
    pub label: &'static str,
}

impl Default for CommandSubsystemDescriptor {
    fn default() -> Self {
        Self {
            capacity: COMMAND_BUFFER_CAPACITY,
            ring_depth: DEFAULT_RING_DEPTH,
            upload: UploadPreference::Auto,
            max_consecutive_gpu_errors: DEFAULT_MAX_CONSECUTIVE_GPU_ERRORS,
            label: "volley",
        }
    }
}

impl CommandSubsystemDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of commands per buffer.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn ring_depth(mut self, depth: usize) -> Self {
        self.ring_depth = depth;
        self
    }

    pub fn upload(mut self, preference: UploadPreference) -> Self {
        self.upload = preference;
        self
    }

    pub fn max_consecutive_gpu_errors(mut self, count: u32) -> Self {
        self.max_consecutive_gpu_errors = count;
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

/// What the pass executor needs to draw one target.
#[derive(Debug, Clone, Copy)]
pub struct PassOutput<'a> {
    pub target: PassTarget,
    pub table: &'a OffsetSizeTable,
    pub buffer: &'a GpuBuffer,
    /// False once the buffer has been halted by GPU errors.
    pub usable: bool,
}

impl PassOutput<'_> {
    /// Multi-draw calls needed for this target.
    pub fn draw_call_count(&self) -> usize {
        if self.usable {
            self.table.draw_call_count()
        } else {
            0
        }
    }
}

/// The particle run and the buffer it lives in.
#[derive(Debug, Clone, Copy)]
pub struct ParticleOutput<'a> {
    pub run: CommandRun,
    pub buffer: &'a GpuBuffer,
    pub usable: bool,
}

/// Owns every command buffer and the per-frame offset/size tables.
pub struct CommandSubsystem {
    pub(crate) ctx: Arc<dyn RenderContext>,
    strategy: UploadStrategyKind,
    capacity: u32,
    pub(crate) allocators: [CommandBufferAllocator; PASS_KIND_COUNT],
    pub(crate) particles: CommandBufferAllocator,
    pub(crate) tables: PassTables,
    pub(crate) particle_run: CommandRun,
    pub(crate) published: bool,
    pub(crate) frame_index: u64,
    pub(crate) diagnostics: FrameDiagnostics,
    pub(crate) overflow_log: OneShotLog,
    lifecycle_errors: Vec<GpuErrorDiagnostic>,
    shut_down: bool,
}

impl CommandSubsystem {
    /// Allocate every command buffer.
    ///
    /// The persistent-mapping capability is queried here, once, and decides
    /// the upload strategy for the subsystem's whole lifetime. Each buffer is
    /// created inside a GPU error scope; a buffer whose creation fails is
    /// halted and the error is kept in [`lifecycle_errors`].
    ///
    /// [`lifecycle_errors`]: CommandSubsystem::lifecycle_errors
    pub fn new(ctx: Arc<dyn RenderContext>, descriptor: CommandSubsystemDescriptor) -> Self {
        let supports_mapping = ctx.supports_persistent_mapping();
        let strategy = UploadStrategyKind::select(supports_mapping, descriptor.upload);
        tracing::info!(
            "Command subsystem using {} uploads (persistent mapping {}), {} commands per pass",
            strategy,
            if supports_mapping { "available" } else { "unavailable" },
            descriptor.capacity
        );

        let mut lifecycle_errors = Vec::new();
        let mut make_allocator = |pass: Option<PassKind>, name: &str| {
            let label = format!("{}_{}_commands", descriptor.label, name);
            ctx.push_error_scope();
            let upload = create_strategy(
                strategy,
                ctx.as_ref(),
                &label,
                descriptor.capacity,
                descriptor.ring_depth,
            );
            let error = ctx.pop_error_scope();
            let mut allocator = CommandBufferAllocator::new(
                label,
                descriptor.capacity,
                upload,
                descriptor.max_consecutive_gpu_errors,
            );
            if let Some(message) = error {
                tracing::error!(
                    "GPU error during create of '{}': {}",
                    allocator.label(),
                    message
                );
                allocator.halt();
                lifecycle_errors.push(GpuErrorDiagnostic {
                    pass,
                    buffer: allocator.label().to_string(),
                    operation: "create",
                    message,
                    halted: true,
                });
            }
            allocator
        };

        let allocators = PassKind::ALL.map(|kind| make_allocator(Some(kind), kind.name()));
        let particles = make_allocator(None, "particles");

        Self {
            strategy,
            capacity: descriptor.capacity,
            allocators,
            particles,
            tables: PassTables::new(),
            particle_run: CommandRun::EMPTY,
            published: false,
            frame_index: 0,
            diagnostics: FrameDiagnostics::default(),
            overflow_log: OneShotLog::default(),
            lifecycle_errors,
            shut_down: false,
            ctx,
        }
    }

    pub fn strategy_kind(&self) -> UploadStrategyKind {
        self.strategy
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn context(&self) -> &Arc<dyn RenderContext> {
        &self.ctx
    }

    /// The allocator registered for `kind`.
    pub fn allocator(&self, kind: PassKind) -> &CommandBufferAllocator {
        &self.allocators[kind.index()]
    }

    pub fn particle_allocator(&self) -> &CommandBufferAllocator {
        &self.particles
    }

    /// Whether the last frame has been committed and not yet rebuilt.
    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Table of `target`, or `None` while a frame is being rebuilt.
    pub fn table(&self, target: PassTarget) -> Option<&OffsetSizeTable> {
        self.published.then(|| self.tables.get(target))
    }

    /// Table and buffer of `target`, or `None` while a frame is being rebuilt.
    pub fn pass_output(&self, target: PassTarget) -> Option<PassOutput<'_>> {
        if !self.published {
            return None;
        }
        let allocator = self.allocator(target.kind());
        Some(PassOutput {
            target,
            table: self.tables.get(target),
            buffer: allocator.buffer(),
            usable: allocator.is_usable(),
        })
    }

    /// Outputs of every target, in table order.
    pub fn pass_outputs(&self) -> impl Iterator<Item = PassOutput<'_>> + '_ {
        PassTarget::ALL
            .iter()
            .filter_map(|target| self.pass_output(*target))
    }

    /// The particle run, or `None` while a frame is being rebuilt.
    pub fn particles(&self) -> Option<ParticleOutput<'_>> {
        self.published.then(|| ParticleOutput {
            run: self.particle_run,
            buffer: self.particles.buffer(),
            usable: self.particles.is_usable(),
        })
    }

    /// Diagnostics of the last committed frame.
    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.diagnostics
    }

    /// Number of frames begun so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// GPU errors raised while creating or releasing buffers.
    pub fn lifecycle_errors(&self) -> &[GpuErrorDiagnostic] {
        &self.lifecycle_errors
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Release every GPU buffer. Later frames are refused.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        tracing::info!("Shutting down command subsystem after {} frames", self.frame_index);
        let ctx = self.ctx.as_ref();
        let passes = PassKind::ALL.map(Some).into_iter().zip(self.allocators.iter_mut());
        for (pass, allocator) in passes.chain([(None, &mut self.particles)]) {
            if let Some(message) = allocator.release(ctx) {
                self.lifecycle_errors.push(GpuErrorDiagnostic {
                    pass,
                    buffer: allocator.label().to_string(),
                    operation: "release",
                    message,
                    halted: false,
                });
            }
        }
        self.published = false;
        self.shut_down = true;
    }
}

impl Drop for CommandSubsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CommandSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSubsystem")
            .field("strategy", &self.strategy)
            .field("capacity", &self.capacity)
            .field("frame_index", &self.frame_index)
            .field("published", &self.published)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_test_utils::MockRenderContext;

    fn subsystem(mock: &Arc<MockRenderContext>) -> CommandSubsystem {
        CommandSubsystem::new(
            mock.clone(),
            CommandSubsystemDescriptor::new().capacity(16),
        )
    }

    #[test]
    fn test_streaming_allocates_one_buffer_per_registry_entry() {
        let mock = Arc::new(MockRenderContext::new());
        let subsystem = subsystem(&mock);

        assert_eq!(subsystem.strategy_kind(), UploadStrategyKind::Streaming);
        // Four passes plus particles.
        assert_eq!(mock.count_buffer_creates(), 5);
        assert_eq!(
            mock.buffer_label(subsystem.allocator(PassKind::Shadow).buffer())
                .as_deref(),
            Some("volley_shadow_commands")
        );
    }

    #[test]
    fn test_persistent_mapping_selects_ring() {
        let mock = Arc::new(MockRenderContext::new().with_persistent_mapping(true));
        let subsystem = subsystem(&mock);

        assert_eq!(subsystem.strategy_kind(), UploadStrategyKind::PersistentRing);
        assert_eq!(mock.count_buffer_creates(), 5 * DEFAULT_RING_DEPTH);
    }

    #[test]
    fn test_force_streaming_overrides_capability() {
        let mock = Arc::new(MockRenderContext::new().with_persistent_mapping(true));
        let subsystem = CommandSubsystem::new(
            mock.clone(),
            CommandSubsystemDescriptor::new().upload(UploadPreference::ForceStreaming),
        );

        assert_eq!(subsystem.strategy_kind(), UploadStrategyKind::Streaming);
        assert_eq!(subsystem.capacity(), COMMAND_BUFFER_CAPACITY);
    }

    #[test]
    fn test_tables_hidden_until_published() {
        let mock = Arc::new(MockRenderContext::new());
        let subsystem = subsystem(&mock);

        assert!(subsystem.table(PassTarget::Solid).is_none());
        assert!(subsystem.pass_output(PassTarget::Glow).is_none());
        assert!(subsystem.particles().is_none());
    }

    #[test]
    fn test_shutdown_releases_buffers_once() {
        let mock = Arc::new(MockRenderContext::new());
        let mut subsystem = subsystem(&mock);

        subsystem.shutdown();
        subsystem.shutdown();
        drop(subsystem);

        assert_eq!(mock.live_buffer_count(), 0);
        assert_eq!(mock.count_buffer_destroys(), 5);
    }

    #[test]
    fn test_creation_error_halts_that_buffer() {
        let mock = Arc::new(MockRenderContext::new());
        mock.inject_error("out of memory");
        let subsystem = subsystem(&mock);

        let errors = subsystem.lifecycle_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, "create");
        assert_eq!(errors[0].pass, Some(PassKind::Solid));
        assert_eq!(errors[0].buffer, "volley_solid_commands");
        assert!(subsystem.allocator(PassKind::Solid).is_faulted());
        assert!(subsystem.allocator(PassKind::Shadow).is_usable());
    }

    #[test]
    fn test_release_error_is_recorded() {
        let mock = Arc::new(MockRenderContext::new());
        let mut subsystem = subsystem(&mock);
        assert!(subsystem.lifecycle_errors().is_empty());

        mock.inject_error("device lost");
        subsystem.shutdown();

        let errors = subsystem.lifecycle_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, "release");
        assert_eq!(errors[0].pass, Some(PassKind::Solid));
        assert_eq!(mock.live_buffer_count(), 0);
    }
}
