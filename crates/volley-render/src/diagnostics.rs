//! Per-frame diagnostics for overflow and GPU-reported errors.

use volley_core::alloc::HashSet;

use crate::material::MaterialType;
use crate::pass::{PassKind, PassTarget};

/// A material bucket that did not fit in its pass buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverflowDiagnostic {
    pub target: PassTarget,
    pub material: MaterialType,
    /// Commands the bucket asked for.
    pub requested: u32,
    /// Commands actually written.
    pub emitted: u32,
    /// Capacity of the pass buffer.
    pub capacity: u32,
}

impl OverflowDiagnostic {
    /// Commands dropped from the tail of the bucket.
    pub fn dropped(&self) -> u32 {
        self.requested - self.emitted
    }
}

impl std::fmt::Display for OverflowDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bucket of {} truncated to {} of {} commands (capacity {})",
            self.material, self.target, self.emitted, self.requested, self.capacity
        )
    }
}

/// A graphics-API error reported around a buffer operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuErrorDiagnostic {
    pub pass: Option<PassKind>,
    /// Label of the affected buffer.
    pub buffer: String,
    /// The operation that was wrapped in the error scope.
    pub operation: &'static str,
    pub message: String,
    /// Whether this error stopped further use of the buffer.
    pub halted: bool,
}

impl std::fmt::Display for GpuErrorDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on '{}' failed: {}", self.operation, self.buffer, self.message)?;
        if self.halted {
            write!(f, " (buffer halted)")?;
        }
        Ok(())
    }
}

/// Everything that went wrong while building one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameDiagnostics {
    pub overflows: Vec<OverflowDiagnostic>,
    /// Particle systems that did not fit in the particle buffer.
    pub dropped_particles: u32,
    pub gpu_errors: Vec<GpuErrorDiagnostic>,
}

impl FrameDiagnostics {
    pub fn clear(&mut self) {
        self.overflows.clear();
        self.dropped_particles = 0;
        self.gpu_errors.clear();
    }

    pub fn is_clean(&self) -> bool {
        self.overflows.is_empty() && self.dropped_particles == 0 && self.gpu_errors.is_empty()
    }

    /// Commands dropped by truncation this frame, particles included.
    pub fn dropped_commands(&self) -> u32 {
        self.overflows.iter().map(|o| o.dropped()).sum::<u32>() + self.dropped_particles
    }

    pub fn overflows_for(&self, target: PassTarget) -> impl Iterator<Item = &OverflowDiagnostic> {
        self.overflows.iter().filter(move |o| o.target == target)
    }
}

/// Logs an overflow at warn level the first time its bucket overflows.
///
/// Later overflows of the same bucket are logged at debug level so a scene
/// that overflows every frame does not flood the log.
#[derive(Debug, Default)]
pub(crate) struct OneShotLog {
    seen: HashSet<(PassTarget, MaterialType)>,
    particles_seen: bool,
}

impl OneShotLog {
    pub(crate) fn overflow(&mut self, diagnostic: &OverflowDiagnostic) {
        if self.seen.insert((diagnostic.target, diagnostic.material)) {
            tracing::warn!("Command buffer overflow: {}", diagnostic);
        } else {
            tracing::debug!("Command buffer overflow: {}", diagnostic);
        }
    }

    pub(crate) fn particle_overflow(&mut self, requested: u32, emitted: u32, capacity: u32) {
        if !std::mem::replace(&mut self.particles_seen, true) {
            tracing::warn!(
                "Particle buffer overflow: {} of {} systems emitted (capacity {})",
                emitted,
                requested,
                capacity
            );
        } else {
            tracing::debug!(
                "Particle buffer overflow: {} of {} systems emitted (capacity {})",
                emitted,
                requested,
                capacity
            );
        }
    }
}
