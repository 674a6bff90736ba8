//! Per-frame command emission.
//!
//! The [`FrameCommandBuilder`] walks the draw list registries once per pass,
//! buckets drawables by target and [`MaterialType`], and appends each bucket
//! to the pass allocator so that every material forms one contiguous run.
//!
//! ```text
//! Idle --begin_frame--> Collecting --commit--> Committed --begin_frame--> Collecting ...
//! ```
//!
//! Within a pass buffer, targets are emitted in [`PassKind::targets`] order
//! (shadow cascades 0..3) and materials in [`MaterialType::ALL`] order. Within
//! a bucket, commands keep the order of the draw list.

use volley_core::profiling::{profile_function, profile_scope};

use crate::command_buffer::{CommandBufferError, CommitOutcome};
use crate::diagnostics::{FrameDiagnostics, GpuErrorDiagnostic, OverflowDiagnostic};
use crate::draw_list::{ImmediateDrawList, ParticlesList};
use crate::indirect::DrawIndexedIndirect;
use crate::material::{MAT_COUNT, MaterialType};
use crate::offset_table::CommandRun;
use crate::pass::{CASCADE_COUNT, PASS_KIND_COUNT, PassKind, PassMask};
use crate::subsystem::CommandSubsystem;

/// Where the builder is in its per-frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderState {
    /// No frame started yet.
    Idle,
    /// Allocators reset; passes may be collected.
    Collecting,
    /// Buffers uploaded and tables published.
    Committed,
}

/// Errors from driving the builder out of order.
///
/// Capacity overflow and GPU-reported errors are never returned here; they end
/// up in [`FrameDiagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderError {
    /// The call is not valid in the current state.
    InvalidState {
        expected: BuilderState,
        found: BuilderState,
    },
    /// The subsystem has been shut down.
    SubsystemShutDown,
}

impl std::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { expected, found } => {
                write!(f, "Frame builder is {:?}, expected {:?}", found, expected)
            }
            Self::SubsystemShutDown => write!(f, "Command subsystem has been shut down"),
        }
    }
}

impl std::error::Error for BuilderError {}

/// Per-pass statistics of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub kind: PassKind,
    pub collected: bool,
    /// Commands written to the pass buffer.
    pub commands: u32,
    /// Non-empty runs across the pass's targets.
    pub draw_calls: u32,
}

impl PassStats {
    fn new(kind: PassKind) -> Self {
        Self {
            kind,
            collected: false,
            commands: 0,
            draw_calls: 0,
        }
    }
}

/// Summary of one committed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub passes: [PassStats; PASS_KIND_COUNT],
    pub particle_commands: u32,
    /// Bytes sent to the GPU across every buffer.
    pub bytes_uploaded: u64,
    pub diagnostics: FrameDiagnostics,
}

impl FrameReport {
    pub fn pass(&self, kind: PassKind) -> &PassStats {
        &self.passes[kind.index()]
    }

    pub fn total_commands(&self) -> u32 {
        self.passes.iter().map(|p| p.commands).sum::<u32>() + self.particle_commands
    }

    /// Multi-draw calls the pass executor will issue, particles included.
    pub fn total_draw_calls(&self) -> u32 {
        let particles = u32::from(self.particle_commands > 0);
        self.passes.iter().map(|p| p.draw_calls).sum::<u32>() + particles
    }

    pub fn dropped_commands(&self) -> u32 {
        self.diagnostics.dropped_commands()
    }
}

/// Drives one [`CommandSubsystem`] through the per-frame state machine.
///
/// The builder keeps its bucket storage between frames so steady-state frames
/// do not allocate.
#[derive(Debug)]
pub struct FrameCommandBuilder {
    state: BuilderState,
    /// `[target][material]` buckets for the pass being collected.
    buckets: Vec<Vec<DrawIndexedIndirect>>,
    collected: PassMask,
    particles_collected: bool,
}

impl Default for FrameCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCommandBuilder {
    pub fn new() -> Self {
        Self {
            state: BuilderState::Idle,
            buckets: vec![Vec::new(); CASCADE_COUNT * MAT_COUNT],
            collected: PassMask::empty(),
            particles_collected: false,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Passes collected so far this frame.
    pub fn collected(&self) -> PassMask {
        self.collected
    }

    /// Start a frame: reset every allocator and clear every table.
    ///
    /// Tables of the previous frame become unreadable until [`commit`].
    ///
    /// [`commit`]: FrameCommandBuilder::commit
    pub fn begin_frame(&mut self, subsystem: &mut CommandSubsystem) -> Result<(), BuilderError> {
        profile_function!();

        if subsystem.is_shut_down() {
            return Err(BuilderError::SubsystemShutDown);
        }
        if self.state == BuilderState::Collecting {
            tracing::warn!(
                "Frame {} was never committed; discarding it",
                subsystem.frame_index
            );
        }

        subsystem.published = false;
        subsystem.frame_index += 1;
        for allocator in &mut subsystem.allocators {
            allocator.begin_frame();
        }
        subsystem.particles.begin_frame();
        subsystem.tables.clear();
        subsystem.particle_run = CommandRun::EMPTY;
        subsystem.diagnostics.clear();

        self.collected = PassMask::empty();
        self.particles_collected = false;
        self.state = BuilderState::Collecting;

        tracing::trace!("Began frame {}", subsystem.frame_index);
        Ok(())
    }

    /// Emit the commands of one pass from `drawables`.
    ///
    /// Collecting a pass twice in one frame is ignored. When the pass buffer
    /// runs out, each overflowing bucket keeps its first commands in draw list
    /// order, later buckets get empty runs, and an [`OverflowDiagnostic`] is
    /// recorded per truncated bucket.
    pub fn collect(
        &mut self,
        subsystem: &mut CommandSubsystem,
        kind: PassKind,
        drawables: &ImmediateDrawList,
    ) -> Result<(), BuilderError> {
        profile_function!();

        self.expect_state(BuilderState::Collecting)?;
        if self.collected.contains(kind.mask()) {
            tracing::warn!("Pass {} already collected this frame; ignoring", kind);
            return Ok(());
        }
        self.collected |= kind.mask();

        let targets = kind.targets();
        {
            profile_scope!("bucket");
            for bucket in &mut self.buckets {
                bucket.clear();
            }
            for drawable in drawables {
                for (t, target) in targets.iter().enumerate() {
                    if drawable.participates(*target) {
                        self.buckets[t * MAT_COUNT + drawable.material.index()]
                            .push(drawable.params.to_command());
                    }
                }
            }
        }

        profile_scope!("emit");
        let allocator = &mut subsystem.allocators[kind.index()];
        if !allocator.is_usable() {
            tracing::debug!("Skipping pass {}: buffer '{}' is halted", kind, allocator.label());
            return Ok(());
        }

        for (t, target) in targets.iter().enumerate() {
            let table = subsystem.tables.get_mut(*target);
            for material in MaterialType::ALL {
                let bucket = &self.buckets[t * MAT_COUNT + material.index()];
                let offset = allocator.written_count();
                let mut emitted = 0u32;
                for command in bucket {
                    match allocator.append(*command) {
                        Ok(_) => emitted += 1,
                        Err(CommandBufferError::CapacityExceeded { .. }) => break,
                        Err(CommandBufferError::Faulted) => break,
                    }
                }
                table.set(material, CommandRun::new(offset, emitted));

                let requested = bucket.len() as u32;
                if emitted < requested {
                    let overflow = OverflowDiagnostic {
                        target: *target,
                        material,
                        requested,
                        emitted,
                        capacity: allocator.capacity(),
                    };
                    subsystem.overflow_log.overflow(&overflow);
                    subsystem.diagnostics.overflows.push(overflow);
                }
            }
        }

        tracing::trace!(
            "Collected pass {}: {} commands from {} drawables",
            kind,
            allocator.written_count(),
            drawables.len()
        );
        Ok(())
    }

    /// Emit one command per particle system, in registry order, as one run.
    pub fn collect_particles(
        &mut self,
        subsystem: &mut CommandSubsystem,
        particles: &ParticlesList,
    ) -> Result<(), BuilderError> {
        profile_function!();

        self.expect_state(BuilderState::Collecting)?;
        if std::mem::replace(&mut self.particles_collected, true) {
            tracing::warn!("Particles already collected this frame; ignoring");
            return Ok(());
        }

        let allocator = &mut subsystem.particles;
        let offset = allocator.written_count();
        let mut emitted = 0u32;
        for system in particles {
            if allocator.append(system.params.to_command()).is_err() {
                break;
            }
            emitted += 1;
        }
        subsystem.particle_run = CommandRun::new(offset, emitted);

        let requested = particles.len() as u32;
        if emitted < requested && allocator.is_usable() {
            subsystem
                .overflow_log
                .particle_overflow(requested, emitted, allocator.capacity());
            subsystem.diagnostics.dropped_particles += requested - emitted;
        }
        Ok(())
    }

    /// Upload every touched buffer and publish the tables.
    pub fn commit(&mut self, subsystem: &mut CommandSubsystem) -> Result<FrameReport, BuilderError> {
        profile_function!();

        self.expect_state(BuilderState::Collecting)?;

        let mut report = FrameReport {
            frame_index: subsystem.frame_index,
            passes: PassKind::ALL.map(PassStats::new),
            particle_commands: 0,
            bytes_uploaded: 0,
            diagnostics: FrameDiagnostics::default(),
        };

        let ctx = subsystem.ctx.clone();
        for kind in PassKind::ALL {
            if !self.collected.contains(kind.mask()) {
                continue;
            }
            let allocator = &mut subsystem.allocators[kind.index()];
            let outcome = allocator.commit(ctx.as_ref());
            record_outcome(
                &mut report,
                &mut subsystem.diagnostics,
                Some(kind),
                allocator.label(),
                outcome,
            );

            let stats = &mut report.passes[kind.index()];
            stats.collected = true;
            stats.commands = allocator.written_count();
            stats.draw_calls = kind
                .targets()
                .iter()
                .map(|target| subsystem.tables.get(*target).draw_call_count() as u32)
                .sum();
        }

        if self.particles_collected {
            let outcome = subsystem.particles.commit(ctx.as_ref());
            record_outcome(
                &mut report,
                &mut subsystem.diagnostics,
                None,
                subsystem.particles.label(),
                outcome,
            );
            report.particle_commands = subsystem.particle_run.count;
        }

        report.diagnostics = subsystem.diagnostics.clone();
        subsystem.published = true;
        self.state = BuilderState::Committed;

        tracing::trace!(
            "Committed frame {}: {} commands, {} draw calls, {} bytes",
            report.frame_index,
            report.total_commands(),
            report.total_draw_calls(),
            report.bytes_uploaded
        );
        Ok(report)
    }

    /// Run a whole frame: begin, collect every pass in `passes`, optionally
    /// collect particles, commit.
    pub fn build_frame(
        &mut self,
        subsystem: &mut CommandSubsystem,
        passes: PassMask,
        drawables: &ImmediateDrawList,
        particles: Option<&ParticlesList>,
    ) -> Result<FrameReport, BuilderError> {
        self.begin_frame(subsystem)?;
        for kind in PassKind::ALL {
            if passes.contains(kind.mask()) {
                self.collect(subsystem, kind, drawables)?;
            }
        }
        if let Some(particles) = particles {
            self.collect_particles(subsystem, particles)?;
        }
        self.commit(subsystem)
    }

    fn expect_state(&self, expected: BuilderState) -> Result<(), BuilderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BuilderError::InvalidState {
                expected,
                found: self.state,
            })
        }
    }
}

fn record_outcome(
    report: &mut FrameReport,
    diagnostics: &mut FrameDiagnostics,
    pass: Option<PassKind>,
    label: &str,
    outcome: CommitOutcome,
) {
    match outcome {
        CommitOutcome::Uploaded { bytes } => report.bytes_uploaded += bytes,
        CommitOutcome::Failed { error, halted } => {
            diagnostics.gpu_errors.push(GpuErrorDiagnostic {
                pass,
                buffer: label.to_string(),
                operation: "upload",
                message: error,
                halted,
            });
        }
        CommitOutcome::Skipped => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_list::{DrawParams, DrawableRef, NodeId, ParticleSystemRef};
    use crate::pass::{CascadeIndex, CascadeMask, PassTarget};
    use crate::subsystem::CommandSubsystemDescriptor;
    use std::sync::Arc;
    use volley_test_utils::MockRenderContext;

    fn subsystem(capacity: u32) -> (Arc<MockRenderContext>, CommandSubsystem) {
        let mock = Arc::new(MockRenderContext::new());
        let subsystem = CommandSubsystem::new(
            mock.clone(),
            CommandSubsystemDescriptor::new().capacity(capacity),
        );
        (mock, subsystem)
    }

    fn drawable(id: u64, material: MaterialType) -> DrawableRef {
        DrawableRef::new(
            NodeId(id),
            material,
            DrawParams::new(3, id as u32 * 3, 0),
        )
    }

    #[test]
    fn test_state_machine_order() {
        let (_mock, mut subsystem) = subsystem(8);
        let mut builder = FrameCommandBuilder::new();
        let list = ImmediateDrawList::new();

        assert_eq!(builder.state(), BuilderState::Idle);
        assert_eq!(
            builder.collect(&mut subsystem, PassKind::Solid, &list),
            Err(BuilderError::InvalidState {
                expected: BuilderState::Collecting,
                found: BuilderState::Idle,
            })
        );

        builder.begin_frame(&mut subsystem).unwrap();
        assert_eq!(builder.state(), BuilderState::Collecting);
        builder.collect(&mut subsystem, PassKind::Solid, &list).unwrap();
        builder.commit(&mut subsystem).unwrap();
        assert_eq!(builder.state(), BuilderState::Committed);

        assert!(builder.commit(&mut subsystem).is_err());
    }

    #[test]
    fn test_materials_grouped_in_enum_order() {
        let (_mock, mut subsystem) = subsystem(16);
        let mut builder = FrameCommandBuilder::new();
        let mut list = ImmediateDrawList::new();
        list.append(drawable(1, MaterialType::Unlit));
        list.append(drawable(2, MaterialType::Default));
        list.append(drawable(3, MaterialType::Unlit));
        list.append(drawable(4, MaterialType::AlphaRef));

        builder
            .build_frame(&mut subsystem, PassMask::SOLID, &list, None)
            .unwrap();

        let table = subsystem.table(PassTarget::Solid).unwrap();
        assert_eq!(table.get(MaterialType::Default), CommandRun::new(0, 1));
        assert_eq!(table.get(MaterialType::AlphaRef), CommandRun::new(1, 1));
        assert_eq!(table.get(MaterialType::Unlit), CommandRun::new(2, 2));

        let first_indices: Vec<_> = subsystem
            .allocator(PassKind::Solid)
            .commands()
            .iter()
            .map(|c| c.first_index)
            .collect();
        assert_eq!(first_indices, vec![6, 12, 3, 9]);
    }

    #[test]
    fn test_overflow_truncates_first_k() {
        let (_mock, mut subsystem) = subsystem(4);
        let mut builder = FrameCommandBuilder::new();
        let mut list = ImmediateDrawList::new();
        for id in 0..6 {
            list.append(drawable(id, MaterialType::Detail));
        }

        let report = builder
            .build_frame(&mut subsystem, PassMask::SOLID, &list, None)
            .unwrap();

        let table = subsystem.table(PassTarget::Solid).unwrap();
        assert_eq!(table.get(MaterialType::Detail), CommandRun::new(0, 4));
        assert_eq!(report.dropped_commands(), 2);
        assert_eq!(
            report.diagnostics.overflows,
            vec![OverflowDiagnostic {
                target: PassTarget::Solid,
                material: MaterialType::Detail,
                requested: 6,
                emitted: 4,
                capacity: 4,
            }]
        );
    }

    #[test]
    fn test_exhausted_buffer_leaves_later_buckets_empty() {
        let (_mock, mut subsystem) = subsystem(2);
        let mut builder = FrameCommandBuilder::new();
        let mut list = ImmediateDrawList::new();
        list.append(drawable(0, MaterialType::Default));
        list.append(drawable(1, MaterialType::Default));
        list.append(drawable(2, MaterialType::Unlit));

        builder
            .build_frame(&mut subsystem, PassMask::SOLID, &list, None)
            .unwrap();

        let table = subsystem.table(PassTarget::Solid).unwrap();
        assert_eq!(table.get(MaterialType::Unlit), CommandRun::new(2, 0));
        assert!(table.is_contiguous());
        assert_eq!(table.draw_call_count(), 1);
    }

    #[test]
    fn test_shadow_cascades_segment_one_buffer() {
        let (_mock, mut subsystem) = subsystem(16);
        let mut builder = FrameCommandBuilder::new();
        let mut list = ImmediateDrawList::new();
        list.append(drawable(0, MaterialType::Default).with_cascades(CascadeMask::all()));
        list.append(
            drawable(1, MaterialType::Default)
                .with_cascades(CascadeMask::CASCADE_1 | CascadeMask::CASCADE_3),
        );

        let report = builder
            .build_frame(&mut subsystem, PassMask::SHADOW, &list, None)
            .unwrap();

        let counts: Vec<_> = CascadeIndex::ALL
            .iter()
            .map(|c| {
                subsystem
                    .table(PassTarget::Shadow(*c))
                    .unwrap()
                    .get(MaterialType::Default)
            })
            .collect();
        assert_eq!(
            counts,
            vec![
                CommandRun::new(0, 1),
                CommandRun::new(1, 2),
                CommandRun::new(3, 1),
                CommandRun::new(4, 2),
            ]
        );
        assert_eq!(report.pass(PassKind::Shadow).commands, 6);
        assert_eq!(report.pass(PassKind::Shadow).draw_calls, 4);
    }

    #[test]
    fn test_duplicate_collect_is_ignored() {
        let (_mock, mut subsystem) = subsystem(8);
        let mut builder = FrameCommandBuilder::new();
        let mut list = ImmediateDrawList::new();
        list.append(drawable(0, MaterialType::Default));

        builder.begin_frame(&mut subsystem).unwrap();
        builder.collect(&mut subsystem, PassKind::Solid, &list).unwrap();
        builder.collect(&mut subsystem, PassKind::Solid, &list).unwrap();
        let report = builder.commit(&mut subsystem).unwrap();

        assert_eq!(report.pass(PassKind::Solid).commands, 1);
    }

    #[test]
    fn test_particles_form_one_run() {
        let (_mock, mut subsystem) = subsystem(8);
        let mut builder = FrameCommandBuilder::new();
        let mut particles = ParticlesList::new();
        for id in 0..3 {
            particles.append(ParticleSystemRef::new(NodeId(id), DrawParams::new(6, 0, 0)));
        }

        let report = builder
            .build_frame(
                &mut subsystem,
                PassMask::empty(),
                &ImmediateDrawList::new(),
                Some(&particles),
            )
            .unwrap();

        let output = subsystem.particles().unwrap();
        assert_eq!(output.run, CommandRun::new(0, 3));
        assert_eq!(report.particle_commands, 3);
        assert_eq!(report.total_draw_calls(), 1);
    }

    #[test]
    fn test_begin_frame_hides_previous_tables() {
        let (_mock, mut subsystem) = subsystem(8);
        let mut builder = FrameCommandBuilder::new();
        let mut list = ImmediateDrawList::new();
        list.append(drawable(0, MaterialType::Default));

        builder
            .build_frame(&mut subsystem, PassMask::SOLID, &list, None)
            .unwrap();
        assert!(subsystem.table(PassTarget::Solid).is_some());

        builder.begin_frame(&mut subsystem).unwrap();
        assert!(subsystem.table(PassTarget::Solid).is_none());
        assert_eq!(subsystem.allocator(PassKind::Solid).written_count(), 0);
    }

    #[test]
    fn test_shut_down_subsystem_refuses_frames() {
        let (_mock, mut subsystem) = subsystem(8);
        let mut builder = FrameCommandBuilder::new();

        subsystem.shutdown();

        assert_eq!(
            builder.begin_frame(&mut subsystem),
            Err(BuilderError::SubsystemShutDown)
        );
    }
}
