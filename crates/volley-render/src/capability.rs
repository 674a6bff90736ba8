//! Render capability system for declaring GPU feature requirements.
//!
//! Components implement [`RenderCapability`] to declare what they need from
//! the device. Requirements are collected with
//! [`GraphicsContextDescriptor::require_capability`] and
//! [`GraphicsContextDescriptor::request_capability`] before device creation.
//!
//! # Example
//!
//! ```ignore
//! use volley_render::{CommandBatchCapability, GraphicsContext, GraphicsContextDescriptor};
//!
//! let ctx = pollster::block_on(GraphicsContext::new_owned_with_descriptor(
//!     GraphicsContextDescriptor::new().request_capability::<CommandBatchCapability>(),
//! ))?;
//! ```
//!
//! [`GraphicsContextDescriptor::require_capability`]: crate::GraphicsContextDescriptor::require_capability
//! [`GraphicsContextDescriptor::request_capability`]: crate::GraphicsContextDescriptor::request_capability

use crate::features::GpuFeatures;

/// A trait for components to declare their GPU feature requirements.
pub trait RenderCapability {
    /// GPU requirements for this component.
    fn requirements() -> GpuRequirements;

    /// Human-readable name for diagnostics.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// GPU requirements for a render capability.
#[derive(Debug, Clone, Default)]
pub struct GpuRequirements {
    /// Features that must be present (device creation fails if missing).
    pub required_features: GpuFeatures,
    /// Features that are desired but not essential (warns if missing).
    pub requested_features: GpuFeatures,
}

impl GpuRequirements {
    /// Create requirements with no features.
    pub fn none() -> Self {
        Self::default()
    }

    /// Create a new requirements builder starting from no requirements.
    pub fn new() -> Self {
        Self::none()
    }

    /// Add required GPU features.
    pub fn require_features(mut self, features: GpuFeatures) -> Self {
        self.required_features |= features;
        self
    }

    /// Add requested (best-effort) GPU features.
    pub fn request_features(mut self, features: GpuFeatures) -> Self {
        self.requested_features |= features;
        self
    }

    /// Merge another set of requirements into this one. Features are unioned.
    pub fn merge(&mut self, other: &GpuRequirements) {
        self.required_features |= other.required_features;
        self.requested_features |= other.requested_features;
    }
}

/// Capability for the indirect command batcher.
///
/// Nothing is strictly required: without `MAPPABLE_PRIMARY_BUFFERS` the
/// batcher falls back to streaming uploads, and without
/// `INDIRECT_FIRST_INSTANCE` callers must keep every base instance at 0.
pub struct CommandBatchCapability;

impl RenderCapability for CommandBatchCapability {
    fn requirements() -> GpuRequirements {
        GpuRequirements::new().request_features(
            GpuFeatures::MAPPABLE_PRIMARY_BUFFERS | GpuFeatures::INDIRECT_FIRST_INSTANCE,
        )
    }

    fn name() -> &'static str {
        "CommandBatchCapability"
    }
}
