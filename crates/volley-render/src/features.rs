//! GPU feature detection and management.
//!
//! A small, type-safe view over the wgpu features the command batcher cares
//! about, with support for required vs requested features.

use bitflags::bitflags;

bitflags! {
    /// GPU features that can be requested or required.
    ///
    /// Use `GpuFeatures::to_wgpu()` to convert to `wgpu::Features`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GpuFeatures: u32 {
        /// Allows a non-zero `first_instance` in indirect draw commands.
        /// Without it every command's base instance must be 0.
        const INDIRECT_FIRST_INSTANCE = 1 << 0;

        /// Allows `multi_draw_indexed_indirect_count`, where the draw count is
        /// itself read from a GPU buffer.
        const MULTI_DRAW_INDIRECT_COUNT = 1 << 1;

        /// Buffers used by the GPU (indirect, vertex, index) may also be
        /// CPU-mappable. This is the persistent-mapping capability the command
        /// batcher queries once at startup.
        const MAPPABLE_PRIMARY_BUFFERS = 1 << 2;
    }
}

impl GpuFeatures {
    /// Convert to wgpu::Features.
    pub fn to_wgpu(self) -> wgpu::Features {
        let mut features = wgpu::Features::empty();

        if self.contains(GpuFeatures::INDIRECT_FIRST_INSTANCE) {
            features |= wgpu::Features::INDIRECT_FIRST_INSTANCE;
        }
        if self.contains(GpuFeatures::MULTI_DRAW_INDIRECT_COUNT) {
            features |= wgpu::Features::MULTI_DRAW_INDIRECT_COUNT;
        }
        if self.contains(GpuFeatures::MAPPABLE_PRIMARY_BUFFERS) {
            features |= wgpu::Features::MAPPABLE_PRIMARY_BUFFERS;
        }

        features
    }

    /// Convert from wgpu::Features to GpuFeatures.
    ///
    /// Note: Only features that have a corresponding GpuFeatures flag will be included.
    pub fn from_wgpu(features: wgpu::Features) -> Self {
        let mut gpu_features = GpuFeatures::empty();

        if features.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
            gpu_features |= GpuFeatures::INDIRECT_FIRST_INSTANCE;
        }
        if features.contains(wgpu::Features::MULTI_DRAW_INDIRECT_COUNT) {
            gpu_features |= GpuFeatures::MULTI_DRAW_INDIRECT_COUNT;
        }
        if features.contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS) {
            gpu_features |= GpuFeatures::MAPPABLE_PRIMARY_BUFFERS;
        }

        gpu_features
    }

    /// Check if all the specified features are supported by the adapter.
    pub fn check_support(self, adapter: &wgpu::Adapter) -> FeatureSupportResult {
        let adapter_features = GpuFeatures::from_wgpu(adapter.features());
        let missing = self - (self & adapter_features);

        if missing.is_empty() {
            FeatureSupportResult::Supported
        } else {
            FeatureSupportResult::Missing(missing)
        }
    }
}

impl Default for GpuFeatures {
    fn default() -> Self {
        GpuFeatures::empty()
    }
}

/// Result of checking feature support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSupportResult {
    /// All requested features are supported.
    Supported,
    /// Some features are missing.
    Missing(GpuFeatures),
}

impl FeatureSupportResult {
    /// Returns true if all features are supported.
    pub fn is_supported(&self) -> bool {
        matches!(self, FeatureSupportResult::Supported)
    }

    /// Returns the missing features, if any.
    pub fn missing(&self) -> Option<GpuFeatures> {
        match self {
            FeatureSupportResult::Supported => None,
            FeatureSupportResult::Missing(features) => Some(*features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_features_empty() {
        let features = GpuFeatures::empty();
        assert!(features.is_empty());
        assert_eq!(features.to_wgpu(), wgpu::Features::empty());
    }

    #[test]
    fn test_gpu_features_roundtrip() {
        let features = GpuFeatures::all();
        assert_eq!(GpuFeatures::from_wgpu(features.to_wgpu()), features);
    }

    #[test]
    fn test_unrelated_wgpu_features_are_ignored() {
        let features = wgpu::Features::MAPPABLE_PRIMARY_BUFFERS | wgpu::Features::SHADER_F16;
        assert_eq!(
            GpuFeatures::from_wgpu(features),
            GpuFeatures::MAPPABLE_PRIMARY_BUFFERS
        );
    }
}
