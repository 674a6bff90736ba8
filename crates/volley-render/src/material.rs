//! Material categories used as batching keys.
//!
//! A [`MaterialType`] carries no behavior of its own. Every drawable belongs to
//! exactly one category, and each category with at least one command in a pass
//! becomes one multi-draw call, since all of its members share a pipeline.

/// Number of material categories.
pub const MAT_COUNT: usize = 7;

/// Closed set of material categories.
///
/// The declaration order is the emission order inside every pass buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MaterialType {
    /// Opaque lit geometry.
    Default,
    /// Alpha-tested geometry (foliage, fences).
    AlphaRef,
    /// Lit geometry with a tangent-space normal map.
    NormalMap,
    /// Geometry with a secondary detail texture.
    Detail,
    /// Environment-mapped reflective surfaces.
    SphereMap,
    /// Terrain blending several layers through a splat map.
    Splatting,
    /// Geometry that ignores scene lighting.
    Unlit,
}

impl MaterialType {
    /// All categories in emission order.
    pub const ALL: [MaterialType; MAT_COUNT] = [
        MaterialType::Default,
        MaterialType::AlphaRef,
        MaterialType::NormalMap,
        MaterialType::Detail,
        MaterialType::SphereMap,
        MaterialType::Splatting,
        MaterialType::Unlit,
    ];

    /// Dense index in `0..MAT_COUNT`.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            MaterialType::Default => "default",
            MaterialType::AlphaRef => "alpha_ref",
            MaterialType::NormalMap => "normal_map",
            MaterialType::Detail => "detail",
            MaterialType::SphereMap => "sphere_map",
            MaterialType::Splatting => "splatting",
            MaterialType::Unlit => "unlit",
        }
    }
}

impl std::fmt::Display for MaterialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
