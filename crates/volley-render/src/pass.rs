//! Pass kinds, shadow cascades and the table targets they expand to.

use bitflags::bitflags;

/// Number of shadow cascades.
pub const CASCADE_COUNT: usize = 4;

/// Number of [`PassKind`]s.
pub const PASS_KIND_COUNT: usize = 4;

/// Number of [`PassTarget`]s: one per non-shadow pass plus one per cascade.
pub const PASS_TARGET_COUNT: usize = PASS_KIND_COUNT - 1 + CASCADE_COUNT;

/// A logical render pass that owns one command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassKind {
    Solid,
    /// Cascaded shadow maps. One buffer, segmented per cascade.
    Shadow,
    ReflectiveShadowMap,
    /// Glow/outline effects.
    Glow,
}

impl PassKind {
    pub const ALL: [PassKind; PASS_KIND_COUNT] = [
        PassKind::Solid,
        PassKind::Shadow,
        PassKind::ReflectiveShadowMap,
        PassKind::Glow,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            PassKind::Solid => "solid",
            PassKind::Shadow => "shadow",
            PassKind::ReflectiveShadowMap => "rsm",
            PassKind::Glow => "glow",
        }
    }

    pub const fn mask(self) -> PassMask {
        match self {
            PassKind::Solid => PassMask::SOLID,
            PassKind::Shadow => PassMask::SHADOW,
            PassKind::ReflectiveShadowMap => PassMask::RSM,
            PassKind::Glow => PassMask::GLOW,
        }
    }

    /// Table targets backed by this pass's buffer, in emission order.
    pub fn targets(self) -> &'static [PassTarget] {
        match self {
            PassKind::Solid => &PassTarget::ALL[0..1],
            PassKind::Shadow => &PassTarget::ALL[1..1 + CASCADE_COUNT],
            PassKind::ReflectiveShadowMap => &PassTarget::ALL[5..6],
            PassKind::Glow => &PassTarget::ALL[6..7],
        }
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a shadow cascade, always in `0..CASCADE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CascadeIndex(u8);

impl CascadeIndex {
    pub const ALL: [CascadeIndex; CASCADE_COUNT] =
        [CascadeIndex(0), CascadeIndex(1), CascadeIndex(2), CascadeIndex(3)];

    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < CASCADE_COUNT {
            Some(CascadeIndex(index))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    pub const fn mask(self) -> CascadeMask {
        CascadeMask::from_bits_truncate(1 << self.0)
    }
}

impl std::fmt::Display for CascadeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One offset/size table: a pass, or a single cascade of the shadow pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassTarget {
    Solid,
    Shadow(CascadeIndex),
    ReflectiveShadowMap,
    Glow,
}

impl PassTarget {
    /// Every target, in table order. Shadow cascades are contiguous.
    pub const ALL: [PassTarget; PASS_TARGET_COUNT] = [
        PassTarget::Solid,
        PassTarget::Shadow(CascadeIndex::ALL[0]),
        PassTarget::Shadow(CascadeIndex::ALL[1]),
        PassTarget::Shadow(CascadeIndex::ALL[2]),
        PassTarget::Shadow(CascadeIndex::ALL[3]),
        PassTarget::ReflectiveShadowMap,
        PassTarget::Glow,
    ];

    pub const fn kind(self) -> PassKind {
        match self {
            PassTarget::Solid => PassKind::Solid,
            PassTarget::Shadow(_) => PassKind::Shadow,
            PassTarget::ReflectiveShadowMap => PassKind::ReflectiveShadowMap,
            PassTarget::Glow => PassKind::Glow,
        }
    }

    /// Position in [`PassTarget::ALL`].
    pub const fn index(self) -> usize {
        match self {
            PassTarget::Solid => 0,
            PassTarget::Shadow(cascade) => 1 + cascade.get(),
            PassTarget::ReflectiveShadowMap => 5,
            PassTarget::Glow => 6,
        }
    }

    pub const fn cascade(self) -> Option<CascadeIndex> {
        match self {
            PassTarget::Shadow(cascade) => Some(cascade),
            _ => None,
        }
    }
}

impl std::fmt::Display for PassTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassTarget::Shadow(cascade) => write!(f, "shadow[{}]", cascade),
            other => f.write_str(other.kind().name()),
        }
    }
}

bitflags! {
    /// Passes a drawable takes part in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassMask: u8 {
        const SOLID = 1 << 0;
        const SHADOW = 1 << 1;
        const RSM = 1 << 2;
        const GLOW = 1 << 3;
    }
}

bitflags! {
    /// Shadow cascades whose frustum contains a drawable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CascadeMask: u8 {
        const CASCADE_0 = 1 << 0;
        const CASCADE_1 = 1 << 1;
        const CASCADE_2 = 1 << 2;
        const CASCADE_3 = 1 << 3;
    }
}

impl CascadeMask {
    pub fn contains_cascade(self, cascade: CascadeIndex) -> bool {
        self.contains(cascade.mask())
    }
}
