//! Per-frame draw list registries.
//!
//! The visibility stage fills an [`ImmediateDrawList`] and a [`ParticlesList`]
//! every frame. Both are cleared and rebuilt each frame, keep insertion order
//! and hold plain `Copy` references that are only meaningful for that frame.

use crate::indirect::DrawIndexedIndirect;
use crate::material::MaterialType;
use crate::pass::{CascadeMask, PassKind, PassMask, PassTarget};

/// Opaque handle of a scene node, owned by the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// Geometry parameters of one indexed draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DrawParams {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

impl DrawParams {
    pub const fn new(index_count: u32, first_index: u32, base_vertex: i32) -> Self {
        Self {
            index_count,
            instance_count: 1,
            first_index,
            base_vertex,
            base_instance: 0,
        }
    }

    pub const fn with_instances(mut self, instance_count: u32, base_instance: u32) -> Self {
        self.instance_count = instance_count;
        self.base_instance = base_instance;
        self
    }

    #[inline]
    pub const fn to_command(self) -> DrawIndexedIndirect {
        DrawIndexedIndirect::new(
            self.index_count,
            self.instance_count,
            self.first_index,
            self.base_vertex,
            self.base_instance,
        )
    }
}

/// A visible drawable, as handed over by the visibility stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableRef {
    pub node: NodeId,
    pub material: MaterialType,
    pub params: DrawParams,
    /// Passes this drawable takes part in.
    pub passes: PassMask,
    /// Shadow cascades whose frustum contains this drawable.
    pub cascades: CascadeMask,
}

impl DrawableRef {
    /// A drawable that takes part in the solid pass only.
    pub fn new(node: NodeId, material: MaterialType, params: DrawParams) -> Self {
        Self {
            node,
            material,
            params,
            passes: PassMask::SOLID,
            cascades: CascadeMask::empty(),
        }
    }

    pub fn with_passes(mut self, passes: PassMask) -> Self {
        self.passes = passes;
        self
    }

    /// Set the visible cascades. Also enrolls the drawable in the shadow pass.
    pub fn with_cascades(mut self, cascades: CascadeMask) -> Self {
        self.cascades = cascades;
        if !cascades.is_empty() {
            self.passes |= PassMask::SHADOW;
        }
        self
    }

    pub fn in_pass(&self, kind: PassKind) -> bool {
        self.passes.contains(kind.mask())
    }

    /// Whether this drawable emits a command into `target`.
    pub fn participates(&self, target: PassTarget) -> bool {
        if !self.in_pass(target.kind()) {
            return false;
        }
        match target.cascade() {
            Some(cascade) => self.cascades.contains_cascade(cascade),
            None => true,
        }
    }
}

/// An active particle system ready to be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleSystemRef {
    pub system: NodeId,
    pub params: DrawParams,
}

impl ParticleSystemRef {
    pub fn new(system: NodeId, params: DrawParams) -> Self {
        Self { system, params }
    }
}

/// Ordered drawables visible this frame.
#[derive(Debug, Clone, Default)]
pub struct ImmediateDrawList {
    items: Vec<DrawableRef>,
}

impl ImmediateDrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Empty the list, keeping its allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn append(&mut self, drawable: DrawableRef) {
        self.items.push(drawable);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawableRef> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[DrawableRef] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a ImmediateDrawList {
    type Item = &'a DrawableRef;
    type IntoIter = std::slice::Iter<'a, DrawableRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Extend<DrawableRef> for ImmediateDrawList {
    fn extend<I: IntoIterator<Item = DrawableRef>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

/// Ordered particle systems active this frame.
#[derive(Debug, Clone, Default)]
pub struct ParticlesList {
    items: Vec<ParticleSystemRef>,
}

impl ParticlesList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn append(&mut self, system: ParticleSystemRef) {
        self.items.push(system);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParticleSystemRef> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[ParticleSystemRef] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a ParticlesList {
    type Item = &'a ParticleSystemRef;
    type IntoIter = std::slice::Iter<'a, ParticleSystemRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
