//! Test utilities for Volley.
//!
//! This crate provides the GPU seam used by the command batcher, so the whole
//! frame pipeline can be exercised without a GPU.
//!
//! # Overview
//!
//! - [`RenderContext`] - Trait abstracting buffer creation, uploads, error
//!   scopes and the persistent-mapping capability query
//! - `MockRenderContext` - Mock implementation for testing (requires `mock` feature)
//! - [`GpuBuffer`] - Buffer handle that can be real or mock
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use volley_test_utils::{MockRenderContext, RenderContext};
//! use wgpu::*;
//!
//! let mock = MockRenderContext::new();
//!
//! let buffer = mock.create_buffer(&BufferDescriptor {
//!     label: Some("solid_commands"),
//!     size: 1024,
//!     usage: BufferUsages::INDIRECT | BufferUsages::COPY_DST,
//!     mapped_at_creation: false,
//! });
//! mock.write_buffer(&buffer, 0, &[1, 2, 3, 4]);
//!
//! assert_eq!(mock.count_buffer_creates(), 1);
//! assert_eq!(&mock.buffer_contents(&buffer)[..4], &[1, 2, 3, 4]);
//! # }
//! ```
//!
//! # Design
//!
//! GPU handles are owned and reference counted, so no lifetimes leak into the
//! batcher. Mock state lives behind `parking_lot::Mutex` so every trait method
//! can take `&self`, and the trait stays object-safe (`dyn RenderContext`).

pub mod gpu_types;
#[cfg(feature = "mock")]
pub mod mock_render;
pub mod render_context;

pub use gpu_types::*;
#[cfg(feature = "mock")]
pub use mock_render::*;
pub use render_context::*;
