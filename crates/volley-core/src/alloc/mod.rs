//! Hash collections used across Volley.
//!
//! Re-exports of the AHash-backed collections. Iteration order of these maps
//! is not stable, so they are only used for lookups and never to drive
//! emission order.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};
