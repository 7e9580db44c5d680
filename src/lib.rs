//! Bidirectional masked-language-model sentence probability scoring in Rust.
//!
//! Powered by [Candle](https://github.com/huggingface/candle). Estimates P(sentence)
//! from a masked language model by masking each interior token in both directions,
//! composing the per-token predictions under a selectable combination policy, and
//! optionally calibrating scores by sentence length for cross-length comparability.

#![deny(missing_docs)]

// ============ Internal API ============

pub(crate) mod models;
pub(crate) mod pipelines;

// ============ Public API ============

pub mod error;

pub use pipelines::sentence_prob;
