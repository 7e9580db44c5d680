//! Sentence probability estimation from a bidirectional masked language model.
//!
//! A sentence's probability is approximated by masking each interior token in
//! two directions and asking the model for the masked token. The forward pass
//! at position `i` hides `i` and everything to its right, approximating
//! `P(w_i | w_0..w_{i-1})`; the backward pass hides `i` and everything to its
//! left, approximating `P(w_i | w_{i+1}..w_N)`. The two directional sentence
//! probabilities combine as a geometric mean. Scoring one sentence therefore
//! costs `2 x (N-2)` masked predictions, batched into a single forward pass
//! when the backend supports it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use candle_sentence_prob::sentence_prob::{
//!     CombinationPolicy, ModernBertSize, SentenceProbPipelineBuilder,
//! };
//!
//! # fn main() -> candle_sentence_prob::error::Result<()> {
//! let pipeline = SentenceProbPipelineBuilder::modernbert(ModernBertSize::Base).build()?;
//!
//! let output = pipeline.run("The cat sat on the mat.", CombinationPolicy::Raw)?;
//! println!("P(sentence) ~ {:.3e}", output.score);
//! # Ok(())
//! # }
//! ```
//!
//! # Combination policies
//!
//! | Policy | Meaning | Comparable across lengths? |
//! |--------|---------|----------------------------|
//! | [`CombinationPolicy::Raw`] | Geometric mean of the forward and backward products | No (longer sentences score lower) |
//! | [`CombinationPolicy::LengthAveraged`] | Per-token probabilities dampened by `1/N` before multiplying | Yes |
//! | [`CombinationPolicy::Calibrated`] | Raw score divided by the mean raw score observed for that length | Yes, given a table covering the length |
//!
//! # Length calibration
//!
//! Raw scores shrink with sentence length. To compare sentences of different
//! lengths, build a [`CalibrationTable`] over a reference corpus once and
//! attach it to the pipeline:
//!
//! ```rust,no_run
//! # use candle_sentence_prob::sentence_prob::{
//! #     CalibrationTable, CombinationPolicy, ModernBertSize, SentenceProbPipelineBuilder,
//! # };
//! # fn main() -> candle_sentence_prob::error::Result<()> {
//! # let pipeline = SentenceProbPipelineBuilder::modernbert(ModernBertSize::Base).build()?;
//! let corpus = std::fs::read_to_string("reference_sentences.txt")?;
//! let table = pipeline.calibrate(corpus.lines())?;
//! table.save("calibration.json")?;
//!
//! let mut pipeline = pipeline;
//! pipeline.set_calibration(table);
//! let output = pipeline.run("A sentence to judge.", CombinationPolicy::Calibrated)?;
//! # Ok(())
//! # }
//! ```
//!
//! Lengths absent from the table fall back to a neutral divisor of 1 with a
//! warning rather than failing.
//!
//! # Custom backends
//!
//! Any type implementing [`MaskedLanguageModel`] can drive the pipeline via
//! [`SentenceProbPipelineBuilder::custom`]; the bundled backend is ModernBERT
//! (`Base`, `Large`) through [`SentenceProbPipelineBuilder::modernbert`].

// ============ Internal API ============

pub(crate) mod builder;
pub(crate) mod calibration;
pub(crate) mod compose;
pub(crate) mod masking;
pub(crate) mod model;
pub(crate) mod pipeline;
pub(crate) mod top_k;

// ============ Public API ============

pub use crate::models::ModernBertSize;
pub use crate::pipelines::cache::ModelOptions;
pub use crate::pipelines::stats::ScoringStats;
pub use builder::SentenceProbPipelineBuilder;
pub use calibration::{CalibrationAccumulator, CalibrationTable};
pub use compose::CombinationPolicy;
pub use masking::{mask, Direction, MaskedVariant};
pub use model::MaskedLanguageModel;
pub use pipeline::{DetailedOutput, Output, PositionScore, SentenceProbPipeline};
pub use top_k::top_k;

/// Only for generic annotations. Use [`SentenceProbPipelineBuilder::modernbert`].
pub type SentenceProbModernBert = crate::models::modernbert::ModernBertMaskedLM;
