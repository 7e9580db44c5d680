use super::calibration::{CalibrationAccumulator, CalibrationTable};
use super::compose::{CombinationPolicy, DirectionalAccumulator, DIST_SUM_TOLERANCE};
use super::masking::{mask, Direction, MaskedVariant};
use super::model::MaskedLanguageModel;
use super::top_k::top_k;
use crate::error::{PipelineError, Result};
use crate::pipelines::stats::ScoringStats;
use tokenizers::Tokenizer;

// ============ Output types ============

/// Scalar result from `run()`.
#[derive(Debug)]
pub struct Output {
    /// Estimated sentence probability under the requested policy.
    pub score: f64,
    /// Execution statistics.
    pub stats: ScoringStats,
}

/// Diagnostics for one interior position of a scored sentence.
#[derive(Debug, Clone)]
pub struct PositionScore {
    /// Interior token index within the sequence.
    pub position: usize,
    /// The true token at this position.
    pub token: String,
    /// Base-10 log-probability of the true token under forward masking.
    pub forward_log10: f64,
    /// Base-10 log-probability of the true token under backward masking.
    pub backward_log10: f64,
    /// The forward masked variant queried for this position.
    pub forward_variant: MaskedVariant,
    /// The backward masked variant queried for this position.
    pub backward_variant: MaskedVariant,
    /// Highest-probability `(token_id, probability)` pairs under forward
    /// masking; empty when top-k reporting was not requested.
    pub top_forward: Vec<(u32, f32)>,
    /// Highest-probability `(token_id, probability)` pairs under backward
    /// masking; empty when top-k reporting was not requested.
    pub top_backward: Vec<(u32, f32)>,
}

/// Output from `run_detailed()`: the score plus per-position diagnostics.
#[derive(Debug)]
pub struct DetailedOutput {
    /// Estimated sentence probability under the requested policy.
    pub score: f64,
    /// The scored token sequence, including boundary markers.
    pub tokens: Vec<String>,
    /// One record per interior position, in position order.
    pub positions: Vec<PositionScore>,
    /// Execution statistics.
    pub stats: ScoringStats,
}

// ============ Pipeline ============

/// Estimates sentence probabilities from a bidirectional masked language model.
///
/// Every interior token is predicted twice — once with its right context
/// masked away (forward) and once with its left context masked away
/// (backward) — and the per-token predictions compose into a single scalar
/// under the requested [`CombinationPolicy`].
///
/// Construct with
/// [`SentenceProbPipelineBuilder`](super::SentenceProbPipelineBuilder).
///
/// # Examples
///
/// ```rust,no_run
/// # use candle_sentence_prob::sentence_prob::{
/// #     CombinationPolicy, ModernBertSize, SentenceProbPipelineBuilder,
/// # };
/// # fn main() -> candle_sentence_prob::error::Result<()> {
/// let pipeline = SentenceProbPipelineBuilder::modernbert(ModernBertSize::Base).build()?;
///
/// let output = pipeline.run("The cat sat on the mat.", CombinationPolicy::Raw)?;
/// println!("P(sentence) ~ {:.3e}", output.score);
/// # Ok(())
/// # }
/// ```
pub struct SentenceProbPipeline<M: MaskedLanguageModel> {
    pub(crate) model: M,
    pub(crate) tokenizer: Tokenizer,
    pub(crate) calibration: CalibrationTable,
}

impl<M: MaskedLanguageModel> SentenceProbPipeline<M> {
    /// Scores `text` under `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateSentence`] when the tokenized input
    /// has no interior tokens, and [`PipelineError::OracleContract`] when the
    /// model returns a malformed distribution. Either way no partial score is
    /// produced.
    pub fn run(&self, text: &str, policy: CombinationPolicy) -> Result<Output> {
        let stats_builder = ScoringStats::start();
        let tokens = self.model.tokenize(&self.tokenizer, text)?;
        let (score, _, queries) = self.score_impl(&tokens, policy, false, 0)?;
        Ok(Output {
            score,
            stats: stats_builder.finish(tokens.len() - 2, queries),
        })
    }

    /// Scores `text` under `policy` and returns per-position diagnostics.
    ///
    /// `top` requests that many highest-probability candidates per position
    /// and direction; pass 0 to skip top-k reporting.
    pub fn run_detailed(
        &self,
        text: &str,
        policy: CombinationPolicy,
        top: usize,
    ) -> Result<DetailedOutput> {
        let stats_builder = ScoringStats::start();
        let tokens = self.model.tokenize(&self.tokenizer, text)?;
        let (score, positions, queries) = self.score_impl(&tokens, policy, true, top)?;
        let stats = stats_builder.finish(tokens.len() - 2, queries);
        Ok(DetailedOutput {
            score,
            tokens,
            positions,
            stats,
        })
    }

    /// Scores an already-tokenized sequence (boundary markers included).
    pub fn score_tokens(&self, tokens: &[String], policy: CombinationPolicy) -> Result<f64> {
        let (score, _, _) = self.score_impl(tokens, policy, false, 0)?;
        Ok(score)
    }

    /// Builds a [`CalibrationTable`] from a reference corpus, one sentence per
    /// item.
    ///
    /// Each sentence is scored under the raw policy and bucketed by token
    /// count; the table holds the per-length arithmetic means. Degenerate
    /// lines (no interior tokens) are skipped with a warning; any other
    /// failure aborts the build.
    pub fn calibrate<I>(&self, sentences: I) -> Result<CalibrationTable>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut accumulator = CalibrationAccumulator::new();
        for sentence in sentences {
            let text = sentence.as_ref().trim();
            if text.is_empty() {
                continue;
            }
            let tokens = self.model.tokenize(&self.tokenizer, text)?;
            match self.score_impl(&tokens, CombinationPolicy::Raw, false, 0) {
                Ok((score, _, _)) => accumulator.record(tokens.len(), score),
                Err(PipelineError::DegenerateSentence(count)) => {
                    tracing::warn!(tokens = count, "skipping degenerate reference sentence");
                }
                Err(e) => return Err(e),
            }
        }

        let table = accumulator.finish();
        tracing::info!(
            lengths = ?table.lengths().collect::<Vec<_>>(),
            "calibration table built"
        );
        Ok(table)
    }

    /// The calibration table consulted by [`CombinationPolicy::Calibrated`].
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Replaces the calibration table wholesale.
    pub fn set_calibration(&mut self, table: CalibrationTable) {
        self.calibration = table;
    }

    /// Maps the top-k entries of a distribution to readable token strings.
    pub fn top_k_tokens(&self, distribution: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let top = top_k(distribution, k);
        let ids: Vec<u32> = top.iter().map(|(id, _)| *id).collect();
        let tokens = self.model.ids_to_tokens(&self.tokenizer, &ids)?;
        Ok(tokens
            .into_iter()
            .zip(top.into_iter().map(|(_, prob)| prob))
            .collect())
    }

    /// Returns the device (CPU/GPU) the model is running on.
    pub fn device(&self) -> &candle_core::Device {
        self.model.device()
    }

    fn score_impl(
        &self,
        tokens: &[String],
        policy: CombinationPolicy,
        collect: bool,
        top: usize,
    ) -> Result<(f64, Vec<PositionScore>, usize)> {
        let token_count = tokens.len();
        if token_count < 3 {
            return Err(PipelineError::DegenerateSentence(token_count));
        }

        let ids = self.model.tokens_to_ids(&self.tokenizer, tokens)?;
        if ids.len() != token_count {
            return Err(PipelineError::Tokenization(format!(
                "{} tokens mapped to {} ids",
                token_count,
                ids.len()
            )));
        }
        let mask_id = self.model.mask_token_id(&self.tokenizer)?;

        let interior = token_count - 2;
        let mut variants = Vec::with_capacity(2 * interior);
        for pivot in 1..=interior {
            variants.push(mask(&ids, mask_id, pivot, Direction::Forward)?);
            variants.push(mask(&ids, mask_id, pivot, Direction::Backward)?);
        }

        let distributions = self.model.predict_masked_batch(&variants)?;
        if distributions.len() != variants.len() {
            return Err(PipelineError::OracleContract(format!(
                "model returned {} distributions for {} masked queries",
                distributions.len(),
                variants.len()
            )));
        }

        let mut vocab_size: Option<usize> = None;
        let mut accumulator = DirectionalAccumulator::new(interior);
        let mut positions = Vec::with_capacity(if collect { interior } else { 0 });

        for (pair, pivot) in (1..=interior).enumerate() {
            let forward = &distributions[2 * pair];
            let backward = &distributions[2 * pair + 1];
            vocab_size = Some(check_distribution(forward, vocab_size)?);
            vocab_size = Some(check_distribution(backward, vocab_size)?);

            let true_id = ids[pivot] as usize;
            if true_id >= forward.len() {
                return Err(PipelineError::OracleContract(format!(
                    "true token id {true_id} outside distribution of {} entries",
                    forward.len()
                )));
            }

            let (forward_log10, backward_log10) =
                accumulator.record(forward[true_id] as f64, backward[true_id] as f64);
            tracing::trace!(
                position = pivot,
                token = %tokens[pivot],
                forward_log10,
                backward_log10,
                "scored interior position"
            );

            if collect {
                positions.push(PositionScore {
                    position: pivot,
                    token: tokens[pivot].clone(),
                    forward_log10,
                    backward_log10,
                    forward_variant: variants[2 * pair].clone(),
                    backward_variant: variants[2 * pair + 1].clone(),
                    top_forward: if top > 0 { top_k(forward, top) } else { Vec::new() },
                    top_backward: if top > 0 { top_k(backward, top) } else { Vec::new() },
                });
            }
        }

        let score = match policy {
            CombinationPolicy::Raw => accumulator.raw(),
            CombinationPolicy::LengthAveraged => accumulator.length_averaged(),
            CombinationPolicy::Calibrated => {
                accumulator.raw() / self.calibration.divisor(token_count)
            }
        };
        tracing::debug!(tokens = token_count, %policy, score, "sentence scored");

        Ok((score, positions, variants.len()))
    }
}

fn check_distribution(distribution: &[f32], expected_len: Option<usize>) -> Result<usize> {
    if distribution.is_empty() {
        return Err(PipelineError::OracleContract(
            "model returned an empty distribution".to_string(),
        ));
    }
    if let Some(expected) = expected_len {
        if distribution.len() != expected {
            return Err(PipelineError::OracleContract(format!(
                "distribution length changed from {expected} to {}",
                distribution.len()
            )));
        }
    }
    if distribution.iter().any(|p| *p < 0.0 || !p.is_finite()) {
        return Err(PipelineError::OracleContract(
            "distribution contains negative or non-finite entries".to_string(),
        ));
    }
    let sum: f64 = distribution.iter().map(|p| *p as f64).sum();
    if (sum - 1.0).abs() > DIST_SUM_TOLERANCE {
        return Err(PipelineError::OracleContract(format!(
            "distribution sums to {sum:.6}, expected ~1"
        )));
    }
    Ok(distribution.len())
}
