use super::masking::MaskedVariant;
use crate::error::Result;
use tokenizers::Tokenizer;

/// A pretrained masked language model usable as the scoring oracle.
///
/// The pipeline only ever talks to the model through this interface, so any
/// backend — local or remote, CPU or GPU — can stand in, including
/// deterministic fakes in tests (see
/// [`SentenceProbPipelineBuilder::custom`](super::SentenceProbPipelineBuilder::custom)).
/// Implementations are expected to be stateless per query: repeating a call
/// with the same inputs yields the same distribution.
pub trait MaskedLanguageModel {
    /// Backend-specific configuration selecting which weights to load.
    type Options: std::fmt::Debug + Clone;

    /// Loads the model onto `device`.
    fn new(options: Self::Options, device: candle_core::Device) -> Result<Self>
    where
        Self: Sized;

    /// Token strings for `text`, bounded by the model's begin and end markers.
    fn tokenize(&self, tokenizer: &Tokenizer, text: &str) -> Result<Vec<String>>;

    /// Vocabulary ids for `tokens`, in order.
    fn tokens_to_ids(&self, tokenizer: &Tokenizer, tokens: &[String]) -> Result<Vec<u32>>;

    /// Token strings for `ids`, in order. Used for diagnostics output.
    fn ids_to_tokens(&self, tokenizer: &Tokenizer, ids: &[u32]) -> Result<Vec<String>>;

    /// Vocabulary id of the mask marker token.
    fn mask_token_id(&self, tokenizer: &Tokenizer) -> Result<u32>;

    /// Probability distribution over the vocabulary at `position` in `ids`.
    ///
    /// The returned vector must be non-negative and sum to ~1; the pipeline
    /// verifies this and rejects violations.
    fn predict_masked(&self, ids: &[u32], position: usize) -> Result<Vec<f32>>;

    /// Distributions for a batch of masked variants, one per variant in order.
    ///
    /// The default runs the queries sequentially; backends that can stack the
    /// variants into a single forward pass should override this.
    fn predict_masked_batch(&self, variants: &[MaskedVariant]) -> Result<Vec<Vec<f32>>> {
        variants
            .iter()
            .map(|variant| self.predict_masked(&variant.ids, variant.pivot))
            .collect()
    }

    /// Loads the tokenizer paired with this model's weights.
    fn get_tokenizer(options: Self::Options) -> Result<Tokenizer>;

    /// The device the model is running on.
    fn device(&self) -> &candle_core::Device;
}
