use super::calibration::CalibrationTable;
use super::model::MaskedLanguageModel;
use super::pipeline::SentenceProbPipeline;
use crate::error::Result;
use crate::pipelines::cache::{global_cache, ModelOptions};
use crate::pipelines::utils::{build_cache_key, DeviceRequest};

crate::pipelines::utils::impl_device_methods!(direct: SentenceProbPipelineBuilder<M: MaskedLanguageModel>);

/// Builder for creating [`SentenceProbPipeline`] instances.
///
/// Use [`Self::modernbert`] as the entry point for the bundled backend, or
/// [`Self::custom`] for any other [`MaskedLanguageModel`] implementation.
///
/// # Examples
///
/// ```rust,no_run
/// # use candle_sentence_prob::sentence_prob::{ModernBertSize, SentenceProbPipelineBuilder};
/// # fn main() -> candle_sentence_prob::error::Result<()> {
/// let pipeline = SentenceProbPipelineBuilder::modernbert(ModernBertSize::Base)
///     .cuda(0)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SentenceProbPipelineBuilder<M: MaskedLanguageModel> {
    options: M::Options,
    device_request: DeviceRequest,
    calibration: Option<CalibrationTable>,
}

impl<M: MaskedLanguageModel> SentenceProbPipelineBuilder<M> {
    /// Creates a builder for any model implementing [`MaskedLanguageModel`].
    pub fn custom(options: M::Options) -> Self {
        Self {
            options,
            device_request: DeviceRequest::Cpu,
            calibration: None,
        }
    }

    /// Attaches a calibration table for [`CombinationPolicy::Calibrated`]
    /// scoring.
    ///
    /// Without one the pipeline starts with an empty table, and calibrated
    /// scores fall back to the neutral divisor for every length.
    ///
    /// [`CombinationPolicy::Calibrated`]: super::CombinationPolicy::Calibrated
    pub fn calibration(mut self, table: CalibrationTable) -> Self {
        self.calibration = Some(table);
        self
    }

    /// Builds the pipeline with configured settings.
    ///
    /// Model weights are shared through the crate-wide cache: building twice
    /// with the same options and device reuses the already-loaded model.
    ///
    /// # Errors
    ///
    /// Returns an error if model loading or device initialization fails.
    pub fn build(self) -> Result<SentenceProbPipeline<M>>
    where
        M: Clone + Send + Sync + 'static,
        M::Options: ModelOptions + Clone,
    {
        let device = self.device_request.clone().resolve()?;
        let key = build_cache_key(&self.options, &device);

        let model =
            global_cache().get_or_create(&key, || M::new(self.options.clone(), device.clone()))?;
        let tokenizer = M::get_tokenizer(self.options)?;

        Ok(SentenceProbPipeline {
            model: (*model).clone(),
            tokenizer,
            calibration: self.calibration.unwrap_or_default(),
        })
    }
}

impl SentenceProbPipelineBuilder<super::SentenceProbModernBert> {
    /// Creates a builder for a ModernBERT masked-LM backend.
    pub fn modernbert(size: crate::models::ModernBertSize) -> Self {
        Self::custom(size)
    }
}
