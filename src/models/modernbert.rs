use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{ops::softmax, VarBuilder};
use candle_transformers::models::modernbert::{Config, ModernBertForMaskedLM};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::Tokenizer;

use crate::error::{PipelineError, Result};
use crate::pipelines::sentence_prob::masking::MaskedVariant;
use crate::pipelines::sentence_prob::model::MaskedLanguageModel;

const MASK_TOKEN: &str = "[MASK]";

/// Available ModernBERT model sizes.
#[derive(Debug, Clone, Copy)]
pub enum ModernBertSize {
    /// Base model (~150M parameters).
    Base,
    /// Large model (~400M parameters).
    Large,
}

impl ModernBertSize {
    fn model_id(&self) -> &'static str {
        match self {
            ModernBertSize::Base => "answerdotai/ModernBERT-base",
            ModernBertSize::Large => "answerdotai/ModernBERT-large",
        }
    }
}

impl std::fmt::Display for ModernBertSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModernBertSize::Base => "modernbert-base",
            ModernBertSize::Large => "modernbert-large",
        };
        write!(f, "{name}")
    }
}

impl crate::pipelines::cache::ModelOptions for ModernBertSize {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

/// ModernBERT masked-LM backend for the sentence probability pipeline.
#[derive(Clone)]
pub struct ModernBertMaskedLM {
    model: ModernBertForMaskedLM,
    device: Device,
}

impl ModernBertMaskedLM {
    /// Downloads (or reuses) the weights for `size` and loads them onto
    /// `device`.
    pub fn new(size: ModernBertSize, device: Device) -> Result<Self> {
        let (config, vb) = load_model_weights(size.model_id(), &device)?;
        let model = ModernBertForMaskedLM::load(vb, &config)?;

        Ok(Self { model, device })
    }

    /// Returns the device (CPU/GPU) the model is running on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn forward_softmax_rows(
        &self,
        ids: Vec<u32>,
        rows: usize,
        row_len: usize,
        positions: impl Iterator<Item = usize>,
    ) -> Result<Vec<Vec<f32>>> {
        let input_ids = Tensor::from_vec(ids, (rows, row_len), &self.device)?;
        let attention_mask = Tensor::ones((rows, row_len), DType::U32, &self.device)?;

        let logits = self.model.forward(&input_ids, &attention_mask)?;

        let mut distributions = Vec::with_capacity(rows);
        for (row, position) in positions.enumerate() {
            let position_logits = logits.i((row, position, ..))?;
            let probs = softmax(&position_logits, D::Minus1)?;
            distributions.push(probs.to_vec1::<f32>()?);
        }
        Ok(distributions)
    }
}

impl MaskedLanguageModel for ModernBertMaskedLM {
    type Options = ModernBertSize;

    fn new(options: Self::Options, device: Device) -> Result<Self> {
        ModernBertMaskedLM::new(options, device)
    }

    fn tokenize(&self, tokenizer: &Tokenizer, text: &str) -> Result<Vec<String>> {
        let encoding = tokenizer.encode(text, true).map_err(|e| {
            PipelineError::Tokenization(format!(
                "Tokenization failed on '{}': {}",
                &text.chars().take(50).collect::<String>(),
                e
            ))
        })?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn tokens_to_ids(&self, tokenizer: &Tokenizer, tokens: &[String]) -> Result<Vec<u32>> {
        tokens
            .iter()
            .map(|token| {
                tokenizer.token_to_id(token).ok_or_else(|| {
                    PipelineError::Tokenization(format!("token '{token}' not in vocabulary"))
                })
            })
            .collect()
    }

    fn ids_to_tokens(&self, tokenizer: &Tokenizer, ids: &[u32]) -> Result<Vec<String>> {
        ids.iter()
            .map(|&id| {
                tokenizer.id_to_token(id).ok_or_else(|| {
                    PipelineError::Tokenization(format!("id {id} not in vocabulary"))
                })
            })
            .collect()
    }

    fn mask_token_id(&self, tokenizer: &Tokenizer) -> Result<u32> {
        tokenizer.token_to_id(MASK_TOKEN).ok_or_else(|| {
            PipelineError::Tokenization(format!("tokenizer has no '{MASK_TOKEN}' token"))
        })
    }

    fn predict_masked(&self, ids: &[u32], position: usize) -> Result<Vec<f32>> {
        if position >= ids.len() {
            return Err(PipelineError::Unexpected(format!(
                "masked position {position} outside sequence of {} tokens",
                ids.len()
            )));
        }
        let mut distributions =
            self.forward_softmax_rows(ids.to_vec(), 1, ids.len(), std::iter::once(position))?;
        Ok(distributions.pop().unwrap_or_default())
    }

    fn predict_masked_batch(&self, variants: &[MaskedVariant]) -> Result<Vec<Vec<f32>>> {
        if variants.is_empty() {
            return Ok(vec![]);
        }

        // All variants of one sentence share a length and can stack into a
        // single forward pass; fall back to per-query passes otherwise.
        let row_len = variants[0].ids.len();
        if variants.iter().any(|v| v.ids.len() != row_len) {
            return variants
                .iter()
                .map(|v| self.predict_masked(&v.ids, v.pivot))
                .collect();
        }

        let mut all_ids = Vec::with_capacity(variants.len() * row_len);
        for variant in variants {
            all_ids.extend_from_slice(&variant.ids);
        }

        self.forward_softmax_rows(
            all_ids,
            variants.len(),
            row_len,
            variants.iter().map(|v| v.pivot),
        )
    }

    fn get_tokenizer(options: Self::Options) -> Result<Tokenizer> {
        load_tokenizer(options.model_id())
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

fn load_tokenizer(repo_id: &str) -> Result<Tokenizer> {
    let api = Api::new()?;
    let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));
    let tokenizer_path = repo.get("tokenizer.json")?;
    let path_str = tokenizer_path.display().to_string();
    Tokenizer::from_file(&tokenizer_path).map_err(|e| {
        PipelineError::Tokenization(format!(
            "Failed to load tokenizer from '{}': {}",
            path_str, e
        ))
    })
}

fn load_model_weights(repo_id: &str, device: &Device) -> Result<(Config, VarBuilder<'static>)> {
    let api = Api::new()?;
    let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

    let config_path = repo.get("config.json")?;
    let weights_path = repo
        .get("model.safetensors")
        .or_else(|_| repo.get("pytorch_model.bin"))?;

    let config: Config = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

    let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
        unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? }
    } else {
        VarBuilder::from_pth(&weights_path, DType::F32, device)?
    };

    Ok((config, vb))
}
