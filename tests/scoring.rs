use candle_core::Device;
use candle_sentence_prob::error::{PipelineError, Result};
use candle_sentence_prob::sentence_prob::{
    CalibrationTable, CombinationPolicy, MaskedLanguageModel, ModelOptions, SentenceProbPipeline,
    SentenceProbPipelineBuilder,
};
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::Tokenizer;

const VOCAB: &[&str] = &[
    "[CLS]", "[SEP]", "[MASK]", "the", "cat", "sat", "on", "mat", "dog", "ran",
];
const MASK_ID: u32 = 2;

/// What distribution the fake model hands back for every masked query.
#[derive(Debug, Clone)]
enum Behavior {
    /// Uniform over the whole vocabulary.
    Uniform,
    /// `prob` on the true token of the configured sentence, rest spread evenly.
    TruePeak { sentence_ids: Vec<u32>, prob: f32 },
    /// Half the probability mass is missing.
    BadMass,
}

#[derive(Debug, Clone)]
struct MockOptions {
    // Cache keys are process-wide; a per-test name keeps models independent.
    name: &'static str,
    behavior: Behavior,
}

impl ModelOptions for MockOptions {
    fn cache_key(&self) -> String {
        self.name.to_string()
    }
}

#[derive(Clone)]
struct MockOracle {
    behavior: Behavior,
    device: Device,
}

impl MaskedLanguageModel for MockOracle {
    type Options = MockOptions;

    fn new(options: Self::Options, device: Device) -> Result<Self> {
        Ok(Self {
            behavior: options.behavior,
            device,
        })
    }

    fn tokenize(&self, _tokenizer: &Tokenizer, text: &str) -> Result<Vec<String>> {
        let mut tokens = vec!["[CLS]".to_string()];
        tokens.extend(text.split_whitespace().map(|word| word.to_lowercase()));
        tokens.push("[SEP]".to_string());
        Ok(tokens)
    }

    fn tokens_to_ids(&self, _tokenizer: &Tokenizer, tokens: &[String]) -> Result<Vec<u32>> {
        tokens
            .iter()
            .map(|token| {
                VOCAB
                    .iter()
                    .position(|v| *v == token.as_str())
                    .map(|i| i as u32)
                    .ok_or_else(|| {
                        PipelineError::Tokenization(format!("token '{token}' not in vocabulary"))
                    })
            })
            .collect()
    }

    fn ids_to_tokens(&self, _tokenizer: &Tokenizer, ids: &[u32]) -> Result<Vec<String>> {
        ids.iter()
            .map(|&id| {
                VOCAB
                    .get(id as usize)
                    .map(|v| v.to_string())
                    .ok_or_else(|| {
                        PipelineError::Tokenization(format!("id {id} not in vocabulary"))
                    })
            })
            .collect()
    }

    fn mask_token_id(&self, _tokenizer: &Tokenizer) -> Result<u32> {
        Ok(MASK_ID)
    }

    fn predict_masked(&self, _ids: &[u32], position: usize) -> Result<Vec<f32>> {
        let vocab_size = VOCAB.len();
        match &self.behavior {
            Behavior::Uniform => Ok(vec![1.0 / vocab_size as f32; vocab_size]),
            Behavior::TruePeak { sentence_ids, prob } => {
                let rest = (1.0 - prob) / (vocab_size - 1) as f32;
                let mut distribution = vec![rest; vocab_size];
                distribution[sentence_ids[position] as usize] = *prob;
                Ok(distribution)
            }
            Behavior::BadMass => Ok(vec![0.5 / vocab_size as f32; vocab_size]),
        }
    }

    fn get_tokenizer(_options: Self::Options) -> Result<Tokenizer> {
        // The mock resolves tokens itself; the pipeline just needs a tokenizer value.
        Ok(Tokenizer::new(WordLevel::default()))
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

fn build(name: &'static str, behavior: Behavior) -> SentenceProbPipeline<MockOracle> {
    SentenceProbPipelineBuilder::<MockOracle>::custom(MockOptions { name, behavior })
        .build()
        .unwrap()
}

fn ids_of(tokens: &[&str]) -> Vec<u32> {
    tokens
        .iter()
        .map(|t| VOCAB.iter().position(|v| v == t).unwrap() as u32)
        .collect()
}

// f32 distributions round-trip through f64 log arithmetic; 1e-7 absorbs the
// representation error of values like 1/10 without hiding real mistakes.
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-7
}

#[test]
fn uniform_oracle_matches_closed_form() -> Result<()> {
    let pipeline = build("uniform-closed-form", Behavior::Uniform);

    // 5 interior tokens, uniform probability 1/10 each, both directions:
    // raw = 10^(0.5*(5*log10(0.1) + 5*log10(0.1))) = 0.1^5.
    let output = pipeline.run("the cat sat on mat", CombinationPolicy::Raw)?;
    assert!(close(output.score, 0.1f64.powi(5)));
    assert_eq!(output.stats.positions_scored, 5);
    assert_eq!(output.stats.oracle_queries, 10);

    // Dampening by 1/N collapses a uniform product back to the single-token
    // probability regardless of sentence length.
    let output = pipeline.run("the cat sat on mat", CombinationPolicy::LengthAveraged)?;
    assert!(close(output.score, 0.1));
    Ok(())
}

#[test]
fn fixed_half_probability_sentence_scores_an_eighth() -> Result<()> {
    let sentence_ids = ids_of(&["[CLS]", "the", "cat", "sat", "[SEP]"]);
    let pipeline = build(
        "true-peak-eighth",
        Behavior::TruePeak {
            sentence_ids,
            prob: 0.5,
        },
    );

    let output = pipeline.run("the cat sat", CombinationPolicy::Raw)?;
    assert!(close(output.score, 0.125));

    let output = pipeline.run("the cat sat", CombinationPolicy::LengthAveraged)?;
    assert!(close(output.score, 0.5));
    Ok(())
}

#[test]
fn degenerate_input_is_an_error_not_a_score() {
    let pipeline = build("degenerate", Behavior::Uniform);

    let err = pipeline.run("", CombinationPolicy::Raw).unwrap_err();
    assert!(matches!(err, PipelineError::DegenerateSentence(2)));

    let boundary_only = vec!["[CLS]".to_string(), "[SEP]".to_string()];
    let err = pipeline
        .score_tokens(&boundary_only, CombinationPolicy::Raw)
        .unwrap_err();
    assert!(matches!(err, PipelineError::DegenerateSentence(2)));
}

#[test]
fn missing_calibration_entry_falls_back_to_raw() -> Result<()> {
    let mut pipeline = build("missing-calibration", Behavior::Uniform);
    pipeline.set_calibration(CalibrationTable::from_entries([(5, 0.125)]));

    // Length-7 sentence against a table that only covers length 5.
    let raw = pipeline.run("the cat sat on mat", CombinationPolicy::Raw)?.score;
    let calibrated = pipeline
        .run("the cat sat on mat", CombinationPolicy::Calibrated)?
        .score;
    assert!(close(calibrated, raw));

    // The covered length actually divides.
    let calibrated = pipeline
        .run("the cat sat", CombinationPolicy::Calibrated)?
        .score;
    let raw = pipeline.run("the cat sat", CombinationPolicy::Raw)?.score;
    assert!(close(calibrated, raw / 0.125));
    Ok(())
}

#[test]
fn calibration_round_trip_normalizes_to_one() -> Result<()> {
    let mut pipeline = build("calibration-round-trip", Behavior::Uniform);

    // Single-sentence corpus: the divisor for its length equals its own raw
    // score, so the calibrated score is 1.
    let table = pipeline.calibrate(["the cat sat"])?;
    assert_eq!(table.len(), 1);
    assert!(table.get(5).is_some());

    pipeline.set_calibration(table);
    let output = pipeline.run("the cat sat", CombinationPolicy::Calibrated)?;
    assert!(close(output.score, 1.0));
    Ok(())
}

#[test]
fn calibration_buckets_by_length_and_skips_blank_lines() -> Result<()> {
    let pipeline = build("calibration-buckets", Behavior::Uniform);

    let table = pipeline.calibrate(["the cat sat", "", "   ", "the cat sat on mat"])?;
    assert_eq!(table.lengths().collect::<Vec<_>>(), vec![5, 7]);
    assert!(close(table.get(5).unwrap(), 0.1f64.powi(3)));
    assert!(close(table.get(7).unwrap(), 0.1f64.powi(5)));

    let empty = pipeline.calibrate(Vec::<&str>::new())?;
    assert!(empty.is_empty());
    Ok(())
}

#[test]
fn scoring_is_idempotent() -> Result<()> {
    let pipeline = build("idempotent", Behavior::Uniform);

    let first = pipeline.run("the cat sat on mat", CombinationPolicy::Raw)?;
    let second = pipeline.run("the cat sat on mat", CombinationPolicy::Raw)?;
    assert_eq!(first.score.to_bits(), second.score.to_bits());
    Ok(())
}

#[test]
fn malformed_distribution_is_a_contract_violation() {
    let pipeline = build("bad-mass", Behavior::BadMass);

    let err = pipeline.run("the cat sat", CombinationPolicy::Raw).unwrap_err();
    assert!(matches!(err, PipelineError::OracleContract(_)));
}

#[test]
fn detailed_output_exposes_variants_logs_and_top_k() -> Result<()> {
    let sentence_ids = ids_of(&["[CLS]", "the", "cat", "sat", "[SEP]"]);
    let pipeline = build(
        "detailed-output",
        Behavior::TruePeak {
            sentence_ids: sentence_ids.clone(),
            prob: 0.5,
        },
    );

    let output = pipeline.run_detailed("the cat sat", CombinationPolicy::Raw, 2)?;
    assert!(close(output.score, 0.125));
    assert_eq!(output.tokens.len(), 5);
    assert_eq!(output.positions.len(), 3);

    let first = &output.positions[0];
    assert_eq!(first.position, 1);
    assert_eq!(first.token, "the");
    // Forward masks the pivot and everything right of it except the end
    // marker; backward masks from just after the begin marker through the pivot.
    assert_eq!(
        first.forward_variant.ids,
        vec![sentence_ids[0], MASK_ID, MASK_ID, MASK_ID, sentence_ids[4]]
    );
    assert_eq!(
        first.backward_variant.ids,
        vec![
            sentence_ids[0],
            MASK_ID,
            sentence_ids[2],
            sentence_ids[3],
            sentence_ids[4]
        ]
    );

    // log10(0.5) in both directions for every position.
    let expected_log = 0.5f64.log10();
    for position in &output.positions {
        assert!(close(position.forward_log10, expected_log));
        assert!(close(position.backward_log10, expected_log));
    }

    // The true token leads the top-k list in both directions.
    assert_eq!(first.top_forward.len(), 2);
    assert_eq!(first.top_forward[0], (sentence_ids[1], 0.5));
    assert_eq!(first.top_backward[0], (sentence_ids[1], 0.5));

    // Top-k is omitted when not requested.
    let output = pipeline.run_detailed("the cat sat", CombinationPolicy::Raw, 0)?;
    assert!(output.positions[0].top_forward.is_empty());
    Ok(())
}

#[test]
fn top_k_tokens_maps_ids_to_strings() -> Result<()> {
    let pipeline = build("top-k-tokens", Behavior::Uniform);

    let mut distribution = vec![0.0f32; VOCAB.len()];
    distribution[3] = 0.7; // "the"
    distribution[4] = 0.3; // "cat"
    let top = pipeline.top_k_tokens(&distribution, 2)?;
    assert_eq!(top, vec![("the".to_string(), 0.7), ("cat".to_string(), 0.3)]);
    Ok(())
}
