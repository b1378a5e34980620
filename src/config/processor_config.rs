use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::composer::composer_to_feature_token;
use crate::config::{ComposerTokens, ConfigError, SerializableRecord};

// NOTE: none of these values are bounds checked, a negative vocabulary size
// is stored as given.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub target_length: i64,
    pub input_length: i64,
    pub n_bars: i64,
    pub sample_rate: i64,
    pub use_mel: bool,
    pub mel_is_conditioned: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_length: 256,
            input_length: 1024,
            n_bars: 2,
            sample_rate: 22050,
            use_mel: true,
            mel_is_conditioned: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabSize {
    pub special: i64,
    pub note: i64,
    pub velocity: i64,
    pub time: i64,
}

impl Default for VocabSize {
    fn default() -> Self {
        Self {
            special: 4,
            note: 128,
            velocity: 2,
            time: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub vocab_size: VocabSize,
}

/// Flat overrides accepted when building a [Pop2PianoProcessorConfig].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfigOverrides {
    pub vocab_size_special: Option<i64>,
    pub vocab_size_note: Option<i64>,
    pub vocab_size_velocity: Option<i64>,
    pub vocab_size_time: Option<i64>,
    pub dataset_target_length: Option<i64>,
    pub dataset_input_length: Option<i64>,
    pub dataset_n_bars: Option<i64>,
    pub dataset_sample_rate: Option<i64>,
    pub dataset_use_mel: Option<bool>,
    pub dataset_mel_is_conditioned: Option<bool>,
}

/// Preprocessing parameters of the Pop2Piano processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pop2PianoProcessorConfig {
    // Not configurable, a loaded document always binds the process-wide table.
    #[serde(skip_deserializing, default = "composer_to_feature_token")]
    pub composer_to_feature_token: &'static ComposerTokens,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
}

impl Pop2PianoProcessorConfig {
    pub fn new(overrides: ProcessorConfigOverrides) -> Self {
        Self {
            composer_to_feature_token: composer_to_feature_token(),
            dataset: DatasetConfig::default(),
            tokenizer: TokenizerConfig::default(),
        }
        .with_overrides(overrides)
    }

    /// Returns a copy where every override that is set replaces the current value.
    pub fn with_overrides(mut self, overrides: ProcessorConfigOverrides) -> Self {
        let vocab_size = &mut self.tokenizer.vocab_size;
        vocab_size.special = overrides.vocab_size_special.unwrap_or(vocab_size.special);
        vocab_size.note = overrides.vocab_size_note.unwrap_or(vocab_size.note);
        vocab_size.velocity = overrides.vocab_size_velocity.unwrap_or(vocab_size.velocity);
        vocab_size.time = overrides.vocab_size_time.unwrap_or(vocab_size.time);

        let dataset = &mut self.dataset;
        dataset.target_length = overrides
            .dataset_target_length
            .unwrap_or(dataset.target_length);
        dataset.input_length = overrides.dataset_input_length.unwrap_or(dataset.input_length);
        dataset.n_bars = overrides.dataset_n_bars.unwrap_or(dataset.n_bars);
        dataset.sample_rate = overrides.dataset_sample_rate.unwrap_or(dataset.sample_rate);
        dataset.use_mel = overrides.dataset_use_mel.unwrap_or(dataset.use_mel);
        dataset.mel_is_conditioned = overrides
            .dataset_mel_is_conditioned
            .unwrap_or(dataset.mel_is_conditioned);
        self
    }

    pub fn composer_token(&self, composer: &str) -> Option<i64> {
        self.composer_to_feature_token.get(composer)
    }
}

impl Default for Pop2PianoProcessorConfig {
    fn default() -> Self {
        Self::new(ProcessorConfigOverrides::default())
    }
}

impl SerializableRecord for Pop2PianoProcessorConfig {
    const MODEL_TYPE: &'static str = "pop2piano_processor";
    const FILE_NAME: &'static str = "processor_config.json";

    /// Accepts both the nested form written by a dump and the flat constructor names,
    /// the flat ones being applied on top.
    fn from_document(document: Map<String, Value>) -> Result<Self, ConfigError> {
        let overrides: ProcessorConfigOverrides =
            serde_json::from_value(Value::Object(document.clone()))?;
        let config: Self = serde_json::from_value(Value::Object(document))?;
        Ok(config.with_overrides(overrides))
    }
}
