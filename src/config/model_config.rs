use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigError, SerializableRecord, MODEL_TYPE_KEY};

pub const KEYS_TO_IGNORE_AT_INFERENCE: [&str; 1] = ["past_key_values"];

// Older checkpoints were exported with "gated-gelu" meaning the tanh approximation.
const LEGACY_GATED_GELU: &str = "gated-gelu";
const LEGACY_GATED_GELU_ACT_FN: &str = "gelu_new";

lazy_static! {
    static ref FEED_FORWARD_PROJ_RE: Regex =
        Regex::new("^(gated-)?([^-]+)$").expect("Invalid feed_forward_proj regex");
}

/// The parsed form of `feed_forward_proj`: either `{ACT_FN}` or `gated-{ACT_FN}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedForwardProj {
    pub is_gated_act: bool,
    pub dense_act_fn: String,
}

impl FeedForwardProj {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let Some(captures) = FEED_FORWARD_PROJ_RE.captures(value) else {
            return Err(ConfigError::InvalidActivation {
                value: value.to_string(),
            });
        };
        let is_gated_act = captures.get(1).is_some();
        let dense_act_fn = if value == LEGACY_GATED_GELU {
            LEGACY_GATED_GELU_ACT_FN.to_string()
        } else {
            captures[2].to_string()
        };
        Ok(Self {
            is_gated_act,
            dense_act_fn,
        })
    }
}

/// Named constructor arguments of [Pop2PianoConfig], every one of them defaulted.
///
/// Keys that are not recognized end up in `extra` and are carried along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pop2PianoConfigArgs {
    pub vocab_size: usize,
    pub d_model: usize,
    pub d_kv: usize,
    pub d_ff: usize,
    pub num_layers: usize,
    pub num_decoder_layers: Option<usize>,
    pub num_heads: usize,
    pub relative_attention_num_buckets: usize,
    pub relative_attention_max_distance: usize,
    pub dropout_rate: f64,
    pub layer_norm_epsilon: f64,
    pub initializer_factor: f64,
    pub feed_forward_proj: String,
    pub is_encoder_decoder: bool,
    pub use_cache: bool,
    pub pad_token_id: i64,
    pub eos_token_id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Pop2PianoConfigArgs {
    fn default() -> Self {
        Self {
            vocab_size: 32128,
            d_model: 512,
            d_kv: 64,
            d_ff: 2048,
            num_layers: 6,
            num_decoder_layers: None,
            num_heads: 8,
            relative_attention_num_buckets: 32,
            relative_attention_max_distance: 128,
            dropout_rate: 0.1,
            layer_norm_epsilon: 1e-6,
            initializer_factor: 1.0,
            feed_forward_proj: "relu".to_string(),
            is_encoder_decoder: true,
            use_cache: true,
            pad_token_id: 0,
            eos_token_id: 1,
            extra: Map::new(),
        }
    }
}

/// Architecture hyperparameters of the Pop2Piano encoder-decoder transformer.
///
/// `dense_act_fn` and `is_gated_act` are derived from `feed_forward_proj` when the
/// config is built and cannot be set on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Pop2PianoConfigArgs")]
pub struct Pop2PianoConfig {
    pub vocab_size: usize,
    pub d_model: usize,
    /// Size of the key, query and value projections per head, should be `d_model / num_heads`.
    pub d_kv: usize,
    pub d_ff: usize,
    pub num_layers: usize,
    pub num_decoder_layers: usize,
    pub num_heads: usize,
    pub relative_attention_num_buckets: usize,
    pub relative_attention_max_distance: usize,
    pub dropout_rate: f64,
    pub layer_norm_epsilon: f64,
    /// Only used for initialization testing, should be kept to 1.
    pub initializer_factor: f64,
    pub feed_forward_proj: String,
    dense_act_fn: String,
    is_gated_act: bool,
    pub is_encoder_decoder: bool,
    pub use_cache: bool,
    pub pad_token_id: i64,
    pub eos_token_id: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Pop2PianoConfig {
    pub fn new(mut args: Pop2PianoConfigArgs) -> Result<Self, ConfigError> {
        // Aliased names passed as extra keys are applied last, so they win.
        for (alias, canonical) in Self::ATTRIBUTE_MAP {
            let Some(value) = args.extra.remove(*alias) else {
                continue;
            };
            let value: usize = serde_json::from_value(value)?;
            match *canonical {
                "d_model" => args.d_model = value,
                "num_heads" => args.num_heads = value,
                "num_layers" => args.num_layers = value,
                _ => unreachable!("{canonical} is not an aliased field"),
            }
        }

        let FeedForwardProj {
            is_gated_act,
            dense_act_fn,
        } = FeedForwardProj::parse(&args.feed_forward_proj)?;

        let mut extra = args.extra;
        // A previously saved config carries these, but they are always recomputed.
        extra.remove("dense_act_fn");
        extra.remove("is_gated_act");
        extra.remove(MODEL_TYPE_KEY);

        Ok(Self {
            vocab_size: args.vocab_size,
            d_model: args.d_model,
            d_kv: args.d_kv,
            d_ff: args.d_ff,
            num_layers: args.num_layers,
            num_decoder_layers: args.num_decoder_layers.unwrap_or(args.num_layers),
            num_heads: args.num_heads,
            relative_attention_num_buckets: args.relative_attention_num_buckets,
            relative_attention_max_distance: args.relative_attention_max_distance,
            dropout_rate: args.dropout_rate,
            layer_norm_epsilon: args.layer_norm_epsilon,
            initializer_factor: args.initializer_factor,
            feed_forward_proj: args.feed_forward_proj,
            dense_act_fn,
            is_gated_act,
            is_encoder_decoder: args.is_encoder_decoder,
            use_cache: args.use_cache,
            pad_token_id: args.pad_token_id,
            eos_token_id: args.eos_token_id,
            extra,
        })
    }

    pub fn dense_act_fn(&self) -> &str {
        &self.dense_act_fn
    }

    pub fn is_gated_act(&self) -> bool {
        self.is_gated_act
    }

    pub fn hidden_size(&self) -> usize {
        self.d_model
    }

    pub fn num_attention_heads(&self) -> usize {
        self.num_heads
    }

    pub fn num_hidden_layers(&self) -> usize {
        self.num_layers
    }

    /// Keys that were present in the source document but are not part of this schema.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl Default for Pop2PianoConfig {
    fn default() -> Self {
        Self::new(Pop2PianoConfigArgs::default()).expect("Default feed_forward_proj must be valid")
    }
}

impl TryFrom<Pop2PianoConfigArgs> for Pop2PianoConfig {
    type Error = ConfigError;

    fn try_from(value: Pop2PianoConfigArgs) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl SerializableRecord for Pop2PianoConfig {
    const MODEL_TYPE: &'static str = "pop2piano";
    const FILE_NAME: &'static str = "config.json";
    const ATTRIBUTE_MAP: &'static [(&'static str, &'static str)] = &[
        ("hidden_size", "d_model"),
        ("num_attention_heads", "num_heads"),
        ("num_hidden_layers", "num_layers"),
    ];

    fn from_document(document: Map<String, Value>) -> Result<Self, ConfigError> {
        let args: Pop2PianoConfigArgs = serde_json::from_value(Value::Object(document))?;
        Self::new(args)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn with_proj(feed_forward_proj: &str) -> Result<Pop2PianoConfig, ConfigError> {
        Pop2PianoConfig::new(Pop2PianoConfigArgs {
            feed_forward_proj: feed_forward_proj.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn plain_activation_is_not_gated() -> Result<(), ConfigError> {
        for act in ["relu", "gelu", "gelu_new", "silu", "relu6", "gated", "GELU"] {
            let config = with_proj(act)?;
            assert!(!config.is_gated_act());
            assert_eq!(config.dense_act_fn(), act);
        }
        Ok(())
    }

    #[test]
    fn gated_activation_strips_prefix() -> Result<(), ConfigError> {
        let config = with_proj("gated-silu")?;
        assert!(config.is_gated_act());
        assert_eq!(config.dense_act_fn(), "silu");

        let config = with_proj("gated-relu")?;
        assert!(config.is_gated_act());
        assert_eq!(config.dense_act_fn(), "relu");
        Ok(())
    }

    #[test]
    fn gated_gelu_maps_to_gelu_new() -> Result<(), ConfigError> {
        let config = with_proj("gated-gelu")?;
        assert!(config.is_gated_act());
        assert_eq!(config.dense_act_fn(), "gelu_new");
        // The original value is kept as is.
        assert_eq!(config.feed_forward_proj, "gated-gelu");
        Ok(())
    }

    #[test]
    fn malformed_activation_is_rejected() {
        for value in ["gated-relu-extra", "foo-bar", "a-b-c", "gated-", "-relu", ""] {
            match with_proj(value) {
                Err(ConfigError::InvalidActivation { value: v }) => assert_eq!(v, value),
                other => panic!("expected InvalidActivation for {value:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_activation_message_names_value_and_formats() {
        let err = with_proj("foo-bar").unwrap_err().to_string();
        assert!(err.contains("foo-bar"));
        assert!(err.contains("`gated-{ACT_FN}`"));
        assert!(err.contains("`{ACT_FN}`"));
    }

    #[test]
    fn decoder_layers_default_to_encoder_layers() -> Result<(), ConfigError> {
        let config = Pop2PianoConfig::new(Pop2PianoConfigArgs {
            num_layers: 4,
            ..Default::default()
        })?;
        assert_eq!(config.num_decoder_layers, 4);

        let config = Pop2PianoConfig::new(Pop2PianoConfigArgs {
            num_layers: 4,
            num_decoder_layers: Some(2),
            ..Default::default()
        })?;
        assert_eq!(config.num_layers, 4);
        assert_eq!(config.num_decoder_layers, 2);
        Ok(())
    }

    #[test]
    fn default_matches_constructed_default() -> Result<(), ConfigError> {
        let built = Pop2PianoConfig::new(Pop2PianoConfigArgs::default())?;
        let default = Pop2PianoConfig::default();
        assert_eq!(built, default);
        assert_eq!(default.vocab_size, 32128);
        assert_eq!(default.d_model, 512);
        assert_eq!(default.num_decoder_layers, 6);
        assert_eq!(default.layer_norm_epsilon, 1e-6);
        assert_eq!(default.dense_act_fn(), "relu");
        assert!(default.use_cache);
        assert!(default.is_encoder_decoder);
        assert_eq!(default.pad_token_id, 0);
        assert_eq!(default.eos_token_id, 1);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_kept() -> Result<(), ConfigError> {
        let config = Pop2PianoConfig::from_json_value(json!({
            "architectures": ["Pop2PianoForConditionalGeneration"],
            "d_model": 256,
        }))?;
        assert_eq!(config.d_model, 256);
        assert_eq!(
            config.extra().get("architectures"),
            Some(&json!(["Pop2PianoForConditionalGeneration"]))
        );
        Ok(())
    }

    #[test]
    fn aliases_in_extra_keys_set_the_canonical_field() -> Result<(), ConfigError> {
        let config = Pop2PianoConfig::new(Pop2PianoConfigArgs {
            num_layers: 2,
            extra: Map::from_iter([
                ("hidden_size".to_string(), json!(1024)),
                ("num_attention_heads".to_string(), json!(16)),
                ("num_hidden_layers".to_string(), json!(4)),
            ]),
            ..Default::default()
        })?;
        assert_eq!(config.d_model, 1024);
        assert_eq!(config.num_heads, 16);
        assert_eq!(config.num_layers, 4);
        assert_eq!(config.num_decoder_layers, 4);
        assert!(config.extra().is_empty());
        assert_eq!(config.get("hidden_size"), Some(json!(1024)));

        let reloaded = Pop2PianoConfig::from_json_str(&config.to_json_string()?)?;
        assert_eq!(reloaded, config);
        Ok(())
    }

    #[test]
    fn round_trips_through_json() -> Result<(), ConfigError> {
        let config = Pop2PianoConfig::new(Pop2PianoConfigArgs {
            d_model: 768,
            num_heads: 12,
            num_decoder_layers: Some(3),
            dropout_rate: 0.25,
            feed_forward_proj: "gated-gelu".to_string(),
            extra: Map::from_iter([("transformers_version".to_string(), json!("4.31.0"))]),
            ..Default::default()
        })?;

        let s = config.to_json_string()?;
        let parsed = Pop2PianoConfig::from_json_str(&s)?;
        assert_eq!(parsed, config);
        assert!(parsed.extra().get("dense_act_fn").is_none());

        // Plain serde goes through the same validation.
        let parsed: Pop2PianoConfig = serde_json::from_str(&serde_json::to_string(&config)?)?;
        assert_eq!(parsed, config);
        Ok(())
    }

    #[test]
    fn serde_deserialization_validates() {
        let result = serde_json::from_value::<Pop2PianoConfig>(json!({
            "feed_forward_proj": "gated-relu-extra"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn dumped_document_has_every_attribute() -> Result<(), ConfigError> {
        let Value::Object(document) = Pop2PianoConfig::default().to_json_value()? else {
            panic!("expected an object");
        };
        for key in [
            "vocab_size",
            "d_model",
            "d_kv",
            "d_ff",
            "num_layers",
            "num_decoder_layers",
            "num_heads",
            "relative_attention_num_buckets",
            "relative_attention_max_distance",
            "dropout_rate",
            "layer_norm_epsilon",
            "initializer_factor",
            "feed_forward_proj",
            "dense_act_fn",
            "is_gated_act",
            "is_encoder_decoder",
            "use_cache",
            "pad_token_id",
            "eos_token_id",
            "model_type",
        ] {
            assert!(document.contains_key(key), "missing {key}");
        }
        assert_eq!(document["model_type"], json!("pop2piano"));
        Ok(())
    }
}
