use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::classification::ProblemType;
use crate::error::{Error, ErrorDetails};

pub const DEFAULT_MODEL_NAME: &str = "lxyuan/distilbert-base-multilingual-cased-sentiments-student";
pub const DEFAULT_MODEL_REVISION: &str = "main";
/// Smallest usable `max_sequence_length`: a text pair alone takes three special tokens.
const MIN_SEQUENCE_LENGTH: usize = 3;

/// Top-level gateway configuration, usually read from a TOML file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind_address: Option<SocketAddr>,
    #[serde(default)]
    pub debug: bool,
}

/// Which classifier backs the gateway.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClassifierConfig {
    Candle(CandleClassifierConfig),
    Dummy(DummyClassifierConfig),
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::Candle(CandleClassifierConfig::default())
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CandleClassifierConfig {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_model_revision")]
    pub revision: String,
    /// Read `config.json`, `tokenizer.json` and the weights from this directory instead of the hub.
    pub local_dir: Option<PathBuf>,
    /// Defaults to the model's `max_position_embeddings`.
    pub max_sequence_length: Option<usize>,
}

impl Default for CandleClassifierConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            revision: default_model_revision(),
            local_dir: None,
            max_sequence_length: None,
        }
    }
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_model_revision() -> String {
    DEFAULT_MODEL_REVISION.to_string()
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DummyClassifierConfig {
    #[serde(default = "default_dummy_model_name")]
    pub model_name: String,
    #[serde(default = "default_dummy_labels")]
    pub labels: Vec<String>,
    pub problem_type: Option<ProblemType>,
}

impl Default for DummyClassifierConfig {
    fn default() -> Self {
        Self {
            model_name: default_dummy_model_name(),
            labels: default_dummy_labels(),
            problem_type: None,
        }
    }
}

fn default_dummy_model_name() -> String {
    "dummy".to_string()
}

fn default_dummy_labels() -> Vec<String> {
    vec![
        "positive".to_string(),
        "neutral".to_string(),
        "negative".to_string(),
    ]
}

impl Config {
    pub async fn load_and_verify_from_path(path: &Path) -> Result<Self, Error> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file `{}`: {e}", path.display()),
            })
        })?;
        Self::load_and_verify_from_str(&contents).map_err(|e| {
            Error::new_without_logging(ErrorDetails::Config {
                message: format!("Invalid config file `{}`: {e}", path.display()),
            })
        })
    }

    pub fn load_and_verify_from_str(contents: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to parse config: {e}"),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        match &self.classifier {
            ClassifierConfig::Candle(candle) => {
                if candle.model_name.trim().is_empty() {
                    return Err(Error::new(ErrorDetails::Config {
                        message: "`classifier.model_name` must not be empty".to_string(),
                    }));
                }
                if let Some(max) = candle.max_sequence_length {
                    if max < MIN_SEQUENCE_LENGTH {
                        return Err(Error::new(ErrorDetails::Config {
                            message: format!(
                                "`classifier.max_sequence_length` must be at least {MIN_SEQUENCE_LENGTH}, got {max}"
                            ),
                        }));
                    }
                }
            }
            ClassifierConfig::Dummy(dummy) => {
                if dummy.labels.is_empty() {
                    return Err(Error::new(ErrorDetails::Config {
                        message: "`classifier.labels` must contain at least one label"
                            .to_string(),
                    }));
                }
            }
        }
        Ok(())
    }
}
