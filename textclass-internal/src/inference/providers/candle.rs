use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use crate::classification::{
    postprocess, ClassificationInput, ClassificationOptions, ClassificationOutput, InputItem,
    ProblemType, TextClassifier,
};
use crate::config_parser::CandleClassifierConfig;
use crate::error::{DisplayOrDebugGateway, Error, ErrorDetails};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PYTORCH_FILE: &str = "pytorch_model.bin";

/// The parts of a sequence-classification `config.json` that the DistilBERT backbone
/// config does not expose.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    dim: usize,
    max_position_embeddings: usize,
    #[serde(default)]
    id2label: BTreeMap<String, String>,
    #[serde(default)]
    problem_type: Option<ProblemType>,
}

impl HeadConfig {
    /// Label names ordered by class index. Gaps are filled with `LABEL_{i}`.
    fn labels(&self) -> Result<Vec<String>, String> {
        let mut indexed = self
            .id2label
            .iter()
            .map(|(id, label)| {
                id.parse::<usize>()
                    .map(|id| (id, label.clone()))
                    .map_err(|e| format!("Invalid class index `{id}` in `id2label`: {e}"))
            })
            .collect::<Result<BTreeMap<usize, String>, String>>()?;
        let num_labels = match indexed.keys().next_back() {
            Some(max) => max + 1,
            None => return Err("`id2label` is missing or empty".to_string()),
        };
        Ok((0..num_labels)
            .map(|i| indexed.remove(&i).unwrap_or_else(|| format!("LABEL_{i}")))
            .collect())
    }

    /// Token budget per input: the configured limit, capped by the position embeddings.
    fn max_length(&self, max_sequence_length: Option<usize>) -> usize {
        max_sequence_length
            .unwrap_or(self.max_position_embeddings)
            .min(self.max_position_embeddings)
    }
}

#[derive(Debug)]
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// A DistilBERT sequence classifier run with `candle` on the CPU.
///
/// Weights, tokenizer and config come from the Hugging Face Hub (cached locally by
/// `hf-hub`) or from `local_dir`. Each input item is run through the model on its own.
pub struct CandleClassifier {
    model_name: String,
    model: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    problem_type: Option<ProblemType>,
    device: Device,
}

impl std::fmt::Debug for CandleClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleClassifier")
            .field("model_name", &self.model_name)
            .field("labels", &self.labels)
            .field("problem_type", &self.problem_type)
            .finish_non_exhaustive()
    }
}

fn model_load_error(model_name: &str, message: String) -> Error {
    Error::new(ErrorDetails::ModelLoad {
        model_name: model_name.to_string(),
        message,
    })
}

impl CandleClassifier {
    pub async fn load(config: &CandleClassifierConfig) -> Result<Self, Error> {
        let files = match &config.local_dir {
            Some(dir) => local_files(&config.model_name, dir)?,
            None => download_files(&config.model_name, &config.revision).await?,
        };
        tracing::debug!(?files, "Building classifier from model files");
        let model_name = config.model_name.clone();
        let max_sequence_length = config.max_sequence_length;
        tokio::task::spawn_blocking(move || Self::build(model_name, &files, max_sequence_length))
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::InternalError {
                    message: format!(
                        "Model loading task failed: {}",
                        DisplayOrDebugGateway::new(e)
                    ),
                })
            })?
    }

    fn build(
        model_name: String,
        files: &ModelFiles,
        max_sequence_length: Option<usize>,
    ) -> Result<Self, Error> {
        let device = Device::Cpu;
        let raw_config = std::fs::read_to_string(&files.config).map_err(|e| {
            model_load_error(
                &model_name,
                format!("Failed to read `{}`: {e}", files.config.display()),
            )
        })?;
        let backbone_config: DistilBertConfig = serde_json::from_str(&raw_config)
            .map_err(|e| model_load_error(&model_name, format!("Invalid `{CONFIG_FILE}`: {e}")))?;
        let head_config: HeadConfig = serde_json::from_str(&raw_config)
            .map_err(|e| model_load_error(&model_name, format!("Invalid `{CONFIG_FILE}`: {e}")))?;
        let labels = head_config
            .labels()
            .map_err(|e| model_load_error(&model_name, e))?;

        let max_length = head_config.max_length(max_sequence_length);
        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            model_load_error(
                &model_name,
                format!("Failed to load tokenizer: {}", DisplayOrDebugGateway::new(e)),
            )
        })?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| {
                model_load_error(
                    &model_name,
                    format!("Failed to configure truncation: {}", DisplayOrDebugGateway::new(e)),
                )
            })?;

        let candle_error = |e: candle_core::Error| {
            model_load_error(
                &model_name,
                format!("Failed to load weights: {}", DisplayOrDebugGateway::new(e)),
            )
        };
        let vb = load_weights(&files.weights, &device).map_err(candle_error)?;
        let model =
            DistilBertModel::load(vb.pp("distilbert"), &backbone_config).map_err(candle_error)?;
        let pre_classifier =
            candle_nn::linear(head_config.dim, head_config.dim, vb.pp("pre_classifier"))
                .map_err(candle_error)?;
        let classifier = candle_nn::linear(head_config.dim, labels.len(), vb.pp("classifier"))
            .map_err(candle_error)?;

        tracing::info!(
            model_name = %model_name,
            num_labels = labels.len(),
            max_length,
            "Loaded classification model"
        );
        Ok(Self {
            model_name,
            model,
            pre_classifier,
            classifier,
            tokenizer,
            labels,
            problem_type: head_config.problem_type,
            device,
        })
    }

    fn logits(&self, item: InputItem<'_>) -> Result<Vec<f32>, Error> {
        let (text, text_pair) = item.text_and_pair()?;
        let encoding = match text_pair {
            Some(text_pair) => self.tokenizer.encode((text, text_pair), true),
            None => self.tokenizer.encode(text, true),
        }
        .map_err(|e| {
            Error::new(ErrorDetails::Classification {
                message: format!("Tokenization failed: {}", DisplayOrDebugGateway::new(e)),
            })
        })?;
        self.forward(encoding.get_ids()).map_err(|e| {
            Error::new(ErrorDetails::Classification {
                message: format!(
                    "Inference failed for model `{}`: {}",
                    self.model_name,
                    DisplayOrDebugGateway::new(e)
                ),
            })
        })
    }

    fn forward(&self, ids: &[u32]) -> candle_core::Result<Vec<f32>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        // No padding within a single sequence, so nothing is masked
        let mask = Tensor::zeros((ids.len(), ids.len()), DType::U8, &self.device)?;
        let hidden = self.model.forward(&input_ids, &mask)?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pre_classifier.forward(&cls)?.relu()?;
        self.classifier.forward(&pooled)?.squeeze(0)?.to_vec1::<f32>()
    }
}

impl TextClassifier for CandleClassifier {
    fn classify(
        &self,
        inputs: &ClassificationInput,
        options: &ClassificationOptions,
    ) -> Result<ClassificationOutput, Error> {
        let items = inputs
            .items()
            .into_iter()
            .map(|item| {
                let logits = self.logits(item)?;
                Ok(postprocess(&logits, &self.labels, self.problem_type, options))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        ClassificationOutput::from_items(inputs, items)
    }

    fn describe(&self) -> String {
        format!("candle ({})", self.model_name)
    }
}

fn load_weights(path: &Path, device: &Device) -> candle_core::Result<VarBuilder<'static>> {
    if path.extension().is_some_and(|ext| ext == "safetensors") {
        let data = std::fs::read(path)?;
        VarBuilder::from_buffered_safetensors(data, DType::F32, device)
    } else {
        VarBuilder::from_pth(path, DType::F32, device)
    }
}

fn local_files(model_name: &str, dir: &Path) -> Result<ModelFiles, Error> {
    let require = |name: &str| {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(model_load_error(
                model_name,
                format!("Missing `{name}` in `{}`", dir.display()),
            ))
        }
    };
    let weights = if dir.join(SAFETENSORS_FILE).is_file() {
        dir.join(SAFETENSORS_FILE)
    } else {
        require(PYTORCH_FILE)?
    };
    Ok(ModelFiles {
        config: require(CONFIG_FILE)?,
        tokenizer: require(TOKENIZER_FILE)?,
        weights,
    })
}

async fn download_files(model_name: &str, revision: &str) -> Result<ModelFiles, Error> {
    let api = ApiBuilder::new().with_progress(false).build().map_err(|e| {
        model_load_error(
            model_name,
            format!("Failed to initialize Hugging Face Hub client: {e}"),
        )
    })?;
    let repo = api.repo(Repo::with_revision(
        model_name.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));
    let download = |name: &'static str| {
        let repo = &repo;
        async move {
            repo.get(name).await.map_err(|e| {
                Error::new_without_logging(ErrorDetails::ModelLoad {
                    model_name: model_name.to_string(),
                    message: format!("Failed to download `{name}`: {e}"),
                })
            })
        }
    };
    tracing::info!(model_name, revision, "Fetching model files from the Hugging Face Hub");
    let config = download(CONFIG_FILE).await.inspect_err(Error::log)?;
    let tokenizer = download(TOKENIZER_FILE).await.inspect_err(Error::log)?;
    let weights = match download(SAFETENSORS_FILE).await {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!("{e}; falling back to `{PYTORCH_FILE}`");
            download(PYTORCH_FILE).await.inspect_err(Error::log)?
        }
    };
    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}
